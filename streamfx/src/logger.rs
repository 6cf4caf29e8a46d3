use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

const LOG_FORMAT_CONSOLE: &str = "\x1B[37m{d(%Y-%m-%d %H:%M:%S%.3f)}\x1B[0m {h({l:>5.5})} \x1B[35m{I:>6.6}\x1B[0m \x1B[37m---\x1B[0m \x1B[37m[{T:>15.15}]\x1B[0m \x1B[36m{t:<40.40}\x1B[0m \x1B[37m:\x1B[0m {m}{n}";
const CONSOLE_APPENDER: &str = "stdout";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The errors which can occur while initializing the logger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoggerError {
    #[error("the logger has already been initialized")]
    AlreadyInitialized,
    #[error("logger configuration is invalid, {0}")]
    InvalidConfig(String),
}

/// Initialize the application logger with the given root level.
pub fn init(root_level: LevelFilter) -> Result<(), LoggerError> {
    if INITIALIZED.swap(true, Ordering::Relaxed) {
        return Err(LoggerError::AlreadyInitialized);
    }

    let config = Config::builder()
        .appender(Appender::builder().build(
            CONSOLE_APPENDER,
            Box::new(
                ConsoleAppender::builder()
                    .encoder(Box::new(PatternEncoder::new(LOG_FORMAT_CONSOLE)))
                    .build(),
            ),
        ))
        .logger(Logger::builder().build("fx_callback", LevelFilter::Info))
        .logger(Logger::builder().build("hyper", LevelFilter::Info))
        .logger(Logger::builder().build("hyper_util", LevelFilter::Info))
        .logger(Logger::builder().build("mio", LevelFilter::Info))
        .logger(Logger::builder().build("rustls", LevelFilter::Info))
        .build(Root::builder().appender(CONSOLE_APPENDER).build(root_level))
        .map_err(|e| LoggerError::InvalidConfig(e.to_string()))?;

    log4rs::init_config(config).map_err(|e| LoggerError::InvalidConfig(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        let _ = init(LevelFilter::Info);

        let result = init(LevelFilter::Info);

        assert_eq!(Err(LoggerError::AlreadyInitialized), result);
    }
}
