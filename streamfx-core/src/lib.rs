/// The current application version of StreamFX.
pub const VERSION: &str = "1.0.0";

pub mod core;

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use log::LevelFilter;
    use log4rs::append::console::ConsoleAppender;
    use log4rs::config::{Appender, Logger, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use log4rs::Config;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Initializes the logger with the specified log level.
    #[macro_export]
    macro_rules! init_logger {
        ($level:expr) => {
            streamfx_core::testing::init_logger_level($level)
        };
        () => {
            streamfx_core::testing::init_logger_level(log::LevelFilter::Trace)
        };
    }

    /// Initializes the logger with the specified log level.
    pub fn init_logger_level(level: LevelFilter) {
        INIT.call_once(|| {
            log4rs::init_config(Config::builder()
                .appender(Appender::builder().build("stdout", Box::new(ConsoleAppender::builder()
                    .encoder(Box::new(PatternEncoder::new("\x1B[37m{d(%Y-%m-%d %H:%M:%S%.3f)}\x1B[0m {h({l:>5.5})} \x1B[35m{I:>6.6}\x1B[0m \x1B[37m---\x1B[0m \x1B[37m[{T:>15.15}]\x1B[0m \x1B[36m{t:<60.60}\x1B[0m \x1B[37m:\x1B[0m {m}{n}")))
                    .build())))
                .logger(Logger::builder().build("fx_callback", LevelFilter::Info))
                .logger(Logger::builder().build("hyper", LevelFilter::Info))
                .logger(Logger::builder().build("hyper_util", LevelFilter::Info))
                .logger(Logger::builder().build("mio", LevelFilter::Info))
                .logger(Logger::builder().build("reqwest", LevelFilter::Info))
                .logger(Logger::builder().build("rustls", LevelFilter::Info))
                .logger(Logger::builder().build("want", LevelFilter::Info))
                .build(Root::builder().appender("stdout").build(level))
                .unwrap())
                .unwrap();
        })
    }

    /// Write a test file with the given contents into the directory.
    ///
    /// It returns the absolute path of the created file.
    pub fn write_test_file<P: AsRef<Path>>(directory: P, filename: &str, contents: &[u8]) -> PathBuf {
        let destination = directory.as_ref().join(filename);

        // make sure the parent dir exists
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, contents).unwrap();

        destination
    }

    /// Assert that the given condition becomes true within the timeout.
    #[macro_export]
    macro_rules! assert_timeout {
        ($timeout:expr, $condition:expr, $message:expr) => {{
            let start = std::time::Instant::now();
            while !$condition {
                if start.elapsed() >= $timeout {
                    assert!(false, "{} within {:?}", $message, $timeout);
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        }};
    }
}
