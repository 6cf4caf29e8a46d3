use std::cmp::min;
use std::fmt::{Display, Formatter};

use crate::core::stream::{Error, Result};

const BYTES_PREFIX: &str = "bytes=";
const BYTES_LEN: usize = BYTES_PREFIX.len();

/// The HTTP range information according to rfc7233, resolved against a resource.
/// Only the `bytes` unit and a single range are supported, anything else results in an [Err].
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    /// The first byte of the range, inclusive.
    pub start: u64,
    /// The last byte of the range, inclusive.
    pub end: u64,
}

impl Range {
    /// Parse the given `Range` header value against the resource length.
    ///
    /// Supported specs are `bytes=N-`, `bytes=N-M` (the end being clamped to the
    /// resource length) and the suffix form `bytes=-S`. Multi-range specs are
    /// rejected.
    pub fn parse(value: &str, resource_len: u64) -> Result<Self> {
        if !value.starts_with(BYTES_PREFIX) {
            return Err(Error::InvalidRange);
        }

        let range_value = &value[BYTES_LEN..];
        if range_value.contains(',') {
            // multi-range requests are not supported
            return Err(Error::InvalidRange);
        }
        if resource_len == 0 {
            return Err(Error::InvalidRange);
        }

        if let Some(suffix) = range_value.strip_prefix('-') {
            let length = suffix
                .parse::<u64>()
                .map_err(|e| Error::Parse(e.to_string()))?;
            if length == 0 {
                return Err(Error::InvalidRange);
            }

            return Ok(Self {
                start: resource_len.saturating_sub(length),
                end: resource_len - 1,
            });
        }

        let (start_value, end_value) = range_value.split_once('-').ok_or(Error::InvalidRange)?;
        let start = start_value
            .parse::<u64>()
            .map_err(|e| Error::Parse(e.to_string()))?;
        let end = if end_value.is_empty() {
            resource_len - 1
        } else {
            let end = end_value
                .parse::<u64>()
                .map_err(|e| Error::Parse(e.to_string()))?;
            min(end, resource_len - 1)
        };

        if start >= resource_len || end < start {
            return Err(Error::InvalidRange);
        }

        Ok(Self { start, end })
    }

    /// The number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// The HTTP content range value of this range for the given resource length.
    pub fn content_range(&self, resource_len: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, resource_len)
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
