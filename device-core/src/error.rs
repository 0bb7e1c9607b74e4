//! Build-time configuration errors.

use thiserror::Error;

/// A device could not be assembled from its configuration.
///
/// These only occur while wiring a system together; a successfully built
/// device has no recoverable errors of its own at run time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("unknown line name: {0:?}")]
    UnknownLine(String),

    #[error("unknown clock source name: {0:?}")]
    UnknownClock(String),

    #[error("CE line {line:?} mapped to bit {bit}, exceeding the {width}-bit CE word")]
    BadCeMapping {
        line: &'static str,
        bit: u32,
        width: u32,
    },

    #[error("malformed device configuration: {0}")]
    BadConfig(String),
}
