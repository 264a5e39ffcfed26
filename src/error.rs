//! Crate-wide error types, following the teacher's `thiserror`-derived
//! enum style ([`crate::settings::SettingsError`]).
//!
//! `sendVPW_status_t` (`original_source/vpw.h`) and `PrError`-shaped
//! failures in `original_source/elm.h`'s `ATPR` both surface as sentinel
//! values or a boolean `process()` return in the original; here each gets
//! a real error type so callers match instead of comparing magic numbers.

use thiserror::Error;

#[cfg(feature = "std")]
pub use crate::settings::SettingsError;
use crate::token::SendStatus;

/// [`SendStatus`] viewed as an error, for callers that want `?` on a
/// transmit attempt rather than a match over every variant. `Ok` has no
/// corresponding variant — convert with [`SendError::from_status`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("line busy, transmit deferred")]
    Congestion,
    #[error("frame failed CRC check")]
    InvalidCrc,
    #[error("frame shorter than the minimum legal length")]
    TooShort,
    #[error("frame exceeds the 1X length limit")]
    TooLong,
    #[error("no echo observed while driving the bus")]
    NoEcho,
    #[error("a previous send is still in progress")]
    StillSending,
}

impl SendError {
    /// Converts a [`SendStatus`] into `Ok(())` or the matching error
    /// variant.
    pub fn from_status(status: SendStatus) -> Result<(), SendError> {
        match status {
            SendStatus::Ok => Ok(()),
            SendStatus::Congestion => Err(SendError::Congestion),
            SendStatus::InvalidCrc => Err(SendError::InvalidCrc),
            SendStatus::TooShort => Err(SendError::TooShort),
            SendStatus::TooLong => Err(SendError::TooLong),
            SendStatus::NoEcho => Err(SendError::NoEcho),
            SendStatus::StillSending => Err(SendError::StillSending),
        }
    }
}

/// Human-readable text a `Terminal` prints for a failed send (spec.md
/// §4.H's `printSendError`, `original_source/cli.h`). The original
/// carries no literal strings for these in the headers retrieved here;
/// these follow the `NO DATA`/`BUS BUSY`/`DATA ERROR`/`BUFFER FULL`
/// vocabulary real ELM327 clones report for the equivalent conditions.
pub fn host_text(status: SendStatus) -> &'static str {
    match status {
        SendStatus::Ok => "OK",
        SendStatus::Congestion => "BUS BUSY",
        SendStatus::InvalidCrc | SendStatus::TooShort | SendStatus::TooLong => "DATA ERROR",
        SendStatus::NoEcho => "NO DATA",
        SendStatus::StillSending => "BUFFER FULL",
    }
}

/// `ATPR` failure modes the parser in [`crate::elm::pr`] doesn't
/// distinguish (it collapses all of these to `None` and the caller
/// responds `?`). Exposed separately for callers that want to log or
/// report which rule was violated rather than just that parsing failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PrError {
    #[error("key contains non-hex characters")]
    InvalidKey,
    #[error("missing = + - or ? operator")]
    MissingOperator,
    #[error("value contains a leading or doubled comma")]
    MalformedValue,
    #[error("a comma-separated run has odd length")]
    OddLengthRun,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_maps_ok_to_result_ok() {
        assert_eq!(SendError::from_status(SendStatus::Ok), Ok(()));
    }

    #[test]
    fn from_status_maps_each_failure_variant() {
        assert_eq!(
            SendError::from_status(SendStatus::Congestion),
            Err(SendError::Congestion)
        );
        assert_eq!(
            SendError::from_status(SendStatus::NoEcho),
            Err(SendError::NoEcho)
        );
    }

    #[test]
    fn host_text_covers_every_status() {
        assert_eq!(host_text(SendStatus::Ok), "OK");
        assert_eq!(host_text(SendStatus::Congestion), "BUS BUSY");
        assert_eq!(host_text(SendStatus::InvalidCrc), "DATA ERROR");
        assert_eq!(host_text(SendStatus::TooShort), "DATA ERROR");
        assert_eq!(host_text(SendStatus::TooLong), "DATA ERROR");
        assert_eq!(host_text(SendStatus::NoEcho), "NO DATA");
        assert_eq!(host_text(SendStatus::StillSending), "BUFFER FULL");
    }
}
