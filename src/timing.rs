//! Wall-clock timestamps carried by messages and the token stream.
//!
//! Mirrors the original firmware's use of POSIX `struct timeval` (seconds
//! + microseconds) in `vpw.h`/`message.h`. The adapter has no RTC of its
//! own; a `TimeSource` collaborator (see `collab.rs`) supplies the value,
//! which this type just carries and does arithmetic on.

use core::ops::Sub;

/// Seconds + microseconds since some epoch meaningful to the caller (wall
/// clock if an RTC is fitted, monotonic uptime otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub sec: u32,
    pub usec: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, usec: 0 };

    pub fn new(sec: u32, usec: u32) -> Self {
        Timestamp { sec, usec }
    }

    /// Encodes as the 8-byte big-endian `(sec, usec)` payload that follows
    /// a `W_TIMESTAMP` token on the wire.
    pub fn to_be_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..4].copy_from_slice(&self.sec.to_be_bytes());
        out[4..8].copy_from_slice(&self.usec.to_be_bytes());
        out
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        let sec = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let usec = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        Timestamp { sec, usec }
    }
}

/// Subtracts `offset` from `self`, borrowing a second from the seconds
/// field whenever the subtrahend's microseconds are larger than the
/// minuend's — matching `message.h`'s offset-display arithmetic:
/// `if (usec < offset.usec) { usec += 1_000_000; sec -= 1; }`.
impl Sub for Timestamp {
    type Output = Timestamp;

    fn sub(self, offset: Timestamp) -> Timestamp {
        let (usec, borrow) = if self.usec >= offset.usec {
            (self.usec - offset.usec, 0)
        } else {
            (1_000_000 + self.usec - offset.usec, 1)
        };
        let sec = self.sec.wrapping_sub(offset.sec).wrapping_sub(borrow);
        Timestamp { sec, usec }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtracts_seconds_when_no_usec_offset() {
        let a = Timestamp::new(100, 500);
        let b = Timestamp::new(40, 0);
        assert_eq!(a - b, Timestamp::new(60, 500));
    }

    #[test]
    fn borrows_a_second_when_usec_offset_exceeds() {
        let a = Timestamp::new(100, 200);
        let b = Timestamp::new(40, 900);
        let result = a - b;
        assert_eq!(result.sec, 59);
        assert_eq!(result.usec, 1_000_000 + 200 - 900);
    }

    #[test]
    fn roundtrips_through_wire_bytes() {
        let t = Timestamp::new(0x0102_0304, 0x0506_0708);
        assert_eq!(Timestamp::from_be_bytes(t.to_be_bytes()), t);
    }
}
