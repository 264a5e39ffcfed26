//! Contracts for the external collaborators named out of scope in
//! spec.md §1/§6: LED/pixel feedback, SD-card logging, the RTC driver,
//! wall-clock time, and board-identity/health queries. Every real
//! firmware build supplies concrete implementations; this crate only
//! needs the trait boundary so the core is testable without hardware.
//!
//! `VpwLine` (the PIO/line-layer contract) lives in [`crate::token`]
//! since it's load-bearing for that module specifically; the rest are
//! collected here.

use crate::timing::Timestamp;

/// LED/pixel indicator, driven by a callback in the original
/// (`led_handler_t`, `original_source/vpw_led.h`). `state` mirrors
/// `ledHandlerState`.
pub trait LedIndicator {
    fn set(&mut self, on: bool, state: LedState);
}

/// Mirrors `original_source/vpw_led.h`'s `ledHandlerState` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    Receive,
    Sof,
    Eof,
    Eot,
    Send,
    Congestion,
}

/// Opaque append-only byte sink mirroring `original_source/sdlog.h`'s
/// `SDLog::write`. Out of scope for implementation in this crate (no SD
/// card in the test harness) but declared so `Terminal`/`Automation`
/// callers can be handed one.
pub trait SdLog {
    fn append(&mut self, data: &[u8]) -> bool;
}

/// Real-time clock, mirroring `original_source/rtc.h`'s bare functions
/// plus the `RTC_PCF8523` surface they call (`begin`, `now`,
/// `lostPower`).
pub trait Rtc {
    fn begin(&mut self) -> bool;
    fn start(&mut self);
    fn now(&self) -> Option<Timestamp>;
    fn lost_power(&self) -> bool;
    fn adjust(&mut self, timestamp: Timestamp);
}

/// Replaces POSIX `gettimeofday`/`settimeofday`/`tzset`/`localtime_r`,
/// used by `ATTIME`, `ATUT`, `ATTZ`, `ATTS`.
pub trait TimeSource {
    fn now(&self) -> Timestamp;
    fn set(&mut self, timestamp: Timestamp);
    /// Sets the active timezone (a POSIX `TZ` string, e.g.
    /// `"America/New_York"`) and applies it (the original's `tzset()`).
    fn set_timezone(&mut self, tz: &str);
    /// Currently active timezone, if one has been set.
    fn timezone(&self) -> Option<alloc_string::String>;
    /// `YYYY-MM-DD HH:MM:SS` in the active timezone (`ATTIME`,
    /// `original_source/util.h::timevalToString`).
    fn format_local(&self, timestamp: Timestamp) -> alloc_string::String;
}

/// Board identity/health, mirroring `original_source/util.h::Util`.
pub trait BoardInfo {
    /// Hyphenated (or plain) hex board ID, e.g. from
    /// `pico_get_unique_board_id`.
    fn unique_id(&self, include_dashes: bool) -> alloc_string::String;
    fn cpu_temperature(&self) -> f32;
    fn free_memory(&self) -> u32;
}

/// The host serial port's byte-level contract, used by [`crate::terminal`].
/// The literal UART transport is out of scope (spec.md §1); this trait is
/// the line-editing/gating layer's only dependency on it.
pub trait HostPort {
    fn read_byte(&mut self) -> Option<u8>;
    fn write(&mut self, data: &[u8]);
    /// DTR, host-asserted, gates incoming host input.
    fn dtr(&self) -> bool;
    /// DSR, device-asserted, gates outgoing monitor/notification output.
    fn set_dsr(&mut self, value: bool);
}

#[cfg(feature = "std")]
mod alloc_string {
    pub use std::string::String;
}
#[cfg(not(feature = "std"))]
mod alloc_string {
    pub type String = heapless::String<64>;
}
