//! Protocol-wide constants for the J1850 VPW link layer and the ELM327
//! command interpreter.
//!
//! These mirror the constants scattered across the original firmware's
//! `vpw.h`, `j1850.h` and `elm.h` headers, collected here so framing,
//! buffer sizing and default configuration values have one home.

/// The escape byte that introduces an in-band control token in the
/// line-layer's byte stream. Chosen by the original hardware design as the
/// least-used byte observed on a real vehicle bus.
pub const W_WILDCARD: u8 = 0xEE;

/// Start Of Frame.
pub const W_SOF: u8 = 0x01;
/// End Of Data (J1850 PWM concept with in-frame responses; ignored on VPW).
pub const W_EOD: u8 = 0x02;
/// End Of Frame — commit the accumulated buffer as a message.
pub const W_EOF: u8 = 0x03;
/// Break — clear buffer, drop out of 4X.
pub const W_BRK: u8 = 0x04;
/// Assumed End Of Transmission — a scheduling hint, not a frame boundary.
pub const W_EOT: u8 = 0x05;

/// Switch to 1X (10.4 kb/s) timing.
pub const W_MODE_1X: u8 = 0x10;
/// Switch to 4X (41.6 kb/s) timing.
pub const W_MODE_4X: u8 = 0x11;

/// An EOF token arrived without a preceding SOF.
pub const W_ERROR_UNEXPECTED_EOF: u8 = 0x80;
/// A SOF token arrived while already inside a frame.
pub const W_ERROR_UNEXPECTED_SOF: u8 = 0x81;

/// The bus was observed stuck high past any legal pulse width.
pub const W_HIGH: u8 = 0x90;
/// A pulse shorter than the shortest legal bit width was observed.
pub const W_RUNT: u8 = 0x91;

/// Length-prefixed ASCII debug string follows.
pub const W_DEBUG_STRING: u8 = 0xFD;
/// One-byte decimal debug value follows.
pub const W_DEBUG: u8 = 0xFE;
/// An 8-byte (sec:u32, usec:u32) timestamp payload follows.
pub const W_TIMESTAMP: u8 = 0xFF;

/// CRC-8/VPW polynomial (x^8 + x^4 + x^3 + x^2 + 1).
pub const CRC_POLY: u8 = 0x1D;

/// Minimum valid frame length: header + target + source + at least one
/// data byte + trailing CRC.
pub const MIN_FRAME_LEN: usize = 5;
/// Maximum frame length at 1X; 4X frames may run longer (display-layer
/// truncation, not a transmit limit — see `Config::allow_long`).
pub const MAX_FRAME_LEN_1X: usize = 12;
/// Upper bound used to size bounded (`no_std`) frame/message buffers.
/// 4X VPW traffic is not expected to exceed this in practice.
pub const MAX_FRAME_LEN: usize = 264;

/// Default device header used when no custom header is set.
pub const DEFAULT_HEADER: &str = "686ATT";

/// `ELM327 V2.3` — the version string reported by `ATI`.
pub const ELM_VERSION: &str = "ELM327 V2.3";

/// Serial baud rate restored by a full reset (`ATZ`).
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Secondary address that commands entry into 4X mode when received on a
/// physical frame addressed to `0xFE`.
pub const ENTER_4X_SECONDARY: u8 = 0xA1;
/// Secondary address that commands a return to 1X mode.
pub const EXIT_4X_SECONDARY: u8 = 0x20;
/// Target byte used for the 1X/4X mode-switch command frame.
pub const MODE_SWITCH_TARGET: u8 = 0xFE;

/// Minimum monitor inter-byte timeout, in milliseconds (`ATST`).
pub const MIN_MONITOR_TIMEOUT_MS: u8 = 0x08;
/// Default monitor inter-byte timeout, in milliseconds.
pub const DEFAULT_MONITOR_TIMEOUT_MS: u8 = 0x32;

/// Bounded capacity for the host-command line buffer (`no_std` builds).
pub const MAX_COMMAND_LEN: usize = 128;
/// Bounded capacity for queues of shared messages/notifications in
/// `no_std` builds.
pub const MAX_QUEUE_LEN: usize = 32;
/// Bounded capacity for the programmatic-response map in `no_std` builds.
pub const MAX_PROGRAMMATIC_RESPONSES: usize = 16;

/// Board identifier baked into `AT@1`/`DXI`'s device-description string
/// (`original_source/elm.h`'s `DEVICE_DESCRIPTION` macro, which
/// concatenates a fixed prefix with a build-time board define). A real
/// firmware build overrides this via its own `consts` shim; it is a
/// plain constant here since this crate has no build script.
pub const BOARD_NAME: &str = "PICO";
