//! # vpw-elm
//!
//! An ELM327-compatible command interpreter and SAE J1850 VPW
//! link-layer/message-assembler stack for embedded OBD-II diagnostic
//! adapters, built around two cooperating halves:
//!
//! - a **link layer** ([`token`], [`assembler`], [`frame`], [`crc`],
//!   [`hex`], [`timing`]) that turns a VPW line's raw mark/space edges
//!   into framed, CRC-checked [`message::Message`]s and back, with no
//!   allocator and no assumptions about what drives it
//! - a **host-facing interpreter** ([`elm`], [`terminal`], [`automation`],
//!   [`settings`]) that speaks the AT/DX/GM command set a scan tool
//!   expects from an ELM327-class adapter
//!
//! ## Crate features
//! | Feature        | Description |
//! |----------------|-------------|
//! | `std` (default)      | Enables the command interpreter, terminal loop, and settings repository, all of which lean on `String`/`Vec`/`HashMap` for host-session bookkeeping |
//! | `timer-isr` (default) | Documents that the host drives the link layer from an interrupt/polling tick rather than a blocking delay loop; the link layer itself has no feature-specific code path |
//! | `delay-loop`   | Documents the alternative: a blocking loop drives the tick instead of a hardware timer |
//! | `defmt-0-3`    | Uses `defmt` logging instead of `log` |
//! | `log`          | Uses `log` logging |
//!
//! The link-layer primitives (`crc`, `hex`, `frame`, `token`, `assembler`,
//! `message`, `timing`, `queue`, `collab`) build under plain `no_std`
//! regardless of the `std` feature; only the host-session half needs an
//! allocator.
//!
//! ## Usage
//!
//! ```rust
//! use vpw_elm::automation::Automation;
//! use vpw_elm::settings::InMemorySettings;
//! use vpw_elm::terminal::Terminal;
//! use vpw_elm::timing::Timestamp;
//! # use vpw_elm::collab::{BoardInfo, HostPort, Rtc, TimeSource};
//! # struct LoopbackPort { buf: std::collections::VecDeque<u8>, out: Vec<u8> }
//! # impl HostPort for LoopbackPort {
//! #     fn read_byte(&mut self) -> Option<u8> { self.buf.pop_front() }
//! #     fn write(&mut self, data: &[u8]) { self.out.extend_from_slice(data) }
//! #     fn dtr(&self) -> bool { true }
//! #     fn set_dsr(&mut self, _value: bool) {}
//! # }
//! # struct NoopBoard;
//! # impl BoardInfo for NoopBoard {
//! #     fn unique_id(&self, _include_dashes: bool) -> String { "DEADBEEF".into() }
//! #     fn cpu_temperature(&self) -> f32 { 25.0 }
//! #     fn free_memory(&self) -> u32 { 1024 }
//! # }
//! # struct NoopRtc;
//! # impl Rtc for NoopRtc {
//! #     fn begin(&mut self) -> bool { true }
//! #     fn start(&mut self) {}
//! #     fn now(&self) -> Option<Timestamp> { None }
//! #     fn lost_power(&self) -> bool { false }
//! #     fn adjust(&mut self, _timestamp: Timestamp) {}
//! # }
//! # struct NoopTime { now: Timestamp }
//! # impl TimeSource for NoopTime {
//! #     fn now(&self) -> Timestamp { self.now }
//! #     fn set(&mut self, timestamp: Timestamp) { self.now = timestamp; }
//! #     fn set_timezone(&mut self, _tz: &str) {}
//! #     fn timezone(&self) -> Option<String> { None }
//! #     fn format_local(&self, timestamp: Timestamp) -> String { format!("{}", timestamp.sec) }
//! # }
//!
//! fn main() {
//!     let port = LoopbackPort { buf: b"ATI\r".iter().copied().collect(), out: Vec::new() };
//!     let mut term = Terminal::new(port);
//!     let automation = Automation::new();
//!     let mut settings = InMemorySettings::new();
//!     let board = NoopBoard;
//!     let mut rtc = NoopRtc;
//!     let mut time = NoopTime { now: Timestamp::ZERO };
//!
//!     // Drive the host-facing side once per received byte...
//!     term.poll(&automation, &mut settings, &board, &mut rtc, &mut time);
//!     // ...while a second loop feeds the link layer's `TokenProducer`
//!     // from the VPW line and hands assembled messages to `Terminal`.
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - The link layer and the command interpreter are deliberately
//!   decoupled: nothing in `token`/`assembler` knows about `elm`, and
//!   `elm`/`terminal` only see [`message::Message`]s and [`token::SendStatus`]
//!   values, never line-level edges.
//! - [`automation::Automation`] is passed by shared reference rather than
//!   reached for as a global: both the link-layer assembler (to decide
//!   whether a programmatic response fires) and the command interpreter
//!   (to change what it fires) need it, and neither owns it.
//! - `RecursiveMutex` ([`queue`]) assumes `critical_section::with` nests
//!   safely for same-caller reentrant locking; see its doc comment before
//!   reusing it as a general-purpose lock.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;

#[cfg(not(feature = "std"))]
pub use heapless;

pub mod assembler;
pub mod automation;
pub mod collab;
pub mod consts;
pub(crate) mod crc;
#[cfg(feature = "std")]
pub mod elm;
pub mod error;
pub mod frame;
pub mod hex;
pub mod message;
pub mod queue;
#[cfg(feature = "std")]
pub mod settings;
#[cfg(feature = "std")]
pub mod terminal;
pub mod timing;
pub mod token;
