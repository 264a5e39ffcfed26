//! Line-layer token stream: the state machine that turns raw bus events
//! into the wildcard-escaped byte stream the assembler consumes, plus the
//! transmit path.
//!
//! Grounded on `original_source/vpw.h` (`wildcardEncoding`,
//! `sendVPW_status_t`) for the token/status vocabulary, and on the
//! teacher's `src/driver.rs` for the tick-driven state machine shape over
//! a generic pin trait. The actual bit-timing/PIO program that detects
//! SOF/EOF/BRK pulses on real silicon is out of scope here (see
//! `VpwLine`); this module owns the event -> token mapping and the
//! transmit status logic, which are hardware-independent.

use crate::consts::*;
use crate::frame::Frame;
use crate::timing::Timestamp;

#[cfg(not(feature = "std"))]
use heapless::Vec;
#[cfg(feature = "std")]
use std::vec::Vec;

/// The line layer's contract with the external bus transceiver. A real
/// implementation samples a PIO state machine's FIFO; tests use an
/// in-memory fake (see `tests` below).
pub trait VpwLine {
    /// True if the bus is currently idle (used for transmit arbitration).
    fn is_idle(&self) -> bool;
    /// Drives one bit onto the bus and blocks (or returns `WouldBlock`)
    /// until its echo has been sampled back, confirming transmission.
    fn drive_bit(&mut self, high: bool) -> nb::Result<(), core::convert::Infallible>;
    /// Polls for the next observed line event, if one has completed since
    /// the last call.
    fn poll_event(&mut self) -> Option<LineEvent>;
    /// Current timestamp, sampled at the moment of the call.
    fn now(&self) -> Timestamp;
}

/// Raw events the line layer can observe, independent of frame state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Sof,
    DataByte(u8),
    Eod,
    Eof,
    Brk,
    UnexpectedSof,
    UnexpectedEof,
    High,
    Runt,
    Mode1X,
    Mode4X,
    IdleElapsed,
}

/// Line-layer producer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    BusIdle,
    InFrame,
}

/// Result of a completed or attempted `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Ok,
    Congestion,
    InvalidCrc,
    TooShort,
    TooLong,
    NoEcho,
    StillSending,
}

/// Object-safe view of [`TokenProducer::send`], so callers that only need
/// to transmit (the automation auto-responder, periodic broadcast tasks)
/// don't need to be generic over `L: VpwLine`.
pub trait FrameSender {
    fn send(&mut self, frame: &Frame, allow_invalid: bool, send_4x: bool) -> SendStatus;
}

impl<L: VpwLine> FrameSender for TokenProducer<L> {
    fn send(&mut self, frame: &Frame, allow_invalid: bool, send_4x: bool) -> SendStatus {
        TokenProducer::send(self, frame, allow_invalid, send_4x)
    }
}

#[cfg(feature = "std")]
type TokenBuf = Vec<u8>;
#[cfg(not(feature = "std"))]
type TokenBuf = Vec<u8, MAX_FRAME_LEN>;

/// Drives the bus-event -> wildcard-escaped-token state machine from one
/// tick to the next. `tick()` is meant to run on whichever core owns the
/// bus hardware; it only ever appends to an internal buffer, which
/// `drain_into` hands to the assembler.
pub struct TokenProducer<L: VpwLine> {
    line: L,
    state: LineState,
    use_timestamp: bool,
    sending: bool,
    out: TokenBuf,
}

impl<L: VpwLine> core::fmt::Debug for TokenProducer<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenProducer")
            .field("state", &self.state)
            .field("sending", &self.sending)
            .finish_non_exhaustive()
    }
}

impl<L: VpwLine> TokenProducer<L> {
    pub fn new(line: L, use_timestamp: bool) -> Self {
        TokenProducer {
            line,
            state: LineState::BusIdle,
            use_timestamp,
            sending: false,
            out: TokenBuf::new(),
        }
    }

    fn emit(&mut self, byte: u8) {
        #[cfg(feature = "std")]
        self.out.push(byte);
        #[cfg(not(feature = "std"))]
        let _ = self.out.push(byte);
    }

    fn emit_control(&mut self, control: u8) {
        self.emit(W_WILDCARD);
        self.emit(control);
    }

    fn emit_data(&mut self, byte: u8) {
        self.emit(byte);
        if byte == W_WILDCARD {
            // Escape: a literal wildcard byte in the data stream is sent twice.
            self.emit(byte);
        }
    }

    fn emit_timestamp(&mut self) {
        if !self.use_timestamp {
            return;
        }
        self.emit_control(W_TIMESTAMP);
        for b in self.line.now().to_be_bytes() {
            self.emit(b);
        }
    }

    /// Advances the state machine by one line-layer observation. Call
    /// repeatedly (e.g. from a polling loop or timer ISR) to drain all
    /// pending events.
    pub fn tick(&mut self) {
        let Some(event) = self.line.poll_event() else {
            return;
        };
        match (self.state, event) {
            (LineState::BusIdle, LineEvent::Sof) => {
                self.emit_timestamp();
                self.emit_control(W_SOF);
                self.state = LineState::InFrame;
            }
            (LineState::InFrame, LineEvent::Sof) => {
                self.emit_control(W_ERROR_UNEXPECTED_SOF);
                self.state = LineState::BusIdle;
            }
            (LineState::InFrame, LineEvent::DataByte(b)) => {
                self.emit_data(b);
            }
            (LineState::InFrame, LineEvent::Eod) => {
                self.emit_control(W_EOD);
            }
            (LineState::InFrame, LineEvent::Eof) => {
                self.emit_control(W_EOF);
                self.state = LineState::BusIdle;
            }
            (LineState::BusIdle, LineEvent::Eof) => {
                self.emit_control(W_ERROR_UNEXPECTED_EOF);
            }
            (_, LineEvent::UnexpectedSof) => {
                #[cfg(feature = "log")]
                log::warn!("unexpected SOF while in state {:?}", self.state);
                self.emit_control(W_ERROR_UNEXPECTED_SOF);
                self.state = LineState::BusIdle;
            }
            (_, LineEvent::UnexpectedEof) => {
                #[cfg(feature = "log")]
                log::warn!("unexpected EOF while in state {:?}", self.state);
                self.emit_control(W_ERROR_UNEXPECTED_EOF);
                self.state = LineState::BusIdle;
            }
            (_, LineEvent::Brk) => {
                self.emit_control(W_BRK);
                self.state = LineState::BusIdle;
            }
            (_, LineEvent::High) => {
                #[cfg(feature = "log")]
                log::warn!("bus observed stuck high");
                self.emit_control(W_HIGH);
                self.state = LineState::BusIdle;
            }
            (_, LineEvent::Runt) => {
                #[cfg(feature = "log")]
                log::warn!("runt pulse observed");
                self.emit_control(W_RUNT);
            }
            (_, LineEvent::Mode1X) => {
                #[cfg(feature = "log")]
                log::debug!("line mode -> 1X");
                self.emit_control(W_MODE_1X);
            }
            (_, LineEvent::Mode4X) => {
                #[cfg(feature = "log")]
                log::debug!("line mode -> 4X");
                self.emit_control(W_MODE_4X);
            }
            (LineState::BusIdle, LineEvent::IdleElapsed) => {
                self.emit_control(W_EOT);
            }
            _ => {}
        }
    }

    /// Moves everything accumulated since the last drain into `sink`,
    /// leaving the internal buffer empty.
    pub fn drain_into(&mut self, sink: &mut TokenBuf) {
        for b in self.out.iter().copied() {
            #[cfg(feature = "std")]
            sink.push(b);
            #[cfg(not(feature = "std"))]
            let _ = sink.push(b);
        }
        self.out.clear();
    }

    /// Transmits `frame` per spec.md's six-step send procedure. The CRC is
    /// expected to already be appended by the caller (the ELM config's
    /// `autoCRC` policy lives one layer up, in `elm`).
    pub fn send(&mut self, frame: &Frame, allow_invalid: bool, send_4x: bool) -> SendStatus {
        if !allow_invalid && !frame.valid() {
            return SendStatus::InvalidCrc;
        }
        let len = frame.len();
        if len < MIN_FRAME_LEN {
            return SendStatus::TooShort;
        }
        if !send_4x && len > MAX_FRAME_LEN_1X {
            return SendStatus::TooLong;
        }
        if self.sending {
            return SendStatus::StillSending;
        }
        if !self.line.is_idle() {
            return SendStatus::Congestion;
        }

        self.sending = true;
        let raw = frame.raw();
        for byte in raw {
            for bit in (0..8).rev() {
                let high = (byte >> bit) & 1 != 0;
                if nb::block!(self.line.drive_bit(high)).is_err() {
                    self.sending = false;
                    return SendStatus::NoEcho;
                }
            }
        }
        self.sending = false;
        SendStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "std")]
    use std::collections::VecDeque;

    #[cfg(feature = "std")]
    struct FakeLine {
        events: VecDeque<LineEvent>,
        idle: bool,
        echoes: VecDeque<bool>,
    }

    #[cfg(feature = "std")]
    impl FakeLine {
        fn new(events: Vec<LineEvent>) -> Self {
            FakeLine {
                events: events.into(),
                idle: true,
                echoes: VecDeque::new(),
            }
        }
    }

    #[cfg(feature = "std")]
    impl VpwLine for FakeLine {
        fn is_idle(&self) -> bool {
            self.idle
        }

        fn drive_bit(&mut self, high: bool) -> nb::Result<(), core::convert::Infallible> {
            self.echoes.push_back(high);
            Ok(())
        }

        fn poll_event(&mut self) -> Option<LineEvent> {
            self.events.pop_front()
        }

        fn now(&self) -> Timestamp {
            Timestamp::ZERO
        }
    }

    #[cfg(feature = "std")]
    fn drain(producer: &mut TokenProducer<FakeLine>, n_ticks: usize) -> Vec<u8> {
        let mut out = TokenBuf::new();
        for _ in 0..n_ticks {
            producer.tick();
        }
        producer.drain_into(&mut out);
        out
    }

    #[test]
    #[cfg(feature = "std")]
    fn sof_then_data_then_eof_produces_expected_tokens() {
        let line = FakeLine::new(vec![
            LineEvent::Sof,
            LineEvent::DataByte(0x68),
            LineEvent::DataByte(0x6A),
            LineEvent::Eof,
        ]);
        let mut producer = TokenProducer::new(line, false);
        let tokens = drain(&mut producer, 4);
        assert_eq!(
            tokens,
            vec![W_WILDCARD, W_SOF, 0x68, 0x6A, W_WILDCARD, W_EOF]
        );
    }

    #[test]
    #[cfg(feature = "std")]
    fn wildcard_byte_in_data_is_escaped() {
        let line = FakeLine::new(vec![LineEvent::Sof, LineEvent::DataByte(W_WILDCARD)]);
        let mut producer = TokenProducer::new(line, false);
        let tokens = drain(&mut producer, 2);
        assert_eq!(tokens, vec![W_WILDCARD, W_SOF, W_WILDCARD, W_WILDCARD]);
    }

    #[test]
    #[cfg(feature = "std")]
    fn brk_resets_to_idle_from_any_state() {
        let line = FakeLine::new(vec![LineEvent::Sof, LineEvent::Brk, LineEvent::Eof]);
        let mut producer = TokenProducer::new(line, false);
        // After BRK we're back in BusIdle, so the trailing EOF is unexpected.
        let tokens = drain(&mut producer, 3);
        assert_eq!(
            tokens,
            vec![
                W_WILDCARD,
                W_SOF,
                W_WILDCARD,
                W_BRK,
                W_WILDCARD,
                W_ERROR_UNEXPECTED_EOF
            ]
        );
    }

    #[test]
    #[cfg(feature = "std")]
    fn send_rejects_invalid_frame_unless_allowed() {
        let line = FakeLine::new(vec![]);
        let mut producer = TokenProducer::new(line, false);
        let mut buf = crate::frame::FrameBuf::new();
        buf.extend_from_slice(&[0x68, 0x6A, 0xF1, 0x01, 0x00, 0x00]); // wrong CRC
        let frame = Frame::new(buf, true);
        assert_eq!(producer.send(&frame, false, false), SendStatus::InvalidCrc);
    }

    #[test]
    #[cfg(feature = "std")]
    fn send_rejects_congestion_when_line_busy() {
        let line = FakeLine::new(vec![]);
        let mut producer = TokenProducer::new(line, false);
        producer.line.idle = false;
        let crc = crate::crc::crc8(&[0x68, 0x6A, 0xF1, 0x01, 0x00]);
        let mut buf = crate::frame::FrameBuf::new();
        buf.extend_from_slice(&[0x68, 0x6A, 0xF1, 0x01, 0x00, crc]);
        let frame = Frame::new(buf, true);
        assert_eq!(producer.send(&frame, false, false), SendStatus::Congestion);
    }

    #[test]
    #[cfg(feature = "std")]
    fn send_succeeds_for_valid_frame_on_idle_line() {
        let line = FakeLine::new(vec![]);
        let mut producer = TokenProducer::new(line, false);
        let crc = crate::crc::crc8(&[0x68, 0x6A, 0xF1, 0x01, 0x00]);
        let mut buf = crate::frame::FrameBuf::new();
        buf.extend_from_slice(&[0x68, 0x6A, 0xF1, 0x01, 0x00, crc]);
        let frame = Frame::new(buf, true);
        assert_eq!(producer.send(&frame, false, false), SendStatus::Ok);
    }

    #[test]
    #[cfg(feature = "std")]
    fn send_rejects_too_long_for_1x() {
        let line = FakeLine::new(vec![]);
        let mut producer = TokenProducer::new(line, false);
        let payload: Vec<u8> = (0..20u8).collect();
        let crc = crate::crc::crc8(&payload);
        let mut buf = crate::frame::FrameBuf::new();
        buf.extend_from_slice(&payload);
        buf.push(crc);
        let frame = Frame::new(buf, true);
        assert_eq!(producer.send(&frame, false, false), SendStatus::TooLong);
    }
}
