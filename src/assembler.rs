//! Message assembler: consumes the wildcard-escaped token stream produced
//! by [`crate::token`] and rebuilds [`Message`]s, pushing each onto a
//! [`QueueOf<Message>`].
//!
//! Ported from `original_source/message.h`'s `VPWMessageQueue::process()`.
//! The mode-switch special case (physical frame to `0xFE` with secondary
//! address `0xA1`/`0x20`) is detected here but delegated to
//! [`crate::automation::Automation::set_send_4x`] — the assembler never
//! touches the flag directly (see the corrected `SEND_4X` assignment bug
//! noted in `DESIGN.md`).

use crate::automation::Automation;
use crate::consts::*;
use crate::frame::{Frame, FrameBuf};
use crate::message::{Message, SpeedMode};
use crate::queue::QueueOf;
use crate::timing::Timestamp;
use crate::token::FrameSender;

#[cfg(not(feature = "std"))]
use heapless::String as HString;
#[cfg(feature = "std")]
use std::string::String as HString;

/// Assembler state carried across calls to [`Assembler::process`].
#[derive(Debug)]
pub struct Assembler {
    buffer: FrameBuf,
    mode: SpeedMode,
    tv: Timestamp,
}

impl Default for Assembler {
    fn default() -> Self {
        Assembler {
            buffer: FrameBuf::new(),
            mode: SpeedMode::OneX,
            tv: Timestamp::ZERO,
        }
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_byte(&mut self, b: u8) {
        #[cfg(feature = "std")]
        self.buffer.push(b);
        #[cfg(not(feature = "std"))]
        let _ = self.buffer.push(b);
    }

    fn take_buffer(&mut self) -> FrameBuf {
        core::mem::replace(&mut self.buffer, FrameBuf::new())
    }

    /// Drains `tokens` (as produced by `TokenProducer::drain_into`),
    /// pushing every completed frame, break, or bus-error event onto
    /// `out` as a [`Message`], updating `automation`'s `SEND_4X` flag when
    /// a mode-switch command frame is observed, and — under the
    /// automation mutex, for each received message — dispatching any
    /// matching programmatic response through `sender` (spec.md §4.F;
    /// `original_source/automation.h`'s `programmaticResponses` table).
    ///
    /// `bus_idle` is the line layer's current idle/busy reading (spec.md
    /// §4.D's `W_EOT`). Returns `false` as soon as a `W_EOT` token is seen
    /// while the bus is idle, stopping before draining the rest of
    /// `tokens` — the scheduling hint a cooperative caller uses to yield
    /// to other work (`original_source/message.h`'s `proceed = vpw.idle()`
    /// short-circuit). Returns `true` once every token has been consumed
    /// without that happening.
    pub fn process(
        &mut self,
        tokens: &[u8],
        out: &QueueOf<Message>,
        automation: &Automation,
        sender: &mut dyn FrameSender,
        bus_idle: bool,
    ) -> bool {
        let mut i = 0;
        while i < tokens.len() {
            let b = tokens[i];
            i += 1;
            if b != W_WILDCARD {
                self.push_byte(b);
                continue;
            }
            let Some(&control) = tokens.get(i) else {
                break;
            };
            i += 1;

            match control {
                W_TIMESTAMP => {
                    if let Some(payload) = tokens.get(i..i + 8) {
                        let mut bytes = [0u8; 8];
                        bytes.copy_from_slice(payload);
                        self.tv = Timestamp::from_be_bytes(bytes);
                        i += 8;
                    }
                }
                W_WILDCARD => self.push_byte(W_WILDCARD),
                W_SOF => {
                    self.buffer = FrameBuf::new();
                }
                W_EOD => {}
                W_EOF => {
                    let frame = Frame::new(self.take_buffer(), true);
                    if !frame.valid() {
                        #[cfg(feature = "log")]
                        log::debug!("CRC check failed on assembled frame");
                    }
                    if frame.is_physical() && frame.target() == MODE_SWITCH_TARGET {
                        if frame.secondary_address() == ENTER_4X_SECONDARY {
                            automation.set_send_4x(true);
                        }
                        if frame.secondary_address() == EXIT_4X_SECONDARY {
                            automation.set_send_4x(false);
                        }
                    }
                    #[cfg(feature = "std")]
                    {
                        let key = frame.tostring(true, false, false);
                        if let Some(responses) = automation.match_response(&key) {
                            for value in responses.split(',') {
                                if value.is_empty() {
                                    continue;
                                }
                                let response = Frame::from_hex(value, true);
                                sender.send(&response, false, automation.send_4x());
                            }
                        }
                    }
                    out.push(Message::new(frame, self.tv, self.mode));
                }
                W_EOT => {
                    if bus_idle {
                        return false;
                    }
                }
                W_BRK => {
                    out.push(Message::with_annotation(self.tv, self.mode, "[BREAK]"));
                    self.buffer = FrameBuf::new();
                    automation.set_send_4x(false);
                }
                W_ERROR_UNEXPECTED_SOF | W_ERROR_UNEXPECTED_EOF => {}
                W_HIGH => {
                    out.push(Message::with_annotation(self.tv, self.mode, "[BUS ERROR]"));
                }
                W_RUNT => {}
                W_MODE_1X => self.mode = SpeedMode::OneX,
                W_MODE_4X => self.mode = SpeedMode::FourX,
                W_DEBUG_STRING => {
                    let Some(&len) = tokens.get(i) else { break };
                    i += 1;
                    let Some(chars) = tokens.get(i..i + len as usize) else {
                        break;
                    };
                    i += len as usize;
                    let mut s: HString = HString::new();
                    #[cfg(feature = "std")]
                    s.push('{');
                    #[cfg(not(feature = "std"))]
                    let _ = s.push('{');
                    for &c in chars {
                        #[cfg(feature = "std")]
                        s.push(c as char);
                        #[cfg(not(feature = "std"))]
                        let _ = s.push(c as char);
                    }
                    #[cfg(feature = "std")]
                    s.push('}');
                    #[cfg(not(feature = "std"))]
                    let _ = s.push('}');
                    out.push(Message::with_annotation(self.tv, self.mode, &s));
                }
                W_DEBUG => {
                    let Some(&value) = tokens.get(i) else { break };
                    i += 1;
                    // Zero-padded 3-digit decimal, matching the original's
                    // `Util.dec(b, 3)` (`util.h`'s `%03d`), not hex.
                    let hundreds = b'0' + value / 100;
                    let tens = b'0' + (value / 10) % 10;
                    let ones = b'0' + value % 10;
                    let mut s: HString = HString::new();
                    #[cfg(feature = "std")]
                    {
                        s.push('{');
                        s.push(hundreds as char);
                        s.push(tens as char);
                        s.push(ones as char);
                        s.push('}');
                    }
                    #[cfg(not(feature = "std"))]
                    {
                        let _ = s.push('{');
                        let _ = s.push(hundreds as char);
                        let _ = s.push(tens as char);
                        let _ = s.push(ones as char);
                        let _ = s.push('}');
                    }
                    out.push(Message::with_annotation(self.tv, self.mode, &s));
                }
                _ => {
                    // Unknown encoded control byte; ignored.
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "std")]
    struct NoopSender {
        sent: std::vec::Vec<(std::vec::Vec<u8>, bool, bool)>,
    }

    #[cfg(feature = "std")]
    impl NoopSender {
        fn new() -> Self {
            NoopSender {
                sent: std::vec::Vec::new(),
            }
        }
    }

    #[cfg(feature = "std")]
    impl FrameSender for NoopSender {
        fn send(
            &mut self,
            frame: &Frame,
            allow_invalid: bool,
            send_4x: bool,
        ) -> crate::token::SendStatus {
            self.sent
                .push((frame.raw().to_vec(), allow_invalid, send_4x));
            crate::token::SendStatus::Ok
        }
    }

    #[test]
    #[cfg(feature = "std")]
    fn assembles_a_complete_frame() {
        let mut asm = Assembler::new();
        let out: QueueOf<Message> = QueueOf::new();
        let automation = Automation::new();
        let mut sender = NoopSender::new();

        let payload = [0x68, 0x6A, 0xF1, 0x01, 0x00];
        let crc = crate::crc::crc8(&payload);
        let mut tokens = vec![W_WILDCARD, W_SOF];
        tokens.extend_from_slice(&payload);
        tokens.push(crc);
        tokens.push(W_WILDCARD);
        tokens.push(W_EOF);

        asm.process(&tokens, &out, &automation, &mut sender, false);
        assert!(out.available());
        let msg = out.pull(|| unreachable!());
        assert!(msg.frame.valid());
        assert_eq!(msg.frame.raw(), &[0x68, 0x6A, 0xF1, 0x01, 0x00, crc]);
    }

    #[test]
    #[cfg(feature = "std")]
    fn brk_emits_annotated_message_and_clears_4x() {
        let mut asm = Assembler::new();
        let out: QueueOf<Message> = QueueOf::new();
        let automation = Automation::new();
        automation.set_send_4x(true);
        let mut sender = NoopSender::new();

        asm.process(&[W_WILDCARD, W_BRK], &out, &automation, &mut sender, false);
        let msg = out.pull(|| unreachable!());
        assert_eq!(msg.annotation.as_str(), "[BREAK]");
        assert!(!automation.send_4x());
    }

    #[test]
    #[cfg(feature = "std")]
    fn mode_switch_frame_toggles_send_4x_on_then_off() {
        let mut asm = Assembler::new();
        let out: QueueOf<Message> = QueueOf::new();
        let automation = Automation::new();
        let mut sender = NoopSender::new();

        let enter = [0x4C, MODE_SWITCH_TARGET, 0x00, ENTER_4X_SECONDARY, 0x00];
        let crc_enter = crate::crc::crc8(&enter);
        let mut tokens = vec![W_WILDCARD, W_SOF];
        tokens.extend_from_slice(&enter);
        tokens.push(crc_enter);
        tokens.push(W_WILDCARD);
        tokens.push(W_EOF);
        asm.process(&tokens, &out, &automation, &mut sender, false);
        assert!(automation.send_4x());

        let exit = [0x4C, MODE_SWITCH_TARGET, 0x00, EXIT_4X_SECONDARY, 0x00];
        let crc_exit = crate::crc::crc8(&exit);
        let mut tokens2 = vec![W_WILDCARD, W_SOF];
        tokens2.extend_from_slice(&exit);
        tokens2.push(crc_exit);
        tokens2.push(W_WILDCARD);
        tokens2.push(W_EOF);
        asm.process(&tokens2, &out, &automation, &mut sender, false);
        assert!(!automation.send_4x());
    }

    #[test]
    #[cfg(feature = "std")]
    fn escaped_wildcard_byte_is_unescaped_in_buffer() {
        let mut asm = Assembler::new();
        let out: QueueOf<Message> = QueueOf::new();
        let automation = Automation::new();
        let mut sender = NoopSender::new();

        let mut tokens = vec![W_WILDCARD, W_SOF, 0x01, W_WILDCARD, W_WILDCARD, 0x02];
        let crc = crate::crc::crc8(&[0x01, W_WILDCARD, 0x02]);
        tokens.push(crc);
        tokens.push(W_WILDCARD);
        tokens.push(W_EOF);

        asm.process(&tokens, &out, &automation, &mut sender, false);
        let msg = out.pull(|| unreachable!());
        assert_eq!(msg.frame.raw(), &[0x01, W_WILDCARD, 0x02, crc]);
    }

    #[test]
    #[cfg(feature = "std")]
    fn matching_programmatic_response_is_transmitted() {
        let mut asm = Assembler::new();
        let out: QueueOf<Message> = QueueOf::new();
        let automation = Automation::new();
        automation.set_programmatic_responses_enabled(true);
        let mut sender = NoopSender::new();

        let payload = [0x68, 0x6A, 0xF1, 0x01, 0x00];
        let crc = crate::crc::crc8(&payload);
        automation.pr_set("686AF10100", "4F4F");

        let mut tokens = vec![W_WILDCARD, W_SOF];
        tokens.extend_from_slice(&payload);
        tokens.push(crc);
        tokens.push(W_WILDCARD);
        tokens.push(W_EOF);

        asm.process(&tokens, &out, &automation, &mut sender, false);
        assert_eq!(sender.sent.len(), 1);
        let expected_crc = crate::crc::crc8(&[0x4F, 0x4F]);
        assert_eq!(sender.sent[0].0, vec![0x4F, 0x4F, expected_crc]);
    }

    #[test]
    #[cfg(feature = "std")]
    fn eot_yields_when_bus_idle_and_stops_short_of_later_tokens() {
        let mut asm = Assembler::new();
        let out: QueueOf<Message> = QueueOf::new();
        let automation = Automation::new();
        let mut sender = NoopSender::new();

        let tokens = vec![W_WILDCARD, W_EOT, W_WILDCARD, W_HIGH];
        let proceed = asm.process(&tokens, &out, &automation, &mut sender, true);
        assert!(!proceed);
        // The trailing W_HIGH was never reached.
        assert!(!out.available());
    }

    #[test]
    #[cfg(feature = "std")]
    fn eot_is_a_no_op_when_bus_is_busy() {
        let mut asm = Assembler::new();
        let out: QueueOf<Message> = QueueOf::new();
        let automation = Automation::new();
        let mut sender = NoopSender::new();

        let tokens = vec![W_WILDCARD, W_EOT, W_WILDCARD, W_HIGH];
        let proceed = asm.process(&tokens, &out, &automation, &mut sender, false);
        assert!(proceed);
        let msg = out.pull(|| unreachable!());
        assert_eq!(msg.annotation.as_str(), "[BUS ERROR]");
    }
}
