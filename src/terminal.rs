//! Per-host-port session: line editor, output gating, and the
//! notification/message pump that sits on top of [`crate::elm::Config`].
//!
//! Ported from `original_source/cli.h`'s `CLI` base class. `HostCLI`
//! (real DTR/DSR pins) and `AltCLI` (`dtr()` hardcoded true) become two
//! [`HostPort`] implementations supplied by the embedding firmware; this
//! module only needs the trait. Gated to `std` since it carries an
//! [`elm::Config`](crate::elm::Config), which is itself `std`-only.
//!
//! No `cli.cpp` survived retrieval alongside the header (`_INDEX.md`
//! lists headers only), so the exact DTR/DSR/`waitMonitor` pump below is
//! reconstructed from the header's field comments and spec.md §4.H/§5,
//! not ported line-for-line; see `DESIGN.md`.

use std::collections::VecDeque;
use std::string::String;

use crate::automation::Automation;
use crate::collab::{BoardInfo, HostPort, Rtc, TimeSource};
use crate::consts::{MAX_COMMAND_LEN, MAX_QUEUE_LEN};
use crate::elm::Config;
use crate::message::Message;
use crate::settings::Settings;
use crate::token::SendStatus;

/// A host serial session: line editing, the per-port `Config`, and the
/// bounded message/notification queues [`Terminal::push`]/[`Terminal::notify`]
/// feed. One instance per physical or virtual port; all instances share
/// the same [`Automation`] (spec.md §4.H: "each terminal holds its own
/// Command interpreter instance but reads from the shared Automation
/// state").
pub struct Terminal<P: HostPort> {
    port: P,
    pub config: Config,
    cmd: String,
    /// Raised while a host input line is mid-edit, to avoid interleaving
    /// queued message/notification output with it.
    inhibit_output: bool,
    /// Deasserted until the first monitor command is issued; while set,
    /// `poll` accumulates but never prints queued output.
    wait_monitor: bool,
    at_prompt: bool,
    active: bool,
    messages: VecDeque<Message>,
    notifications: VecDeque<String>,
}

impl<P: HostPort> core::fmt::Debug for Terminal<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Terminal")
            .field("cmd", &self.cmd)
            .field("inhibit_output", &self.inhibit_output)
            .field("wait_monitor", &self.wait_monitor)
            .field("at_prompt", &self.at_prompt)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl<P: HostPort> Terminal<P> {
    pub fn new(port: P) -> Self {
        Terminal {
            port,
            config: Config::new(),
            cmd: String::new(),
            inhibit_output: false,
            wait_monitor: true,
            at_prompt: false,
            active: false,
            messages: VecDeque::new(),
            notifications: VecDeque::new(),
        }
    }

    /// True once the session has seen at least one byte of host input.
    pub fn ready(&self) -> bool {
        self.active
    }

    /// Queues `message` for display, displacing the oldest queued message
    /// if already at capacity (spec.md §4.H).
    pub fn push(&mut self, message: Message) {
        if self.messages.len() >= MAX_QUEUE_LEN {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Queues a notification line, independent of the message queue and
    /// gated separately by `config.notifications`.
    pub fn notify(&mut self, notification: impl Into<String>) {
        if self.notifications.len() >= MAX_QUEUE_LEN {
            self.notifications.pop_front();
        }
        self.notifications.push_back(notification.into());
    }

    /// Resets session state and optionally shows the initial prompt.
    pub fn begin(&mut self, show_prompt: bool) {
        self.active = false;
        self.at_prompt = false;
        self.cmd.clear();
        if show_prompt {
            self.prompt(true);
        }
    }

    /// Emits `>` if DTR is asserted and either `force` or no prompt is
    /// currently shown.
    pub fn prompt(&mut self, force: bool) {
        if !self.port.dtr() {
            return;
        }
        if self.at_prompt && !force {
            return;
        }
        self.port.write(b">");
        self.at_prompt = true;
    }

    /// Writes every currently queued message and notification immediately,
    /// ignoring `wait_monitor` (used when a session is torn down or a mode
    /// change demands queued output drain right away).
    pub fn flush(&mut self) {
        while let Some(message) = self.messages.pop_front() {
            let text = self.render(&message);
            self.write_line(&text);
        }
        while let Some(notification) = self.notifications.pop_front() {
            self.write_line(&notification);
        }
    }

    /// Writes the text a failed [`crate::token::TokenProducer::send`]
    /// should report to the host (spec.md §4.H's `printSendError`); a
    /// successful send reports nothing.
    pub fn print_send_error(&mut self, status: SendStatus) {
        if status == SendStatus::Ok {
            return;
        }
        self.write_line(crate::error::host_text(status));
    }

    /// One step of the session loop: pulls from host input bytes, then
    /// the message queue, then the notifications queue, in that priority
    /// order (spec.md §4.H). Returns whether any work was done.
    pub fn poll(
        &mut self,
        automation: &Automation,
        settings: &mut dyn Settings,
        board: &dyn BoardInfo,
        rtc: &mut dyn Rtc,
        time: &mut dyn TimeSource,
    ) -> bool {
        if let Some(byte) = self.port.read_byte() {
            self.active = true;
            self.inhibit_output = true;
            self.handle_input_byte(byte, automation, settings, board, rtc, time);
            self.inhibit_output = false;
            return true;
        }

        if self.inhibit_output || !self.port.dtr() || self.wait_monitor {
            return false;
        }

        if let Some(message) = self.messages.pop_front() {
            let text = self.render(&message);
            self.write_line(&text);
            self.prompt(true);
            return true;
        }

        if self.config.notifications {
            if let Some(notification) = self.notifications.pop_front() {
                self.write_line(&notification);
                self.prompt(true);
                return true;
            }
        }

        false
    }

    fn render(&self, message: &Message) -> String {
        message.tostring(
            self.config.timestamp_offset,
            self.config.show_timestamp,
            self.config.headers,
            self.config.spaces,
            self.config.allow_long,
            self.config.show_vpw_mode,
        )
    }

    fn handle_input_byte(
        &mut self,
        byte: u8,
        automation: &Automation,
        settings: &mut dyn Settings,
        board: &dyn BoardInfo,
        rtc: &mut dyn Rtc,
        time: &mut dyn TimeSource,
    ) {
        if byte == b'\r' || byte == b'\n' {
            if self.config.echo {
                self.port.write(self.config.newline().as_bytes());
            }
            self.at_prompt = false;
            if self.cmd.is_empty() {
                self.prompt(true);
                return;
            }
            let cmd = core::mem::take(&mut self.cmd);
            self.run_command(&cmd, automation, settings, board, rtc, time);
            return;
        }

        if self.config.echo {
            self.port.write(&[byte]);
        }
        if self.cmd.len() < MAX_COMMAND_LEN {
            self.cmd.push(byte as char);
        }
    }

    fn run_command(
        &mut self,
        cmd: &str,
        automation: &Automation,
        settings: &mut dyn Settings,
        board: &dyn BoardInfo,
        rtc: &mut dyn Rtc,
        time: &mut dyn TimeSource,
    ) {
        let response = self.config.process(automation, settings, board, rtc, time, cmd);
        if self.wait_monitor && self.config.monitor != 0 {
            self.wait_monitor = false;
        }
        if self.config.responses {
            self.write_line(&response);
        }
        self.prompt(true);
    }

    fn write_line(&mut self, text: &str) {
        self.port.set_dsr(true);
        self.port.write(text.as_bytes());
        self.port.write(self.config.newline().as_bytes());
        self.port.set_dsr(false);
    }
}

/// Fans a message or notification out to every registered terminal,
/// mirroring `original_source/cli.h`'s static `Terminals` aggregator.
/// Kept free-standing (not a type) since Rust has no convenient
/// heterogeneous-`HostPort` collection; callers with uniform `P` can use
/// a `Vec<Terminal<P>>` and this helper, or just iterate themselves.
pub fn broadcast<P: HostPort>(terminals: &mut [Terminal<P>], message: &Message) {
    for terminal in terminals.iter_mut() {
        terminal.push(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{BoardInfo, Rtc, TimeSource};
    use crate::frame::{Frame, FrameBuf};
    use crate::message::SpeedMode;
    use crate::settings::InMemorySettings;
    use crate::timing::Timestamp;

    struct FakePort {
        input: VecDeque<u8>,
        output: Vec<u8>,
        dtr: bool,
        dsr: bool,
    }

    impl FakePort {
        fn new(input: &str) -> Self {
            FakePort {
                input: input.bytes().collect(),
                output: Vec::new(),
                dtr: true,
                dsr: false,
            }
        }
    }

    impl HostPort for FakePort {
        fn read_byte(&mut self) -> Option<u8> {
            self.input.pop_front()
        }
        fn write(&mut self, data: &[u8]) {
            self.output.extend_from_slice(data);
        }
        fn dtr(&self) -> bool {
            self.dtr
        }
        fn set_dsr(&mut self, value: bool) {
            self.dsr = value;
        }
    }

    struct NoopBoard;
    impl BoardInfo for NoopBoard {
        fn unique_id(&self, _include_dashes: bool) -> String {
            "DEADBEEF".into()
        }
        fn cpu_temperature(&self) -> f32 {
            25.0
        }
        fn free_memory(&self) -> u32 {
            1024
        }
    }

    struct NoopRtc;
    impl Rtc for NoopRtc {
        fn begin(&mut self) -> bool {
            true
        }
        fn start(&mut self) {}
        fn now(&self) -> Option<Timestamp> {
            None
        }
        fn lost_power(&self) -> bool {
            false
        }
        fn adjust(&mut self, _timestamp: Timestamp) {}
    }

    #[derive(Default)]
    struct FakeTime {
        now: Timestamp,
    }
    impl TimeSource for FakeTime {
        fn now(&self) -> Timestamp {
            self.now
        }
        fn set(&mut self, timestamp: Timestamp) {
            self.now = timestamp;
        }
        fn set_timezone(&mut self, _tz: &str) {}
        fn timezone(&self) -> Option<String> {
            None
        }
        fn format_local(&self, timestamp: Timestamp) -> String {
            format!("{}", timestamp.sec)
        }
    }

    fn run_one(term: &mut Terminal<FakePort>, automation: &Automation) {
        let mut settings = InMemorySettings::new();
        let board = NoopBoard;
        let mut rtc = NoopRtc;
        let mut time = FakeTime::default();
        while term.poll(automation, &mut settings, &board, &mut rtc, &mut time) {}
    }

    #[test]
    fn typed_command_is_echoed_and_produces_a_response() {
        let port = FakePort::new("ATI\r");
        let mut term = Terminal::new(port);
        let automation = Automation::new();
        run_one(&mut term, &automation);
        let out = String::from_utf8(term.port.output.clone()).unwrap();
        assert!(out.contains("ATI"));
        assert!(out.contains(crate::consts::ELM_VERSION));
    }

    #[test]
    fn atr0_suppresses_response_text_but_still_applies_command() {
        let port = FakePort::new("ATR0\rATI\r");
        let mut term = Terminal::new(port);
        let automation = Automation::new();
        run_one(&mut term, &automation);
        let out = String::from_utf8(term.port.output.clone()).unwrap();
        assert!(!out.contains(crate::consts::ELM_VERSION));
        assert!(!term.config.responses);
    }

    #[test]
    fn push_displaces_oldest_when_queue_is_full() {
        let port = FakePort::new("");
        let mut term = Terminal::new(port);
        let crc = crate::crc::crc8(&[0x68, 0x6A, 0xF1, 0x01, 0x00]);
        let mut buf = FrameBuf::new();
        buf.extend_from_slice(&[0x68, 0x6A, 0xF1, 0x01, 0x00, crc]);
        for _ in 0..(MAX_QUEUE_LEN + 5) {
            let frame = Frame::new(buf.clone(), true);
            term.push(Message::new(frame, Timestamp::ZERO, SpeedMode::OneX));
        }
        assert_eq!(term.messages.len(), MAX_QUEUE_LEN);
    }

    #[test]
    fn wait_monitor_blocks_output_until_a_monitor_command_runs() {
        let port = FakePort::new("");
        let mut term = Terminal::new(port);
        let automation = Automation::new();
        let crc = crate::crc::crc8(&[0x68, 0x6A, 0xF1, 0x01, 0x00]);
        let mut buf = FrameBuf::new();
        buf.extend_from_slice(&[0x68, 0x6A, 0xF1, 0x01, 0x00, crc]);
        term.push(Message::new(
            Frame::new(buf, true),
            Timestamp::ZERO,
            SpeedMode::OneX,
        ));
        run_one(&mut term, &automation);
        assert!(term.port.output.is_empty());

        term.port.input.extend("ATMA\r".bytes());
        run_one(&mut term, &automation);
        assert!(!term.port.output.is_empty());
        assert!(!term.wait_monitor);
    }

    #[test]
    fn deasserted_dtr_suppresses_prompt() {
        let port = FakePort::new("");
        let mut term = Terminal::new(port);
        term.port.dtr = false;
        term.prompt(true);
        assert!(term.port.output.is_empty());
    }
}
