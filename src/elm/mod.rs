//! The ELM327-compatible command interpreter: ~25 persistent
//! configuration flags, command dispatch by longest-prefix match, the
//! `ATPR` auto-responder management surface, and monitor-mode message
//! filtering/formatting.
//!
//! Ported from `original_source/elm.h`'s `ELM` class. The macro-driven
//! dispatch there (`CMDCASE`/`TOGGLE_FN`/`BYTE_FN`/...) is purely
//! organizational (spec.md §9); this is a plain `if`/`else if` chain on
//! `str::strip_prefix`, ordered longest-prefix-first exactly as the
//! original orders its `CMDCASE` calls.
//!
//! Gated to `std`: the command surface leans on `String` throughout, the
//! way the teacher's top-level `std`-feature code leans on `Vec`/`String`
//! for host-session bookkeeping (see `src/lib.rs`'s feature table).

mod pr;

use crate::automation::Automation;
use crate::collab::{BoardInfo, Rtc, TimeSource};
use crate::consts::*;
use crate::message::Message;
use crate::settings::Settings;
use crate::timing::Timestamp;

/// The ~25 persistent configuration flags/bytes a command-interpreter
/// session carries (spec.md §3 "Config"). One `Config` per terminal
/// (spec.md §4.H); `Automation` is the separate, process-wide state they
/// all share.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub baud_rate: u32,
    last_command: String,

    pub header: String,
    pub echo: bool,
    pub allow_long: bool,
    pub linefeed: bool,
    pub auto_receive: bool,
    pub responses: bool,
    pub spaces: bool,
    pub custom_header: bool,
    pub headers: bool,
    pub monitor: u8,
    monitor_count: u64,
    pub monitor_transmit: u8,
    pub monitor_receive: u8,
    pub monitor_timeout: u8,
    pub adaptive_timing: u8,
    pub tester_address: u8,

    pub notifications: bool,
    pub allow_invalid: bool,
    pub show_timestamp: bool,
    pub show_vpw_mode: bool,
    pub auto_crc: bool,
    pub vpw_speed: char,
    pub inactive_time: u8,
    pub response_count: u8,
    pub wait_send: bool,

    pub timestamp_offset: Timestamp,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    /// `ELM()`'s constructor warm-starts; callers that also own an
    /// `Automation` should follow this with `automation.warm_reset()`
    /// (the whole-crate equivalent of the original's `ELM() { ATWS(); }`,
    /// split because `Automation` isn't owned by `Config`).
    pub fn new() -> Self {
        let mut c = Config {
            baud_rate: DEFAULT_BAUD_RATE,
            last_command: String::new(),
            header: String::from(DEFAULT_HEADER),
            echo: true,
            allow_long: false,
            linefeed: true,
            auto_receive: true,
            responses: true,
            spaces: true,
            custom_header: false,
            headers: false,
            monitor: 0x00,
            monitor_count: 0,
            monitor_transmit: 0x00,
            monitor_receive: 0x00,
            monitor_timeout: DEFAULT_MONITOR_TIMEOUT_MS,
            adaptive_timing: 0x01,
            tester_address: 0xF1,
            notifications: true,
            allow_invalid: false,
            show_timestamp: false,
            show_vpw_mode: false,
            auto_crc: true,
            vpw_speed: 'A',
            inactive_time: 0,
            response_count: 0,
            wait_send: false,
            timestamp_offset: Timestamp::ZERO,
        };
        c.restore_timestamp();
        c
    }

    pub fn newline(&self) -> &'static str {
        if self.linefeed { "\r\n" } else { "\r" }
    }

    pub fn version(&self) -> &'static str {
        ELM_VERSION
    }

    pub fn device_description(&self) -> String {
        format!("OBD2-Pico-VPW/{BOARD_NAME}")
    }

    fn zero_timestamp(&mut self, now: Timestamp) {
        self.timestamp_offset = now;
    }

    fn restore_timestamp(&mut self) {
        self.timestamp_offset = Timestamp::ZERO;
    }

    /// The corrected `send4X()` (spec.md §9: compare, don't assign).
    /// `'A'` defers to `Automation`'s mode-switch-driven flag; `'4'`
    /// forces 4X; anything else (including `'1'`) forces 1X.
    pub fn send_4x(&self, automation: &Automation) -> bool {
        match self.vpw_speed {
            'A' => automation.send_4x(),
            '4' => true,
            _ => false,
        }
    }

    /// Substitutes the literal `TT` placeholder in a header string with
    /// the current tester address, two nibbles at a time.
    fn replace_tt(&self, hex_string: &str) -> String {
        let ta = crate::hex::hex_byte(self.tester_address);
        let bytes = hex_string.as_bytes();
        let mut out = String::with_capacity(hex_string.len());
        let mut i = 0;
        while i < bytes.len() {
            if i + 1 < bytes.len() && &hex_string[i..i + 2] == "TT" {
                out.push_str(&ta);
                i += 2;
            } else {
                out.push(bytes[i] as char);
                i += 1;
            }
        }
        out
    }

    /// The header actually used to address an outgoing frame: `self.header`
    /// with any `TT` placeholder resolved and decoded to bytes.
    pub fn resolved_header(&self) -> Vec<u8> {
        crate::hex::bytes(&self.replace_tt(&self.header))
    }

    /// `ATD`: reset all flags to their documented defaults, preserving
    /// `baud_rate` (only `ATZ` touches that).
    pub fn reset_to_defaults(&mut self) {
        let baud = self.baud_rate;
        *self = Config::new();
        self.baud_rate = baud;
    }

    /// `ATWS`: `ATD` plus clearing automation's power-mode/tester-present
    /// broadcast state. SD-log buffer clearing is out of scope (spec.md
    /// §1's external collaborators).
    pub fn warm_start(&mut self, automation: &Automation) {
        self.reset_to_defaults();
        automation.warm_reset();
    }

    /// `ATZ`: `ATWS` plus restoring the default baud rate.
    pub fn full_reset(&mut self, automation: &Automation) {
        self.warm_start(automation);
        self.baud_rate = DEFAULT_BAUD_RATE;
    }

    /// `ATCFG ?` / `ATSAVE`'s payload: the CSV the original's
    /// `serialize(delim)` produces.
    pub fn serialize(&self, delim: char) -> String {
        let yn = |b: bool| if b { "Y" } else { "N" };
        format!(
            "SH={}{d}E={}{d}AL={}{d}L={}{d}AR={}{d}R={}{d}S={}{d}CH={}{d}H={}{d}MT={}{d}MR={}{d}ST={}{d}AT={}{d}TA={}{d}N={}{d}AI={}{d}TS={}{d}VM={}{d}CRC={}{d}W={}{d}RC={}{d}VPW={}",
            self.header,
            yn(self.echo),
            yn(self.allow_long),
            yn(self.linefeed),
            yn(self.auto_receive),
            yn(self.responses),
            yn(self.spaces),
            yn(self.custom_header),
            yn(self.headers),
            crate::hex::hex_byte(self.monitor_transmit),
            crate::hex::hex_byte(self.monitor_receive),
            crate::hex::hex_byte(self.monitor_timeout),
            crate::hex::hex_byte(self.adaptive_timing),
            crate::hex::hex_byte(self.tester_address),
            yn(self.notifications),
            yn(self.allow_invalid),
            yn(self.show_timestamp),
            yn(self.show_vpw_mode),
            yn(self.auto_crc),
            yn(self.wait_send),
            crate::hex::hex_byte(self.response_count),
            self.vpw_speed,
            d = delim,
        )
    }

    /// The inverse of `serialize`: applies every recognized `KEY=VALUE`
    /// pair found in `dat` (split on `delim`, then on the first `=`).
    /// Returns `true` iff at least one field was recognized.
    pub fn load_csv(&mut self, dat: &str, delim: char) -> bool {
        let mut found = false;
        for line in dat.split(delim) {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let y = value == "Y";
            match key {
                "SH" => self.header = value.to_string(),
                "E" => self.echo = y,
                "AL" => self.allow_long = y,
                "L" => self.linefeed = y,
                "AR" => self.auto_receive = y,
                "R" => self.responses = y,
                "S" => self.spaces = y,
                "CH" => self.custom_header = y,
                "H" => self.headers = y,
                "MT" => self.monitor_transmit = crate::hex::byte_at(value, 0, 0),
                "MR" => self.monitor_receive = crate::hex::byte_at(value, 0, 0),
                "ST" => self.monitor_timeout = crate::hex::byte_at(value, 0, 0),
                "AT" => self.adaptive_timing = crate::hex::byte_at(value, 0, 0),
                "TA" => self.tester_address = crate::hex::byte_at(value, 0, 0),
                "N" => self.notifications = y,
                "AI" => self.allow_invalid = y,
                "TS" => self.show_timestamp = y,
                "VM" => self.show_vpw_mode = y,
                "CRC" => self.auto_crc = y,
                "VPW" => self.vpw_speed = value.chars().next().unwrap_or('A'),
                "RC" => self.response_count = crate::hex::byte_at(value, 0, 0),
                "W" => self.wait_send = y,
                _ => continue,
            }
            found = true;
        }
        found
    }

    pub fn save(&self, settings: &mut dyn Settings, index: u8) -> bool {
        let filename = format!("elm-{}", crate::hex::hex_byte(index));
        let mut dat = self.serialize('\n');
        dat.push('\n');
        settings.write(&filename, &dat).is_ok()
    }

    pub fn load(&mut self, settings: &dyn Settings, index: u8) -> bool {
        self.reset_to_defaults();
        let filename = format!("elm-{}", crate::hex::hex_byte(index));
        match settings.read(&filename) {
            Ok(dat) => self.load_csv(&dat, '\n'),
            Err(_) => false,
        }
    }

    fn save_tz(&self, settings: &mut dyn Settings, time: &dyn TimeSource) -> bool {
        let Some(tz) = time.timezone() else {
            return false;
        };
        settings.write("elm-tz", &tz).is_ok()
    }

    fn load_tz(&self, settings: &dyn Settings, time: &mut dyn TimeSource) -> bool {
        match settings.read("elm-tz") {
            Ok(tz) => {
                time.set_timezone(&tz);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether `msg` should be shown under the current monitor mode, and
    /// if so, its rendered line (spec.md §4.G "Monitor mode").
    pub fn monitor_line(&self, msg: &Message) -> Option<String> {
        if self.monitor == 0x00 {
            return None;
        }
        let passes = match self.monitor {
            b'R' => {
                msg.frame.target() == self.monitor_receive
                    || msg.frame.source() == self.monitor_receive
            }
            b'T' => {
                msg.frame.target() == self.monitor_transmit
                    || msg.frame.source() == self.monitor_transmit
            }
            _ => true, // 'A' and 'B': unfiltered
        };
        if !passes {
            return None;
        }
        Some(msg.tostring(
            self.timestamp_offset,
            self.show_timestamp,
            self.headers,
            self.spaces,
            self.allow_long,
            self.show_vpw_mode,
        ))
    }

    /// Parses and dispatches one command line. `input` is the raw line as
    /// received (preserved for `ATTZ`'s free-form timezone set, which —
    /// like the original — keeps case and strips only spaces rather than
    /// upper-casing); everything else matches against the
    /// stripped-and-uppercased form.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        automation: &Automation,
        settings: &mut dyn Settings,
        board: &dyn BoardInfo,
        rtc: &mut dyn Rtc,
        time: &mut dyn TimeSource,
        input: &str,
    ) -> String {
        let cmd: String = input.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase();
        self.last_command = cmd.clone();
        let mut response = String::from("OK");

        macro_rules! toggle {
            ($data:expr, $field:expr) => {{
                match $data {
                    "1" => $field = true,
                    "0" => $field = false,
                    "?" => response = if $field { "1".into() } else { "0".into() },
                    _ => response = "?".into(),
                }
            }};
        }
        macro_rules! byte_field {
            ($data:expr, $field:expr) => {{
                if $data == "?" {
                    response = crate::hex::hex_byte($field);
                } else if $data.is_empty() || $data.len() > 2 {
                    response = "?".into();
                } else {
                    $field = crate::hex::byte_at($data, 0, 0);
                }
            }};
        }
        macro_rules! monitor_cmd {
            ($data:expr, $kind:expr, $field:expr) => {{
                let want_len = if $kind == b'A' || $kind == b'B' { 0 } else { 2 };
                if $data.len() != want_len {
                    response = "?".into();
                } else {
                    self.monitor = $kind;
                    self.monitor_count = 0;
                    $field = crate::hex::byte_at($data, 0, 0);
                    response = "SEARCHING...".into();
                }
            }};
        }

        if let Some(data) = cmd.strip_prefix("AT@1") {
            if data.is_empty() {
                response = self.device_description();
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATAI") {
            toggle!(data, self.allow_invalid);
        } else if let Some(data) = cmd.strip_prefix("ATAL") {
            if data.is_empty() {
                self.allow_long = true;
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATAR") {
            if data.is_empty() {
                self.auto_receive = true;
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATCH") {
            match data {
                "1" => {
                    self.custom_header = true;
                    self.header.clear();
                }
                "0" => {
                    self.custom_header = false;
                    if crate::hex::bytes(&self.header).len() != 3 {
                        self.header = String::from(DEFAULT_HEADER);
                    }
                }
                "?" => response = if self.custom_header { "1".into() } else { "0".into() },
                _ => response = "?".into(),
            }
        } else if let Some(data) = cmd.strip_prefix("ATCFG") {
            if data == "?" {
                response = self.serialize(',');
            } else if !data.is_empty() {
                if !self.load_csv(data, ',') {
                    response = "?".into();
                }
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATCRC") {
            toggle!(data, self.auto_crc);
        } else if let Some(data) = cmd.strip_prefix("ATCT") {
            if data.is_empty() {
                response = format!("{:.1}", board.cpu_temperature());
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATDPN") {
            if data.is_empty() {
                response = "2".into();
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATDP") {
            if data.is_empty() {
                response = "SAE J1850 VPW".into();
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATD") {
            if data.is_empty() {
                self.reset_to_defaults();
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATE") {
            toggle!(data, self.echo);
        } else if let Some(data) = cmd.strip_prefix("ATH") {
            toggle!(data, self.headers);
        } else if let Some(data) = cmd.strip_prefix("ATIA") {
            byte_field!(data, self.inactive_time);
        } else if let Some(data) = cmd.strip_prefix("ATID") {
            if data.is_empty() {
                response = board.unique_id(true);
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATI") {
            if data.is_empty() {
                response = self.version().to_string();
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATLOAD") {
            if data.len() == 1 {
                let index = crate::hex::byte_at(data, 0, 0);
                if !self.load(settings, index) {
                    response = "!ERROR".into();
                }
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATL") {
            toggle!(data, self.linefeed);
        } else if let Some(data) = cmd.strip_prefix("ATMA") {
            monitor_cmd!(data, b'A', self.monitor_receive);
        } else if let Some(data) = cmd.strip_prefix("ATMB") {
            if self.monitor == b'B' {
                response = format!("STOPPED{}", self.newline());
                self.monitor = 0x00;
            } else if data.is_empty() {
                self.monitor = b'B';
                self.monitor_count = 0;
                self.monitor_receive = 0;
                self.monitor_transmit = 0;
                response = "SEARCHING...".into();
            } else {
                response = "?".into();
            }
        } else if cmd.strip_prefix("ATMEM").is_some() {
            response = board.free_memory().to_string();
        } else if let Some(data) = cmd.strip_prefix("ATMR") {
            monitor_cmd!(data, b'R', self.monitor_receive);
        } else if let Some(data) = cmd.strip_prefix("ATMT") {
            monitor_cmd!(data, b'T', self.monitor_transmit);
        } else if let Some(data) = cmd.strip_prefix("ATNL") {
            if data.is_empty() {
                self.allow_long = false;
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATN") {
            toggle!(data, self.notifications);
        } else if let Some(data) = cmd.strip_prefix("ATPR") {
            response = self.atpr(automation, data);
        } else if let Some(data) = cmd.strip_prefix("ATRA") {
            byte_field!(data, self.monitor_receive);
            self.auto_receive = false;
        } else if let Some(data) = cmd.strip_prefix("ATRC") {
            byte_field!(data, self.response_count);
        } else if let Some(data) = cmd.strip_prefix("ATRTC") {
            response = self.atrtc(rtc, time, data);
        } else if let Some(data) = cmd.strip_prefix("ATR") {
            toggle!(data, self.responses);
        } else if let Some(data) = cmd.strip_prefix("ATSAVE") {
            if data.len() == 1 {
                let index = crate::hex::byte_at(data, 0, 0);
                if !self.save(settings, index) {
                    response = "!ERROR".into();
                }
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATSH") {
            let replaced = self.replace_tt(data);
            let bytes = crate::hex::bytes(&replaced);
            if data == "?" {
                response = self.header.clone();
            } else if !self.custom_header && bytes.len() != 3 {
                response = "?".into();
            } else {
                self.header = data.to_string();
            }
        } else if let Some(data) = cmd.strip_prefix("ATSP") {
            if data != "2" && data != "0" {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATSR") {
            self.auto_receive = false;
            byte_field!(data, self.monitor_receive);
        } else if let Some(data) = cmd.strip_prefix("ATST") {
            if data.len() == 2 {
                let mut v = crate::hex::byte_at(data, 0, 0);
                if v == 0x00 {
                    v = DEFAULT_MONITOR_TIMEOUT_MS;
                }
                if v < MIN_MONITOR_TIMEOUT_MS {
                    v = MIN_MONITOR_TIMEOUT_MS;
                }
                self.monitor_timeout = v;
            } else if data == "?" {
                response = crate::hex::hex_byte(self.monitor_timeout);
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATS") {
            toggle!(data, self.spaces);
        } else if let Some(data) = cmd.strip_prefix("ATTA") {
            byte_field!(data, self.tester_address);
        } else if let Some(data) = cmd.strip_prefix("ATTIME") {
            if !data.is_empty() && data != "?" {
                response = "?".into();
            } else {
                response = time.format_local(time.now());
            }
        } else if let Some(data) = cmd.strip_prefix("ATTP") {
            if data != "2" && data != "A" {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATTS") {
            match data {
                "Z" => self.zero_timestamp(time.now()),
                "R" => self.restore_timestamp(),
                "0" => self.show_timestamp = false,
                "1" => self.show_timestamp = true,
                "Z?" => {
                    response = format!(
                        "{}.{}",
                        self.timestamp_offset.sec, self.timestamp_offset.usec
                    )
                }
                "?" => response = if self.show_timestamp { "1".into() } else { "0".into() },
                _ => response = "?".into(),
            }
        } else if cmd.starts_with("ATTZ") {
            response = self.attz(settings, time, input);
        } else if let Some(data) = cmd.strip_prefix("ATUT") {
            if data == "?" {
                let now = time.now();
                response = format!("{}.{}", now.sec, now.usec);
            } else if !data.is_empty() && data.chars().all(|c| c.is_ascii_digit()) {
                let sec: u32 = data.parse().unwrap_or(0);
                time.set(Timestamp::new(sec, 0));
                rtc.adjust(Timestamp::new(sec, 0));
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATVM") {
            toggle!(data, self.show_vpw_mode);
        } else if let Some(data) = cmd.strip_prefix("ATVPW") {
            match data {
                "?" => response = self.vpw_speed.to_string(),
                "A" | "1" | "4" => self.vpw_speed = data.chars().next().unwrap(),
                _ => response = "?".into(),
            }
        } else if let Some(data) = cmd.strip_prefix("ATWS") {
            if data.is_empty() {
                self.warm_start(automation);
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("ATW") {
            toggle!(data, self.wait_send);
        } else if let Some(data) = cmd.strip_prefix("ATZ") {
            if data.is_empty() {
                self.full_reset(automation);
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("DXI") {
            if data.is_empty() {
                response = self.device_description();
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("DXPT") {
            match data {
                "0" => {
                    self.monitor = 0x00;
                    self.monitor_receive = 0;
                    self.monitor_transmit = 0;
                }
                "1" => {
                    self.monitor = b'B';
                    self.monitor_count = 0;
                    self.monitor_transmit = 0;
                    self.monitor_receive = 0;
                }
                "?" => response = if self.monitor == b'B' { "1".into() } else { "0".into() },
                _ => response = "?".into(),
            }
        } else if cmd.strip_prefix("DXSM").is_some() {
            // No-op: acknowledged but carries no state (matches the
            // original's empty `CMDCASE("DXSM", {})`).
        } else if let Some(data) = cmd.strip_prefix("DXUS") {
            if data.is_empty() {
                let id = board.unique_id(false);
                let reversed: String = id.chars().rev().collect();
                response = format!("{id}{reversed}");
            } else {
                response = "?".into();
            }
        } else if let Some(data) = cmd.strip_prefix("DXVS") {
            match data {
                "1" => self.vpw_speed = '1',
                "4" => self.vpw_speed = '4',
                "?" => response = self.vpw_speed.to_string(),
                _ => response = "?".into(),
            }
        } else if let Some(data) = cmd.strip_prefix("GMTP") {
            let mut v = automation.send_tester_present();
            toggle!(data, v);
            automation.set_send_tester_present(v);
        } else if let Some(data) = cmd.strip_prefix("GMPM") {
            response = self.gmpm(automation, data);
        } else if let Some(data) = cmd.strip_prefix("GMVIN") {
            response = self.gmvin(automation, data);
        } else {
            #[cfg(feature = "log")]
            log::debug!("unrecognized command: {cmd}");
            response = "?".into();
        }

        response
    }

    fn atrtc(&self, rtc: &mut dyn Rtc, time: &mut dyn TimeSource, data: &str) -> String {
        match data {
            "B" => {
                if rtc.begin() {
                    "OK".into()
                } else {
                    "FAIL".into()
                }
            }
            "S" => {
                rtc.start();
                "OK".into()
            }
            "?" => {
                let mut out = String::from("[CHECKING RTC]");
                out.push_str(self.newline());
                if rtc.lost_power() {
                    out.push_str("[RTC LOST POWER]");
                    out.push_str(self.newline());
                }
                match rtc.now() {
                    Some(dt) => {
                        time.set(dt);
                        out.push_str("[RTC INITIALIZED]");
                        out.push_str(self.newline());
                        out.push_str("OK");
                    }
                    None => {
                        out.push_str("[FAILED TO SET TIME FROM RTC]");
                        out.push_str(self.newline());
                        out.push_str("FAIL");
                    }
                }
                out
            }
            _ => "ERROR".into(),
        }
    }

    fn attz(&self, settings: &mut dyn Settings, time: &mut dyn TimeSource, input: &str) -> String {
        let cmd_upper: String = input.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase();
        let data = &cmd_upper[4..];
        match data {
            "?" => time.timezone().unwrap_or_default(),
            "" => "?".into(),
            "S" => {
                if !self.save_tz(settings, time) {
                    "!ERROR".into()
                } else {
                    "OK".into()
                }
            }
            "L" => {
                if !self.load_tz(settings, time) {
                    "!ERROR".into()
                } else {
                    "OK".into()
                }
            }
            _ => {
                // Free-form set: strip spaces only, preserve case, then cut
                // the first 4 characters positionally — matching the
                // original's `erase(0, 4)` against `input` rather than
                // `cmd`, so a timezone name's own case survives.
                let tz: String = input.chars().filter(|c| !c.is_whitespace()).collect();
                let tz = if tz.len() >= 4 { &tz[4..] } else { "" };
                time.set_timezone(tz);
                "OK".into()
            }
        }
    }

    fn atpr(&self, automation: &Automation, data: &str) -> String {
        match data {
            "1" => {
                automation.set_programmatic_responses_enabled(true);
                "OK".into()
            }
            "0" => {
                automation.set_programmatic_responses_enabled(false);
                "OK".into()
            }
            "?" => {
                if automation.programmatic_responses_enabled() {
                    "1".into()
                } else {
                    "0".into()
                }
            }
            "??" | "???" => {
                let pairs = automation.pr_list();
                if pairs.is_empty() {
                    return "[]".into();
                }
                let pretty = data == "???";
                let mut out = String::from("[");
                if pretty {
                    out.push_str(self.newline());
                }
                for (i, (k, v)) in pairs.iter().enumerate() {
                    out.push_str(k);
                    out.push('=');
                    out.push_str(v);
                    if i + 1 != pairs.len() {
                        out.push_str(if pretty { self.newline() } else { ";" });
                    }
                }
                if pretty {
                    out.push_str(self.newline());
                }
                out.push(']');
                out
            }
            _ => match pr::parse(data) {
                None => "?".into(),
                Some(parsed) => match parsed.op {
                    pr::Op::Set => {
                        automation.pr_set(&parsed.key, &parsed.value);
                        "OK".into()
                    }
                    pr::Op::Append => {
                        if parsed.value.is_empty() {
                            "?".into()
                        } else {
                            automation.pr_append(&parsed.key, &parsed.value);
                            "OK".into()
                        }
                    }
                    pr::Op::Remove => {
                        if parsed.value.is_empty() {
                            "?".into()
                        } else {
                            automation.pr_remove(&parsed.key, &parsed.value);
                            "OK".into()
                        }
                    }
                    pr::Op::Query => {
                        let stored = automation.pr_get(&parsed.key).unwrap_or_default();
                        format!("{}={}", parsed.key, stored)
                    }
                },
            },
        }
    }

    fn gmpm(&self, automation: &Automation, data: &str) -> String {
        match data {
            "?" => {
                let (pm, kp) = automation.power_mode();
                format!(
                    "{}:{}{}",
                    if automation.send_power_mode() { "1" } else { "0" },
                    crate::hex::hex_byte(pm),
                    crate::hex::hex_byte(kp)
                )
            }
            "1" => {
                automation.set_send_power_mode(true);
                "OK".into()
            }
            "0" => {
                automation.set_send_power_mode(false);
                "OK".into()
            }
            _ => {
                let bytes = crate::hex::bytes(data);
                if bytes.len() == 2 {
                    automation.set_power_mode(bytes[0], bytes[1]);
                    automation.set_send_power_mode(bytes[0] > 0 || bytes[1] > 0);
                    "OK".into()
                } else {
                    "?".into()
                }
            }
        }
    }

    fn gmvin(&self, automation: &Automation, data: &str) -> String {
        match data {
            "?" => format!(
                "{}:{}",
                if automation.send_vin() { "1" } else { "0" },
                automation.vin()
            ),
            "1" => {
                automation.set_send_vin(true);
                "OK".into()
            }
            "0" => {
                automation.set_send_vin(false);
                "OK".into()
            }
            _ if data.len() == 17 => {
                automation.set_vin(data);
                automation.set_send_vin(true);
                "OK".into()
            }
            _ => "?".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{BoardInfo, Rtc, TimeSource};
    use crate::settings::{InMemorySettings, Settings};

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
        tz: Option<String>,
    }
    impl TimeSource for FakeTime {
        fn now(&self) -> Timestamp {
            self.now
        }
        fn set(&mut self, timestamp: Timestamp) {
            self.now = timestamp;
        }
        fn set_timezone(&mut self, tz: &str) {
            self.tz = Some(tz.to_string());
        }
        fn timezone(&self) -> Option<String> {
            self.tz.clone()
        }
        fn format_local(&self, timestamp: Timestamp) -> String {
            format!("{}", timestamp.sec)
        }
    }

    struct Harness {
        config: Config,
        automation: Automation,
        settings: InMemorySettings,
        board: NoopBoard,
        rtc: NoopRtc,
        time: FakeTime,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                config: Config::new(),
                automation: Automation::new(),
                settings: InMemorySettings::new(),
                board: NoopBoard,
                rtc: NoopRtc,
                time: FakeTime::default(),
            }
        }

        fn send(&mut self, line: &str) -> String {
            self.config.process(
                &self.automation,
                &mut self.settings,
                &self.board,
                &mut self.rtc,
                &mut self.time,
                line,
            )
        }
    }

    #[test]
    fn ati_returns_version_string() {
        let mut h = Harness::new();
        assert_eq!(h.send("ATI"), "ELM327 V2.3");
    }

    #[test]
    fn unknown_command_returns_question_mark() {
        let mut h = Harness::new();
        assert_eq!(h.send("ATXYZ"), "?");
    }

    #[test]
    fn atsp_rejects_non_vpw_protocol() {
        let mut h = Harness::new();
        assert_eq!(h.send("ATSP3"), "?");
        assert_eq!(h.send("ATSP2"), "OK");
    }

    #[test]
    fn atd_then_serialize_matches_defaults() {
        let mut h = Harness::new();
        h.send("ATD");
        let csv = h.send("ATCFG?");
        assert!(csv.starts_with("SH=686ATT,E=Y,AL=N,L=Y,AR=Y,R=Y,S=Y,CH=N,H=N,"));
        assert!(csv.ends_with("VPW=A"));
    }

    #[test]
    fn atpr_set_then_query_round_trips() {
        let mut h = Harness::new();
        assert_eq!(h.send("ATPR686AF10100=4F4F"), "OK");
        assert_eq!(h.send("ATPR686AF10100?"), "686AF10100=4F4F");
    }

    #[test]
    fn atpr_append_accumulates() {
        let mut h = Harness::new();
        h.send("ATPRKEY+V1");
        h.send("ATPRKEY+V2");
        assert_eq!(h.send("ATPRKEY?"), "KEY=V1,V2");
    }

    #[test]
    fn atch_one_clears_header_zero_restores_default_when_not_three_bytes() {
        let mut h = Harness::new();
        h.send("ATCH1");
        assert_eq!(h.config.header, "");
        h.send("ATCH0");
        assert_eq!(h.config.header, "686ATT");
    }

    #[test]
    fn monitor_commands_enter_and_stop() {
        let mut h = Harness::new();
        assert_eq!(h.send("ATMB"), "SEARCHING...");
        assert_eq!(h.config.monitor, b'B');
        assert_eq!(h.send("ATMB"), format!("STOPPED{}", h.config.newline()));
        assert_eq!(h.config.monitor, 0x00);
    }

    #[test]
    fn send_4x_compares_rather_than_assigns() {
        let mut h = Harness::new();
        h.send("ATVPWA");
        assert!(!h.config.send_4x(&h.automation));
        h.automation.set_send_4x(true);
        assert!(h.config.send_4x(&h.automation));
        h.send("ATVPW4");
        h.automation.set_send_4x(false);
        assert!(h.config.send_4x(&h.automation));
    }

    #[test]
    fn gmvin_sets_and_queries() {
        let mut h = Harness::new();
        assert_eq!(h.send("GMVIN1HGCM82633A004352"), "OK");
        assert_eq!(h.send("GMVIN?"), "1:1HGCM82633A004352");
    }

    #[test]
    fn attz_set_save_reboot_load_query_round_trips_through_fs_settings() {
        use crate::settings::FsSettings;

        let dir = std::env::temp_dir().join(format!(
            "vpw-elm-attz-test-{}-{}",
            std::process::id(),
            std::line!()
        ));
        let mut settings = FsSettings::new(&dir);
        let board = NoopBoard;
        let mut rtc = NoopRtc;
        let mut time = FakeTime::default();
        let automation = Automation::new();

        // Set a free-form timezone, then persist it.
        let mut config = Config::new();
        assert_eq!(
            config.process(&automation, &mut settings, &board, &mut rtc, &mut time, "ATTZ America/New_York"),
            "OK"
        );
        assert_eq!(time.timezone().as_deref(), Some("America/New_York"));
        assert_eq!(
            config.process(&automation, &mut settings, &board, &mut rtc, &mut time, "ATTZ S"),
            "OK"
        );

        // Simulate a reboot: fresh Config, fresh in-memory time source with
        // no timezone set, same on-disk settings.
        let mut rebooted = Config::new();
        let mut fresh_time = FakeTime::default();
        assert_eq!(fresh_time.timezone(), None);
        assert_eq!(
            rebooted.process(&automation, &mut settings, &board, &mut rtc, &mut fresh_time, "ATTZ L"),
            "OK"
        );
        assert_eq!(
            rebooted.process(&automation, &mut settings, &board, &mut rtc, &mut fresh_time, "ATTZ ?"),
            "America/New_York"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
