//! Shared, lock-protected automation state: the auto-responder table, VIN
//! broadcast, tester-present/power-mode spoofing, and the global 1X/4X
//! speed flag the assembler and transmitter both touch.
//!
//! Ported from `original_source/automation.h`'s global `Automation`
//! object. Here it is a value the caller owns and passes by reference
//! (see DESIGN.md's Open Question log) rather than a process-wide
//! singleton, so tests can instantiate independent universes per
//! spec.md §9.
//!
//! `send_4x` is the corrected form of the original's `send4X()` helper,
//! which assigned (`vpwSpeed = '4'`) where a comparison was intended
//! (spec.md §9 REDESIGN FLAGS). It lives here, not in `elm::Config`,
//! because both the assembler (mode-switch frames) and the command
//! interpreter (`ATVPW`/`DXVS`) need to read and write it.

use crate::queue::RecursiveMutex;
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "std")]
use std::collections::BTreeMap;
#[cfg(feature = "std")]
use std::string::String;
#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
type PrKey = heapless::String<32>;
#[cfg(not(feature = "std"))]
type PrValue = heapless::String<96>;

/// 17-character VIN buffer; fixed-size regardless of the `std` feature
/// since a VIN is never longer than this.
#[cfg(feature = "std")]
pub type VinString = String;
#[cfg(not(feature = "std"))]
pub type VinString = heapless::String<17>;

struct AutomationState {
    power_mode: u8,
    key_position: u8,
    send_power_mode: bool,
    send_tester_present: bool,
    send_vin: bool,
    vin: VinString,
    programmatic_responses_enabled: bool,
    #[cfg(feature = "std")]
    programmatic_responses: BTreeMap<String, String>,
    #[cfg(not(feature = "std"))]
    programmatic_responses:
        heapless::FnvIndexMap<PrKey, PrValue, { crate::consts::MAX_PROGRAMMATIC_RESPONSES }>,
}

impl AutomationState {
    fn new() -> Self {
        AutomationState {
            power_mode: 0x00,
            key_position: 0x00,
            send_power_mode: false,
            send_tester_present: false,
            send_vin: false,
            vin: VinString::new(),
            programmatic_responses_enabled: false,
            #[cfg(feature = "std")]
            programmatic_responses: BTreeMap::new(),
            #[cfg(not(feature = "std"))]
            programmatic_responses: heapless::FnvIndexMap::new(),
        }
    }
}

/// Process-wide (or per-test-universe) automation state, guarded by a
/// single reentrant mutex, plus the plain-atomic `SEND_4X` flag that a
/// single writer updates with relaxed ordering (spec.md §5).
pub struct Automation {
    send_4x: AtomicBool,
    state: RecursiveMutex<AutomationState>,
}

impl Default for Automation {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Automation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Automation")
            .field("send_4x", &self.send_4x.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Automation {
    pub fn new() -> Self {
        Automation {
            send_4x: AtomicBool::new(false),
            state: RecursiveMutex::new(AutomationState::new()),
        }
    }

    /// Resets everything `ATWS` clears: power mode, key position, the two
    /// broadcast toggles. VIN, tester-present and the programmatic
    /// response table are left untouched — the original's `ATWS` does not
    /// touch them either.
    pub fn warm_reset(&self) {
        self.state.lock(|s| {
            s.power_mode = 0x00;
            s.key_position = 0x00;
            s.send_power_mode = false;
            s.send_tester_present = false;
        });
    }

    pub fn send_4x(&self) -> bool {
        self.send_4x.load(Ordering::Relaxed)
    }

    pub fn set_send_4x(&self, value: bool) {
        self.send_4x.store(value, Ordering::Relaxed);
    }

    pub fn power_mode(&self) -> (u8, u8) {
        self.state.lock(|s| (s.power_mode, s.key_position))
    }

    pub fn set_power_mode(&self, power_mode: u8, key_position: u8) {
        self.state.lock(|s| {
            s.power_mode = power_mode;
            s.key_position = key_position;
        });
    }

    pub fn send_power_mode(&self) -> bool {
        self.state.lock(|s| s.send_power_mode)
    }

    pub fn set_send_power_mode(&self, value: bool) {
        self.state.lock(|s| s.send_power_mode = value);
    }

    pub fn send_tester_present(&self) -> bool {
        self.state.lock(|s| s.send_tester_present)
    }

    pub fn set_send_tester_present(&self, value: bool) {
        self.state.lock(|s| s.send_tester_present = value);
    }

    pub fn send_vin(&self) -> bool {
        self.state.lock(|s| s.send_vin)
    }

    pub fn set_send_vin(&self, value: bool) {
        self.state.lock(|s| s.send_vin = value);
    }

    /// Uppercases and strips spaces, matching `GMVIN`'s original handling.
    pub fn set_vin(&self, raw: &str) {
        let mut v = VinString::new();
        for c in raw.chars() {
            if c == ' ' {
                continue;
            }
            let upper = c.to_ascii_uppercase();
            #[cfg(feature = "std")]
            v.push(upper);
            #[cfg(not(feature = "std"))]
            let _ = v.push(upper);
        }
        self.state.lock(|s| s.vin = v);
    }

    #[cfg(feature = "std")]
    pub fn vin(&self) -> String {
        self.state.lock(|s| s.vin.clone())
    }
    #[cfg(not(feature = "std"))]
    pub fn vin(&self) -> VinString {
        self.state.lock(|s| s.vin.clone())
    }

    pub fn programmatic_responses_enabled(&self) -> bool {
        self.state.lock(|s| s.programmatic_responses_enabled)
    }

    pub fn set_programmatic_responses_enabled(&self, value: bool) {
        self.state
            .lock(|s| s.programmatic_responses_enabled = value);
    }

    /// `KEY=<stored>` lookup used by `ATPR KEY?` and by the auto-responder
    /// itself (keyed on the inbound frame's header+data hex).
    #[cfg(feature = "std")]
    pub fn pr_get(&self, key: &str) -> Option<String> {
        self.state.lock(|s| s.programmatic_responses.get(key).cloned())
    }

    /// `=`: set, or erase if `value` is empty.
    #[cfg(feature = "std")]
    pub fn pr_set(&self, key: &str, value: &str) {
        self.state.lock(|s| {
            if value.is_empty() {
                s.programmatic_responses.remove(key);
            } else {
                s.programmatic_responses
                    .insert(key.to_string(), value.to_string());
            }
        });
    }

    /// `+`: append `,VALUE`. Caller is responsible for rejecting an empty
    /// value before calling (the original responds `?` in that case).
    #[cfg(feature = "std")]
    pub fn pr_append(&self, key: &str, value: &str) {
        self.state.lock(|s| {
            s.programmatic_responses
                .entry(key.to_string())
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        });
    }

    /// `-`: remove `value` from the stored comma list; erase the key if
    /// the list becomes empty. No-op if the key doesn't exist.
    #[cfg(feature = "std")]
    pub fn pr_remove(&self, key: &str, value: &str) {
        self.state.lock(|s| {
            if let Some(existing) = s.programmatic_responses.get(key) {
                let remaining: Vec<&str> =
                    existing.split(',').filter(|v| *v != value).collect();
                if remaining.is_empty() {
                    s.programmatic_responses.remove(key);
                } else {
                    s.programmatic_responses
                        .insert(key.to_string(), remaining.join(","));
                }
            }
        });
    }

    /// All stored pairs, in key order (matches the original's
    /// `std::map`, which iterates sorted).
    #[cfg(feature = "std")]
    pub fn pr_list(&self) -> Vec<(String, String)> {
        self.state.lock(|s| {
            s.programmatic_responses
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    /// Auto-responder lookup: given the hex key of an inbound frame
    /// (header+data, no spaces), returns the comma-separated list of hex
    /// frames to transmit in response, if the table has a match and
    /// responses are enabled.
    #[cfg(feature = "std")]
    pub fn match_response(&self, key: &str) -> Option<String> {
        if !self.programmatic_responses_enabled() {
            return None;
        }
        self.pr_get(key)
    }

    /// Builds the periodic tester-present frame (a functional broadcast
    /// to the diagnostic response address, GM convention `3E 01`), or
    /// `None` when `send_tester_present` is off. No concrete frame layout
    /// survives in `original_source/automation.h` (a bare data struct with
    /// no broadcast logic of its own); this follows the same functional
    /// addressing style as the mode-switch command frame in
    /// [`crate::assembler`] and is documented in `DESIGN.md` as
    /// representative rather than ported verbatim.
    #[cfg(feature = "std")]
    pub fn tester_present_frame(&self) -> Option<Vec<u8>> {
        if !self.send_tester_present() {
            return None;
        }
        let payload = [0x68, 0x6A, 0xF1, 0x3E, 0x01];
        let crc = crate::crc::crc8(&payload);
        let mut frame = payload.to_vec();
        frame.push(crc);
        Some(frame)
    }

    /// Builds the periodic power-mode/key-position broadcast frame, or
    /// `None` when `send_power_mode` is off.
    #[cfg(feature = "std")]
    pub fn power_mode_frame(&self) -> Option<Vec<u8>> {
        if !self.send_power_mode() {
            return None;
        }
        let (power_mode, key_position) = self.power_mode();
        let payload = [0x68, 0x6A, 0xF1, 0x22, power_mode, key_position];
        let crc = crate::crc::crc8(&payload);
        let mut frame = payload.to_vec();
        frame.push(crc);
        Some(frame)
    }

    /// Builds the VIN broadcast frames (one per 4-byte chunk of the
    /// 17-character VIN, matching `ATDPN`-style multi-frame responses), or
    /// an empty `Vec` when `send_vin` is off or no VIN has been set.
    #[cfg(feature = "std")]
    pub fn vin_frames(&self) -> Vec<Vec<u8>> {
        if !self.send_vin() {
            return Vec::new();
        }
        let vin = self.vin();
        if vin.is_empty() {
            return Vec::new();
        }
        let bytes = vin.as_bytes();
        let mut frames = Vec::new();
        for (index, chunk) in bytes.chunks(4).enumerate() {
            let mut payload: Vec<u8> = std::vec![0x68, 0x6A, 0xF1, 0x49, 0x02, index as u8];
            payload.extend_from_slice(chunk);
            let crc = crate::crc::crc8(&payload);
            payload.push(crc);
            frames.push(payload);
        }
        frames
    }
}
