//! A [`Frame`] plus the metadata the assembler attaches: capture
//! timestamp, VPW speed mode, and an optional free-text annotation used
//! for synthetic entries like `[BREAK]` and debug strings.
//!
//! Ported from `original_source/message.h`'s `Message` class, in
//! particular its `tostring` layout (timestamp column, mode tag, hex
//! data, annotation) and long-frame truncation behavior.

use crate::frame::Frame;
use crate::timing::Timestamp;

#[cfg(feature = "std")]
use std::string::String;

/// VPW bus speed a message was captured (or is to be sent) at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedMode {
    #[default]
    Unspecified,
    OneX,
    FourX,
}

#[cfg(feature = "std")]
pub type Annotation = String;
#[cfg(not(feature = "std"))]
pub type Annotation = heapless::String<64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub frame: Frame,
    pub timestamp: Timestamp,
    pub mode: SpeedMode,
    pub annotation: Annotation,
}

impl Message {
    pub fn new(frame: Frame, timestamp: Timestamp, mode: SpeedMode) -> Self {
        Message {
            frame,
            timestamp,
            mode,
            annotation: Annotation::new(),
        }
    }

    pub fn with_annotation(timestamp: Timestamp, mode: SpeedMode, annotation: &str) -> Self {
        let mut a = Annotation::new();
        #[cfg(feature = "std")]
        a.push_str(annotation);
        #[cfg(not(feature = "std"))]
        let _ = a.push_str(annotation);
        Message {
            frame: Frame::new(crate::frame::FrameBuf::new(), false),
            timestamp,
            mode,
            annotation: a,
        }
    }

    /// Renders the message the way the monitor/log display does: an
    /// optional leading `sec.usec` timestamp column (offset against
    /// `timestamp_offset`), an optional `[1X]`/`[4X]`/`[--]` mode tag, the
    /// frame's hex (optionally header-less, optionally truncated when
    /// `allow_long` is false), then a tab-separated annotation if present.
    #[cfg(feature = "std")]
    pub fn tostring(
        &self,
        timestamp_offset: Timestamp,
        show_timestamp: bool,
        headers: bool,
        spaces: bool,
        allow_long: bool,
        show_mode: bool,
    ) -> String {
        let mut out = String::new();
        if show_timestamp {
            let tv = self.timestamp - timestamp_offset;
            out.push_str(&alloc_format(tv.sec));
            out.push('.');
            out.push_str(&alloc_format_usec(tv.usec));
            out.push('\t');
        }

        let mut data = self.frame.tostring(headers, spaces, true);
        if !allow_long {
            let max_size = (if headers { 12 } else { 8 }) * (if spaces { 3 } else { 2 })
                - if spaces { 1 } else { 0 };
            if data.len() > max_size {
                data.truncate(max_size);
                data.push_str(" <DATA ERROR");
            }
        }

        if show_mode && !data.is_empty() {
            out.push_str(match self.mode {
                SpeedMode::FourX => "[4X] ",
                SpeedMode::OneX => "[1X] ",
                SpeedMode::Unspecified => "[--] ",
            });
        }
        out.push_str(&data);

        if !self.annotation.is_empty() {
            if !self.frame.is_empty() {
                out.push('\t');
            }
            out.push_str(&self.annotation);
        }
        out
    }
}

#[cfg(feature = "std")]
fn alloc_format(v: u32) -> String {
    let s = v.to_string();
    if s.len() < 5 {
        let mut padded = String::new();
        for _ in 0..(5 - s.len()) {
            padded.push('0');
        }
        padded.push_str(&s);
        padded
    } else {
        s
    }
}

#[cfg(feature = "std")]
fn alloc_format_usec(v: u32) -> String {
    let s = v.to_string();
    if s.len() < 6 {
        let mut padded = String::new();
        for _ in 0..(6 - s.len()) {
            padded.push('0');
        }
        padded.push_str(&s);
        padded
    } else {
        s
    }
}
