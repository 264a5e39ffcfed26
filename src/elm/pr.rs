//! The `ATPR` grammar, as an explicit, iterative, bounded parser.
//!
//! Ported from `original_source/elm.h::ATPR`, which replaced an earlier
//! regex-based attempt (`^([0-9A-F]+)([\=\+\-\?])([^,][0-9A-F,]+)?$`,
//! left commented out in the source) after it blew the stack on long
//! input. This is a direct translation of that replacement's
//! character-at-a-time state machine (spec.md §9 DESIGN NOTES), not a
//! regex crate — `KEY<op>VALUE`, `KEY ∈ [0-9A-F]+`, `op ∈ {=,+,-,?}`,
//! `VALUE ∈ [0-9A-F,]+` with no leading comma and even-length runs
//! between commas.

#[cfg(feature = "std")]
use std::string::String;

/// A successfully parsed `ATPR` body, or one of the fixed control forms
/// (`0`/`1`/`?`/`??`/`???`) handled by the caller before this parser runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub key: String,
    pub op: Op,
    /// Trailing commas already trimmed.
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Append,
    Remove,
    Query,
}

/// Parses `data` into key/op/value. Returns `None` for anything that
/// doesn't match the grammar — the caller turns that into the literal
/// `?` response.
pub fn parse(data: &str) -> Option<Parsed> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Group {
        Key,
        Value,
        Invalid,
    }

    let mut group = Group::Key;
    let mut key = String::new();
    let mut op: Option<Op> = None;
    let mut value = String::new();

    for c in data.chars() {
        match group {
            Group::Key => {
                if c.is_ascii_digit() || ('A'..='F').contains(&c) {
                    key.push(c);
                } else if c == '=' || c == '+' || c == '-' || c == '?' {
                    op = Some(match c {
                        '=' => Op::Set,
                        '+' => Op::Append,
                        '-' => Op::Remove,
                        _ => Op::Query,
                    });
                    group = Group::Value;
                } else {
                    group = Group::Invalid;
                    break;
                }
            }
            Group::Value => {
                if c.is_ascii_digit() || ('A'..='F').contains(&c) {
                    value.push(c);
                } else if c == ',' {
                    if value.is_empty() {
                        group = Group::Invalid;
                        break;
                    }
                    value.push(',');
                } else {
                    group = Group::Invalid;
                    break;
                }
            }
            Group::Invalid => break,
        }
    }

    if group == Group::Invalid || op.is_none() {
        return None;
    }

    // Trim trailing commas.
    while value.ends_with(',') {
        value.pop();
    }

    // Every comma-separated run must be even-length hex (a run of whole
    // bytes); a run that fails this makes the whole value invalid.
    for run in value.split(',') {
        if run.len() % 2 != 0 {
            return None;
        }
    }

    Some(Parsed {
        key,
        op: op.unwrap(),
        value,
    })
}
