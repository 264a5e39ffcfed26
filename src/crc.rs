//! CRC-8/VPW, the table-driven checksum used to validate and append the
//! trailing byte of a J1850 VPW frame.
//!
//! Polynomial 0x1D, initial value 0xFF, final XOR 0xFF — the table is
//! precomputed at compile time so `crc8` is a handful of table lookups per
//! byte, matching the original firmware's `crcTable` in `j1850.h`.

use crate::consts::CRC_POLY;

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u8; 256] = build_table();

/// Computes CRC-8/VPW over `data`: init 0xFF, table-driven reduction,
/// final XOR 0xFF.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &b in data {
        crc = TABLE[(crc ^ b) as usize];
    }
    crc ^ 0xFF
}

/// Validates that `frame` (header through trailing CRC byte, inclusive)
/// carries a correct CRC-8/VPW checksum. An empty slice is never valid.
pub fn validate(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&trailing, payload)) => crc8(payload) == trailing,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_reference_rows() {
        // Spot-check against the table baked into the original firmware's
        // j1850.h (crcTable[0x01] and crcTable[0xFF]).
        assert_eq!(TABLE[0x01], 0x1d);
        assert_eq!(TABLE[0xFF], 0xc4);
    }

    #[test]
    fn crc8_of_empty_is_init_xor_final() {
        assert_eq!(crc8(&[]), 0xFF ^ 0xFF);
    }

    #[test]
    fn crc8_matches_scenario_s1() {
        // S1's frame: header 68 6A F1, data 01 00. The spec prose's own
        // worked value (0x5B) doesn't match CRC-8/SAE-J1850 (poly 0x1D,
        // init/xorout 0xFF) against its own check value for "123456789"
        // (0x4B, per the standard catalogue); 0x17 is what this table and
        // the bitwise form agree on for this payload. See DESIGN.md.
        let payload = [0x68, 0x6A, 0xF1, 0x01, 0x00];
        assert_eq!(crc8(&payload), 0x17);
    }

    #[test]
    fn crc8_matches_sae_j1850_check_value() {
        // The CRC catalogue's standard check value for CRC-8/SAE-J1850:
        // CRC8(ASCII "123456789") == 0x4B.
        assert_eq!(crc8(b"123456789"), 0x4B);
    }

    #[test]
    fn validate_accepts_correct_trailing_crc() {
        let crc = crc8(&[0x68, 0x6A, 0xF1, 0x01, 0x00]);
        let frame = [0x68, 0x6A, 0xF1, 0x01, 0x00, crc];
        assert!(validate(&frame));
    }

    #[test]
    fn validate_rejects_corrupted_payload() {
        let crc = crc8(&[0x68, 0x6A, 0xF1, 0x01, 0x00]);
        let frame = [0x68, 0x6A, 0xF1, 0x01, 0x01, crc];
        assert!(!validate(&frame));
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(!validate(&[]));
    }

    #[test]
    fn invariant_crc_roundtrips_for_all_single_byte_payloads() {
        for b in 0u8..=255 {
            let crc = crc8(&[b]);
            assert!(validate(&[b, crc]));
        }
    }
}
