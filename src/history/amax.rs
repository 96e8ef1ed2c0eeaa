//! AMAX-family history decoding (§4.9).
//!
//! Message lookup tries a chain of increasingly specific keys and takes the
//! first hit; everything else falls through to "Unknown event".

use super::format_tables::{render, FormatTable};
use super::HistoryEvent;

/// Polled record layout, 8 bytes: same shape as Solution (§4.9 "AMAX
/// timestamp: same as Solution").
pub fn decode_polled_record(id: u32, record: &[u8], table: &FormatTable) -> HistoryEvent {
    let timestamp = super::decode_timestamp_16_16_le([record[0], record[1], record[2], record[3]]);
    let p1 = u16::from_le_bytes([record[4], record[5]]);
    let code = record[6] as u16;
    let p2 = record[7] as u16;
    let message = message(code, p1, p2, table).unwrap_or_else(|| "Unknown event".to_string());
    HistoryEvent { id, timestamp, message }
}

/// Try, in order: `code`, `code_{p1}`, `code_zone`, `code_keypad` (iff
/// `p1 <= 16`), `code_dx2` (iff `p1 <= 108`), `code_dx3`/`code_b4` (iff
/// `p1 ∈ {150, 151}`). First table hit wins (§4.9).
pub fn message(code: u16, p1: u16, p2: u16, table: &FormatTable) -> Option<String> {
    let render_key = |key: &str| table.get(key).map(|t| render(t, 0, p1, p2, 0, ""));

    if let Some(m) = render_key(&code.to_string()) {
        return Some(m);
    }
    if let Some(m) = render_key(&format!("{code}_{p1}")) {
        return Some(m);
    }
    if let Some(m) = render_key(&format!("{code}_zone")) {
        return Some(m);
    }
    if p1 <= 16 {
        if let Some(m) = render_key(&format!("{code}_keypad")) {
            return Some(m);
        }
    }
    if p1 <= 108 {
        if let Some(m) = render_key(&format!("{code}_dx2")) {
            return Some(m);
        }
    }
    if matches!(p1, 150 | 151) {
        if let Some(m) = render_key(&format!("{code}_dx3")) {
            return Some(m);
        }
        if let Some(m) = render_key(&format!("{code}_b4")) {
            return Some(m);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_key_is_tried_before_keypad() {
        let table = FormatTable::new().with("1_zone", "Zone Alarm, Zone: {param1}");
        let msg = message(1, 5, 0, &table).unwrap();
        assert_eq!(msg, "Zone Alarm, Zone: 5");
    }

    #[test]
    fn keypad_key_requires_p1_at_most_16() {
        let table = FormatTable::new().with("1_keypad", "Keypad Alarm, Keypad: {param1}");
        assert!(message(1, 17, 0, &table).is_none());
        assert_eq!(message(1, 16, 0, &table).unwrap(), "Keypad Alarm, Keypad: 16");
    }

    #[test]
    fn dx2_requires_p1_at_most_108() {
        let table = FormatTable::new().with("1_dx2", "DX2 event {param1}");
        assert!(message(1, 109, 0, &table).is_none());
        assert!(message(1, 108, 0, &table).is_some());
    }

    #[test]
    fn dx3_and_b4_require_p1_in_150_or_151() {
        let table = FormatTable::new().with("1_b4", "B4 event {param1}");
        assert!(message(1, 150, 0, &table).is_some());
        assert!(message(1, 149, 0, &table).is_none());
    }

    #[test]
    fn exact_code_wins_over_every_fallback() {
        let table = FormatTable::new().with("1", "Exact").with("1_zone", "Zone fallback");
        assert_eq!(message(1, 5, 0, &table).unwrap(), "Exact");
    }
}
