//! B/G-family history decoding (§4.9).

use super::format_tables::{render, FormatTable};
use super::HistoryEvent;

/// Polled record layout, 14 bytes: `[code:2][area:2][p1:2][p2:2][p3:2]
/// [timestamp:4]`, all big-endian.
pub fn decode_polled_record(id: u32, record: &[u8], table: &FormatTable) -> HistoryEvent {
    let code = u16::from_be_bytes([record[0], record[1]]);
    let area = u16::from_be_bytes([record[2], record[3]]);
    let p1 = u16::from_be_bytes([record[4], record[5]]);
    let p2 = u16::from_be_bytes([record[6], record[7]]);
    let p3 = u16::from_be_bytes([record[8], record[9]]);
    let timestamp = super::decode_timestamp_32_be([record[10], record[11], record[12], record[13]], false);
    let message = message(code, area, p1, p2, p3, table).unwrap_or_else(|| "Unknown event".to_string());
    HistoryEvent { id, timestamp, message }
}

pub fn message(code: u16, area: u16, p1: u16, p2: u16, p3: u16, table: &FormatTable) -> Option<String> {
    table.get(&code.to_string()).map(|t| render(t, area, p1, p2, p3, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_message_substitutes_area_and_point() {
        let table = super::super::format_tables::default_bg_table();
        let msg = message(19, 1, 5, 0, 0, &table).unwrap();
        assert_eq!(msg, "Alarm, Area: 1, Point: 5");
    }

    #[test]
    fn unknown_code_returns_none() {
        let table = super::super::format_tables::default_bg_table();
        assert!(message(0xBEEF, 1, 1, 1, 1, &table).is_none());
    }
}
