//! Solution-family history decoding (§4.9).

use super::format_tables::{render, solution_user, FormatTable};
use super::HistoryEvent;

/// Polled record layout, 8 bytes: `[word1:2 LE][word2:2 LE][p1:2 LE][code:1][p2:1]`.
pub fn decode_polled_record(id: u32, record: &[u8], table: &FormatTable) -> HistoryEvent {
    let timestamp = super::decode_timestamp_16_16_le([record[0], record[1], record[2], record[3]]);
    let p1 = u16::from_le_bytes([record[4], record[5]]);
    let code = record[6];
    let p2 = record[7] as u16;
    let message = message(code as u16, p1, p2, table).unwrap_or_else(|| format!("Unknown event {code}"));
    HistoryEvent { id, timestamp, message }
}

/// Message for event `code` with params `(p1, p2)`: `p2` selects the user
/// label (§4.9 "SOLUTION_USERS").
pub fn message(code: u16, p1: u16, p2: u16, table: &FormatTable) -> Option<String> {
    let user = solution_user(p2);
    table.get(&code.to_string()).map(|template| render(template, 0, p1, p2, 0, &user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_event_renders_area_and_user() {
        let table = super::super::format_tables::default_solution_table();
        let msg = message(18, 2, 0, &table).unwrap();
        assert_eq!(msg, "Arm, Area: 2, by: Quick");
    }

    #[test]
    fn unknown_code_has_no_table_entry() {
        let table = super::super::format_tables::default_solution_table();
        assert!(message(250, 1, 1, &table).is_none());
    }
}
