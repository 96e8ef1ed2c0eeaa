//! History log decoding: three per-family dialects sharing one frame shape
//! for pushed (subscription) events, and a dialect-specific fixed record
//! length for polled (batch) events (§4.9).

pub mod amax;
pub mod bg;
pub mod format_tables;
pub mod solution;

pub use format_tables::FormatTable;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A decoded history entry (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: u32,
    pub timestamp: NaiveDateTime,
    pub message: String,
}

/// Number of recent events to seed the cursor window with on first load
/// (§4.5 "a fixed window of recent events to cap load time").
pub const EVENT_LOOKBACK_COUNT: u32 = 500;

/// The panel's sentinel cursor value meaning "tell me the next-to-be-written
/// id, empty batch" (§4.5).
pub const CURSOR_SEED: u32 = 0xFFFF_FFFF;

/// Append-only event log plus the pagination cursor and the decode-warning
/// latch (§3 "HistoryEvent", §4.5 "History load").
#[derive(Debug, Default)]
pub struct HistoryLog {
    events: Vec<HistoryEvent>,
    cursor: u32,
    max_batch_seen: usize,
    /// Set on the first decode failure; suppresses further warnings until
    /// the latch is cleared by `reset_warning_latch` on reconnect (§7).
    warned: bool,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self { events: Vec::new(), cursor: CURSOR_SEED, max_batch_seen: 0, warned: false }
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// §3 "last_event_id": 0 for an empty log, else the most recent id.
    pub fn last_event_id(&self) -> u32 {
        self.events.last().map(|e| e.id).unwrap_or(0)
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.events.last().map(|e| e.timestamp)
    }

    /// Append an event unless its timestamp regresses relative to the most
    /// recently stored one — a guard against wrap/overflow (§4.5). Returns
    /// whether the event was appended.
    pub fn try_append(&mut self, event: HistoryEvent) -> bool {
        if let Some(last) = self.last_timestamp() {
            if event.timestamp < last {
                return false;
            }
        }
        self.cursor = event.id;
        self.events.push(event);
        true
    }

    /// Insert a synthetic "parse error" event at `id` using the current
    /// wall clock (§3, §4.5). Does not advance the decode-failure latch by
    /// itself — call `note_decode_failure` alongside this.
    pub fn append_parse_error(&mut self, id: u32, now: NaiveDateTime) {
        self.events.push(HistoryEvent { id, timestamp: now, message: "parse error".to_string() });
        self.cursor = id;
    }

    /// Seed the cursor after a first empty reply: `max(0, start_id -
    /// EVENT_LOOKBACK_COUNT - 1)` (§4.5, S6).
    pub fn seed_cursor_from_empty_reply(&mut self, start_id: u32) {
        self.cursor = start_id.saturating_sub(EVENT_LOOKBACK_COUNT).saturating_sub(1);
    }

    pub fn track_batch_size(&mut self, size: usize) -> bool {
        let is_final = size < self.max_batch_seen;
        self.max_batch_seen = self.max_batch_seen.max(size);
        is_final
    }

    /// Whether a decode-failure warning has already been logged this
    /// connection (§4.5 "a latch preventing further warnings until reconnect").
    pub fn warned(&self) -> bool {
        self.warned
    }

    pub fn note_decode_failure(&mut self) {
        self.warned = true;
    }

    /// Reset per-connection warning/batch-size tracking on reconnect.
    /// Events and the pagination cursor both survive — a reconnect resumes
    /// history collection rather than re-seeding the lookback window.
    pub fn reset_for_reconnect(&mut self) {
        self.max_batch_seen = 0;
        self.warned = false;
    }
}

/// Which decoder a connected panel uses, chosen once at capability
/// negotiation and never changed within a connection (§4.3, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDialect {
    Solution,
    Amax,
    BG,
}

/// Common fields extracted from the shared subscription-event layout
/// (§4.9): `[event_id:4 BE][event_code:2 BE][area:2 BE][p1:2 BE][p2:2 BE]
/// [p3:2 BE][timestamp:4 BE][..5 reserved..][text_len:2 BE][text]`.
struct SubscriptionHeader {
    event_id: u32,
    event_code: u16,
    area: u16,
    p1: u16,
    p2: u16,
    p3: u16,
    timestamp: [u8; 4],
    text: String,
    consumed: usize,
}

const SUBSCRIPTION_HEADER_LEN: usize = 25;

fn parse_subscription_header(raw: &[u8]) -> Result<SubscriptionHeader> {
    if raw.len() < SUBSCRIPTION_HEADER_LEN {
        return Err(Error::decode("subscription history record shorter than fixed header"));
    }
    let event_id = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let event_code = u16::from_be_bytes([raw[4], raw[5]]);
    let area = u16::from_be_bytes([raw[6], raw[7]]);
    let p1 = u16::from_be_bytes([raw[8], raw[9]]);
    let p2 = u16::from_be_bytes([raw[10], raw[11]]);
    let p3 = u16::from_be_bytes([raw[12], raw[13]]);
    let timestamp = [raw[14], raw[15], raw[16], raw[17]];
    let text_len = u16::from_be_bytes([raw[23], raw[24]]) as usize;
    let consumed = SUBSCRIPTION_HEADER_LEN + text_len;
    if raw.len() < consumed {
        return Err(Error::decode("subscription history record shorter than declared text length"));
    }
    let text = String::from_utf8_lossy(&raw[SUBSCRIPTION_HEADER_LEN..consumed]).into_owned();
    Ok(SubscriptionHeader { event_id, event_code, area, p1, p2, p3, timestamp, text, consumed })
}

impl HistoryDialect {
    /// Decode a batch of polled records (§4.5 "History load"): `count`
    /// fixed-length records back to back, producing ids `start_id+1 ..
    /// start_id+count`.
    pub fn decode_polled(self, start_id: u32, data: &[u8], count: usize, table: &FormatTable) -> Vec<HistoryEvent> {
        if count == 0 {
            return Vec::new();
        }
        let record_len = data.len() / count;
        (0..count)
            .map(|i| {
                let record = &data[i * record_len..(i + 1) * record_len];
                let id = start_id + i as u32 + 1;
                match self {
                    HistoryDialect::Solution => solution::decode_polled_record(id, record, table),
                    HistoryDialect::Amax => amax::decode_polled_record(id, record, table),
                    HistoryDialect::BG => bg::decode_polled_record(id, record, table),
                }
            })
            .collect()
    }

    /// Decode one subscription-pushed event, returning the event and the
    /// number of bytes it consumed so the caller can advance to the next
    /// record in the group.
    pub fn decode_subscription(self, raw: &[u8], table: &FormatTable) -> Result<(HistoryEvent, usize)> {
        let mut header = parse_subscription_header(raw)?;
        if self == HistoryDialect::Amax {
            // AMAX event ids carry high flag bits that must be masked off (§4.9).
            header.event_id &= 0x1FF;
        }
        let timestamp = match self {
            HistoryDialect::Solution | HistoryDialect::Amax => decode_timestamp_16_16_le(header.timestamp),
            HistoryDialect::BG => decode_timestamp_32_be(header.timestamp, true),
        };
        let message = match self {
            HistoryDialect::Solution => solution::message(header.event_code, header.p1, header.p2, table),
            HistoryDialect::Amax => amax::message(header.event_code, header.p1, header.p2, table),
            HistoryDialect::BG => bg::message(header.event_code, header.area, header.p1, header.p2, header.p3, table),
        }
        .unwrap_or(header.text);
        Ok((HistoryEvent { id: header.event_id + 1, timestamp, message }, header.consumed))
    }
}

/// Solution/AMAX shared timestamp: two little-endian 16-bit words (§4.9).
fn decode_timestamp_16_16_le(bytes: [u8; 4]) -> NaiveDateTime {
    let word1 = u16::from_le_bytes([bytes[0], bytes[1]]);
    let word2 = u16::from_le_bytes([bytes[2], bytes[3]]);
    let minute = word1 & 0x3F;
    let hour = (word1 >> 6) & 0x1F;
    let day = (word1 >> 11) & 0x1F;
    let second = word2 & 0x3F;
    let month = (word2 >> 6) & 0x0F;
    let year = 2000 + (word2 >> 10);
    build_datetime(year as i32, month as u32, day as u32, hour as u32, minute as u32, second as u32)
}

/// B/G timestamp: one big-endian 32-bit word (§4.9; see module docs for why
/// this is big-endian while the original decoder reads it little-endian).
/// Subscription events carry a +1 day/month bias that callers add back.
fn decode_timestamp_32_be(bytes: [u8; 4], subscription_biased: bool) -> NaiveDateTime {
    let word = u32::from_be_bytes(bytes);
    let year = 2010 + (word >> 26);
    let mut month = (word >> 22) & 0x0F;
    let mut day = (word >> 17) & 0x1F;
    let hour = (word >> 12) & 0x1F;
    let minute = (word >> 6) & 0x3F;
    let second = word & 0x3F;
    if subscription_biased {
        month += 1;
        day += 1;
    }
    build_datetime(year as i32, month, day, hour, minute, second)
}

fn build_datetime(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    use chrono::{NaiveDate, NaiveTime};
    let date = NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), second.min(59))
        .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    NaiveDateTime::new(date, time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription_frame(event_id: u32, code: u16, area: u16, p1: u16, p2: u16, p3: u16, ts: [u8; 4], text: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&event_id.to_be_bytes());
        buf.extend_from_slice(&code.to_be_bytes());
        buf.extend_from_slice(&area.to_be_bytes());
        buf.extend_from_slice(&p1.to_be_bytes());
        buf.extend_from_slice(&p2.to_be_bytes());
        buf.extend_from_slice(&p3.to_be_bytes());
        buf.extend_from_slice(&ts);
        buf.extend_from_slice(&[0u8; 5]); // reserved gap up to offset 23
        buf.extend_from_slice(&(text.len() as u16).to_be_bytes());
        buf.extend_from_slice(text.as_bytes());
        buf
    }

    /// S7: code=0x0013 (19) Alarm, area=1, p1=5, p2=p3=0, timestamp bits
    /// `(14<<26)|(3<<22)|(14<<17)|(9<<12)|(27<<6)|33` as published, decoding
    /// to 2024-03-14 09:27:33. The raw bits above already encode that exact
    /// day/month; decoded unbiased (as a polled record) they must read back
    /// as day=14, month=3. A subscription-pushed copy of the same bits
    /// carries the dialect's known +1 day/month bias, so it must read back
    /// one day and one month later instead of being skipped over.
    #[test]
    fn s7_bg_history_decode_matches_published_scenario() {
        let encoded: u32 = (14u32 << 26) | (3u32 << 22) | (14u32 << 17) | (9u32 << 12) | (27u32 << 6) | 33;
        let ts = encoded.to_be_bytes();
        let table = format_tables::default_bg_table();

        let mut polled_record = Vec::new();
        polled_record.extend_from_slice(&19u16.to_be_bytes()); // code
        polled_record.extend_from_slice(&1u16.to_be_bytes()); // area
        polled_record.extend_from_slice(&5u16.to_be_bytes()); // p1
        polled_record.extend_from_slice(&0u16.to_be_bytes()); // p2
        polled_record.extend_from_slice(&0u16.to_be_bytes()); // p3
        polled_record.extend_from_slice(&ts);
        let polled = HistoryDialect::BG.decode_polled(0, &polled_record, 1, &table);
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].timestamp.year(), 2024);
        assert_eq!(polled[0].timestamp.month(), 3);
        assert_eq!(polled[0].timestamp.day(), 14);
        assert_eq!(polled[0].timestamp.hour(), 9);
        assert_eq!(polled[0].timestamp.minute(), 27);
        assert_eq!(polled[0].timestamp.second(), 33);
        assert_eq!(polled[0].message, "Alarm, Area: 1, Point: 5");

        let frame = subscription_frame(0, 19, 1, 5, 0, 0, ts, "");
        let (event, consumed) = HistoryDialect::BG.decode_subscription(&frame, &table).unwrap();
        assert_eq!(consumed, 25);
        assert_eq!(event.timestamp.year(), 2024);
        assert_eq!(event.timestamp.month(), 4, "subscription dialect bias adds 1 to month");
        assert_eq!(event.timestamp.day(), 15, "subscription dialect bias adds 1 to day");
        assert_eq!(event.timestamp.hour(), 9);
        assert_eq!(event.timestamp.minute(), 27);
        assert_eq!(event.timestamp.second(), 33);
        assert_eq!(event.message, "Alarm, Area: 1, Point: 5");
    }

    #[test]
    fn stored_event_id_is_event_id_plus_one() {
        let frame = subscription_frame(41, 18, 1, 0, 0, 0, [0, 0, 0, 0], "");
        let table = format_tables::default_bg_table();
        let (event, _) = HistoryDialect::BG.decode_subscription(&frame, &table).unwrap();
        assert_eq!(event.id, 42);
    }

    #[test]
    fn amax_event_id_high_bits_are_masked() {
        let frame = subscription_frame(0x3FF, 1, 0, 1, 0, 0, [0, 0, 0, 0], "");
        let table = format_tables::default_amax_table();
        let (event, _) = HistoryDialect::Amax.decode_subscription(&frame, &table).unwrap();
        // 0x3FF & 0x1FF = 0x1FF, stored id is +1.
        assert_eq!(event.id, 0x200);
    }

    #[test]
    fn unknown_code_falls_back_to_raw_text() {
        let frame = subscription_frame(0, 0xFFFF, 1, 0, 0, 0, [0, 0, 0, 0], "raw panel text");
        let table = format_tables::default_bg_table();
        let (event, _) = HistoryDialect::BG.decode_subscription(&frame, &table).unwrap();
        assert_eq!(event.message, "raw panel text");
    }

    #[test]
    fn short_record_is_a_decode_error() {
        let table = format_tables::default_bg_table();
        assert!(HistoryDialect::BG.decode_subscription(&[0u8; 10], &table).is_err());
    }

    /// §8 property 3: a batch of `count` events decodes to ids
    /// `start_id+1 .. start_id+count`.
    #[test]
    fn polled_batch_ids_are_contiguous_from_start_plus_one() {
        let table = format_tables::default_solution_table();
        // Solution polled record is 8 bytes: word1(2) word2(2) p1(2) code(1) p2(1).
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend_from_slice(&[0, 0, 0, 0, 0, 0, 1, 0]);
        }
        let events = HistoryDialect::Solution.decode_polled(100, &data, 3, &table);
        let ids: Vec<u32> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![101, 102, 103]);
    }

    /// S6: a `count=0` reply at `start_id=12345` seeds the cursor to
    /// `max(0, 12345 - EVENT_LOOKBACK_COUNT - 1)`.
    #[test]
    fn s6_empty_reply_seeds_cursor_below_start_id() {
        let mut log = HistoryLog::new();
        assert_eq!(log.cursor(), CURSOR_SEED);
        log.seed_cursor_from_empty_reply(12345);
        assert_eq!(log.cursor(), 12345 - EVENT_LOOKBACK_COUNT - 1);
    }

    #[test]
    fn seed_cursor_never_goes_negative() {
        let mut log = HistoryLog::new();
        log.seed_cursor_from_empty_reply(10);
        assert_eq!(log.cursor(), 0);
    }

    #[test]
    fn try_append_rejects_timestamp_regression() {
        let mut log = HistoryLog::new();
        let t1 = build_datetime(2024, 1, 1, 0, 0, 0);
        let t0 = build_datetime(2023, 1, 1, 0, 0, 0);
        assert!(log.try_append(HistoryEvent { id: 1, timestamp: t1, message: "a".into() }));
        assert!(!log.try_append(HistoryEvent { id: 2, timestamp: t0, message: "b".into() }));
        assert_eq!(log.events().len(), 1);
    }

    #[test]
    fn decode_failure_latch_suppresses_repeat_warnings_until_reconnect() {
        let mut log = HistoryLog::new();
        assert!(!log.warned());
        log.note_decode_failure();
        assert!(log.warned());
        log.reset_for_reconnect();
        assert!(!log.warned());
    }
}
