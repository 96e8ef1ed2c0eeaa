//! Capability negotiation: parse the WHAT_ARE_YOU reply into everything
//! downstream code branches on (§4.3).

use crate::commands::{cmd, ArmingAction, PanelModel};
use crate::error::{Error, Result};
use crate::history::HistoryDialect;

/// Text-retrieval / alarm-memory / subscription "format" level. 0 means
/// unsupported; higher numbers mean richer dialects (§9 "Format feature-gate
/// negotiation"). Every loader takes one of these as a parameter and falls
/// through to a synthesized fallback rather than erroring on 0.
pub type Format = u8;

/// Everything the negotiator derives from one WHAT_ARE_YOU reply.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub model: PanelModel,
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub busy: bool,

    pub serial_read: bool,
    pub extended_what_are_you: bool,
    /// Detected but never enabled — see `extended_protocol_disabled_by_design`.
    pub extended_protocol: bool,
    pub subscriptions: bool,
    pub alarm_memory_format: Format,
    pub area_text_format: Format,
    pub output_text_format: Format,
    pub point_text_format: Format,
    pub door_text_format: Format,
    pub door_subsystem: bool,
    pub subscription_format: Format,
    pub extended_history: bool,

    pub in_flight_limit: usize,
    pub history_dialect: HistoryDialect,
    pub partial_arm: ArmingAction,
    pub all_arm: ArmingAction,
}

impl Capabilities {
    /// Extended (0x04) protocol is documented and the bitmask is parsed,
    /// but it is intentionally never switched on — a firmware bug on
    /// several panel families truncates long events under it (§4.3, §9).
    pub fn extended_protocol_disabled_by_design(&self) -> bool {
        true
    }
}

/// Minimum reply length before offset 23's bitmask is guaranteed present;
/// shorter replies are right-padded with zero bytes so every flag probe
/// reads as "unsupported" instead of panicking.
const MIN_FEATURE_TABLE_LEN: usize = 23 + 33;

/// `cf01`/`cf03` win over nothing: CF03 (batch) is richer than CF01
/// (per-id), so it wins when a panel somehow reports both.
fn format_from_cf(cf01: bool, cf03: bool) -> Format {
    if cf03 {
        3
    } else if cf01 {
        1
    } else {
        0
    }
}

fn format_from_bits(byte: u8, high: u8, low: u8) -> Format {
    if byte & high != 0 {
        2
    } else if byte & low != 0 {
        1
    } else {
        0
    }
}

/// Parse a WHAT_ARE_YOU reply payload into negotiated capabilities.
pub fn negotiate(reply: &[u8]) -> Result<Capabilities> {
    if reply.is_empty() {
        return Err(Error::decode("empty WHAT_ARE_YOU reply"));
    }
    let mut padded = reply.to_vec();
    if padded.len() < MIN_FEATURE_TABLE_LEN {
        padded.resize(MIN_FEATURE_TABLE_LEN, 0);
    }

    let family = padded[0];
    let model = PanelModel(family);

    let protocol_major = padded.get(5).copied().unwrap_or(0);
    let protocol_minor = padded.get(6).copied().unwrap_or(0);
    let busy = padded.get(13).copied().unwrap_or(0) != 0;

    // Feature bitmask: offsets 23.. right-padded to >= 33 bytes. Indexed
    // per-byte, matching the panel's own `bitmask[n] & mask` checks, not
    // folded into one big integer.
    let bitmask = &padded[23..MIN_FEATURE_TABLE_LEN];
    let byte0 = bitmask[0];
    let byte7 = bitmask[7];
    let byte11 = bitmask[11];

    let subscriptions = byte0 & 0x40 != 0;
    let extended_what_are_you = byte0 & 0x80 != 0;
    let extended_protocol = byte0 & 0x20 != 0;

    let supports_cf01 = byte7 & 0x20 != 0;
    let supports_cf03 = byte7 & 0x08 != 0;
    let text_format = format_from_cf(supports_cf01, supports_cf03);
    let area_text_format = text_format;
    let output_text_format = text_format;
    let point_text_format = text_format;
    let door_text_format = text_format;
    let alarm_memory_format = format_from_bits(byte7, 0x80, 0x40);
    let subscription_format = format_from_bits(byte7, 0x04, 0x02);
    let door_subsystem = byte7 & 0x01 != 0;

    let serial_read = byte11 & 0x04 != 0;
    let extended_history = byte11 & 0x02 != 0;

    let in_flight_limit = if family >= 0xA0 { 100 } else { 1 };

    let history_dialect = if family <= 0x21 || family == 0x28 {
        HistoryDialect::Solution
    } else if family <= 0x24 {
        HistoryDialect::Amax
    } else {
        HistoryDialect::BG
    };

    let (partial_arm, all_arm) = if family <= 0x28 {
        (ArmingAction::Stay1, ArmingAction::Away)
    } else {
        (ArmingAction::PerimeterDelay, ArmingAction::MasterDelay)
    };

    Ok(Capabilities {
        model,
        protocol_major,
        protocol_minor,
        busy,
        serial_read,
        extended_what_are_you,
        extended_protocol,
        subscriptions,
        alarm_memory_format,
        area_text_format,
        output_text_format,
        point_text_format,
        door_text_format,
        door_subsystem,
        subscription_format,
        extended_history,
        in_flight_limit,
        history_dialect,
        partial_arm,
        all_arm,
    })
}

/// The request payload for the WHAT_ARE_YOU command: format-3 first, with
/// the caller falling back to the bare format-1 request if this NACKs.
pub fn request_format3() -> (u8, Vec<u8>) {
    (cmd::WHAT_ARE_YOU, vec![0x03])
}

pub fn request_format1() -> (u8, Vec<u8>) {
    (cmd::WHAT_ARE_YOU, Vec::new())
}
