//! Subscription payload construction and notification dispatch (§4.6).

use tracing::warn;

use crate::codec::endian::be_u16;
use crate::commands::AlarmPriority;
use crate::history::{FormatTable, HistoryDialect, HistoryLog};
use crate::model::PanelModel;

/// Per-kind subscribe/ignore flags sent in the SET_SUBSCRIPTION payload.
/// Fields not named here (config-change, walk-test, wireless-learn) are
/// always sent as "ignore" — no caller ever wants them (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionFlags {
    pub heartbeat: bool,
    pub event_memory_summary: bool,
    pub event_history: bool,
    pub area_on_off: bool,
    pub area_ready: bool,
    pub output_status: bool,
    pub point_status: bool,
    pub door_status: bool,
    pub panel_system_status: bool,
}

impl Default for SubscriptionFlags {
    /// Subscribe to everything the core understands.
    fn default() -> Self {
        Self {
            heartbeat: true,
            event_memory_summary: true,
            event_history: true,
            area_on_off: true,
            area_ready: true,
            output_status: true,
            point_status: true,
            door_status: true,
            panel_system_status: true,
        }
    }
}

fn flag(on: bool) -> u8 {
    on as u8
}

/// Build the SET_SUBSCRIPTION payload for the negotiated `format` (1 or 2).
/// Format 2 appends panel-system-status and wireless-learn flags (§4.6).
pub fn build_subscription_payload(format: u8, flags: SubscriptionFlags) -> Vec<u8> {
    let mut payload = vec![format];
    payload.push(flag(flags.heartbeat));
    payload.push(flag(flags.event_memory_summary));
    payload.push(flag(flags.event_history));
    payload.push(0); // config-change: always ignored
    payload.push(flag(flags.area_on_off));
    payload.push(flag(flags.area_ready));
    payload.push(flag(flags.output_status));
    payload.push(flag(flags.point_status));
    payload.push(flag(flags.door_status));
    payload.push(0); // walk-test: always ignored
    if format == 2 {
        payload.push(flag(flags.panel_system_status));
        payload.push(0); // wireless-learn: always ignored
    }
    payload
}

/// Asynchronous follow-ups a notification group schedules. Dispatch itself
/// never blocks; the caller's event loop acts on these afterward (§4.6
/// "Finalizers ... schedule asynchronous follow-up actions rather than
/// blocking dispatch").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalizer {
    /// Re-run `get_alarms_for_priority` for a priority the summary reported
    /// newly nonzero.
    RefreshAlarmPriority(AlarmPriority),
    /// The first subscription-pushed event observed on a freshly connected,
    /// still-armed panel with no captured history yet: reload soon.
    HistoryReloadNow,
    /// An area-on/off notification arrived while `events` was still empty:
    /// reload history after a 30s delay (§4.6).
    HistoryReloadDelayed,
    /// Output-status ids in notifications don't match the request-side ids
    /// on Solution panels; re-poll the full enabled-output bitmap instead.
    PollOutputBitmap,
}

/// Parse and apply one notification payload (a sequence of
/// `[update_type:1][count:1]` groups), returning the finalizers its groups
/// scheduled (§4.6).
pub fn dispatch_notification(
    payload: &[u8],
    model: &mut PanelModel,
    dialect: HistoryDialect,
    table: &FormatTable,
    history: &mut HistoryLog,
) -> Vec<Finalizer> {
    let mut finalizers = Vec::new();
    let mut rest = payload;
    while rest.len() >= 2 {
        let update_type = rest[0];
        let count = rest[1] as usize;
        rest = &rest[2..];
        match update_type {
            0x00 => {
                // heartbeat: zero-length records, no model mutation beyond
                // the liveness timestamp the multiplexer already tracks.
            }
            0x01 => {
                for _ in 0..count {
                    if rest.len() < 3 {
                        break;
                    }
                    let priority = AlarmPriority(rest[0]);
                    let priority_count = be_u16(rest, 1);
                    rest = &rest[3..];
                    if priority_count > 0 {
                        finalizers.push(Finalizer::RefreshAlarmPriority(priority));
                    } else {
                        for area in model.areas.values_mut() {
                            area.clear_alarm(priority);
                        }
                    }
                }
                continue;
            }
            0x02 => {
                for _ in 0..count {
                    match dialect.decode_subscription(rest, table) {
                        Ok((event, consumed)) => {
                            let was_empty = history.events().is_empty();
                            history.try_append(event);
                            rest = &rest[consumed..];
                            if was_empty {
                                finalizers.push(Finalizer::HistoryReloadNow);
                            }
                        }
                        Err(e) => {
                            if !history.warned() {
                                warn!(error = %e, "failed to decode pushed history event");
                                history.note_decode_failure();
                            }
                            break;
                        }
                    }
                }
                continue;
            }
            0x04 => {
                for _ in 0..count {
                    if rest.len() < 3 {
                        break;
                    }
                    let id = be_u16(rest, 0);
                    let status = rest[2];
                    rest = &rest[3..];
                    if let Some(area) = model.areas.get_mut(&id) {
                        area.set_status(crate::model::AreaStatus::from_wire(status));
                    } else {
                        warn!(id, "area on/off notification for unknown area");
                    }
                }
                if history.events().is_empty() {
                    finalizers.push(Finalizer::HistoryReloadDelayed);
                }
                continue;
            }
            0x05 => {
                for _ in 0..count {
                    if rest.len() < 5 {
                        break;
                    }
                    let id = be_u16(rest, 0);
                    let ready = rest[2];
                    let faults = be_u16(rest, 3);
                    rest = &rest[5..];
                    if let Some(area) = model.areas.get_mut(&id) {
                        area.set_ready(crate::model::ReadyStatus::from_wire(ready), faults as u32);
                    }
                }
                continue;
            }
            0x06 => {
                // Record layout is opaque/unreliable for id correlation on
                // Solution panels; skip over the bytes and let the
                // finalizer re-poll the bitmap (§4.6).
                rest = &rest[(count * 3).min(rest.len())..];
                finalizers.push(Finalizer::PollOutputBitmap);
                continue;
            }
            0x07 => {
                for _ in 0..count {
                    if rest.len() < 3 {
                        break;
                    }
                    let id = be_u16(rest, 0);
                    let status = rest[2];
                    rest = &rest[3..];
                    if let Some(point) = model.points.get_mut(&id) {
                        point.set_status(crate::model::PointStatus::from_wire(status));
                    }
                }
                continue;
            }
            0x08 => {
                for _ in 0..count {
                    if rest.len() < 3 {
                        break;
                    }
                    let id = be_u16(rest, 0);
                    let status = rest[2];
                    rest = &rest[3..];
                    if let Some(door) = model.doors.get_mut(&id) {
                        door.set_status(crate::model::DoorStatus::from_wire(status));
                    }
                }
                continue;
            }
            0x0A => {
                for _ in 0..count {
                    if rest.len() < 6 {
                        break;
                    }
                    let faults = be_u16(rest, 1);
                    model.info.faults_bitmap = faults;
                    rest = &rest[6..];
                }
                continue;
            }
            other => {
                warn!(update_type = other, "unrecognised notification group; dropping rest of payload");
                break;
            }
        }
    }
    finalizers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::format_tables;
    use crate::model::{Area, AreaStatus};

    #[test]
    fn format1_payload_has_no_trailing_flags() {
        let payload = build_subscription_payload(1, SubscriptionFlags::default());
        assert_eq!(payload.len(), 11);
        assert_eq!(payload[0], 1);
    }

    #[test]
    fn format2_payload_appends_two_more_flags() {
        let payload = build_subscription_payload(2, SubscriptionFlags::default());
        assert_eq!(payload.len(), 13);
        assert_eq!(payload[11], 1); // panel-system-status subscribed
        assert_eq!(payload[12], 0); // wireless-learn always ignored
    }

    #[test]
    fn area_on_off_notification_updates_status_and_schedules_delayed_reload() {
        let mut model = PanelModel::new();
        model.areas.insert(1, Area::new(1, "Area1".into()));
        let mut history = HistoryLog::new();
        let table = format_tables::default_bg_table();

        let payload = [0x04, 0x01, 0x00, 0x01, 0x0C];
        let finalizers = dispatch_notification(&payload, &mut model, HistoryDialect::BG, &table, &mut history);

        assert_eq!(model.areas[&1].status(), AreaStatus::AwayOn);
        assert_eq!(finalizers, vec![Finalizer::HistoryReloadDelayed]);
    }

    #[test]
    fn event_memory_summary_nonzero_count_schedules_refresh() {
        let mut model = PanelModel::new();
        let mut history = HistoryLog::new();
        let table = format_tables::default_bg_table();

        let payload = [0x01, 0x01, 0x07, 0x00, 0x02];
        let finalizers = dispatch_notification(&payload, &mut model, HistoryDialect::BG, &table, &mut history);

        assert_eq!(finalizers, vec![Finalizer::RefreshAlarmPriority(AlarmPriority::BURGLARY_ALARM)]);
    }

    #[test]
    fn event_memory_summary_zero_count_clears_priority() {
        let mut model = PanelModel::new();
        model.areas.insert(1, Area::new(1, "Area1".into()));
        model.areas.get_mut(&1).unwrap().set_alarm(AlarmPriority::FIRE_ALARM);
        let mut history = HistoryLog::new();
        let table = format_tables::default_bg_table();

        let payload = [0x01, 0x01, 0x0A, 0x00, 0x00];
        let finalizers = dispatch_notification(&payload, &mut model, HistoryDialect::BG, &table, &mut history);

        assert!(finalizers.is_empty());
        assert!(!model.areas[&1].alarms().contains(&AlarmPriority::FIRE_ALARM));
    }

    #[test]
    fn panel_system_status_notification_sets_faults_bitmap() {
        let mut model = PanelModel::new();
        let mut history = HistoryLog::new();
        let table = format_tables::default_bg_table();

        let payload = [0x0A, 0x01, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00];
        dispatch_notification(&payload, &mut model, HistoryDialect::BG, &table, &mut history);

        assert_eq!(model.info.faults_bitmap, 0x20);
    }

    #[test]
    fn unknown_group_type_stops_dispatch_without_panicking() {
        let mut model = PanelModel::new();
        let mut history = HistoryLog::new();
        let table = format_tables::default_bg_table();

        let payload = [0xEE, 0x01, 0x00];
        let finalizers = dispatch_notification(&payload, &mut model, HistoryDialect::BG, &table, &mut history);
        assert!(finalizers.is_empty());
    }
}
