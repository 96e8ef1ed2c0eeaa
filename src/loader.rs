//! Enumeration and bulk status loading (§4.5).

use std::collections::BTreeMap;

use tracing::warn;

use crate::capability::Capabilities;
use crate::codec::endian::decode_enabled_bitmap;
use crate::commands::{cmd, cmd_request_max, AlarmPriority};
use crate::error::Result;
use crate::history::HistoryLog;
use crate::model::{Area, Door, Output, Point};
use crate::multiplexer::Multiplexer;

/// Which phases to run. `ALL` is their union (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSelector {
    pub extended_info: bool,
    pub entities: bool,
    pub status: bool,
}

impl LoadSelector {
    pub const ALL: Self = Self { extended_info: true, entities: true, status: true };
    /// Used by the supervisor on reconnect once entities are already
    /// populated (§4.7): only status needs reloading.
    pub const STATUS_ONLY: Self = Self { extended_info: false, entities: false, status: true };
}

/// Bulk enumeration driver, parameterized by one connection's negotiated
/// capabilities.
pub struct Loader<'a> {
    mux: &'a Multiplexer,
    caps: &'a Capabilities,
}

impl<'a> Loader<'a> {
    pub fn new(mux: &'a Multiplexer, caps: &'a Capabilities) -> Self {
        Self { mux, caps }
    }

    /// Phase 1: serial number and firmware version (§4.5 "Extended info").
    pub async fn load_extended_info(&self) -> Result<(Option<u64>, Option<String>)> {
        let serial = if self.caps.serial_read {
            let reply = self.mux.send_command(cmd::PRODUCT_SERIAL, vec![0x00, 0x00]).await?;
            Some(crate::codec::endian::be_u48(&reply, 0))
        } else {
            None
        };
        let firmware = if self.caps.extended_what_are_you {
            let reply = self.mux.send_command(cmd::PANEL_SYSTEM_STATUS, Vec::new()).await?;
            if reply.len() >= 3 {
                let major = reply[0];
                let minor = crate::codec::endian::be_u16(&reply, 1);
                Some(format!("v{major}.{minor}"))
            } else {
                None
            }
        } else {
            None
        };
        Ok((serial, firmware))
    }

    /// Enumerate one entity kind's configured ids from a bitmap-encoding
    /// config command (§4.5 step 2, bullet 1).
    async fn enabled_ids(&self, config_cmd: u8) -> Result<Vec<u16>> {
        let reply = self.mux.send_command(config_cmd, Vec::new()).await?;
        Ok(decode_enabled_bitmap(&reply))
    }

    /// CF03 batched name retrieval: iterate starting from id 0, each call
    /// returning zero or more `[id:2][name utf-8][0x00]` records; stop on
    /// an empty reply (§4.5).
    async fn load_names_cf03(&self, name_cmd: u8) -> Result<BTreeMap<u16, String>> {
        let mut names = BTreeMap::new();
        let mut next_id: u16 = 0;
        loop {
            let mut request = next_id.to_be_bytes().to_vec();
            request.push(0x00); // primary language
            request.push(0x01); // return many
            let reply = self.mux.send_command(name_cmd, request).await?;
            if reply.is_empty() {
                break;
            }
            let mut rest = &reply[..];
            while !rest.is_empty() {
                if rest.len() < 2 {
                    break;
                }
                let id = crate::codec::endian::be_u16(rest, 0);
                let after_id = &rest[2..];
                let nul = after_id.iter().position(|&b| b == 0).unwrap_or(after_id.len());
                let name = String::from_utf8_lossy(&after_id[..nul]).into_owned();
                names.insert(id, name);
                next_id = id;
                rest = &after_id[(nul + 1).min(after_id.len())..];
            }
        }
        Ok(names)
    }

    /// CF01 per-id name retrieval: one request per enabled id, reply is a
    /// NUL-terminated UTF-8 name (§4.5).
    async fn load_names_cf01(&self, name_cmd: u8, enabled: &[u16]) -> Result<BTreeMap<u16, String>> {
        let mut names = BTreeMap::new();
        for &id in enabled {
            let mut request = id.to_be_bytes().to_vec();
            request.push(0x00);
            let reply = self.mux.send_command(name_cmd, request).await?;
            let nul = reply.iter().position(|&b| b == 0).unwrap_or(reply.len());
            names.insert(id, String::from_utf8_lossy(&reply[..nul]).into_owned());
        }
        Ok(names)
    }

    /// Phase 2 for one entity kind: enumerate ids then resolve names via
    /// CF03, CF01, or synthesis (§4.5). Only ids in the enabled set survive
    /// (§8 property 2).
    async fn load_names(
        &self,
        name_cmd: u8,
        config_cmd: u8,
        text_format: u8,
        type_label: &str,
    ) -> Result<BTreeMap<u16, String>> {
        let enabled = self.enabled_ids(config_cmd).await?;
        let mut names = match text_format {
            3 => self.load_names_cf03(name_cmd).await?,
            1 => self.load_names_cf01(name_cmd, &enabled).await?,
            _ => enabled.iter().map(|&id| (id, format!("{type_label}{id}"))).collect(),
        };
        // §8 property 2: entities is exactly the enabled set, never a superset.
        names.retain(|id, _| enabled.contains(id));
        for &id in &enabled {
            names.entry(id).or_insert_with(|| format!("{type_label}{id}"));
        }
        Ok(names)
    }

    pub async fn load_areas(&self) -> Result<BTreeMap<u16, Area>> {
        let names = self.load_names(cmd::AREA_TEXT, cmd::CONFIGURED_AREAS, self.caps.area_text_format, "AREA").await?;
        Ok(names.into_iter().map(|(id, name)| (id, Area::new(id, name))).collect())
    }

    pub async fn load_points(&self) -> Result<BTreeMap<u16, Point>> {
        let names =
            self.load_names(cmd::POINT_TEXT, cmd::CONFIGURED_POINTS, self.caps.point_text_format, "POINT").await?;
        Ok(names.into_iter().map(|(id, name)| (id, Point::new(id, name))).collect())
    }

    pub async fn load_outputs(&self) -> Result<BTreeMap<u16, Output>> {
        let names = self
            .load_names(cmd::OUTPUT_TEXT, cmd::CONFIGURED_OUTPUTS, self.caps.output_text_format, "OUTPUT")
            .await?;
        Ok(names.into_iter().map(|(id, name)| (id, Output::new(id, name))).collect())
    }

    pub async fn load_doors(&self) -> Result<BTreeMap<u16, Door>> {
        if !self.caps.door_subsystem {
            return Ok(BTreeMap::new());
        }
        let names = self.load_names(cmd::DOOR_TEXT, cmd::CONFIGURED_DOORS, self.caps.door_text_format, "DOOR").await?;
        Ok(names.into_iter().map(|(id, name)| (id, Door::new(id, name))).collect())
    }

    /// Phase 3 status loader, generic over the `[id:2][status:1]` record
    /// shape shared by area/point/door status commands. Requests are
    /// chunked to the per-command maximum (§4.5, §9).
    pub async fn load_entity_status(&self, status_cmd: u8, ids: &[u16]) -> Result<BTreeMap<u16, u8>> {
        let mut statuses = BTreeMap::new();
        let chunk_size = cmd_request_max(status_cmd).unwrap_or(ids.len().max(1));
        for chunk in ids.chunks(chunk_size.max(1)) {
            let mut request = Vec::with_capacity(chunk.len() * 2);
            for &id in chunk {
                request.extend_from_slice(&id.to_be_bytes());
            }
            let reply = self.mux.send_command(status_cmd, request).await?;
            let mut rest = &reply[..];
            while rest.len() >= 3 {
                let id = crate::codec::endian::be_u16(rest, 0);
                statuses.insert(id, rest[2]);
                rest = &rest[3..];
            }
        }
        Ok(statuses)
    }

    /// Outputs have no per-id status byte: active membership is read from
    /// the enabled-output bitmap (§4.5 "For outputs: request the
    /// enabled-output bitmap and set each output to Active if present else
    /// Inactive").
    pub async fn load_output_active_set(&self) -> Result<Vec<u16>> {
        self.enabled_ids(cmd::OUTPUT_STATUS).await
    }

    /// Alarm memory summary + per-priority detail with continuation
    /// records (§4.5 "Alarm memory load").
    pub async fn load_alarm_status(&self, areas: &mut BTreeMap<u16, Area>) -> Result<()> {
        if self.caps.alarm_memory_format == 0 {
            return Ok(());
        }
        let payload = if self.caps.alarm_memory_format == 2 { vec![0x02] } else { Vec::new() };
        let summary = self.mux.send_command(cmd::ALARM_MEMORY_SUMMARY, payload).await?;

        for priority in AlarmPriority::ALL {
            let offset = (priority.0 as usize - 1) * 2;
            let count = summary.get(offset..offset + 2).map(|b| crate::codec::endian::be_u16(b, 0)).unwrap_or(0);
            if count > 0 {
                self.load_alarms_for_priority(priority, areas, None).await?;
            } else {
                for area in areas.values_mut() {
                    area.clear_alarm(priority);
                }
            }
        }
        Ok(())
    }

    /// Re-run the per-priority alarm detail fetch for one priority, e.g.
    /// after a subscription's event-memory-summary notification reports a
    /// newly nonzero count (§4.6).
    pub async fn refresh_alarm_priority(&self, priority: AlarmPriority, areas: &mut BTreeMap<u16, Area>) -> Result<()> {
        self.load_alarms_for_priority(priority, areas, None).await
    }

    fn load_alarms_for_priority<'f>(
        &'f self,
        priority: AlarmPriority,
        areas: &'f mut BTreeMap<u16, Area>,
        continuation: Option<(u16, u16)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'f>> {
        Box::pin(async move {
            let mut request = vec![priority.0];
            if let Some((last_area, last_point)) = continuation {
                request.extend_from_slice(&last_area.to_be_bytes());
                request.extend_from_slice(&last_point.to_be_bytes());
            }
            let reply = self.mux.send_command(cmd::ALARM_MEMORY_DETAIL, request).await?;
            let mut rest = &reply[..];
            while rest.len() >= 5 {
                let area = crate::codec::endian::be_u16(rest, 0);
                let point = crate::codec::endian::be_u16(rest, 3);
                if point == 0xFFFF {
                    self.load_alarms_for_priority(priority, areas, Some((area, point))).await?;
                } else if let Some(entry) = areas.get_mut(&area) {
                    entry.set_alarm(priority);
                } else {
                    warn!(area, "alarm memory referenced an unknown area");
                }
                rest = &rest[5..];
            }
            Ok(())
        })
    }

    /// §4.5 "History load": skipped unless every configured area is
    /// disarmed; otherwise page through the panel's rolling cursor.
    pub async fn load_history(&self, areas: &BTreeMap<u16, Area>, log: &mut HistoryLog) -> Result<()> {
        if !areas.values().all(|a| a.status().disarmed()) {
            return Ok(());
        }
        loop {
            let mut request = vec![0xFF];
            request.extend_from_slice(&log.cursor().to_be_bytes());
            let reply = match self.mux.send_command(cmd::RAW_HISTORY, request).await {
                Ok(reply) => reply,
                Err(e) => {
                    if !log.warned() {
                        warn!(error = %e, "history load failed");
                        log.note_decode_failure();
                    }
                    return Ok(());
                }
            };
            if reply.len() < 5 {
                break;
            }
            let count = reply[0] as usize;
            let start_id = crate::codec::endian::be_u32(&reply, 1);
            let records = &reply[5..];

            if count == 0 {
                log.seed_cursor_from_empty_reply(start_id);
                break;
            }

            let is_final_batch = log.track_batch_size(count);
            for event in self.caps.history_dialect.decode_polled(start_id, records, count, &default_format_table(self.caps.history_dialect)) {
                if !log.try_append(event) {
                    return Ok(());
                }
            }
            if is_final_batch {
                break;
            }
        }
        Ok(())
    }
}

fn default_format_table(dialect: crate::history::HistoryDialect) -> crate::history::FormatTable {
    use crate::history::{format_tables, HistoryDialect};
    match dialect {
        HistoryDialect::Solution => format_tables::default_solution_table(),
        HistoryDialect::Amax => format_tables::default_amax_table(),
        HistoryDialect::BG => format_tables::default_bg_table(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_selector_all_enables_every_phase() {
        assert!(LoadSelector::ALL.extended_info);
        assert!(LoadSelector::ALL.entities);
        assert!(LoadSelector::ALL.status);
    }

    #[test]
    fn status_only_selector_skips_info_and_entities() {
        assert!(!LoadSelector::STATUS_ONLY.extended_info);
        assert!(!LoadSelector::STATUS_ONLY.entities);
        assert!(LoadSelector::STATUS_ONLY.status);
    }
}
