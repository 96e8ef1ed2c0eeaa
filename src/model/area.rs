//! Area entity: arming state machine and derived predicates (§3).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::commands::AlarmPriority;
use crate::observable::Observable;

/// Wire-exact area status (§6 "area status 0x00..0x0E").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AreaStatus {
    #[default]
    Unknown,
    AllArmedAway,
    PartArmedInstant,
    PartArmedDelay,
    Disarmed,
    AllArmedEntryDelay,
    PartArmedEntryDelay,
    AllArmedExitDelay,
    PartArmedExitDelay,
    AllArmedInstant,
    Stay1On,
    Stay2On,
    AwayOn,
    AwayExitDelay,
    AwayEntryDelay,
}

impl AreaStatus {
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0x00 => Self::Unknown,
            0x01 => Self::AllArmedAway,
            0x02 => Self::PartArmedInstant,
            0x03 => Self::PartArmedDelay,
            0x04 => Self::Disarmed,
            0x05 => Self::AllArmedEntryDelay,
            0x06 => Self::PartArmedEntryDelay,
            0x07 => Self::AllArmedExitDelay,
            0x08 => Self::PartArmedExitDelay,
            0x09 => Self::AllArmedInstant,
            0x0A => Self::Stay1On,
            0x0B => Self::Stay2On,
            0x0C => Self::AwayOn,
            0x0D => Self::AwayExitDelay,
            0x0E => Self::AwayEntryDelay,
            _ => Self::Unknown,
        }
    }

    pub fn disarmed(self) -> bool {
        matches!(self, Self::Disarmed)
    }

    pub fn arming(self) -> bool {
        matches!(self, Self::AllArmedExitDelay | Self::PartArmedExitDelay | Self::AwayExitDelay)
    }

    pub fn pending(self) -> bool {
        matches!(self, Self::AllArmedEntryDelay | Self::PartArmedEntryDelay | Self::AwayEntryDelay)
    }

    pub fn part_armed(self) -> bool {
        matches!(self, Self::PartArmedInstant | Self::PartArmedDelay | Self::Stay1On | Self::Stay2On)
    }

    pub fn all_armed(self) -> bool {
        matches!(self, Self::AllArmedAway | Self::AllArmedInstant | Self::AwayOn)
    }

    pub fn armed(self) -> bool {
        self.part_armed() || self.all_armed()
    }
}

/// Ready-to-arm summary (§6 "ready 0x00..0x02").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadyStatus {
    #[default]
    Not,
    Part,
    All,
}

impl ReadyStatus {
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0x01 => Self::Part,
            0x02 => Self::All,
            _ => Self::Not,
        }
    }
}

/// An alarm/arming area (§3).
pub struct Area {
    pub id: u16,
    pub name: String,
    status: AreaStatus,
    ready: ReadyStatus,
    faults: u32,
    alarms: HashSet<AlarmPriority>,
    pub status_observable: Observable<AreaStatus>,
    pub ready_observable: Observable<ReadyStatus>,
    pub alarm_observable: Observable<HashSet<AlarmPriority>>,
}

impl Area {
    pub fn new(id: u16, name: String) -> Self {
        Self {
            id,
            name,
            status: AreaStatus::Unknown,
            ready: ReadyStatus::Not,
            faults: 0,
            alarms: HashSet::new(),
            status_observable: Observable::new(),
            ready_observable: Observable::new(),
            alarm_observable: Observable::new(),
        }
    }

    pub fn status(&self) -> AreaStatus {
        self.status
    }

    pub fn set_status(&mut self, status: AreaStatus) {
        self.status = status;
        self.status_observable.notify(&status);
    }

    pub fn ready(&self) -> ReadyStatus {
        self.ready
    }

    pub fn faults(&self) -> u32 {
        self.faults
    }

    pub fn set_ready(&mut self, ready: ReadyStatus, faults: u32) {
        self.ready = ready;
        self.faults = faults;
        self.ready_observable.notify(&ready);
    }

    pub fn alarms(&self) -> &HashSet<AlarmPriority> {
        &self.alarms
    }

    pub fn set_alarm(&mut self, priority: AlarmPriority) {
        self.alarms.insert(priority);
        self.alarm_observable.notify(&self.alarms.clone());
    }

    pub fn clear_alarm(&mut self, priority: AlarmPriority) {
        self.alarms.remove(&priority);
        self.alarm_observable.notify(&self.alarms.clone());
    }

    /// Reset to the post-disconnect state (§3 "on disconnect every entity's
    /// status is reset"). Ready returns to `Not` and alarms are cleared.
    pub fn reset(&mut self) {
        self.status = AreaStatus::Unknown;
        self.ready = ReadyStatus::Not;
        self.faults = 0;
        self.alarms.clear();
    }

    pub fn triggered(&self) -> bool {
        let armed_or_pending = self.status.armed() || self.status.pending();
        armed_or_pending && self.alarms.iter().any(|p| p.is_alarm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_predicates_follow_status() {
        let mut area = Area::new(1, "Area1".into());
        area.set_status(AreaStatus::AwayOn);
        assert!(area.status().all_armed());
        assert!(area.status().armed());
        assert!(!area.status().arming());
    }

    #[test]
    fn triggered_requires_armed_or_pending_and_an_alarm_priority() {
        let mut area = Area::new(1, "Area1".into());
        area.set_status(AreaStatus::AwayOn);
        assert!(!area.triggered());
        area.set_alarm(AlarmPriority::FIRE_ALARM);
        assert!(area.triggered());
    }

    #[test]
    fn disarmed_with_alarm_is_not_triggered() {
        let mut area = Area::new(1, "Area1".into());
        area.set_status(AreaStatus::Disarmed);
        area.set_alarm(AlarmPriority::FIRE_ALARM);
        assert!(!area.triggered());
    }

    #[test]
    fn reset_clears_status_ready_and_alarms() {
        let mut area = Area::new(1, "Area1".into());
        area.set_status(AreaStatus::AwayOn);
        area.set_ready(ReadyStatus::All, 2);
        area.set_alarm(AlarmPriority::FIRE_ALARM);
        area.reset();
        assert_eq!(area.status(), AreaStatus::Unknown);
        assert_eq!(area.ready(), ReadyStatus::Not);
        assert!(area.alarms().is_empty());
    }
}
