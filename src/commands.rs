//! Wire-exact command codes, enum catalogs, and lookup tables (§6).
//!
//! These are data, not behaviour — kept in one module so the codec and
//! loader can reference them without duplicating magic numbers, mirroring
//! the teacher's `net/types.rs` constants table.

/// Command codes used by the core (§6).
#[allow(non_snake_case)]
pub mod cmd {
    pub const WHAT_ARE_YOU: u8 = 0x01;
    pub const AUTHENTICATE: u8 = 0x06;
    pub const REQUEST_PERMISSION: u8 = 0x07;
    pub const ALARM_MEMORY_SUMMARY: u8 = 0x08;
    pub const SET_DATE_TIME: u8 = 0x11;
    pub const REQUEST_DATE_TIME: u8 = 0x12;
    pub const RAW_HISTORY: u8 = 0x15;
    pub const PANEL_SYSTEM_STATUS: u8 = 0x20;
    pub const ALARM_MEMORY_DETAIL: u8 = 0x23;
    pub const CONFIGURED_AREAS: u8 = 0x24;
    pub const AREA_STATUS: u8 = 0x26;
    pub const AREA_ARM: u8 = 0x27;
    pub const AREA_TEXT: u8 = 0x29;
    pub const CONFIGURED_DOORS: u8 = 0x2B;
    pub const DOOR_STATUS: u8 = 0x2C;
    pub const SET_DOOR_STATE: u8 = 0x2D;
    pub const DOOR_TEXT: u8 = 0x2E;
    pub const CONFIGURED_OUTPUTS: u8 = 0x30;
    pub const OUTPUT_STATUS: u8 = 0x31;
    pub const SET_OUTPUT_STATE: u8 = 0x32;
    pub const OUTPUT_TEXT: u8 = 0x33;
    pub const CONFIGURED_POINTS: u8 = 0x35;
    pub const POINT_STATUS: u8 = 0x38;
    pub const POINT_TEXT: u8 = 0x3C;
    pub const LOGIN_REMOTE_USER: u8 = 0x3E;
    pub const PRODUCT_SERIAL: u8 = 0x4A;
    pub const SET_SUBSCRIPTION: u8 = 0x5F;
    pub const RAW_HISTORY_EXT: u8 = 0x63;
}

/// Per-command maximum entity count per request (§9 "Per-command record-length maxima").
/// Status loaders MUST chunk requests to these limits or the panel silently truncates.
pub fn cmd_request_max(command: u8) -> Option<usize> {
    match command {
        cmd::AREA_STATUS => Some(50),
        cmd::DOOR_STATUS => Some(32),
        cmd::OUTPUT_STATUS => Some(600),
        cmd::POINT_STATUS => Some(66),
        _ => None,
    }
}

/// Arming action codes sent in `AREA_ARM` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmingAction {
    Disarm,
    MasterDelay,
    PerimeterDelay,
    Stay1,
    Stay2,
    Away,
}

impl ArmingAction {
    pub fn code(self) -> u8 {
        match self {
            ArmingAction::Disarm => 0x01,
            ArmingAction::MasterDelay => 0x03,
            ArmingAction::PerimeterDelay => 0x05,
            ArmingAction::Stay1 => 0x0A,
            ArmingAction::Stay2 => 0x0B,
            ArmingAction::Away => 0x0C,
        }
    }
}

/// Door action codes sent in `SET_DOOR_STATE` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorAction {
    NoAction,
    Cycle,
    Unlock,
    TerminateUnlock,
    Secure,
    TerminateSecure,
}

impl DoorAction {
    pub fn code(self) -> u8 {
        match self {
            DoorAction::NoAction => 0,
            DoorAction::Cycle => 1,
            DoorAction::Unlock => 2,
            DoorAction::TerminateUnlock => 3,
            DoorAction::Secure => 4,
            DoorAction::TerminateSecure => 5,
        }
    }
}

/// Authentication user types for the `AUTHENTICATE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    InstallerApp,
    Automation,
}

impl UserType {
    pub fn code(self) -> u8 {
        match self {
            UserType::InstallerApp => 0x00,
            UserType::Automation => 0x01,
        }
    }
}

/// Alarm memory priority (1..10), wire-exact ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmPriority(pub u8);

impl AlarmPriority {
    pub const BURGLARY_TROUBLE: AlarmPriority = AlarmPriority(0x01);
    pub const BURGLARY_SUPERVISORY: AlarmPriority = AlarmPriority(0x02);
    pub const GAS_TROUBLE: AlarmPriority = AlarmPriority(0x03);
    pub const GAS_SUPERVISORY: AlarmPriority = AlarmPriority(0x04);
    pub const FIRE_TROUBLE: AlarmPriority = AlarmPriority(0x05);
    pub const FIRE_SUPERVISORY: AlarmPriority = AlarmPriority(0x06);
    pub const BURGLARY_ALARM: AlarmPriority = AlarmPriority(0x07);
    pub const PERSONAL_EMERGENCY: AlarmPriority = AlarmPriority(0x08);
    pub const GAS_ALARM: AlarmPriority = AlarmPriority(0x09);
    pub const FIRE_ALARM: AlarmPriority = AlarmPriority(0x0A);

    pub const ALL: [AlarmPriority; 10] = [
        Self::BURGLARY_TROUBLE,
        Self::BURGLARY_SUPERVISORY,
        Self::GAS_TROUBLE,
        Self::GAS_SUPERVISORY,
        Self::FIRE_TROUBLE,
        Self::FIRE_SUPERVISORY,
        Self::BURGLARY_ALARM,
        Self::PERSONAL_EMERGENCY,
        Self::GAS_ALARM,
        Self::FIRE_ALARM,
    ];

    /// True for the priorities that constitute a "triggered" area (§3).
    pub fn is_alarm(self) -> bool {
        matches!(self, Self::BURGLARY_ALARM | Self::GAS_ALARM | Self::FIRE_ALARM)
    }

    pub fn text(self) -> &'static str {
        match self.0 {
            0x01 => "Burglary Trouble",
            0x02 => "Burglary Supervisory",
            0x03 => "Gas Trouble",
            0x04 => "Gas Supervisory",
            0x05 => "Fire Trouble",
            0x06 => "Fire Supervisory",
            0x07 => "Burglary Alarm",
            0x08 => "Personal Emergency",
            0x09 => "Gas Alarm",
            0x0A => "Fire Alarm",
            _ => "Unknown",
        }
    }
}

/// Panel family/model, resolved from the one-byte family code in the
/// WHAT_ARE_YOU reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelModel(pub u8);

impl PanelModel {
    pub fn name(self) -> &'static str {
        match self.0 {
            0x20 => "Solution 2000",
            0x21 => "Solution 3000",
            0x28 => "Solution 4000",
            0x22 => "AMAX 2100",
            0x23 => "AMAX 3000",
            0x24 => "AMAX 4000",
            0x79 => "D7412GV4",
            0x84 => "D9412GV4",
            0xA0 => "B4512 (US1B)",
            0xA4 => "B5512 (US1B)",
            0xA6 => "B8512G (US1A)",
            0xA7 => "B9512G (US1A)",
            0xA8 => "B3512 (US1B)",
            0xA9 => "B6512 (US1B)",
            _ => "Unknown",
        }
    }
}

/// Translate a NACK error byte to its published error text (§6).
pub fn error_text(code: u8) -> &'static str {
    match code {
        0x00 => "Non-specific error",
        0x01 => "Checksum failure (UDP connections only)",
        0x02 => "Invalid size / length",
        0x03 => "Invalid command",
        0x04 => "Invalid interface state",
        0x05 => "Data out of range",
        0x06 => "No authority",
        0x07 => "Unsupported command",
        0x08 => "Cannot arm panel",
        0x09 => "Invalid Remote ID",
        0x0A => "Invalid License",
        0x0B => "Invalid Magic Number",
        0x0C => "Expired License",
        0x0D => "Expired Magic Number",
        0x0E => "Unsupported Format Version",
        0x11 => "Firmware Update in Progress",
        0x12 => "Incompatible Firmware Version",
        0x13 => "All Points Not Configured",
        0x20 => "Execution Function No Errors",
        0x21 => "Execution Function Invalid Area",
        0x22 => "Execution Function Invalid Command",
        0x23 => "Execution Function Not Authenticated",
        0x24 => "Execution Function Invalid User",
        0x40 => "Execution Function Parameter Incorrect",
        0x41 => "Execution Function Sequence Wrong",
        0x42 => "Execution Function Invalid Configuration Request",
        0x43 => "Execution Function Invalid Size",
        0x44 => "Execution Function Time Out",
        0xDF => "RF Request Failed",
        0xE0 => "No RF device with that RFID",
        0xE1 => "Bad RFID. Not proper format",
        0xE2 => "Too many RF devices for this panel",
        0xE3 => "Duplicate RFID",
        0xE4 => "Duplicate access card",
        0xE5 => "Bad access card data",
        0xE6 => "Bad language choice",
        0xE7 => "Bad supervision mode selection",
        0xE8 => "Bad enable/disable choice",
        0xE9 => "Bad Month",
        0xEA => "Bad Day",
        0xEB => "Bad Hour",
        0xEC => "Bad Minute",
        0xED => "Bad Time edit choice",
        0xEF => "Bad Remote Enable",
        _ => "Unknown error",
    }
}

/// Panel fault bitmask flags and their text (§3, §6).
pub const PANEL_FAULTS: &[(u16, &str)] = &[
    (1 << 1, "Phone line failure"),
    (1 << 2, "Parameter CRC fail in PIF"),
    (1 << 3, "Battery low"),
    (1 << 4, "Battery missing"),
    (1 << 5, "AC fail"),
    (1 << 7, "Communication fail since RPS hang up"),
    (1 << 8, "SDI fail since RPS hang up"),
    (1 << 9, "User code tamper since RPS hang up"),
    (1 << 10, "Fail to call RPS since RPS hang up"),
    (1 << 13, "Point bus fail since RPS hang up"),
    (1 << 14, "Log overflow"),
    (1 << 15, "Log threshold"),
];

/// Iterate the fault names set in `bitmap`.
pub fn active_faults(bitmap: u16) -> impl Iterator<Item = &'static str> {
    PANEL_FAULTS.iter().filter(move |(bit, _)| bitmap & bit != 0).map(|(_, text)| *text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_codes_match_published_spec() {
        assert_eq!(ArmingAction::Disarm.code(), 0x01);
        assert_eq!(ArmingAction::MasterDelay.code(), 0x03);
        assert_eq!(ArmingAction::PerimeterDelay.code(), 0x05);
        assert_eq!(ArmingAction::Stay1.code(), 0x0A);
        assert_eq!(ArmingAction::Stay2.code(), 0x0B);
        assert_eq!(ArmingAction::Away.code(), 0x0C);
    }

    #[test]
    fn per_command_maxima_are_as_published() {
        assert_eq!(cmd_request_max(cmd::AREA_STATUS), Some(50));
        assert_eq!(cmd_request_max(cmd::DOOR_STATUS), Some(32));
        assert_eq!(cmd_request_max(cmd::OUTPUT_STATUS), Some(600));
        assert_eq!(cmd_request_max(cmd::POINT_STATUS), Some(66));
        assert_eq!(cmd_request_max(cmd::AREA_ARM), None);
    }

    #[test]
    fn alarm_priority_text_and_is_alarm() {
        assert!(AlarmPriority::FIRE_ALARM.is_alarm());
        assert!(!AlarmPriority::FIRE_TROUBLE.is_alarm());
        assert_eq!(AlarmPriority::BURGLARY_ALARM.text(), "Burglary Alarm");
    }
}
