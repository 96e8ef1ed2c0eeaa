//! Panel identity and fault-bitmap summary (§3 "PanelInfo").

use crate::commands::{active_faults, PanelModel};

/// Static-ish identity facts resolved once at connect time.
#[derive(Debug, Clone, Default)]
pub struct PanelInfo {
    pub model: Option<PanelModel>,
    pub protocol_version: Option<String>,
    pub firmware_version: Option<String>,
    pub serial_number: Option<u64>,
    pub faults_bitmap: u16,
}

impl PanelInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_fault_descriptions(&self) -> Vec<&'static str> {
        active_faults(self.faults_bitmap).collect()
    }
}
