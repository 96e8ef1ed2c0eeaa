//! Event-code → message-template lookup tables.
//!
//! The long-form, per-panel-family human-readable event catalogs are
//! external data (§1 "Explicitly out of scope"): this module only owns the
//! *mechanism* (`{placeholder}` substitution, AMAX's fallback-key chain) and
//! ships a small built-in table per dialect as a working default. Callers
//! with the full published catalog can build their own `FormatTable` and
//! hand it to the loader instead.

use std::collections::HashMap;

/// A key → template map, where templates may reference `{area}`, `{param1}`,
/// `{param2}`, `{param3}`, and `{user}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct FormatTable {
    entries: HashMap<String, String>,
}

impl FormatTable {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn with(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.entries.insert(key.into(), template.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// Substitute the recognised placeholders in `template` with the given
/// field values. Unknown placeholders are left as-is.
pub fn render(template: &str, area: u16, param1: u16, param2: u16, param3: u16, user: &str) -> String {
    template
        .replace("{area}", &area.to_string())
        .replace("{param1}", &param1.to_string())
        .replace("{param2}", &param2.to_string())
        .replace("{param3}", &param3.to_string())
        .replace("{user}", user)
}

/// Map a Solution "second param" field to a user label, per the fixed
/// special-case table plus the 1..32 generic range (§4.9).
pub fn solution_user(second_param: u16) -> String {
    match second_param {
        0 => "Quick".to_string(),
        994 => "PowerUp".to_string(),
        995 => "Telephone".to_string(),
        997 => "Schedule".to_string(),
        998 => "A-Link".to_string(),
        999 => "Installer".to_string(),
        n if n >= 1 && n <= 32 => format!("User {n}"),
        _ => String::new(),
    }
}

pub fn default_solution_table() -> FormatTable {
    FormatTable::new()
        .with("1", "Alarm, Area: {param1}, by: {user}")
        .with("3", "Bypass, Area: {param1}, by: {user}")
        .with("18", "Arm, Area: {param1}, by: {user}")
        .with("19", "Disarm, Area: {param1}, by: {user}")
}

pub fn default_amax_table() -> FormatTable {
    FormatTable::new()
        .with("1", "Alarm, Point: {param1}")
        .with("1_zone", "Zone Alarm, Zone: {param1}")
        .with("1_keypad", "Keypad Alarm, Keypad: {param1}")
        .with("18", "Arm, Area: {param1}")
        .with("19", "Disarm, Area: {param1}")
}

pub fn default_bg_table() -> FormatTable {
    FormatTable::new()
        .with("19", "Alarm, Area: {area}, Point: {param1}")
        .with("18", "Arm, Area: {area}")
        .with("1", "Disarm, Area: {area}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_placeholders() {
        let rendered = render("Alarm, Area: {area}, Point: {param1}", 1, 5, 0, 0, "");
        assert_eq!(rendered, "Alarm, Area: 1, Point: 5");
    }

    #[test]
    fn solution_user_covers_specials_and_generic_range() {
        assert_eq!(solution_user(0), "Quick");
        assert_eq!(solution_user(999), "Installer");
        assert_eq!(solution_user(5), "User 5");
        assert_eq!(solution_user(500), "");
    }
}
