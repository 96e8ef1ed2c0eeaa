//! In-memory panel model: entities, collections, and lifecycle (§3).

pub mod area;
pub mod door;
pub mod output;
pub mod panel_info;
pub mod point;

pub use area::{Area, AreaStatus, ReadyStatus};
pub use door::{Door, DoorStatus};
pub use output::{Output, OutputStatus};
pub use panel_info::PanelInfo;
pub use point::{Point, PointStatus};

use std::collections::BTreeMap;

/// `id → entity` mapping. Insertion happens once per connect cycle during
/// load; entries are never removed while connected (§3 "Collections").
pub type EntityMap<T> = BTreeMap<u16, T>;

/// The panel's live, observable state. Owned exclusively by the session
/// task; entities are shared by reference with external readers (§3
/// "Ownership/lifecycle").
#[derive(Default)]
pub struct PanelModel {
    pub areas: EntityMap<Area>,
    pub points: EntityMap<Point>,
    pub outputs: EntityMap<Output>,
    pub doors: EntityMap<Door>,
    pub info: PanelInfo,
}

impl PanelModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// On disconnect every entity's status resets to `Unknown`/equivalent,
    /// but the id→entity mapping is kept so a reconnect can selectively
    /// reload status only (§3 "Ownership/lifecycle").
    pub fn reset_all_statuses(&mut self) {
        for area in self.areas.values_mut() {
            area.reset();
        }
        for point in self.points.values_mut() {
            point.reset();
        }
        for output in self.outputs.values_mut() {
            output.reset();
        }
        for door in self.doors.values_mut() {
            door.reset();
        }
    }

    pub fn all_areas_disarmed(&self) -> bool {
        self.areas.values().all(|a| a.status().disarmed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_statuses_keeps_entities_but_clears_state() {
        let mut model = PanelModel::new();
        model.areas.insert(1, Area::new(1, "Area1".into()));
        model.areas.get_mut(&1).unwrap().set_status(AreaStatus::AwayOn);

        model.reset_all_statuses();

        assert!(model.areas.contains_key(&1));
        assert_eq!(model.areas[&1].status(), AreaStatus::Unknown);
    }

    #[test]
    fn all_areas_disarmed_is_true_for_empty_model() {
        let model = PanelModel::new();
        assert!(model.all_areas_disarmed());
    }
}
