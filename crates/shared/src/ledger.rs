//! Plan numbering across generate/regenerate cycles.
//!
//! Units start unassigned. A successful generation tags the units its request
//! was built from with the current plan id and a per-side number (friendlies
//! and enemies are numbered independently, in request order), then advances
//! the counter. Units placed while the request was in flight stay unassigned.
//! Regeneration strips the tags but keeps the units.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PlanError, SessionError};
use crate::geo::{self, Geofence};
use crate::history::{BoundedHistory, ReportEntry, HISTORY_CAP};
use crate::models::{
    GenerationOutcome, LatLon, OverlayImage, PlanId, PlanTag, ReportPayload, Route, Side, Unit,
    UnitId,
};

/// What happens to earlier plans' overlays when a new plan is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPolicy {
    /// Keep every plan's overlay, each independently toggleable.
    #[default]
    Accumulate,
    /// Keep only the latest plan's overlay.
    Replace,
}

impl std::str::FromStr for OverlayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accumulate" => Ok(OverlayPolicy::Accumulate),
            "replace" => Ok(OverlayPolicy::Replace),
            other => Err(format!("unknown overlay policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOverlay {
    pub image: OverlayImage,
    pub visible: bool,
}

/// Summary of one successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAssignment {
    pub plan_id: PlanId,
    pub friendlies: Vec<UnitId>,
    pub enemies: Vec<UnitId>,
    pub report_entry: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLedger {
    units: Vec<Unit>,
    next_plan_id: PlanId,
    overlay_policy: OverlayPolicy,
    overlays: BTreeMap<PlanId, PlanOverlay>,
    routes: Vec<Route>,
    report: Option<ReportPayload>,
    reports: BoundedHistory<ReportEntry>,
}

impl Default for PlanLedger {
    fn default() -> Self {
        Self::new(OverlayPolicy::default())
    }
}

impl PlanLedger {
    pub fn new(overlay_policy: OverlayPolicy) -> Self {
        PlanLedger {
            units: Vec::new(),
            next_plan_id: 1,
            overlay_policy,
            overlays: BTreeMap::new(),
            routes: Vec::new(),
            report: None,
            reports: BoundedHistory::new(HISTORY_CAP),
        }
    }

    // --- units ---

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn add_unit(&mut self, side: Side, at: LatLon) -> UnitId {
        let unit = Unit::new(side, at);
        let id = unit.id;
        self.units.push(unit);
        id
    }

    /// Drag-end. Plan tags are kept.
    pub fn move_unit(&mut self, id: UnitId, to: LatLon) -> Result<(), SessionError> {
        let unit = self
            .units
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(SessionError::UnknownUnit(id))?;
        unit.position = to;
        Ok(())
    }

    pub fn remove_unit(&mut self, id: UnitId) -> Result<Unit, SessionError> {
        let idx = self
            .units
            .iter()
            .position(|u| u.id == id)
            .ok_or(SessionError::UnknownUnit(id))?;
        Ok(self.units.remove(idx))
    }

    pub fn unassigned(&self, side: Side) -> impl Iterator<Item = &Unit> {
        self.units
            .iter()
            .filter(move |u| u.side == side && !u.is_assigned())
    }

    // --- plans ---

    /// The id the next successful generation will receive.
    pub fn next_plan_id(&self) -> PlanId {
        self.next_plan_id
    }

    pub fn overlay_policy(&self) -> OverlayPolicy {
        self.overlay_policy
    }

    pub fn set_overlay_policy(&mut self, policy: OverlayPolicy) {
        self.overlay_policy = policy;
    }

    /// Check that both sides have unassigned units. No mutation.
    pub fn validate_generation(&self) -> Result<(), PlanError> {
        for side in [Side::Friendly, Side::Enemy] {
            if self.unassigned(side).next().is_none() {
                return Err(if self.units.iter().any(|u| u.side == side) {
                    PlanError::AlreadyPlanned { side }
                } else {
                    PlanError::MissingUnits { side }
                });
            }
        }
        Ok(())
    }

    /// Reject unassigned units placed outside `fence`.
    pub fn validate_region(&self, fence: &Geofence) -> Result<(), PlanError> {
        for side in [Side::Friendly, Side::Enemy] {
            for (i, unit) in self.unassigned(side).enumerate() {
                if !fence.contains(unit.position) {
                    return Err(PlanError::OutsideRegion {
                        side,
                        number: i + 1,
                        area: fence.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Ids of the units the next request should carry, friendlies first.
    pub fn pending_batch(&self) -> Vec<UnitId> {
        self.unassigned(Side::Friendly)
            .chain(self.unassigned(Side::Enemy))
            .map(|u| u.id)
            .collect()
    }

    /// Units of `side` in `batch` that can still be tagged, in batch order.
    fn taggable<'a>(
        &'a self,
        batch: &'a [UnitId],
        side: Side,
    ) -> impl Iterator<Item = UnitId> + 'a {
        batch.iter().copied().filter(move |id| {
            self.unit(*id)
                .is_some_and(|u| u.side == side && !u.is_assigned())
        })
    }

    /// Tag the units in `batch` with a new plan and merge the generated
    /// result. Ids that were removed or planned in the meantime are skipped;
    /// each side needs at least one id left. On error nothing changes.
    pub fn generate_plan(
        &mut self,
        batch: &[UnitId],
        outcome: GenerationOutcome,
    ) -> Result<PlanAssignment, PlanError> {
        for side in [Side::Friendly, Side::Enemy] {
            if self.taggable(batch, side).next().is_none() {
                return Err(match self.validate_generation() {
                    Err(e) => e,
                    Ok(()) => PlanError::StaleBatch { side },
                });
            }
        }
        let mut seen = HashSet::new();
        if let Some(dup) = outcome.routes.iter().find(|r| !seen.insert(r.route_id)) {
            return Err(PlanError::DuplicateRoute {
                route_id: dup.route_id,
            });
        }

        let plan_id = self.next_plan_id;
        let mut friendlies = Vec::new();
        let mut enemies = Vec::new();
        for id in batch {
            let Some(unit) = self
                .units
                .iter_mut()
                .find(|u| u.id == *id && !u.is_assigned())
            else {
                continue;
            };
            let tagged = match unit.side {
                Side::Friendly => &mut friendlies,
                Side::Enemy => &mut enemies,
            };
            tagged.push(unit.id);
            unit.plan = Some(PlanTag {
                plan_id,
                number: tagged.len() as u32,
            });
        }
        self.next_plan_id += 1;

        self.routes = outcome.routes;
        if let Some(image) = outcome.overlay {
            if self.overlay_policy == OverlayPolicy::Replace {
                self.overlays.clear();
            }
            self.overlays.insert(
                plan_id,
                PlanOverlay {
                    image,
                    visible: true,
                },
            );
        }

        let mut report_entry = None;
        if let Some(report) = outcome.report {
            let center = geo::center_of_mass(self.units.iter().map(|u| u.position))
                .unwrap_or_default();
            let entry = ReportEntry {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                plan_id,
                center,
                report: report.clone(),
            };
            report_entry = Some(entry.id);
            self.reports.push(entry);
            self.report = Some(report);
        }

        Ok(PlanAssignment {
            plan_id,
            friendlies,
            enemies,
            report_entry,
        })
    }

    /// Strip every plan tag and drop the current result, keeping the units.
    pub fn reset_for_regeneration(&mut self) {
        for unit in &mut self.units {
            unit.plan = None;
        }
        self.clear_routes();
    }

    /// Drop routes, overlays and the live report. Units and tags stay.
    pub fn clear_routes(&mut self) {
        self.routes.clear();
        self.overlays.clear();
        self.report = None;
        self.reports.clear_selection();
    }

    /// Remove all units as well as the current result.
    pub fn clear_all(&mut self) {
        self.units.clear();
        self.clear_routes();
    }

    // --- results ---

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn overlays(&self) -> &BTreeMap<PlanId, PlanOverlay> {
        &self.overlays
    }

    /// Flip visibility of one plan's overlay, returning the new state.
    pub fn toggle_overlay(&mut self, plan_id: PlanId) -> Result<bool, SessionError> {
        let overlay = self
            .overlays
            .get_mut(&plan_id)
            .ok_or(SessionError::UnknownPlan(plan_id))?;
        overlay.visible = !overlay.visible;
        Ok(overlay.visible)
    }

    pub fn live_report(&self) -> Option<&ReportPayload> {
        self.report.as_ref()
    }

    pub fn reports(&self) -> &BoundedHistory<ReportEntry> {
        &self.reports
    }

    /// `Some(id)` shows a past report, `None` returns to the live one.
    pub fn select_report(&mut self, id: Option<Uuid>) -> Result<(), SessionError> {
        match id {
            Some(id) => {
                if !self.reports.select(id) {
                    return Err(SessionError::UnknownHistoryEntry(id));
                }
            }
            None => self.reports.clear_selection(),
        }
        Ok(())
    }

    /// The report the UI should show: the selected past entry, else live.
    pub fn displayed_report(&self) -> Option<&ReportPayload> {
        match self.reports.selected() {
            Some(entry) => Some(&entry.report),
            None => self.live_report(),
        }
    }
}
