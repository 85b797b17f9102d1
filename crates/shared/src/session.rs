//! The mission session: one object owning everything the planner edits.
//!
//! Every mutation goes through a named method. Requests for the external
//! route service are built here (validated first, nothing mutated) and their
//! results are committed back only once a complete response is in hand.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cover::{self, SegmentCover};
use crate::error::{PlanError, SessionError};
use crate::geo;
use crate::history::{BoundedHistory, SimulationEntry, HISTORY_CAP};
use crate::ledger::{OverlayPolicy, PlanAssignment, PlanLedger};
use crate::mode::{ClickGate, ClickOutcome, InteractionMode, MapAction, ModeMachine};
use crate::models::{
    AnalysisDepth, AnalysisOutcome, AnalysisRequest, AnalysisSubject, FriendlyKind, GeoBounds,
    GenerationOutcome, LatLon, Observer, ObserverKind, PlanId, RouteRequest, Side, SimEnemy,
    SimFriendly, TacticalUnit, UnitComposition, UnitId, normalize_bearing,
};

/// Minimum drawn waypoints for an evaluation or simulation.
pub const MIN_ROUTE_WAYPOINTS: usize = 2;

/// Kind and facing given to newly placed simulation entities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimTemplate {
    pub enemy_kind: ObserverKind,
    pub facing_deg: f64,
    pub friendly_kind: FriendlyKind,
}

impl Default for SimTemplate {
    fn default() -> Self {
        SimTemplate {
            enemy_kind: ObserverKind::Rifleman,
            facing_deg: 0.0,
            friendly_kind: FriendlyKind::Rifleman,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Evaluation,
    Simulation,
}

/// The result of the latest evaluation or simulation, with the waypoints it
/// was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAnalysis {
    pub kind: AnalysisKind,
    pub waypoints: Vec<LatLon>,
    pub outcome: AnalysisOutcome,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    pub gate: ClickGate,
    pub overlay_policy: OverlayPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSession {
    ledger: PlanLedger,
    machine: ModeMachine,
    start: Option<LatLon>,
    end: Option<LatLon>,
    via_points: Vec<LatLon>,
    drawn_route: Vec<LatLon>,
    no_go_zones: Vec<Vec<LatLon>>,
    sim_enemies: Vec<SimEnemy>,
    sim_friendlies: Vec<SimFriendly>,
    sim_template: SimTemplate,
    analysis: Option<RouteAnalysis>,
    simulations: BoundedHistory<SimulationEntry>,
}

impl Default for MissionSession {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

impl MissionSession {
    pub fn new(settings: SessionSettings) -> Self {
        MissionSession {
            ledger: PlanLedger::new(settings.overlay_policy),
            machine: ModeMachine::new(settings.gate),
            start: None,
            end: None,
            via_points: Vec::new(),
            drawn_route: Vec::new(),
            no_go_zones: Vec::new(),
            sim_enemies: Vec::new(),
            sim_friendlies: Vec::new(),
            sim_template: SimTemplate::default(),
            analysis: None,
            simulations: BoundedHistory::new(HISTORY_CAP),
        }
    }

    // --- read access ---

    pub fn ledger(&self) -> &PlanLedger {
        &self.ledger
    }

    pub fn mode(&self) -> InteractionMode {
        self.machine.mode()
    }

    pub fn gate(&self) -> &ClickGate {
        self.machine.gate()
    }

    pub fn pending_polygon(&self) -> &[LatLon] {
        self.machine.pending_polygon()
    }

    pub fn start(&self) -> Option<LatLon> {
        self.start
    }

    pub fn end(&self) -> Option<LatLon> {
        self.end
    }

    pub fn via_points(&self) -> &[LatLon] {
        &self.via_points
    }

    pub fn drawn_route(&self) -> &[LatLon] {
        &self.drawn_route
    }

    pub fn no_go_zones(&self) -> &[Vec<LatLon>] {
        &self.no_go_zones
    }

    pub fn sim_enemies(&self) -> &[SimEnemy] {
        &self.sim_enemies
    }

    pub fn sim_friendlies(&self) -> &[SimFriendly] {
        &self.sim_friendlies
    }

    pub fn sim_template(&self) -> SimTemplate {
        self.sim_template
    }

    pub fn analysis(&self) -> Option<&RouteAnalysis> {
        self.analysis.as_ref()
    }

    pub fn simulations(&self) -> &BoundedHistory<SimulationEntry> {
        &self.simulations
    }

    /// Vision cones of every placed simulation enemy.
    pub fn observers(&self) -> Vec<Observer> {
        self.sim_enemies.iter().map(SimEnemy::observer).collect()
    }

    // --- interaction ---

    /// Tool selection. Leaving or entering `draw-route` drops the open route.
    pub fn select_mode(&mut self, mode: InteractionMode) -> InteractionMode {
        let previous = self.machine.select(mode);
        if previous == InteractionMode::DrawRoute || mode == InteractionMode::DrawRoute {
            self.drawn_route.clear();
        }
        previous
    }

    pub fn handle_click(&mut self, at: LatLon, zoom: u8) -> ClickOutcome {
        let outcome = self.machine.click(at, zoom);
        if let ClickOutcome::Accepted(action) = &outcome {
            self.apply_action(action);
        }
        outcome
    }

    pub fn double_click(&mut self) -> ClickOutcome {
        let outcome = self.machine.double_click();
        if let ClickOutcome::Accepted(action) = &outcome {
            self.apply_action(action);
        }
        outcome
    }

    /// Close the open drawn route and return to idle.
    pub fn finish_route(&mut self) -> bool {
        self.machine.finish_route()
    }

    fn apply_action(&mut self, action: &MapAction) {
        match action {
            MapAction::SetStart { at } => self.start = Some(*at),
            MapAction::SetEnd { at } => self.end = Some(*at),
            MapAction::AddViaPoint { at } => self.via_points.push(*at),
            MapAction::PlaceUnit { side, at } => {
                self.ledger.add_unit(*side, *at);
            }
            MapAction::PlaceSimEnemy { at } => self.sim_enemies.push(SimEnemy::new(
                *at,
                self.sim_template.enemy_kind,
                self.sim_template.facing_deg,
            )),
            MapAction::PlaceSimFriendly { at } => self
                .sim_friendlies
                .push(SimFriendly::new(*at, self.sim_template.friendly_kind)),
            MapAction::AppendRoutePoint { at } => self.drawn_route.push(*at),
            MapAction::AppendNoGoVertex { .. } => {}
            MapAction::FinalizeNoGo { polygon } => self.no_go_zones.push(polygon.clone()),
        }
    }

    // --- entity handles ---

    pub fn move_unit(&mut self, id: UnitId, to: LatLon) -> Result<(), SessionError> {
        self.ledger.move_unit(id, to)
    }

    pub fn remove_unit(&mut self, id: UnitId) -> Result<(), SessionError> {
        self.ledger.remove_unit(id).map(|_| ())
    }

    pub fn move_waypoint(&mut self, index: usize, to: LatLon) -> Result<(), SessionError> {
        let point = self
            .drawn_route
            .get_mut(index)
            .ok_or(SessionError::UnknownWaypoint(index))?;
        *point = to;
        Ok(())
    }

    pub fn remove_waypoint(&mut self, index: usize) -> Result<(), SessionError> {
        if index >= self.drawn_route.len() {
            return Err(SessionError::UnknownWaypoint(index));
        }
        self.drawn_route.remove(index);
        Ok(())
    }

    pub fn remove_via_point(&mut self, index: usize) -> Result<(), SessionError> {
        if index >= self.via_points.len() {
            return Err(SessionError::UnknownWaypoint(index));
        }
        self.via_points.remove(index);
        Ok(())
    }

    pub fn remove_no_go_zone(&mut self, index: usize) -> Result<(), SessionError> {
        if index >= self.no_go_zones.len() {
            return Err(SessionError::UnknownNoGoZone(index));
        }
        self.no_go_zones.remove(index);
        Ok(())
    }

    fn sim_enemy_mut(&mut self, id: UnitId) -> Result<&mut SimEnemy, SessionError> {
        self.sim_enemies
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(SessionError::UnknownSimEnemy(id))
    }

    fn sim_friendly_mut(&mut self, id: UnitId) -> Result<&mut SimFriendly, SessionError> {
        self.sim_friendlies
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(SessionError::UnknownSimFriendly(id))
    }

    pub fn move_sim_enemy(&mut self, id: UnitId, to: LatLon) -> Result<(), SessionError> {
        self.sim_enemy_mut(id)?.position = to;
        Ok(())
    }

    pub fn rotate_sim_enemy(&mut self, id: UnitId, facing_deg: f64) -> Result<(), SessionError> {
        self.sim_enemy_mut(id)?.facing_deg = normalize_bearing(facing_deg);
        Ok(())
    }

    pub fn retype_sim_enemy(&mut self, id: UnitId, kind: ObserverKind) -> Result<(), SessionError> {
        self.sim_enemy_mut(id)?.kind = kind;
        Ok(())
    }

    pub fn remove_sim_enemy(&mut self, id: UnitId) -> Result<(), SessionError> {
        let before = self.sim_enemies.len();
        self.sim_enemies.retain(|e| e.id != id);
        if self.sim_enemies.len() == before {
            return Err(SessionError::UnknownSimEnemy(id));
        }
        Ok(())
    }

    pub fn move_sim_friendly(&mut self, id: UnitId, to: LatLon) -> Result<(), SessionError> {
        self.sim_friendly_mut(id)?.position = to;
        Ok(())
    }

    pub fn retype_sim_friendly(
        &mut self,
        id: UnitId,
        kind: FriendlyKind,
    ) -> Result<(), SessionError> {
        self.sim_friendly_mut(id)?.kind = kind;
        Ok(())
    }

    pub fn remove_sim_friendly(&mut self, id: UnitId) -> Result<(), SessionError> {
        let before = self.sim_friendlies.len();
        self.sim_friendlies.retain(|f| f.id != id);
        if self.sim_friendlies.len() == before {
            return Err(SessionError::UnknownSimFriendly(id));
        }
        Ok(())
    }

    pub fn set_sim_template(&mut self, template: SimTemplate) {
        self.sim_template = SimTemplate {
            facing_deg: normalize_bearing(template.facing_deg),
            ..template
        };
    }

    // --- route generation ---

    /// Build the route-generation request from the unassigned units.
    pub fn generation_request(
        &self,
        request_id: impl Into<String>,
        bounds: GeoBounds,
        zoom: u8,
        analysis_depth: AnalysisDepth,
    ) -> Result<RouteRequest, PlanError> {
        self.ledger.validate_generation()?;
        self.ledger.validate_region(&self.gate().geofence)?;
        let units = |side| -> Vec<TacticalUnit> {
            self.ledger.unassigned(side).map(TacticalUnit::from).collect()
        };
        Ok(RouteRequest {
            request_id: request_id.into(),
            soldiers: units(Side::Friendly),
            enemies: units(Side::Enemy),
            bounds,
            zoom,
            no_go_zones: self
                .no_go_zones
                .iter()
                .map(|zone| zone.iter().map(|p| (p.lat, p.lon)).collect())
                .collect(),
            analysis_depth,
        })
    }

    /// Commit a successful generation response for `request`. Only the
    /// units the request carried are tagged.
    pub fn generate_plan(
        &mut self,
        request: &RouteRequest,
        outcome: GenerationOutcome,
    ) -> Result<PlanAssignment, PlanError> {
        self.ledger.generate_plan(&request.unit_ids(), outcome)
    }

    pub fn reset_for_regeneration(&mut self) {
        self.ledger.reset_for_regeneration();
    }

    pub fn clear_routes(&mut self) {
        self.ledger.clear_routes();
    }

    pub fn toggle_overlay(&mut self, plan_id: PlanId) -> Result<bool, SessionError> {
        self.ledger.toggle_overlay(plan_id)
    }

    pub fn select_report(&mut self, id: Option<Uuid>) -> Result<(), SessionError> {
        self.ledger.select_report(id)
    }

    // --- evaluation and simulation ---

    fn require_route(&self) -> Result<Vec<LatLon>, PlanError> {
        if self.drawn_route.len() < MIN_ROUTE_WAYPOINTS {
            return Err(PlanError::TooFewWaypoints {
                found: self.drawn_route.len(),
            });
        }
        Ok(self.drawn_route.clone())
    }

    /// Evaluation of the drawn route against a unit composition. Without an
    /// explicit composition the placed units are counted per side.
    pub fn evaluation_request(
        &self,
        request_id: impl Into<String>,
        bounds: GeoBounds,
        composition: Option<UnitComposition>,
    ) -> Result<AnalysisRequest, PlanError> {
        let waypoints = self.require_route()?;
        let composition = composition.unwrap_or_else(|| {
            let count =
                |side: Side| self.ledger.units().iter().filter(|u| u.side == side).count() as u32;
            UnitComposition {
                friendlies: count(Side::Friendly),
                enemies: count(Side::Enemy),
            }
        });
        Ok(AnalysisRequest {
            request_id: request_id.into(),
            waypoints,
            subject: AnalysisSubject::Composition(composition),
            bounds,
        })
    }

    /// Simulation of the drawn route against the placed observers.
    pub fn simulation_request(
        &self,
        request_id: impl Into<String>,
        bounds: GeoBounds,
    ) -> Result<AnalysisRequest, PlanError> {
        let waypoints = self.require_route()?;
        if self.sim_enemies.is_empty() {
            return Err(PlanError::NoObservers);
        }
        Ok(AnalysisRequest {
            request_id: request_id.into(),
            waypoints,
            subject: AnalysisSubject::Entities {
                observers: self.sim_enemies.clone(),
                friendlies: self.sim_friendlies.clone(),
            },
            bounds,
        })
    }

    /// Store a completed analysis for `waypoints`. Simulations also enter
    /// the simulation history; the new entry id is returned.
    pub fn apply_analysis(
        &mut self,
        kind: AnalysisKind,
        waypoints: Vec<LatLon>,
        outcome: AnalysisOutcome,
    ) -> Option<Uuid> {
        let mut entry_id = None;
        if kind == AnalysisKind::Simulation {
            let entry = SimulationEntry {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                center: geo::center_of_mass(waypoints.iter().copied()).unwrap_or_default(),
                waypoints: waypoints.clone(),
                outcome: outcome.clone(),
            };
            entry_id = Some(entry.id);
            self.simulations.push(entry);
            self.simulations.clear_selection();
        }
        self.analysis = Some(RouteAnalysis {
            kind,
            waypoints,
            outcome,
        });
        entry_id
    }

    pub fn select_simulation(&mut self, id: Option<Uuid>) -> Result<(), SessionError> {
        match id {
            Some(id) => {
                if !self.simulations.select(id) {
                    return Err(SessionError::UnknownHistoryEntry(id));
                }
            }
            None => self.simulations.clear_selection(),
        }
        Ok(())
    }

    /// The selected past simulation, else the live analysis.
    pub fn displayed_analysis(&self) -> Option<&AnalysisOutcome> {
        match self.simulations.selected() {
            Some(entry) => Some(&entry.outcome),
            None => self.analysis.as_ref().map(|a| &a.outcome),
        }
    }

    /// Cover classification of the drawn route. Supplied analysis only
    /// applies while the route still matches the one it was computed for.
    pub fn segment_covers(&self) -> Vec<SegmentCover> {
        let supplied = self
            .analysis
            .as_ref()
            .filter(|a| a.waypoints == self.drawn_route)
            .map(|a| &a.outcome.segment_analysis);
        cover::resolve_route(&self.drawn_route, supplied, &self.observers())
    }

    // --- reset ---

    /// Remove every placed and drawn entity and return to idle. Histories
    /// and the plan counter survive.
    pub fn clear_all(&mut self) {
        self.ledger.clear_all();
        self.machine.reset();
        self.start = None;
        self.end = None;
        self.via_points.clear();
        self.drawn_route.clear();
        self.no_go_zones.clear();
        self.sim_enemies.clear();
        self.sim_friendlies.clear();
        self.analysis = None;
        self.simulations.clear_selection();
    }
}
