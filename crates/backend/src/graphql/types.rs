use async_graphql::{Enum, InputObject, SimpleObject, ID};
use georoute_shared::cover::{self, ResolvedCover, SegmentCover};
use georoute_shared::geo;
use georoute_shared::history::{ReportEntry, SimulationEntry};
use georoute_shared::ledger::PlanOverlay;
use georoute_shared::models::{
    self, AnalysisOutcome, GeoBounds, LatLon, OverlayImage, PlanId, ReportPayload, Route,
    SimEnemy, SimFriendly, Unit,
};
use georoute_shared::progress::ProgressEvent;
use georoute_shared::session::{AnalysisKind, MissionSession};
use uuid::Uuid;

use crate::storage::BacklogEntry;

// Enums mirrored from the shared crate

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::models::Side")]
pub enum GqlSide {
    Friendly,
    Enemy,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::mode::InteractionMode")]
pub enum GqlMode {
    Idle,
    SetStart,
    SetEnd,
    AddWaypoint,
    DrawNoGo,
    PlaceSoldier,
    PlaceEnemy,
    DrawRoute,
    PlaceSimEnemy,
    PlaceSimFriendly,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::models::ObserverKind")]
pub enum GqlObserverKind {
    Sniper,
    Rifleman,
    Observer,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::models::FriendlyKind")]
pub enum GqlFriendlyKind {
    Rifleman,
    Sniper,
    Support,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::models::AnalysisDepth")]
pub enum GqlAnalysisDepth {
    Full,
    Quick,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::models::CoverStatus")]
pub enum GqlCoverStatus {
    Exposed,
    Partial,
    Covered,
    Clear,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::cover::CoverSource")]
pub enum GqlCoverSource {
    Supplied,
    Geometric,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::models::RiskLevel")]
pub enum GqlRiskLevel {
    Safe,
    Moderate,
    High,
    Critical,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::models::RouteVerdict")]
pub enum GqlRouteVerdict {
    Success,
    Risk,
    Failed,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::session::AnalysisKind")]
pub enum GqlAnalysisKind {
    Evaluation,
    Simulation,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "georoute_shared::progress::ProgressStage")]
pub enum GqlProgressStage {
    Terrain,
    Imagery,
    Routes,
    Risk,
    Scoring,
    Classification,
    Complete,
    Error,
}

// GraphQL output types

#[derive(SimpleObject, Clone, Copy)]
pub struct GqlLatLon {
    pub lat: f64,
    pub lon: f64,
}

impl From<LatLon> for GqlLatLon {
    fn from(p: LatLon) -> Self {
        GqlLatLon {
            lat: p.lat,
            lon: p.lon,
        }
    }
}

fn points(list: &[LatLon]) -> Vec<GqlLatLon> {
    list.iter().copied().map(GqlLatLon::from).collect()
}

#[derive(SimpleObject, Clone, Copy)]
pub struct GqlBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl From<GeoBounds> for GqlBounds {
    fn from(b: GeoBounds) -> Self {
        GqlBounds {
            north: b.north,
            south: b.south,
            east: b.east,
            west: b.west,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlRegion {
    pub name: String,
    pub bounds: GqlBounds,
    pub min_zoom: Option<u8>,
}

#[derive(SimpleObject)]
pub struct GqlObserverType {
    pub kind: GqlObserverKind,
    pub label: String,
    pub range_m: f64,
    pub fov_deg: f64,
}

#[derive(SimpleObject)]
pub struct GqlUnit {
    pub id: ID,
    pub position: GqlLatLon,
    pub side: GqlSide,
    pub plan_id: Option<PlanId>,
    pub plan_number: Option<u32>,
}

impl From<&Unit> for GqlUnit {
    fn from(u: &Unit) -> Self {
        GqlUnit {
            id: ID(u.id.to_string()),
            position: u.position.into(),
            side: u.side.into(),
            plan_id: u.plan.map(|t| t.plan_id),
            plan_number: u.plan.map(|t| t.number),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlSimEnemy {
    pub id: ID,
    pub position: GqlLatLon,
    pub kind: GqlObserverKind,
    pub facing_deg: f64,
    pub range_m: f64,
    pub fov_deg: f64,
    /// Vision cone outline, apex first.
    pub cone: Vec<GqlLatLon>,
}

impl From<&SimEnemy> for GqlSimEnemy {
    fn from(e: &SimEnemy) -> Self {
        let vision = e.kind.vision();
        GqlSimEnemy {
            id: ID(e.id.to_string()),
            position: e.position.into(),
            kind: e.kind.into(),
            facing_deg: e.facing_deg,
            range_m: vision.range_m,
            fov_deg: vision.fov_deg,
            cone: points(&geo::observer_cone(&e.observer())),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlSimFriendly {
    pub id: ID,
    pub position: GqlLatLon,
    pub kind: GqlFriendlyKind,
}

impl From<&SimFriendly> for GqlSimFriendly {
    fn from(f: &SimFriendly) -> Self {
        GqlSimFriendly {
            id: ID(f.id.to_string()),
            position: f.position.into(),
            kind: f.kind.into(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlRouteSegment {
    pub segment_id: u32,
    pub start_waypoint_idx: u32,
    pub end_waypoint_idx: u32,
    pub risk_level: GqlRiskLevel,
    pub distance_m: f64,
    pub risk_factors: Vec<String>,
}

#[derive(SimpleObject)]
pub struct GqlRoute {
    pub route_id: u32,
    pub name: String,
    pub waypoints: Vec<GqlLatLon>,
    pub segments: Vec<GqlRouteSegment>,
    pub verdict: Option<GqlRouteVerdict>,
}

impl From<&Route> for GqlRoute {
    fn from(r: &Route) -> Self {
        GqlRoute {
            route_id: r.route_id,
            name: r.name.clone(),
            waypoints: points(&r.waypoints),
            segments: r
                .segments
                .iter()
                .map(|s| GqlRouteSegment {
                    segment_id: s.segment_id,
                    start_waypoint_idx: s.start_waypoint_idx as u32,
                    end_waypoint_idx: s.end_waypoint_idx as u32,
                    risk_level: s.risk_level.into(),
                    distance_m: s.distance_m,
                    risk_factors: s.risk_factors.clone(),
                })
                .collect(),
            verdict: r.verdict.map(Into::into),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlOverlayImage {
    pub image: String,
    pub bounds: GqlBounds,
}

impl From<&OverlayImage> for GqlOverlayImage {
    fn from(o: &OverlayImage) -> Self {
        GqlOverlayImage {
            image: o.image.clone(),
            bounds: o.bounds.into(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlPlanOverlay {
    pub plan_id: PlanId,
    pub image: GqlOverlayImage,
    pub visible: bool,
}

impl GqlPlanOverlay {
    fn new(plan_id: PlanId, overlay: &PlanOverlay) -> Self {
        GqlPlanOverlay {
            plan_id,
            image: (&overlay.image).into(),
            visible: overlay.visible,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlReport {
    pub mission_assessment: String,
    pub key_risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub recommended_route_id: Option<u32>,
}

impl From<&ReportPayload> for GqlReport {
    fn from(r: &ReportPayload) -> Self {
        GqlReport {
            mission_assessment: r.mission_assessment.clone(),
            key_risks: r.key_risks.clone(),
            recommendations: r.recommendations.clone(),
            recommended_route_id: r.recommended_route_id,
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlReportEntry {
    pub id: ID,
    pub created_at: String,
    pub plan_id: PlanId,
    pub center: GqlLatLon,
    pub report: GqlReport,
}

impl From<&ReportEntry> for GqlReportEntry {
    fn from(e: &ReportEntry) -> Self {
        GqlReportEntry {
            id: uuid_id(e.id),
            created_at: e.created_at.to_rfc3339(),
            plan_id: e.plan_id,
            center: e.center.into(),
            report: (&e.report).into(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlSegmentCover {
    pub index: u32,
    pub source: GqlCoverSource,
    /// Set when the classification came from a supplied analysis.
    pub status: Option<GqlCoverStatus>,
    pub danger_zone: bool,
    pub threatened: bool,
    pub color: String,
    pub dash: Option<String>,
    pub tooltip: String,
}

impl From<&SegmentCover> for GqlSegmentCover {
    fn from(c: &SegmentCover) -> Self {
        let status = match c.cover {
            ResolvedCover::Analysed(status) => Some(status.into()),
            _ => None,
        };
        GqlSegmentCover {
            index: c.index as u32,
            source: c.source.into(),
            status,
            danger_zone: c.cover == ResolvedCover::DangerZone,
            threatened: c.cover.is_threatened(),
            color: c.style.color.to_string(),
            dash: c.style.dash.map(str::to_string),
            tooltip: c.tooltip.clone(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlSegmentAnalysis {
    pub index: u32,
    pub status: GqlCoverStatus,
    pub explanation: Option<String>,
    pub blocking_feature: Option<String>,
}

#[derive(SimpleObject)]
pub struct GqlScores {
    pub time_to_target: f64,
    pub stealth_score: f64,
    pub survival_probability: f64,
    pub overall_score: f64,
}

#[derive(SimpleObject)]
pub struct GqlAnalysis {
    pub kind: Option<GqlAnalysisKind>,
    pub segment_analysis: Vec<GqlSegmentAnalysis>,
    pub scores: Option<GqlScores>,
    pub overlay: Option<GqlOverlayImage>,
    pub assessment: String,
    /// Simulation history entry created for this result.
    pub history_entry_id: Option<ID>,
}

impl GqlAnalysis {
    pub fn new(kind: Option<AnalysisKind>, outcome: &AnalysisOutcome, entry: Option<Uuid>) -> Self {
        GqlAnalysis {
            kind: kind.map(Into::into),
            segment_analysis: outcome
                .segment_analysis
                .iter()
                .map(|(index, a)| GqlSegmentAnalysis {
                    index: *index as u32,
                    status: a.status.into(),
                    explanation: a.explanation.clone(),
                    blocking_feature: a.blocking_feature.clone(),
                })
                .collect(),
            scores: outcome.scores.map(|s| GqlScores {
                time_to_target: s.time_to_target,
                stealth_score: s.stealth_score,
                survival_probability: s.survival_probability,
                overall_score: s.overall_score,
            }),
            overlay: outcome.overlay.as_ref().map(Into::into),
            assessment: outcome.assessment.clone(),
            history_entry_id: entry.map(uuid_id),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlSimulationEntry {
    pub id: ID,
    pub created_at: String,
    pub center: GqlLatLon,
    pub waypoints: Vec<GqlLatLon>,
    pub analysis: GqlAnalysis,
}

impl From<&SimulationEntry> for GqlSimulationEntry {
    fn from(e: &SimulationEntry) -> Self {
        GqlSimulationEntry {
            id: uuid_id(e.id),
            created_at: e.created_at.to_rfc3339(),
            center: e.center.into(),
            waypoints: points(&e.waypoints),
            analysis: GqlAnalysis::new(Some(AnalysisKind::Simulation), &e.outcome, Some(e.id)),
        }
    }
}

/// Everything a map view needs to render the current session.
#[derive(SimpleObject)]
pub struct GqlSession {
    pub mode: GqlMode,
    pub units: Vec<GqlUnit>,
    pub next_plan_id: PlanId,
    pub start_point: Option<GqlLatLon>,
    pub end_point: Option<GqlLatLon>,
    pub via_points: Vec<GqlLatLon>,
    pub drawn_route: Vec<GqlLatLon>,
    pub pending_polygon: Vec<GqlLatLon>,
    pub no_go_zones: Vec<Vec<GqlLatLon>>,
    pub sim_enemies: Vec<GqlSimEnemy>,
    pub sim_friendlies: Vec<GqlSimFriendly>,
    pub routes: Vec<GqlRoute>,
    pub overlays: Vec<GqlPlanOverlay>,
    /// Selected past report, else the live one.
    pub report: Option<GqlReport>,
    pub selected_report_id: Option<ID>,
    pub report_history: Vec<GqlReportEntry>,
    pub segment_covers: Vec<GqlSegmentCover>,
    pub threatened_segments: u32,
    /// Selected past simulation, else the live analysis.
    pub analysis: Option<GqlAnalysis>,
    pub selected_simulation_id: Option<ID>,
    pub simulation_history: Vec<GqlSimulationEntry>,
}

impl From<&MissionSession> for GqlSession {
    fn from(s: &MissionSession) -> Self {
        let ledger = s.ledger();
        let covers = s.segment_covers();
        let analysis = match s.simulations().selected() {
            Some(entry) => Some(GqlAnalysis::new(
                Some(AnalysisKind::Simulation),
                &entry.outcome,
                Some(entry.id),
            )),
            None => s
                .analysis()
                .map(|a| GqlAnalysis::new(Some(a.kind), &a.outcome, None)),
        };
        GqlSession {
            mode: s.mode().into(),
            units: ledger.units().iter().map(GqlUnit::from).collect(),
            next_plan_id: ledger.next_plan_id(),
            start_point: s.start().map(Into::into),
            end_point: s.end().map(Into::into),
            via_points: points(s.via_points()),
            drawn_route: points(s.drawn_route()),
            pending_polygon: points(s.pending_polygon()),
            no_go_zones: s.no_go_zones().iter().map(|z| points(z)).collect(),
            sim_enemies: s.sim_enemies().iter().map(GqlSimEnemy::from).collect(),
            sim_friendlies: s.sim_friendlies().iter().map(GqlSimFriendly::from).collect(),
            routes: ledger.routes().iter().map(GqlRoute::from).collect(),
            overlays: ledger
                .overlays()
                .iter()
                .map(|(id, o)| GqlPlanOverlay::new(*id, o))
                .collect(),
            report: ledger.displayed_report().map(Into::into),
            selected_report_id: ledger.reports().selected_id().map(uuid_id),
            report_history: ledger.reports().iter().map(GqlReportEntry::from).collect(),
            threatened_segments: cover::threatened_count(&covers) as u32,
            segment_covers: covers.iter().map(GqlSegmentCover::from).collect(),
            analysis,
            selected_simulation_id: s.simulations().selected_id().map(uuid_id),
            simulation_history: s
                .simulations()
                .iter()
                .map(GqlSimulationEntry::from)
                .collect(),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlClickResult {
    pub accepted: bool,
    /// Advisory to show when the click was refused.
    pub rejection: Option<String>,
    pub mode: GqlMode,
}

#[derive(SimpleObject)]
pub struct GqlPlanResult {
    pub request_id: String,
    pub plan_id: PlanId,
    pub friendlies: Vec<ID>,
    pub enemies: Vec<ID>,
    pub routes: Vec<GqlRoute>,
    pub report_entry_id: Option<ID>,
}

#[derive(SimpleObject)]
pub struct GqlBacklogEntry {
    pub request_id: String,
    pub created_at: String,
    pub plan_id: PlanId,
    pub soldiers: u32,
    pub enemies: u32,
    pub no_go_zones: u32,
    pub zoom: u8,
    pub routes: Vec<GqlRoute>,
    pub report: Option<GqlReport>,
}

impl From<&BacklogEntry> for GqlBacklogEntry {
    fn from(e: &BacklogEntry) -> Self {
        GqlBacklogEntry {
            request_id: e.request_id.clone(),
            created_at: e.created_at.to_rfc3339(),
            plan_id: e.plan_id,
            soldiers: e.request.soldiers.len() as u32,
            enemies: e.request.enemies.len() as u32,
            no_go_zones: e.request.no_go_zones.len() as u32,
            zoom: e.request.zoom,
            routes: e.routes.iter().map(GqlRoute::from).collect(),
            report: e.report.as_ref().map(Into::into),
        }
    }
}

#[derive(SimpleObject)]
pub struct GqlProgressEvent {
    pub request_id: String,
    pub stage: GqlProgressStage,
    pub label: String,
    pub progress: u8,
    pub message: String,
    pub timestamp: String,
}

impl From<ProgressEvent> for GqlProgressEvent {
    fn from(e: ProgressEvent) -> Self {
        GqlProgressEvent {
            label: e.stage.label().to_string(),
            stage: e.stage.into(),
            request_id: e.request_id,
            progress: e.progress,
            message: e.message,
            timestamp: e.timestamp.to_rfc3339(),
        }
    }
}

pub fn uuid_id(id: Uuid) -> ID {
    ID(id.to_string())
}

// Input types

#[derive(InputObject, Clone, Copy)]
pub struct LatLonInput {
    pub lat: f64,
    pub lon: f64,
}

impl From<LatLonInput> for LatLon {
    fn from(p: LatLonInput) -> Self {
        LatLon::new(p.lat, p.lon)
    }
}

#[derive(InputObject, Clone, Copy)]
pub struct BoundsInput {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl From<BoundsInput> for GeoBounds {
    fn from(b: BoundsInput) -> Self {
        GeoBounds::new(b.south, b.west, b.north, b.east)
    }
}

#[derive(InputObject)]
pub struct GeneratePlanInput {
    /// Client-chosen id to subscribe to progress before the call.
    pub request_id: Option<String>,
    pub bounds: BoundsInput,
    pub zoom: u8,
    pub analysis_depth: Option<GqlAnalysisDepth>,
}

#[derive(InputObject)]
pub struct EvaluateRouteInput {
    pub request_id: Option<String>,
    pub bounds: BoundsInput,
    /// Explicit composition; defaults to the placed unit counts.
    pub friendlies: Option<u32>,
    pub enemies: Option<u32>,
}

impl EvaluateRouteInput {
    pub fn composition(&self) -> Option<models::UnitComposition> {
        if self.friendlies.is_none() && self.enemies.is_none() {
            return None;
        }
        Some(models::UnitComposition {
            friendlies: self.friendlies.unwrap_or(0),
            enemies: self.enemies.unwrap_or(0),
        })
    }
}

#[derive(InputObject)]
pub struct SimulateRouteInput {
    pub request_id: Option<String>,
    pub bounds: BoundsInput,
}

#[derive(InputObject)]
pub struct SimTemplateInput {
    pub enemy_kind: GqlObserverKind,
    pub facing_deg: f64,
    pub friendly_kind: GqlFriendlyKind,
}
