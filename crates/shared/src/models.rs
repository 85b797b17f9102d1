use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side a placed unit fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Friendly,
    Enemy,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Friendly => write!(f, "friendly"),
            Side::Enemy => write!(f, "enemy"),
        }
    }
}

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        LatLon { lat, lon }
    }

    /// Linear interpolation in degree space, `t` in [0, 1].
    pub fn lerp(self, other: LatLon, t: f64) -> LatLon {
        LatLon {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }
}

/// A lat/lon rectangle. Used both for map viewports and the geofence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        GeoBounds {
            north,
            south,
            east,
            west,
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: LatLon) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub Uuid);

impl UnitId {
    pub fn new() -> Self {
        UnitId(Uuid::new_v4())
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Plan identifiers are issued by the ledger, starting at 1.
pub type PlanId = u32;

/// Plan membership of a unit. Both halves are always set together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTag {
    pub plan_id: PlanId,
    /// Per-side sequence number within the plan, starting at 1.
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub position: LatLon,
    pub side: Side,
    #[serde(default)]
    pub plan: Option<PlanTag>,
}

impl Unit {
    pub fn new(side: Side, position: LatLon) -> Self {
        Unit {
            id: UnitId::new(),
            position,
            side,
            plan: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.plan.is_some()
    }
}

/// Field of view of an observer: how far and how wide it sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisionSpec {
    pub range_m: f64,
    pub fov_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverKind {
    Sniper,
    #[default]
    Rifleman,
    Observer,
}

impl ObserverKind {
    pub const ALL: [ObserverKind; 3] = [
        ObserverKind::Sniper,
        ObserverKind::Rifleman,
        ObserverKind::Observer,
    ];

    pub fn vision(self) -> VisionSpec {
        match self {
            ObserverKind::Sniper => VisionSpec {
                range_m: 800.0,
                fov_deg: 30.0,
            },
            ObserverKind::Rifleman => VisionSpec {
                range_m: 300.0,
                fov_deg: 90.0,
            },
            ObserverKind::Observer => VisionSpec {
                range_m: 1000.0,
                fov_deg: 120.0,
            },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ObserverKind::Sniper => "Sniper",
            ObserverKind::Rifleman => "Rifleman",
            ObserverKind::Observer => "Observer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendlyKind {
    #[default]
    Rifleman,
    Sniper,
    Support,
}

/// Something that watches the map: a position, a facing and a vision spec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub position: LatLon,
    pub facing_deg: f64,
    pub vision: VisionSpec,
}

/// Enemy placed for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEnemy {
    pub id: UnitId,
    pub position: LatLon,
    pub kind: ObserverKind,
    /// Compass bearing in [0, 360).
    pub facing_deg: f64,
}

impl SimEnemy {
    pub fn new(position: LatLon, kind: ObserverKind, facing_deg: f64) -> Self {
        SimEnemy {
            id: UnitId::new(),
            position,
            kind,
            facing_deg: normalize_bearing(facing_deg),
        }
    }

    pub fn observer(&self) -> Observer {
        Observer {
            position: self.position,
            facing_deg: self.facing_deg,
            vision: self.kind.vision(),
        }
    }
}

/// Friendly actor placed for a simulation run. Passive: it has no vision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimFriendly {
    pub id: UnitId,
    pub position: LatLon,
    pub kind: FriendlyKind,
}

impl SimFriendly {
    pub fn new(position: LatLon, kind: FriendlyKind) -> Self {
        SimFriendly {
            id: UnitId::new(),
            position,
            kind,
        }
    }
}

/// Normalize a bearing to [0, 360).
pub fn normalize_bearing(bearing: f64) -> f64 {
    let b = bearing.rem_euclid(360.0);
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverStatus {
    Exposed,
    Partial,
    Covered,
    Clear,
}

/// Externally supplied line-of-sight analysis for one drawn segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCoverAnalysis {
    pub status: CoverStatus,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub blocking_feature: Option<String>,
}

/// Segment analysis keyed by drawn segment index. May be partial.
pub type CoverAnalysisMap = BTreeMap<usize, SegmentCoverAnalysis>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteVerdict {
    Success,
    Risk,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub segment_id: u32,
    pub start_waypoint_idx: usize,
    pub end_waypoint_idx: usize,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub distance_m: f64,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

/// A generated route as returned by the route-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: u32,
    #[serde(default)]
    pub name: String,
    pub waypoints: Vec<LatLon>,
    #[serde(default)]
    pub segments: Vec<RouteSegment>,
    /// Read from the service's `classification.final_verdict`.
    #[serde(default, rename = "classification", with = "classification")]
    pub verdict: Option<RouteVerdict>,
}

/// The service nests the verdict inside a wider classification record.
/// Only the final verdict is kept.
mod classification {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::RouteVerdict;

    #[derive(Serialize, Deserialize)]
    struct Classification {
        final_verdict: RouteVerdict,
    }

    pub fn serialize<S: Serializer>(
        verdict: &Option<RouteVerdict>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        verdict
            .map(|final_verdict| Classification { final_verdict })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<RouteVerdict>, D::Error> {
        Ok(Option::<Classification>::deserialize(deserializer)?.map(|c| c.final_verdict))
    }
}

/// Georeferenced image drawn over the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayImage {
    /// Image URL or `data:` URI.
    pub image: String,
    pub bounds: GeoBounds,
}

/// Textual mission report attached to a generation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportPayload {
    pub mission_assessment: String,
    #[serde(default)]
    pub key_risks: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub recommended_route_id: Option<u32>,
}

/// Successful response of a route-generation request. The report fields
/// sit at the top level of the response next to `routes`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationOutcome {
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub overlay: Option<OverlayImage>,
    #[serde(flatten)]
    pub report: Option<ReportPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    #[default]
    Full,
    Quick,
}

/// A unit as the route-generation service sees it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TacticalUnit {
    pub lat: f64,
    pub lon: f64,
    pub is_friendly: bool,
    #[serde(default)]
    pub unit_id: Option<UnitId>,
}

impl TacticalUnit {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

impl From<&Unit> for TacticalUnit {
    fn from(unit: &Unit) -> Self {
        TacticalUnit {
            lat: unit.position.lat,
            lon: unit.position.lon,
            is_friendly: unit.side == Side::Friendly,
            unit_id: Some(unit.id),
        }
    }
}

/// Route-generation request built from the unassigned units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub request_id: String,
    pub soldiers: Vec<TacticalUnit>,
    pub enemies: Vec<TacticalUnit>,
    pub bounds: GeoBounds,
    pub zoom: u8,
    /// Polygons as `[lat, lon]` pairs.
    pub no_go_zones: Vec<Vec<(f64, f64)>>,
    pub analysis_depth: AnalysisDepth,
}

impl RouteRequest {
    /// Ids of the units this request was built from, soldiers first.
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.soldiers
            .iter()
            .chain(&self.enemies)
            .filter_map(|u| u.unit_id)
            .collect()
    }
}

/// Counts per unit type, the coarse alternative to explicit entity lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitComposition {
    pub friendlies: u32,
    pub enemies: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnalysisSubject {
    Composition(UnitComposition),
    Entities {
        observers: Vec<SimEnemy>,
        friendlies: Vec<SimFriendly>,
    },
}

/// Route-evaluation or simulation request over the drawn route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub request_id: String,
    pub waypoints: Vec<LatLon>,
    pub subject: AnalysisSubject,
    pub bounds: GeoBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TacticalScores {
    pub time_to_target: f64,
    pub stealth_score: f64,
    pub survival_probability: f64,
    pub overall_score: f64,
}

/// Successful response of an evaluation or simulation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    #[serde(default)]
    pub segment_analysis: CoverAnalysisMap,
    #[serde(default)]
    pub scores: Option<TacticalScores>,
    #[serde(default)]
    pub overlay: Option<OverlayImage>,
    #[serde(default)]
    pub assessment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bearing() {
        assert!((normalize_bearing(370.0) - 10.0).abs() < 1e-9);
        assert!((normalize_bearing(-90.0) - 270.0).abs() < 1e-9);
        assert!((normalize_bearing(360.0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_contains_is_inclusive() {
        let b = GeoBounds::new(16.0, 34.5, 32.0, 60.0);
        assert!(b.contains(LatLon::new(24.7, 46.7)));
        assert!(b.contains(LatLon::new(16.0, 34.5)));
        assert!(!b.contains(LatLon::new(40.0, 46.7)));
        assert!(!b.contains(LatLon::new(24.7, 10.0)));
    }

    #[test]
    fn test_sim_enemy_normalizes_facing() {
        let e = SimEnemy::new(LatLon::new(0.0, 0.0), ObserverKind::Sniper, 450.0);
        assert!((e.facing_deg - 90.0).abs() < 1e-9);
        assert_eq!(e.observer().vision, ObserverKind::Sniper.vision());
    }

    #[test]
    fn test_cover_analysis_parses_partial_fields() {
        let json = r#"{"1": {"status": "covered", "blocking_feature": "building"}}"#;
        let map: CoverAnalysisMap = serde_json::from_str(json).unwrap();
        let entry = &map[&1];
        assert_eq!(entry.status, CoverStatus::Covered);
        assert_eq!(entry.explanation, None);
        assert_eq!(entry.blocking_feature.as_deref(), Some("building"));
    }

    #[test]
    fn test_analysis_subject_tagging() {
        let subject = AnalysisSubject::Composition(UnitComposition {
            friendlies: 2,
            enemies: 1,
        });
        let json = serde_json::to_value(&subject).unwrap();
        assert_eq!(json["mode"], "composition");
        assert_eq!(json["friendlies"], 2);
    }

    #[test]
    fn test_route_request_wire_shape() {
        let soldier = Unit::new(Side::Friendly, LatLon::new(24.70, 46.70));
        let enemy = Unit::new(Side::Enemy, LatLon::new(24.71, 46.70));
        let req = RouteRequest {
            request_id: "req-1".into(),
            soldiers: vec![TacticalUnit::from(&soldier)],
            enemies: vec![TacticalUnit::from(&enemy)],
            bounds: GeoBounds::new(24.6, 46.6, 24.8, 46.8),
            zoom: 17,
            no_go_zones: vec![vec![(24.70, 46.71), (24.71, 46.71), (24.71, 46.72)]],
            analysis_depth: AnalysisDepth::Quick,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["soldiers"][0]["is_friendly"], true);
        assert_eq!(json["soldiers"][0]["unit_id"], soldier.id.to_string());
        assert_eq!(json["enemies"][0]["is_friendly"], false);
        assert_eq!(json["enemies"][0]["lat"], 24.71);
        assert_eq!(json["no_go_zones"][0][1], serde_json::json!([24.71, 46.71]));
        assert_eq!(json["analysis_depth"], "quick");
        assert_eq!(req.unit_ids(), vec![soldier.id, enemy.id]);
    }

    #[test]
    fn test_generation_outcome_reads_service_response() {
        let json = r#"{
            "request_id": "req-1",
            "timestamp": "2026-01-01T00:00:00Z",
            "soldier_count": 1,
            "enemy_count": 1,
            "routes": [{
                "route_id": 1,
                "name": "Western approach",
                "waypoints": [
                    {"lat": 24.70, "lon": 46.70, "elevation_m": 612.0},
                    {"lat": 24.71, "lon": 46.70, "elevation_m": 618.5}
                ],
                "segments": [{
                    "segment_id": 0,
                    "start_waypoint_idx": 0,
                    "end_waypoint_idx": 1,
                    "color": "yellow",
                    "risk_level": "moderate",
                    "distance_m": 1110.0,
                    "estimated_time_seconds": 900.0,
                    "risk_factors": ["open ground"]
                }],
                "classification": {
                    "gemini_evaluation": "risk",
                    "simulation": {"detected": true},
                    "final_verdict": "risk",
                    "confidence": 0.8
                },
                "total_distance_m": 1110.0
            }],
            "recommended_route_id": 1,
            "mission_assessment": "Approach from the west",
            "key_risks": ["open ground"],
            "recommendations": ["move at night"],
            "detection_debug": {"grid": []}
        }"#;
        let outcome: GenerationOutcome = serde_json::from_str(json).unwrap();
        let route = &outcome.routes[0];
        assert_eq!(route.verdict, Some(RouteVerdict::Risk));
        assert_eq!(route.waypoints[1], LatLon::new(24.71, 46.70));
        assert_eq!(route.segments[0].risk_level, RiskLevel::Moderate);
        let report = outcome.report.unwrap();
        assert_eq!(report.mission_assessment, "Approach from the west");
        assert_eq!(report.recommended_route_id, Some(1));
        assert_eq!(report.recommendations, vec!["move at night".to_string()]);
        assert!(outcome.overlay.is_none());
    }

    #[test]
    fn test_generation_outcome_without_report() {
        let outcome: GenerationOutcome =
            serde_json::from_str(r#"{"routes": [{"route_id": 3, "waypoints": []}]}"#).unwrap();
        assert_eq!(outcome.routes[0].verdict, None);
        assert!(outcome.report.is_none());
    }
}
