//! Per-segment cover classification for a drawn route.
//!
//! Two strategies: analysis supplied by the evaluation service, which knows
//! about buildings, vegetation and terrain, and a geometric fallback that only
//! knows about vision cones. Supplied analysis always wins for the segments it
//! covers; the fallback can only say "possibly exposed" or "geometrically
//! clear".

use serde::{Deserialize, Serialize};

use crate::geo;
use crate::models::{CoverAnalysisMap, CoverStatus, LatLon, Observer};

pub const RED: &str = "#ef4444";
pub const AMBER: &str = "#f59e0b";
pub const GREEN: &str = "#22c55e";
pub const BLUE: &str = "#3b82f6";

/// Dash pattern for exposed segments.
pub const TIGHT_DASH: &str = "4 4";

/// Line style for one rendered segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentStyle {
    pub color: &'static str,
    pub dash: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    Supplied,
    Geometric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedCover {
    /// Authoritative status from the evaluation service.
    Analysed(CoverStatus),
    /// Inside at least one vision cone; needs analysis.
    DangerZone,
    /// Outside every vision cone.
    GeometricallyClear,
}

impl ResolvedCover {
    pub fn style(self) -> SegmentStyle {
        let (color, dash) = match self {
            ResolvedCover::Analysed(CoverStatus::Exposed) => (RED, Some(TIGHT_DASH)),
            ResolvedCover::Analysed(CoverStatus::Partial) => (AMBER, None),
            ResolvedCover::Analysed(CoverStatus::Covered) => (GREEN, None),
            ResolvedCover::Analysed(CoverStatus::Clear) => (BLUE, None),
            ResolvedCover::DangerZone => (AMBER, None),
            ResolvedCover::GeometricallyClear => (GREEN, None),
        };
        SegmentStyle { color, dash }
    }

    /// Whether the segment should be counted as a threat in summaries.
    pub fn is_threatened(self) -> bool {
        matches!(
            self,
            ResolvedCover::Analysed(CoverStatus::Exposed)
                | ResolvedCover::Analysed(CoverStatus::Partial)
                | ResolvedCover::DangerZone
        )
    }
}

/// Classification of one drawn segment, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCover {
    pub index: usize,
    pub cover: ResolvedCover,
    pub source: CoverSource,
    pub style: SegmentStyle,
    pub tooltip: String,
}

/// Strategy for classifying drawn segment `index` running `from -> to`.
///
/// Returns `None` when the strategy has nothing to say about the segment.
pub trait CoverResolver {
    fn resolve(&self, index: usize, from: LatLon, to: LatLon) -> Option<SegmentCover>;
}

/// Uses analysis returned by the evaluation service.
pub struct ExternallySupplied<'a> {
    analysis: &'a CoverAnalysisMap,
}

impl<'a> ExternallySupplied<'a> {
    pub fn new(analysis: &'a CoverAnalysisMap) -> Self {
        ExternallySupplied { analysis }
    }
}

fn status_label(status: CoverStatus) -> &'static str {
    match status {
        CoverStatus::Exposed => "Exposed",
        CoverStatus::Partial => "Partial cover",
        CoverStatus::Covered => "Covered",
        CoverStatus::Clear => "Clear",
    }
}

fn generic_explanation(status: CoverStatus) -> &'static str {
    match status {
        CoverStatus::Exposed => "segment is in direct enemy line of sight",
        CoverStatus::Partial => "concealment is intermittent along this segment",
        CoverStatus::Covered => "enemy line of sight is blocked",
        CoverStatus::Clear => "no enemy observation on this segment",
    }
}

impl CoverResolver for ExternallySupplied<'_> {
    fn resolve(&self, index: usize, _from: LatLon, _to: LatLon) -> Option<SegmentCover> {
        let analysis = self.analysis.get(&index)?;
        let explanation = analysis
            .explanation
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| generic_explanation(analysis.status));
        let mut tooltip = format!("{}: {}", status_label(analysis.status), explanation);
        if let Some(feature) = analysis
            .blocking_feature
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            tooltip.push_str(&format!(" (blocked by {})", feature));
        }
        let cover = ResolvedCover::Analysed(analysis.status);
        Some(SegmentCover {
            index,
            cover,
            source: CoverSource::Supplied,
            style: cover.style(),
            tooltip,
        })
    }
}

/// Vision-cone heuristic over the current observers.
pub struct GeometricFallback<'a> {
    observers: &'a [Observer],
}

impl<'a> GeometricFallback<'a> {
    pub fn new(observers: &'a [Observer]) -> Self {
        GeometricFallback { observers }
    }
}

impl CoverResolver for GeometricFallback<'_> {
    fn resolve(&self, index: usize, from: LatLon, to: LatLon) -> Option<SegmentCover> {
        let (cover, tooltip) = if geo::segment_exposed(from, to, self.observers) {
            (
                ResolvedCover::DangerZone,
                "In danger zone: crosses an enemy vision cone. Run an analysis for cover detail",
            )
        } else {
            (
                ResolvedCover::GeometricallyClear,
                "Clear: outside all enemy vision cones",
            )
        };
        Some(SegmentCover {
            index,
            cover,
            source: CoverSource::Geometric,
            style: cover.style(),
            tooltip: tooltip.to_string(),
        })
    }
}

/// Classify every consecutive pair of `waypoints`.
pub fn resolve_route(
    waypoints: &[LatLon],
    analysis: Option<&CoverAnalysisMap>,
    observers: &[Observer],
) -> Vec<SegmentCover> {
    let empty = CoverAnalysisMap::new();
    let supplied = ExternallySupplied::new(analysis.unwrap_or(&empty));
    let fallback = GeometricFallback::new(observers);
    waypoints
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            supplied
                .resolve(i, pair[0], pair[1])
                .or_else(|| fallback.resolve(i, pair[0], pair[1]))
        })
        .collect()
}

/// Count of segments flagged as exposed, partial or in a danger zone.
pub fn threatened_count(covers: &[SegmentCover]) -> usize {
    covers.iter().filter(|c| c.cover.is_threatened()).count()
}
