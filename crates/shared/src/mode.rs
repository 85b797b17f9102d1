//! What a click on the map means.
//!
//! The machine rests in [`InteractionMode::Idle`] and is moved around by tool
//! selection. Clicks in any other mode pass through a [`ClickGate`] (minimum
//! zoom, then geofence) before being turned into a [`MapAction`] for the
//! session to apply. The machine itself only owns the vertices of an
//! in-progress restricted polygon.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Geofence;
use crate::models::{LatLon, Side};

/// Zoom level below which a click is too coarse to place anything.
pub const DEFAULT_MIN_ZOOM: u8 = 17;

/// Vertices needed before a restricted polygon can be closed.
pub const MIN_POLYGON_VERTICES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    #[default]
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

impl InteractionMode {
    /// Modes that keep accepting clicks until an explicit terminal event.
    pub fn is_drawing(self) -> bool {
        matches!(self, InteractionMode::DrawRoute | InteractionMode::DrawNoGo)
    }
}

/// Advisory shown when a click is refused. Nothing is mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClickRejection {
    #[error("zoom in to level {required} or closer to place or draw (current level {current})")]
    ZoomTooLow { current: u8, required: u8 },
    #[error("placement is restricted to the {area}")]
    OutsideGeofence { area: String },
}

/// Preconditions every restricted-mode click must meet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickGate {
    /// `None` disables the zoom check.
    pub min_zoom: Option<u8>,
    pub geofence: Geofence,
}

impl Default for ClickGate {
    fn default() -> Self {
        ClickGate {
            min_zoom: Some(DEFAULT_MIN_ZOOM),
            geofence: Geofence::gulf_region(),
        }
    }
}

impl ClickGate {
    pub fn check(&self, at: LatLon, zoom: u8) -> Result<(), ClickRejection> {
        if let Some(required) = self.min_zoom {
            if zoom < required {
                return Err(ClickRejection::ZoomTooLow {
                    current: zoom,
                    required,
                });
            }
        }
        if !self.geofence.contains(at) {
            return Err(ClickRejection::OutsideGeofence {
                area: self.geofence.name.clone(),
            });
        }
        Ok(())
    }
}

/// Mutation requested by an accepted click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MapAction {
    SetStart { at: LatLon },
    SetEnd { at: LatLon },
    AddViaPoint { at: LatLon },
    PlaceUnit { side: Side, at: LatLon },
    PlaceSimEnemy { at: LatLon },
    PlaceSimFriendly { at: LatLon },
    AppendRoutePoint { at: LatLon },
    /// Vertex kept by the machine; nothing for the session to store yet.
    AppendNoGoVertex { at: LatLon, vertices: usize },
    FinalizeNoGo { polygon: Vec<LatLon> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Click in idle mode or an ignored terminal event.
    Ignored,
    Rejected(ClickRejection),
    Accepted(MapAction),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModeMachine {
    mode: InteractionMode,
    gate: ClickGate,
    pending_polygon: Vec<LatLon>,
}

impl ModeMachine {
    pub fn new(gate: ClickGate) -> Self {
        ModeMachine {
            mode: InteractionMode::Idle,
            gate,
            pending_polygon: Vec::new(),
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn gate(&self) -> &ClickGate {
        &self.gate
    }

    pub fn pending_polygon(&self) -> &[LatLon] {
        &self.pending_polygon
    }

    /// Tool selection. Always succeeds and abandons any in-progress polygon.
    /// Returns the mode that was left.
    pub fn select(&mut self, mode: InteractionMode) -> InteractionMode {
        let previous = self.mode;
        self.pending_polygon.clear();
        self.mode = mode;
        previous
    }

    /// Back to idle, dropping any accumulation.
    pub fn reset(&mut self) {
        self.select(InteractionMode::Idle);
    }

    pub fn click(&mut self, at: LatLon, zoom: u8) -> ClickOutcome {
        if self.mode == InteractionMode::Idle {
            return ClickOutcome::Ignored;
        }
        if let Err(rejection) = self.gate.check(at, zoom) {
            return ClickOutcome::Rejected(rejection);
        }

        let action = match self.mode {
            InteractionMode::Idle => return ClickOutcome::Ignored,
            InteractionMode::SetStart => MapAction::SetStart { at },
            InteractionMode::SetEnd => MapAction::SetEnd { at },
            InteractionMode::AddWaypoint => MapAction::AddViaPoint { at },
            InteractionMode::PlaceSoldier => MapAction::PlaceUnit {
                side: Side::Friendly,
                at,
            },
            InteractionMode::PlaceEnemy => MapAction::PlaceUnit {
                side: Side::Enemy,
                at,
            },
            InteractionMode::PlaceSimEnemy => MapAction::PlaceSimEnemy { at },
            InteractionMode::PlaceSimFriendly => MapAction::PlaceSimFriendly { at },
            InteractionMode::DrawRoute => {
                return ClickOutcome::Accepted(MapAction::AppendRoutePoint { at })
            }
            InteractionMode::DrawNoGo => {
                self.pending_polygon.push(at);
                return ClickOutcome::Accepted(MapAction::AppendNoGoVertex {
                    at,
                    vertices: self.pending_polygon.len(),
                });
            }
        };
        // Single-shot modes return to rest after one accepted click.
        self.mode = InteractionMode::Idle;
        ClickOutcome::Accepted(action)
    }

    /// Terminal event for `draw-no-go`. Needs at least three vertices.
    pub fn double_click(&mut self) -> ClickOutcome {
        if self.mode != InteractionMode::DrawNoGo
            || self.pending_polygon.len() < MIN_POLYGON_VERTICES
        {
            return ClickOutcome::Ignored;
        }
        let polygon = std::mem::take(&mut self.pending_polygon);
        self.mode = InteractionMode::Idle;
        ClickOutcome::Accepted(MapAction::FinalizeNoGo { polygon })
    }

    /// Terminal command for `draw-route`. Returns whether a route was open.
    pub fn finish_route(&mut self) -> bool {
        if self.mode == InteractionMode::DrawRoute {
            self.mode = InteractionMode::Idle;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inside() -> LatLon {
        LatLon::new(24.70, 46.70)
    }

    fn machine(mode: InteractionMode) -> ModeMachine {
        let mut m = ModeMachine::new(ClickGate::default());
        m.select(mode);
        m
    }

    #[test]
    fn test_place_enemy_returns_to_idle() {
        let mut m = machine(InteractionMode::PlaceEnemy);
        let out = m.click(inside(), 18);
        assert_eq!(
            out,
            ClickOutcome::Accepted(MapAction::PlaceUnit {
                side: Side::Enemy,
                at: inside()
            })
        );
        assert_eq!(m.mode(), InteractionMode::Idle);
    }

    #[test]
    fn test_low_zoom_rejected_and_mode_kept() {
        let mut m = machine(InteractionMode::PlaceEnemy);
        let out = m.click(inside(), 15);
        assert_eq!(
            out,
            ClickOutcome::Rejected(ClickRejection::ZoomTooLow {
                current: 15,
                required: 17
            })
        );
        assert_eq!(m.mode(), InteractionMode::PlaceEnemy);
    }

    #[test]
    fn test_zoom_is_checked_before_geofence() {
        let mut m = machine(InteractionMode::PlaceSoldier);
        let out = m.click(LatLon::new(51.5, -0.1), 10);
        assert!(matches!(
            out,
            ClickOutcome::Rejected(ClickRejection::ZoomTooLow { .. })
        ));
    }

    #[test]
    fn test_outside_geofence_rejected() {
        let mut m = machine(InteractionMode::SetStart);
        let out = m.click(LatLon::new(51.5, -0.1), 18);
        match out {
            ClickOutcome::Rejected(r) => {
                assert_eq!(r.to_string(), "placement is restricted to the Gulf region")
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(m.mode(), InteractionMode::SetStart);
    }

    #[test]
    fn test_zoom_gate_can_be_disabled() {
        let mut m = ModeMachine::new(ClickGate {
            min_zoom: None,
            geofence: Geofence::gulf_region(),
        });
        m.select(InteractionMode::SetEnd);
        assert_eq!(
            m.click(inside(), 3),
            ClickOutcome::Accepted(MapAction::SetEnd { at: inside() })
        );
    }

    #[test]
    fn test_idle_click_ignored() {
        let mut m = machine(InteractionMode::Idle);
        assert_eq!(m.click(inside(), 18), ClickOutcome::Ignored);
    }

    #[test]
    fn test_draw_route_stays_until_done() {
        let mut m = machine(InteractionMode::DrawRoute);
        for _ in 0..3 {
            assert_eq!(
                m.click(inside(), 18),
                ClickOutcome::Accepted(MapAction::AppendRoutePoint { at: inside() })
            );
            assert_eq!(m.mode(), InteractionMode::DrawRoute);
        }
        assert!(m.finish_route());
        assert_eq!(m.mode(), InteractionMode::Idle);
        assert!(!m.finish_route());
    }

    #[test]
    fn test_no_go_needs_three_vertices() {
        let mut m = machine(InteractionMode::DrawNoGo);
        m.click(LatLon::new(24.70, 46.70), 18);
        m.click(LatLon::new(24.71, 46.70), 18);
        assert_eq!(m.double_click(), ClickOutcome::Ignored);
        assert_eq!(m.mode(), InteractionMode::DrawNoGo);
        assert_eq!(m.pending_polygon().len(), 2);

        m.click(LatLon::new(24.71, 46.71), 18);
        match m.double_click() {
            ClickOutcome::Accepted(MapAction::FinalizeNoGo { polygon }) => {
                assert_eq!(polygon.len(), 3)
            }
            other => panic!("expected polygon, got {other:?}"),
        }
        assert_eq!(m.mode(), InteractionMode::Idle);
        assert!(m.pending_polygon().is_empty());
    }

    #[test]
    fn test_rejected_vertex_not_accumulated() {
        let mut m = machine(InteractionMode::DrawNoGo);
        m.click(inside(), 12);
        assert!(m.pending_polygon().is_empty());
    }

    #[test]
    fn test_toggle_abandons_polygon() {
        let mut m = machine(InteractionMode::DrawNoGo);
        m.click(inside(), 18);
        m.click(inside(), 18);
        let left = m.select(InteractionMode::PlaceSoldier);
        assert_eq!(left, InteractionMode::DrawNoGo);
        assert!(m.pending_polygon().is_empty());
        m.select(InteractionMode::DrawNoGo);
        assert!(m.pending_polygon().is_empty());
    }

    #[test]
    fn test_double_click_outside_no_go_ignored() {
        let mut m = machine(InteractionMode::DrawRoute);
        assert_eq!(m.double_click(), ClickOutcome::Ignored);
        assert_eq!(m.mode(), InteractionMode::DrawRoute);
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&InteractionMode::PlaceSimEnemy).unwrap();
        assert_eq!(json, "\"place-sim-enemy\"");
        let back: InteractionMode = serde_json::from_str("\"draw-no-go\"").unwrap();
        assert_eq!(back, InteractionMode::DrawNoGo);
    }
}
