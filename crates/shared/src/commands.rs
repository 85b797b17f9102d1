//! Named session commands.
//!
//! Map popups do not call back into the session directly. Each rendered
//! entity carries an [`EntityHandle`]; a popup button turns a
//! [`PopupAction`] into a [`SessionCommand`] bound to that handle, and the
//! command is applied like any other.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::mode::{ClickOutcome, InteractionMode};
use crate::models::{FriendlyKind, LatLon, ObserverKind, PlanId, UnitId};
use crate::session::{MissionSession, SimTemplate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    SelectMode { mode: InteractionMode },
    Click { at: LatLon, zoom: u8 },
    DoubleClick,
    FinishRoute,
    MoveUnit { id: UnitId, to: LatLon },
    RemoveUnit { id: UnitId },
    MoveWaypoint { index: usize, to: LatLon },
    RemoveWaypoint { index: usize },
    RemoveViaPoint { index: usize },
    RemoveNoGoZone { index: usize },
    MoveSimEnemy { id: UnitId, to: LatLon },
    RotateSimEnemy { id: UnitId, facing_deg: f64 },
    RetypeSimEnemy { id: UnitId, kind: ObserverKind },
    RemoveSimEnemy { id: UnitId },
    MoveSimFriendly { id: UnitId, to: LatLon },
    RetypeSimFriendly { id: UnitId, kind: FriendlyKind },
    RemoveSimFriendly { id: UnitId },
    SetSimTemplate { template: SimTemplate },
    ToggleOverlay { plan_id: PlanId },
    SelectReport { id: Option<Uuid> },
    SelectSimulation { id: Option<Uuid> },
    ResetForRegeneration,
    ClearRoutes,
    ClearAll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Applied,
    ModeChanged { previous: InteractionMode },
    Click(ClickOutcome),
    RouteFinished(bool),
    OverlayVisible { plan_id: PlanId, visible: bool },
}

impl MissionSession {
    /// Dispatch one command. Lookup failures leave the session unchanged.
    pub fn apply(&mut self, command: SessionCommand) -> Result<CommandOutcome, SessionError> {
        use SessionCommand as C;
        match command {
            C::SelectMode { mode } => {
                let previous = self.select_mode(mode);
                return Ok(CommandOutcome::ModeChanged { previous });
            }
            C::Click { at, zoom } => return Ok(CommandOutcome::Click(self.handle_click(at, zoom))),
            C::DoubleClick => return Ok(CommandOutcome::Click(self.double_click())),
            C::FinishRoute => return Ok(CommandOutcome::RouteFinished(self.finish_route())),
            C::MoveUnit { id, to } => self.move_unit(id, to)?,
            C::RemoveUnit { id } => self.remove_unit(id)?,
            C::MoveWaypoint { index, to } => self.move_waypoint(index, to)?,
            C::RemoveWaypoint { index } => self.remove_waypoint(index)?,
            C::RemoveViaPoint { index } => self.remove_via_point(index)?,
            C::RemoveNoGoZone { index } => self.remove_no_go_zone(index)?,
            C::MoveSimEnemy { id, to } => self.move_sim_enemy(id, to)?,
            C::RotateSimEnemy { id, facing_deg } => self.rotate_sim_enemy(id, facing_deg)?,
            C::RetypeSimEnemy { id, kind } => self.retype_sim_enemy(id, kind)?,
            C::RemoveSimEnemy { id } => self.remove_sim_enemy(id)?,
            C::MoveSimFriendly { id, to } => self.move_sim_friendly(id, to)?,
            C::RetypeSimFriendly { id, kind } => self.retype_sim_friendly(id, kind)?,
            C::RemoveSimFriendly { id } => self.remove_sim_friendly(id)?,
            C::SetSimTemplate { template } => self.set_sim_template(template),
            C::ToggleOverlay { plan_id } => {
                let visible = self.toggle_overlay(plan_id)?;
                return Ok(CommandOutcome::OverlayVisible { plan_id, visible });
            }
            C::SelectReport { id } => self.select_report(id)?,
            C::SelectSimulation { id } => self.select_simulation(id)?,
            C::ResetForRegeneration => self.reset_for_regeneration(),
            C::ClearRoutes => self.clear_routes(),
            C::ClearAll => self.clear_all(),
        }
        Ok(CommandOutcome::Applied)
    }
}

/// Identity of one rendered map entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityHandle {
    Unit { id: UnitId },
    SimEnemy { id: UnitId },
    SimFriendly { id: UnitId },
    Waypoint { index: usize },
    ViaPoint { index: usize },
    NoGoZone { index: usize },
}

/// Button or drag on an entity's popup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PopupAction {
    Remove,
    MoveTo { at: LatLon },
    Rotate { facing_deg: f64 },
    SetObserverKind { kind: ObserverKind },
    SetFriendlyKind { kind: FriendlyKind },
}

impl EntityHandle {
    /// The command `action` stands for on this entity, if the entity
    /// supports it.
    pub fn command(self, action: PopupAction) -> Option<SessionCommand> {
        use EntityHandle as H;
        use PopupAction as A;
        let command = match (self, action) {
            (H::Unit { id }, A::Remove) => SessionCommand::RemoveUnit { id },
            (H::Unit { id }, A::MoveTo { at }) => SessionCommand::MoveUnit { id, to: at },
            (H::SimEnemy { id }, A::Remove) => SessionCommand::RemoveSimEnemy { id },
            (H::SimEnemy { id }, A::MoveTo { at }) => SessionCommand::MoveSimEnemy { id, to: at },
            (H::SimEnemy { id }, A::Rotate { facing_deg }) => {
                SessionCommand::RotateSimEnemy { id, facing_deg }
            }
            (H::SimEnemy { id }, A::SetObserverKind { kind }) => {
                SessionCommand::RetypeSimEnemy { id, kind }
            }
            (H::SimFriendly { id }, A::Remove) => SessionCommand::RemoveSimFriendly { id },
            (H::SimFriendly { id }, A::MoveTo { at }) => {
                SessionCommand::MoveSimFriendly { id, to: at }
            }
            (H::SimFriendly { id }, A::SetFriendlyKind { kind }) => {
                SessionCommand::RetypeSimFriendly { id, kind }
            }
            (H::Waypoint { index }, A::Remove) => SessionCommand::RemoveWaypoint { index },
            (H::Waypoint { index }, A::MoveTo { at }) => {
                SessionCommand::MoveWaypoint { index, to: at }
            }
            (H::ViaPoint { index }, A::Remove) => SessionCommand::RemoveViaPoint { index },
            (H::NoGoZone { index }, A::Remove) => SessionCommand::RemoveNoGoZone { index },
            _ => return None,
        };
        Some(command)
    }
}
