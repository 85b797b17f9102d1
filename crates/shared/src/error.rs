use thiserror::Error;
use uuid::Uuid;

use crate::models::{PlanId, Side, UnitId};

/// Validation failures detected before any request leaves the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("no {side} units placed: place at least one before generating a plan")]
    MissingUnits { side: Side },
    #[error("every {side} unit already belongs to a plan: place new units or reset to regenerate")]
    AlreadyPlanned { side: Side },
    #[error("the {side} units of this request were removed or planned while it was in flight")]
    StaleBatch { side: Side },
    #[error("draw at least 2 waypoints to analyse a route (found {found})")]
    TooFewWaypoints { found: usize },
    #[error("place at least one enemy observer to run a simulation")]
    NoObservers,
    #[error("route service returned route {route_id} more than once")]
    DuplicateRoute { route_id: u32 },
    #[error("{side} unit {number} is outside the {area}")]
    OutsideRegion {
        side: Side,
        number: usize,
        area: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
    #[error("no waypoint at index {0}")]
    UnknownWaypoint(usize),
    #[error("unknown simulated enemy {0}")]
    UnknownSimEnemy(UnitId),
    #[error("unknown simulated friendly {0}")]
    UnknownSimFriendly(UnitId),
    #[error("no restricted zone at index {0}")]
    UnknownNoGoZone(usize),
    #[error("no history entry {0}")]
    UnknownHistoryEntry(Uuid),
    #[error("no overlay for plan {0}")]
    UnknownPlan(PlanId),
    #[error(transparent)]
    Plan(#[from] PlanError),
}
