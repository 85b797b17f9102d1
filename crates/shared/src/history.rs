use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AnalysisOutcome, LatLon, PlanId, ReportPayload};

/// Default number of entries retained per history.
pub const HISTORY_CAP: usize = 20;

pub trait HistoryItem {
    fn id(&self) -> Uuid;
}

/// A generated mission report, frozen at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub plan_id: PlanId,
    /// Centroid of every unit on the map when the plan was generated.
    pub center: LatLon,
    pub report: ReportPayload,
}

impl HistoryItem for ReportEntry {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// A completed simulation run over the drawn route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub center: LatLon,
    pub waypoints: Vec<LatLon>,
    pub outcome: AnalysisOutcome,
}

impl HistoryItem for SimulationEntry {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Most-recent-first list with a fixed capacity and an optional selection.
///
/// The selection lets a past entry be displayed without touching the live
/// result; it is cleared if the selected entry gets evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    cap: usize,
    selected: Option<Uuid>,
}

impl<T: HistoryItem> BoundedHistory<T> {
    pub fn new(cap: usize) -> Self {
        BoundedHistory {
            entries: VecDeque::with_capacity(cap),
            cap: cap.max(1),
            selected: None,
        }
    }

    /// Insert as newest, evicting from the old end beyond capacity.
    pub fn push(&mut self, entry: T) {
        self.entries.push_front(entry);
        while self.entries.len() > self.cap {
            if let Some(evicted) = self.entries.pop_back() {
                if self.selected == Some(evicted.id()) {
                    self.selected = None;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Point the display at a past entry. Returns `false` for unknown ids.
    pub fn select(&mut self, id: Uuid) -> bool {
        if self.get(id).is_some() {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_id(&self) -> Option<Uuid> {
        self.selected
    }

    pub fn selected(&self) -> Option<&T> {
        self.selected.and_then(|id| self.get(id))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.selected = None;
    }
}

impl<T: HistoryItem> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new(HISTORY_CAP)
    }
}
