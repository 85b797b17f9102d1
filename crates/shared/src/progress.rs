//! Progress reporting for long-running route operations.
//!
//! Events only ever drive transient display state. A [`ProgressTracker`]
//! follows at most one request at a time; starting another one, or a
//! disconnect, simply stops listening. The server's progress relay keeps one
//! per watched request, and a client can use the same type to model its own
//! subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Terrain,
    Imagery,
    Routes,
    Risk,
    Scoring,
    Classification,
    Complete,
    Error,
}

impl ProgressStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStage::Complete | ProgressStage::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            ProgressStage::Terrain => "Loading terrain",
            ProgressStage::Imagery => "Fetching imagery",
            ProgressStage::Routes => "Generating routes",
            ProgressStage::Risk => "Assessing risk",
            ProgressStage::Scoring => "Scoring routes",
            ProgressStage::Classification => "Classifying routes",
            ProgressStage::Complete => "Complete",
            ProgressStage::Error => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub request_id: String,
    pub stage: ProgressStage,
    /// Percentage in 0..=100.
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        request_id: impl Into<String>,
        stage: ProgressStage,
        progress: f64,
        message: impl Into<String>,
    ) -> Self {
        let progress = if progress.is_finite() {
            progress.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        ProgressEvent {
            request_id: request_id.into(),
            stage,
            progress,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What the tracker did with an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerUpdate {
    /// Not for the active request; dropped.
    Stale,
    Progress,
    /// Terminal event; the subscription is now closed.
    Finished(ProgressStage),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressTracker {
    active: Option<String>,
    latest: Option<ProgressEvent>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start following `request_id`. Returns the request that was being
    /// followed before, which is no longer listened to.
    pub fn begin(&mut self, request_id: impl Into<String>) -> Option<String> {
        self.latest = None;
        self.active.replace(request_id.into())
    }

    pub fn observe(&mut self, event: ProgressEvent) -> TrackerUpdate {
        if self.active.as_deref() != Some(event.request_id.as_str()) {
            return TrackerUpdate::Stale;
        }
        let stage = event.stage;
        self.latest = Some(event);
        if stage.is_terminal() {
            self.active = None;
            TrackerUpdate::Finished(stage)
        } else {
            TrackerUpdate::Progress
        }
    }

    /// Stop listening. Not an error: the remote operation keeps running.
    pub fn cancel(&mut self) -> Option<String> {
        self.active.take()
    }

    /// Channel dropped by the server or the network.
    pub fn disconnect(&mut self) {
        self.cancel();
    }

    pub fn active_request(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn latest(&self) -> Option<&ProgressEvent> {
        self.latest.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(ProgressEvent::new("r", ProgressStage::Routes, 140.0, "").progress, 100);
        assert_eq!(ProgressEvent::new("r", ProgressStage::Routes, -3.0, "").progress, 0);
        assert_eq!(ProgressEvent::new("r", ProgressStage::Routes, 42.4, "").progress, 42);
        assert_eq!(ProgressEvent::new("r", ProgressStage::Routes, f64::NAN, "").progress, 0);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(ProgressStage::Complete.is_terminal());
        assert!(ProgressStage::Error.is_terminal());
        assert!(!ProgressStage::Classification.is_terminal());
    }

    #[test]
    fn test_tracker_follows_one_request() {
        let mut t = ProgressTracker::new();
        assert_eq!(t.begin("a"), None);
        assert_eq!(
            t.observe(ProgressEvent::new("a", ProgressStage::Terrain, 10.0, "terrain")),
            TrackerUpdate::Progress
        );
        assert_eq!(t.begin("b"), Some("a".to_string()));
        assert!(t.latest().is_none());
        assert_eq!(
            t.observe(ProgressEvent::new("a", ProgressStage::Routes, 50.0, "late")),
            TrackerUpdate::Stale
        );
        assert_eq!(
            t.observe(ProgressEvent::new("b", ProgressStage::Complete, 100.0, "done")),
            TrackerUpdate::Finished(ProgressStage::Complete)
        );
        assert_eq!(t.active_request(), None);
        assert_eq!(t.latest().unwrap().message, "done");
    }

    #[test]
    fn test_events_after_finish_are_stale() {
        let mut t = ProgressTracker::new();
        t.begin("a");
        t.observe(ProgressEvent::new("a", ProgressStage::Error, 0.0, "boom"));
        assert_eq!(
            t.observe(ProgressEvent::new("a", ProgressStage::Routes, 60.0, "")),
            TrackerUpdate::Stale
        );
    }

    #[test]
    fn test_disconnect_is_quiet() {
        let mut t = ProgressTracker::new();
        t.begin("a");
        t.observe(ProgressEvent::new("a", ProgressStage::Risk, 70.0, ""));
        t.disconnect();
        assert_eq!(t.active_request(), None);
        // Last seen state stays displayable.
        assert_eq!(t.latest().unwrap().stage, ProgressStage::Risk);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(ProgressEvent::new("r", ProgressStage::Scoring, 80.0, "x"))
            .unwrap();
        assert_eq!(json["stage"], "scoring");
        assert_eq!(json["progress"], 80);
    }
}
