//! Client for the external route-generation and evaluation service.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use georoute_shared::models::{AnalysisOutcome, AnalysisRequest, GenerationOutcome, RouteRequest};
use georoute_shared::progress::{ProgressEvent, ProgressStage, ProgressTracker, TrackerUpdate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::progress::ProgressHub;

pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// How long a progress relay may stay connected.
const RELAY_TIMEOUT: Duration = Duration::from_secs(300);

pub trait RouteService: Send + Sync {
    fn plan_routes<'a>(&'a self, request: &'a RouteRequest) -> ServiceFuture<'a, GenerationOutcome>;

    fn evaluate_route<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> ServiceFuture<'a, AnalysisOutcome>;

    fn simulate<'a>(&'a self, request: &'a AnalysisRequest) -> ServiceFuture<'a, AnalysisOutcome>;

    /// Forward the service's own progress for `request_id` into `hub`.
    fn watch_progress(&self, _request_id: &str, _hub: &ProgressHub) {}
}

/// Pull the service-provided reason out of an error body, else `fallback`.
pub fn failure_message(body: &str, fallback: &str) -> String {
    let reason = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|d| d.as_str()).map(str::to_string))
        })
        .filter(|s| !s.trim().is_empty());
    reason.unwrap_or_else(|| fallback.to_string())
}

pub struct HttpRouteService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRouteService {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpRouteService {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<T, String> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%url, error = %e, "route service unreachable");
                format!("{}: {}", fallback, e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = failure_message(&body, fallback);
            tracing::warn!(%url, status = status.as_u16(), %message, "route service error");
            return Err(message);
        }
        resp.json::<T>()
            .await
            .map_err(|e| format!("{}: malformed response: {}", fallback, e))
    }
}

impl RouteService for HttpRouteService {
    fn plan_routes<'a>(&'a self, request: &'a RouteRequest) -> ServiceFuture<'a, GenerationOutcome> {
        Box::pin(self.post_json("/api/plan-tactical-attack", request, "Tactical planning failed"))
    }

    fn evaluate_route<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> ServiceFuture<'a, AnalysisOutcome> {
        Box::pin(self.post_json("/api/evaluate-route", request, "Route evaluation failed"))
    }

    fn simulate<'a>(&'a self, request: &'a AnalysisRequest) -> ServiceFuture<'a, AnalysisOutcome> {
        Box::pin(self.post_json(
            "/api/analyze-tactical-simulation",
            request,
            "Tactical simulation analysis failed",
        ))
    }

    fn watch_progress(&self, request_id: &str, hub: &ProgressHub) {
        let url = format!("{}/api/progress/{}", self.base_url, request_id);
        let client = self.client.clone();
        let hub = hub.clone();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            let relay = relay_progress(client, &url, &request_id, &hub);
            match tokio::time::timeout(RELAY_TIMEOUT, relay).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(%request_id, error = %e, "progress relay closed"),
                Err(_) => tracing::debug!(%request_id, "progress relay timed out"),
            }
        });
    }
}

/// One `data:` payload of the service's event stream.
#[derive(Debug, Deserialize)]
struct RemoteProgress {
    /// Absent when the stream only ever carries one request.
    #[serde(default)]
    request_id: Option<String>,
    stage: ProgressStage,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    message: String,
}

/// Remove every complete event from `buffer`, returning their `data:` lines
/// joined per event.
fn drain_sse_events(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut events = Vec::new();
    while let Some(end) = buffer.windows(2).position(|w| w == b"\n\n") {
        let frame: Vec<u8> = buffer.drain(..end + 2).collect();
        let text = String::from_utf8_lossy(&frame);
        let data: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if !data.is_empty() {
            events.push(data.join("\n"));
        }
    }
    events
}

async fn relay_progress(
    client: reqwest::Client,
    url: &str,
    request_id: &str,
    hub: &ProgressHub,
) -> Result<(), String> {
    let mut resp = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())?;

    let mut tracker = ProgressTracker::new();
    tracker.begin(request_id);
    let mut buffer = Vec::new();
    while let Some(chunk) = resp.chunk().await.map_err(|e| e.to_string())? {
        buffer.extend_from_slice(&chunk);
        if forward_frames(drain_sse_events(&mut buffer), &mut tracker, hub) {
            return Ok(());
        }
    }
    tracker.disconnect();
    Ok(())
}

/// Publish the frames that belong to the tracked request. Returns true once
/// a terminal stage went out; later frames are dropped.
fn forward_frames(frames: Vec<String>, tracker: &mut ProgressTracker, hub: &ProgressHub) -> bool {
    for data in frames {
        let Some(active) = tracker.active_request().map(str::to_string) else {
            return true;
        };
        let p = match serde_json::from_str::<RemoteProgress>(&data) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(request_id = %active, error = %e, "skipping progress frame");
                continue;
            }
        };
        let event = ProgressEvent::new(
            p.request_id.unwrap_or(active),
            p.stage,
            p.progress,
            p.message,
        );
        match tracker.observe(event.clone()) {
            TrackerUpdate::Stale => {}
            TrackerUpdate::Progress => hub.publish(event),
            TrackerUpdate::Finished(_) => {
                hub.publish(event);
                return true;
            }
        }
    }
    tracker.active_request().is_none()
}
