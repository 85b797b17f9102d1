mod types;

use std::sync::Arc;

use async_graphql::futures_util::{Stream, StreamExt};
use async_graphql::{Context, Json, Object, Subscription};
use chrono::{DateTime, Utc};
use georoute_shared::commands::{EntityHandle, PopupAction, SessionCommand};
use georoute_shared::geo;
use georoute_shared::mode::ClickOutcome;
use georoute_shared::models::{AnalysisOutcome, AnalysisRequest, ObserverKind};
use georoute_shared::progress::ProgressStage;
use georoute_shared::session::{AnalysisKind, MissionSession, SimTemplate};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::progress::ProgressHub;
use crate::route_service::RouteService;
use crate::storage::{BacklogEntry, Storage};

pub use types::*;

/// The one live session, shared by every resolver.
pub type SharedSession = Arc<Mutex<MissionSession>>;

fn gql_error(e: impl std::fmt::Display) -> async_graphql::Error {
    async_graphql::Error::new(e.to_string())
}

fn parse_since(since: Option<String>) -> async_graphql::Result<Option<DateTime<Utc>>> {
    since
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| async_graphql::Error::new(format!("Invalid timestamp {}: {}", s, e)))
        })
        .transpose()
}

fn click_result(outcome: &ClickOutcome, session: &MissionSession) -> GqlClickResult {
    GqlClickResult {
        accepted: matches!(outcome, ClickOutcome::Accepted(_)),
        rejection: match outcome {
            ClickOutcome::Rejected(r) => Some(r.to_string()),
            _ => None,
        },
        mode: session.mode().into(),
    }
}

fn new_request_id(request_id: Option<String>) -> String {
    request_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// Query root

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn session(&self, ctx: &Context<'_>) -> async_graphql::Result<GqlSession> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        Ok(GqlSession::from(&*session))
    }

    /// Where and at which zoom placement is allowed.
    async fn region(&self, ctx: &Context<'_>) -> async_graphql::Result<GqlRegion> {
        let session = ctx.data::<SharedSession>()?.lock().await;
        let gate = session.gate();
        Ok(GqlRegion {
            name: gate.geofence.name.clone(),
            bounds: gate.geofence.bounds.into(),
            min_zoom: gate.min_zoom,
        })
    }

    async fn observer_types(&self) -> Vec<GqlObserverType> {
        ObserverKind::ALL
            .iter()
            .map(|kind| {
                let vision = kind.vision();
                GqlObserverType {
                    kind: (*kind).into(),
                    label: kind.label().to_string(),
                    range_m: vision.range_m,
                    fov_deg: vision.fov_deg,
                }
            })
            .collect()
    }

    async fn vision_cone(
        &self,
        apex: LatLonInput,
        facing_deg: f64,
        range_m: f64,
        fov_deg: f64,
    ) -> Vec<GqlLatLon> {
        geo::build_vision_cone(apex.into(), facing_deg, range_m, fov_deg)
            .into_iter()
            .map(GqlLatLon::from)
            .collect()
    }

    /// Recorded generations, newest first.
    async fn backlog(
        &self,
        ctx: &Context<'_>,
        limit: Option<u32>,
        offset: Option<u32>,
        since: Option<String>,
    ) -> async_graphql::Result<Vec<GqlBacklogEntry>> {
        let storage = ctx.data::<Arc<Storage>>()?;
        let entries = storage
            .list(
                limit.unwrap_or(50) as usize,
                offset.unwrap_or(0) as usize,
                parse_since(since)?,
            )
            .map_err(async_graphql::Error::new)?;
        Ok(entries.iter().map(GqlBacklogEntry::from).collect())
    }

    async fn backlog_entry(
        &self,
        ctx: &Context<'_>,
        request_id: String,
    ) -> async_graphql::Result<Option<GqlBacklogEntry>> {
        let storage = ctx.data::<Arc<Storage>>()?;
        let entry = storage.get(&request_id).map_err(async_graphql::Error::new)?;
        Ok(entry.as_ref().map(GqlBacklogEntry::from))
    }

    async fn backlog_count(
        &self,
        ctx: &Context<'_>,
        since: Option<String>,
    ) -> async_graphql::Result<u64> {
        let storage = ctx.data::<Arc<Storage>>()?;
        storage
            .count(parse_since(since)?)
            .map_err(async_graphql::Error::new)
    }
}

// Mutation root

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Switch tools. Returns the mode that was left.
    async fn select_mode(&self, ctx: &Context<'_>, mode: GqlMode) -> async_graphql::Result<GqlMode> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.select_mode(mode.into()).into())
    }

    async fn click(
        &self,
        ctx: &Context<'_>,
        at: LatLonInput,
        zoom: u8,
    ) -> async_graphql::Result<GqlClickResult> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        let outcome = session.handle_click(at.into(), zoom);
        if let ClickOutcome::Rejected(r) = &outcome {
            tracing::debug!(reason = %r, "click rejected");
        }
        Ok(click_result(&outcome, &session))
    }

    async fn double_click(&self, ctx: &Context<'_>) -> async_graphql::Result<GqlClickResult> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        let outcome = session.double_click();
        Ok(click_result(&outcome, &session))
    }

    async fn finish_route(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        Ok(session.finish_route())
    }

    /// Apply any named session command.
    async fn apply_command(
        &self,
        ctx: &Context<'_>,
        command: Json<SessionCommand>,
    ) -> async_graphql::Result<GqlSession> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.apply(command.0).map_err(gql_error)?;
        Ok(GqlSession::from(&*session))
    }

    /// A popup button pressed on one rendered entity.
    async fn popup_action(
        &self,
        ctx: &Context<'_>,
        handle: Json<EntityHandle>,
        action: Json<PopupAction>,
    ) -> async_graphql::Result<GqlSession> {
        let command = handle
            .0
            .command(action.0)
            .ok_or_else(|| async_graphql::Error::new("Action not supported for this entity"))?;
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.apply(command).map_err(gql_error)?;
        Ok(GqlSession::from(&*session))
    }

    async fn set_sim_template(
        &self,
        ctx: &Context<'_>,
        input: SimTemplateInput,
    ) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.set_sim_template(SimTemplate {
            enemy_kind: input.enemy_kind.into(),
            facing_deg: input.facing_deg,
            friendly_kind: input.friendly_kind.into(),
        });
        Ok(true)
    }

    /// Flip one plan's overlay. Returns the new visibility.
    async fn toggle_overlay(&self, ctx: &Context<'_>, plan_id: u32) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.toggle_overlay(plan_id).map_err(gql_error)
    }

    async fn reset_for_regeneration(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.reset_for_regeneration();
        Ok(true)
    }

    async fn clear_routes(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.clear_routes();
        Ok(true)
    }

    async fn clear_all(&self, ctx: &Context<'_>) -> async_graphql::Result<bool> {
        let mut session = ctx.data::<SharedSession>()?.lock().await;
        session.clear_all();
        Ok(true)
    }

    /// Generate routes for the units unassigned at call time and record them
    /// as a new plan.
    async fn generate_plan(
        &self,
        ctx: &Context<'_>,
        input: GeneratePlanInput,
    ) -> async_graphql::Result<GqlPlanResult> {
        let session = ctx.data::<SharedSession>()?;
        let service = ctx.data::<Arc<dyn RouteService>>()?;
        let hub = ctx.data::<ProgressHub>()?;
        let storage = ctx.data::<Arc<Storage>>()?;

        let request_id = new_request_id(input.request_id);
        let request = session
            .lock()
            .await
            .generation_request(
                &request_id,
                input.bounds.into(),
                input.zoom,
                input.analysis_depth.map(Into::into).unwrap_or_default(),
            )
            .map_err(gql_error)?;

        hub.report(&request_id, ProgressStage::Imagery, 5.0, "Connecting...");
        service.watch_progress(&request_id, hub);

        let outcome = match service.plan_routes(&request).await {
            Ok(outcome) => outcome,
            Err(message) => {
                tracing::warn!(%request_id, %message, "route generation failed");
                hub.report(&request_id, ProgressStage::Error, 0.0, &message);
                return Err(async_graphql::Error::new(message));
            }
        };
        let routes = outcome.routes.clone();
        let report = outcome.report.clone();

        let assignment = session
            .lock()
            .await
            .generate_plan(&request, outcome)
            .map_err(|e| {
                hub.report(&request_id, ProgressStage::Error, 0.0, &e.to_string());
                gql_error(e)
            })?;

        let entry = BacklogEntry {
            request_id: request_id.clone(),
            created_at: Utc::now(),
            plan_id: assignment.plan_id,
            request,
            routes: routes.clone(),
            report,
            sequence: 0,
        };
        match storage.append(&entry) {
            Ok(evicted) if evicted > 0 => tracing::debug!(evicted, "backlog trimmed"),
            Ok(_) => {}
            Err(e) => tracing::error!(%request_id, error = %e, "failed to record backlog entry"),
        }

        tracing::info!(
            %request_id,
            plan_id = assignment.plan_id,
            friendlies = assignment.friendlies.len(),
            enemies = assignment.enemies.len(),
            routes = routes.len(),
            "plan generated"
        );
        hub.report(
            &request_id,
            ProgressStage::Complete,
            100.0,
            &format!("Plan {} ready", assignment.plan_id),
        );

        Ok(GqlPlanResult {
            request_id,
            plan_id: assignment.plan_id,
            friendlies: assignment.friendlies.iter().map(|id| id.to_string().into()).collect(),
            enemies: assignment.enemies.iter().map(|id| id.to_string().into()).collect(),
            routes: routes.iter().map(GqlRoute::from).collect(),
            report_entry_id: assignment.report_entry.map(uuid_id),
        })
    }

    /// Evaluate the drawn route against a unit composition.
    async fn evaluate_route(
        &self,
        ctx: &Context<'_>,
        input: EvaluateRouteInput,
    ) -> async_graphql::Result<GqlAnalysis> {
        let request_id = new_request_id(input.request_id.clone());
        let request = ctx
            .data::<SharedSession>()?
            .lock()
            .await
            .evaluation_request(&request_id, input.bounds.into(), input.composition())
            .map_err(gql_error)?;
        run_analysis(ctx, AnalysisKind::Evaluation, request).await
    }

    /// Simulate the drawn route against the placed observers.
    async fn simulate_route(
        &self,
        ctx: &Context<'_>,
        input: SimulateRouteInput,
    ) -> async_graphql::Result<GqlAnalysis> {
        let request_id = new_request_id(input.request_id);
        let request = ctx
            .data::<SharedSession>()?
            .lock()
            .await
            .simulation_request(&request_id, input.bounds.into())
            .map_err(gql_error)?;
        run_analysis(ctx, AnalysisKind::Simulation, request).await
    }
}

/// Call the service for a validated request and commit the result.
async fn run_analysis(
    ctx: &Context<'_>,
    kind: AnalysisKind,
    request: AnalysisRequest,
) -> async_graphql::Result<GqlAnalysis> {
    let service = ctx.data::<Arc<dyn RouteService>>()?;
    let hub = ctx.data::<ProgressHub>()?;
    let request_id = request.request_id.clone();

    hub.report(&request_id, ProgressStage::Imagery, 5.0, "Connecting...");
    service.watch_progress(&request_id, hub);

    let result: Result<AnalysisOutcome, String> = match kind {
        AnalysisKind::Evaluation => service.evaluate_route(&request).await,
        AnalysisKind::Simulation => service.simulate(&request).await,
    };
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(message) => {
            tracing::warn!(%request_id, ?kind, %message, "route analysis failed");
            hub.report(&request_id, ProgressStage::Error, 0.0, &message);
            return Err(async_graphql::Error::new(message));
        }
    };

    let entry = ctx
        .data::<SharedSession>()?
        .lock()
        .await
        .apply_analysis(kind, request.waypoints, outcome.clone());
    tracing::info!(
        %request_id,
        ?kind,
        segments = outcome.segment_analysis.len(),
        "route analysis stored"
    );
    hub.report(&request_id, ProgressStage::Complete, 100.0, "Analysis complete");
    Ok(GqlAnalysis::new(Some(kind), &outcome, entry))
}

// Subscription root

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Progress of one request; ends after `COMPLETE` or `ERROR`.
    async fn progress(
        &self,
        ctx: &Context<'_>,
        request_id: String,
    ) -> async_graphql::Result<impl Stream<Item = GqlProgressEvent>> {
        let hub = ctx.data::<ProgressHub>()?;
        Ok(hub.subscribe(request_id).map(GqlProgressEvent::from))
    }
}

pub type Schema = async_graphql::Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

pub fn build_schema(
    session: SharedSession,
    storage: Arc<Storage>,
    service: Arc<dyn RouteService>,
    hub: ProgressHub,
) -> Schema {
    async_graphql::Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(session)
        .data(storage)
        .data(service)
        .data(hub)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route_service::ServiceFuture;
    use tokio::sync::Notify;
    use georoute_shared::models::{
        CoverStatus, GenerationOutcome, OverlayImage, ReportPayload, Route, RouteRequest,
        SegmentCoverAnalysis, TacticalScores,
    };

    /// Route service returning canned answers, or a failure for every call.
    struct StubService {
        failure: Option<String>,
        /// When set, route generation signals the first notify and then waits
        /// on the second before answering.
        hold: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl RouteService for StubService {
        fn plan_routes<'a>(
            &'a self,
            request: &'a RouteRequest,
        ) -> ServiceFuture<'a, GenerationOutcome> {
            Box::pin(async move {
                if let Some((started, release)) = &self.hold {
                    started.notify_one();
                    release.notified().await;
                }
                if let Some(message) = &self.failure {
                    return Err(message.clone());
                }
                let route = |id: u32| Route {
                    route_id: id,
                    name: format!("Route {}", id),
                    waypoints: vec![request.soldiers[0].position(), request.enemies[0].position()],
                    segments: vec![],
                    verdict: None,
                };
                Ok(GenerationOutcome {
                    routes: vec![route(1), route(2), route(3)],
                    overlay: Some(OverlayImage {
                        image: "data:image/png;base64,AAAA".to_string(),
                        bounds: request.bounds,
                    }),
                    report: Some(ReportPayload {
                        mission_assessment: "Flank from the north".to_string(),
                        recommended_route_id: Some(2),
                        ..Default::default()
                    }),
                })
            })
        }

        fn evaluate_route<'a>(
            &'a self,
            request: &'a AnalysisRequest,
        ) -> ServiceFuture<'a, AnalysisOutcome> {
            self.simulate(request)
        }

        fn simulate<'a>(&'a self, _request: &'a AnalysisRequest) -> ServiceFuture<'a, AnalysisOutcome> {
            Box::pin(async move {
                if let Some(message) = &self.failure {
                    return Err(message.clone());
                }
                let mut outcome = AnalysisOutcome {
                    scores: Some(TacticalScores {
                        overall_score: 72.0,
                        ..Default::default()
                    }),
                    assessment: "Segment 1 is screened by buildings".to_string(),
                    ..Default::default()
                };
                outcome.segment_analysis.insert(
                    0,
                    SegmentCoverAnalysis {
                        status: CoverStatus::Covered,
                        explanation: None,
                        blocking_feature: Some("building".to_string()),
                    },
                );
                Ok(outcome)
            })
        }
    }

    fn test_schema(failure: Option<&str>) -> (tempfile::TempDir, Schema, SharedSession) {
        schema_with(StubService {
            failure: failure.map(str::to_string),
            hold: None,
        })
    }

    fn schema_with(stub: StubService) -> (tempfile::TempDir, Schema, SharedSession) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("test.redb"), 100).unwrap();
        let session: SharedSession = Arc::new(Mutex::new(MissionSession::default()));
        let service: Arc<dyn RouteService> = Arc::new(stub);
        let schema = build_schema(session.clone(), storage, service, ProgressHub::new());
        (dir, schema, session)
    }

    async fn run(schema: &Schema, query: &str) -> serde_json::Value {
        let res = schema.execute(query).await;
        assert!(res.errors.is_empty(), "unexpected errors: {:?}", res.errors);
        res.data.into_json().unwrap()
    }

    async fn run_err(schema: &Schema, query: &str) -> String {
        let res = schema.execute(query).await;
        assert_eq!(res.errors.len(), 1, "expected one error");
        res.errors[0].message.clone()
    }

    async fn place(schema: &Schema, mode: &str, lat: f64, lon: f64) {
        run(schema, &format!("mutation {{ selectMode(mode: {}) }}", mode)).await;
        let data = run(
            schema,
            &format!(
                "mutation {{ click(at: {{lat: {}, lon: {}}}, zoom: 18) {{ accepted mode }} }}",
                lat, lon
            ),
        )
        .await;
        assert_eq!(data["click"]["accepted"], true);
        assert_eq!(data["click"]["mode"], "IDLE");
    }

    const GENERATE: &str = r#"mutation {
        generatePlan(input: {
            requestId: "req-1",
            bounds: {north: 24.8, south: 24.6, east: 46.8, west: 46.6},
            zoom: 17
        }) { requestId planId friendlies enemies routes { routeId } reportEntryId }
    }"#;

    #[tokio::test]
    async fn test_generate_plan_assigns_units_and_records_backlog() {
        let (_dir, schema, _session) = test_schema(None);
        place(&schema, "PLACE_SOLDIER", 24.70, 46.70).await;
        place(&schema, "PLACE_SOLDIER", 24.70, 46.71).await;
        place(&schema, "PLACE_ENEMY", 24.72, 46.70).await;

        let data = run(&schema, GENERATE).await;
        assert_eq!(data["generatePlan"]["planId"], 1);
        assert_eq!(data["generatePlan"]["friendlies"].as_array().unwrap().len(), 2);
        assert_eq!(data["generatePlan"]["routes"].as_array().unwrap().len(), 3);
        assert!(data["generatePlan"]["reportEntryId"].is_string());

        let data = run(
            &schema,
            "{ session { nextPlanId units { side planId planNumber } overlays { planId visible } report { recommendedRouteId } } backlogCount }",
        )
        .await;
        let session = &data["session"];
        assert_eq!(session["nextPlanId"], 2);
        let numbers: Vec<(String, i64)> = session["units"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| {
                assert_eq!(u["planId"], 1);
                (u["side"].as_str().unwrap().to_string(), u["planNumber"].as_i64().unwrap())
            })
            .collect();
        assert_eq!(
            numbers,
            vec![
                ("FRIENDLY".to_string(), 1),
                ("FRIENDLY".to_string(), 2),
                ("ENEMY".to_string(), 1)
            ]
        );
        assert_eq!(session["overlays"][0]["visible"], true);
        assert_eq!(session["report"]["recommendedRouteId"], 2);
        assert_eq!(data["backlogCount"], 1);

        let data = run(&schema, r#"{ backlogEntry(requestId: "req-1") { planId soldiers enemies } }"#).await;
        assert_eq!(data["backlogEntry"]["soldiers"], 2);
        assert_eq!(data["backlogEntry"]["enemies"], 1);
    }

    #[tokio::test]
    async fn test_unit_placed_during_generation_waits_for_next_plan() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (_dir, schema, session) = schema_with(StubService {
            failure: None,
            hold: Some((started.clone(), release.clone())),
        });
        place(&schema, "PLACE_SOLDIER", 24.70, 46.70).await;
        place(&schema, "PLACE_ENEMY", 24.72, 46.70).await;

        let in_flight = tokio::spawn({
            let schema = schema.clone();
            async move { schema.execute(GENERATE).await }
        });
        started.notified().await;
        place(&schema, "PLACE_SOLDIER", 24.70, 46.72).await;
        release.notify_one();

        let res = in_flight.await.unwrap();
        assert!(res.errors.is_empty(), "unexpected errors: {:?}", res.errors);
        let data = res.data.into_json().unwrap();
        assert_eq!(data["generatePlan"]["friendlies"].as_array().unwrap().len(), 1);
        let late = session.lock().await.ledger().units()[2].clone();
        assert_eq!(late.plan, None);

        // Nothing holds the second generation back.
        release.notify_one();
        place(&schema, "PLACE_ENEMY", 24.73, 46.70).await;
        let data = run(
            &schema,
            r#"mutation {
                generatePlan(input: {
                    requestId: "req-2",
                    bounds: {north: 24.8, south: 24.6, east: 46.8, west: 46.6},
                    zoom: 17
                }) { planId friendlies }
            }"#,
        )
        .await;
        assert_eq!(data["generatePlan"]["planId"], 2);
        assert_eq!(data["generatePlan"]["friendlies"], serde_json::json!([late.id.to_string()]));
    }

    #[tokio::test]
    async fn test_generate_without_enemies_is_rejected() {
        let (_dir, schema, session) = test_schema(None);
        place(&schema, "PLACE_SOLDIER", 24.70, 46.70).await;
        let message = run_err(&schema, GENERATE).await;
        assert!(message.contains("no enemy units placed"), "{}", message);
        assert!(session.lock().await.ledger().units()[0].plan.is_none());
    }

    #[tokio::test]
    async fn test_service_failure_leaves_session_untouched() {
        let (_dir, schema, session) = test_schema(Some("Enemy positions are outside imagery coverage"));
        place(&schema, "PLACE_SOLDIER", 24.70, 46.70).await;
        place(&schema, "PLACE_ENEMY", 24.72, 46.70).await;

        let message = run_err(&schema, GENERATE).await;
        assert_eq!(message, "Enemy positions are outside imagery coverage");
        let session = session.lock().await;
        assert!(session.ledger().units().iter().all(|u| u.plan.is_none()));
        assert_eq!(session.ledger().next_plan_id(), 1);
        assert!(session.ledger().routes().is_empty());
        drop(session);
        let data = run(&schema, "{ backlogCount }").await;
        assert_eq!(data["backlogCount"], 0);
    }

    #[tokio::test]
    async fn test_low_zoom_click_reports_advisory() {
        let (_dir, schema, session) = test_schema(None);
        run(&schema, "mutation { selectMode(mode: PLACE_ENEMY) }").await;
        let data = run(
            &schema,
            "mutation { click(at: {lat: 24.7, lon: 46.7}, zoom: 15) { accepted rejection mode } }",
        )
        .await;
        assert_eq!(data["click"]["accepted"], false);
        assert_eq!(data["click"]["mode"], "PLACE_ENEMY");
        assert!(data["click"]["rejection"].as_str().unwrap().contains("17"));
        assert!(session.lock().await.ledger().units().is_empty());
    }

    async fn draw_route(schema: &Schema) {
        run(schema, "mutation { selectMode(mode: DRAW_ROUTE) }").await;
        for lon in [46.700, 46.701] {
            run(
                schema,
                &format!("mutation {{ click(at: {{lat: 24.7, lon: {}}}, zoom: 18) {{ accepted }} }}", lon),
            )
            .await;
        }
        let data = run(schema, "mutation { finishRoute }").await;
        assert_eq!(data["finishRoute"], true);
    }

    const SIMULATE: &str = r#"mutation {
        simulateRoute(input: {bounds: {north: 24.8, south: 24.6, east: 46.8, west: 46.6}}) {
            kind assessment historyEntryId scores { overallScore }
        }
    }"#;

    #[tokio::test]
    async fn test_simulation_requires_observers() {
        let (_dir, schema, _session) = test_schema(None);
        draw_route(&schema).await;
        let message = run_err(&schema, SIMULATE).await;
        assert!(message.contains("enemy observer"), "{}", message);
    }

    #[tokio::test]
    async fn test_simulation_stores_analysis_and_history() {
        let (_dir, schema, _session) = test_schema(None);
        place(&schema, "PLACE_SIM_ENEMY", 24.7005, 46.7005).await;
        draw_route(&schema).await;

        let data = run(&schema, SIMULATE).await;
        assert_eq!(data["simulateRoute"]["kind"], "SIMULATION");
        assert!(data["simulateRoute"]["historyEntryId"].is_string());

        let data = run(
            &schema,
            "{ session { segmentCovers { source status blockingFeature: tooltip } simulationHistory { id } analysis { assessment } } }",
        )
        .await;
        let cover = &data["session"]["segmentCovers"][0];
        assert_eq!(cover["source"], "SUPPLIED");
        assert_eq!(cover["status"], "COVERED");
        assert_eq!(data["session"]["simulationHistory"].as_array().unwrap().len(), 1);
        assert_eq!(
            data["session"]["analysis"]["assessment"],
            "Segment 1 is screened by buildings"
        );
    }

    #[tokio::test]
    async fn test_popup_action_removes_entity() {
        let (_dir, schema, session) = test_schema(None);
        place(&schema, "PLACE_SIM_ENEMY", 24.70, 46.70).await;
        let id = session.lock().await.sim_enemies()[0].id.to_string();
        let query = format!(
            r#"mutation {{ popupAction(handle: {{entity: "sim_enemy", id: "{}"}}, action: {{action: "remove"}}) {{ simEnemies {{ id }} }} }}"#,
            id
        );
        let data = run(&schema, &query).await;
        assert!(data["popupAction"]["simEnemies"].as_array().unwrap().is_empty());

        let message = run_err(&schema, &query).await;
        assert!(message.contains("unknown simulated enemy"), "{}", message);
    }

    #[tokio::test]
    async fn test_apply_command_toggles_overlay() {
        let (_dir, schema, _session) = test_schema(None);
        place(&schema, "PLACE_SOLDIER", 24.70, 46.70).await;
        place(&schema, "PLACE_ENEMY", 24.72, 46.70).await;
        run(&schema, GENERATE).await;

        let data = run(
            &schema,
            r#"mutation { applyCommand(command: {type: "toggle_overlay", plan_id: 1}) { overlays { visible } } }"#,
        )
        .await;
        assert_eq!(data["applyCommand"]["overlays"][0]["visible"], false);

        let data = run(&schema, "mutation { resetForRegeneration }").await;
        assert_eq!(data["resetForRegeneration"], true);
        let data = run(&schema, "{ session { units { planId } routes { routeId } } }").await;
        assert!(data["session"]["routes"].as_array().unwrap().is_empty());
        assert!(data["session"]["units"][0]["planId"].is_null());
    }

    #[tokio::test]
    async fn test_region_and_catalogue() {
        let (_dir, schema, _session) = test_schema(None);
        let data = run(
            &schema,
            "{ region { name minZoom bounds { north } } observerTypes { kind rangeM fovDeg } }",
        )
        .await;
        assert_eq!(data["region"]["name"], "Gulf region");
        assert_eq!(data["region"]["minZoom"], 17);
        assert_eq!(data["observerTypes"][0]["kind"], "SNIPER");
        assert_eq!(data["observerTypes"][0]["rangeM"], 800.0);
    }

    #[tokio::test]
    async fn test_vision_cone_query() {
        let (_dir, schema, _session) = test_schema(None);
        let data = run(
            &schema,
            "{ visionCone(apex: {lat: 24.7, lon: 46.7}, facingDeg: 90, rangeM: 100, fovDeg: 60) { lat lon } }",
        )
        .await;
        let cone = data["visionCone"].as_array().unwrap();
        assert!(cone.len() >= 3);
        assert_eq!(cone[0]["lat"], 24.7);
    }

    #[tokio::test]
    async fn test_progress_subscription_ends_on_complete() {
        let hub = ProgressHub::new();
        let schema = async_graphql::Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
            .data(hub.clone())
            .finish();
        let mut stream = schema.execute_stream(r#"subscription { progress(requestId: "r1") { stage progress } }"#);

        // Let the subscription register before publishing.
        let publisher = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            hub.report("r1", ProgressStage::Routes, 40.0, "routes");
            hub.report("r1", ProgressStage::Complete, 100.0, "done");
        });

        let first = stream.next().await.unwrap().data.into_json().unwrap();
        assert_eq!(first["progress"]["stage"], "ROUTES");
        let second = stream.next().await.unwrap().data.into_json().unwrap();
        assert_eq!(second["progress"]["stage"], "COMPLETE");
        assert!(stream.next().await.is_none());
        publisher.await.unwrap();
    }
}
