//! REST API handlers.
//!
//! Each handler reads/writes via the `TargetRegistry` and returns JSON
//! responses. Config writes are validated here and staged; they become
//! live at the target's next tick, never mid-tick.

use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::StreamExt;

use replicore_core::{AutoscaleConfig, PodResources, TargetSpec, TargetStatus};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// A target spec together with its runtime status.
#[derive(serde::Serialize)]
struct TargetView {
    #[serde(flatten)]
    spec: TargetSpec,
    status: TargetStatus,
}

// ── Targets ────────────────────────────────────────────────────

/// GET /api/v1/targets
pub async fn list_targets(State(state): State<ApiState>) -> impl IntoResponse {
    let targets: Vec<TargetView> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|(spec, status)| TargetView { spec, status })
        .collect();
    ApiResponse::ok(targets)
}

/// GET /api/v1/targets/{ns}/{name}
pub async fn get_target(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.registry.snapshot(&format!("{ns}/{name}")).await {
        Some((spec, status)) => ApiResponse::ok(TargetView { spec, status }).into_response(),
        None => error_response("target not found", StatusCode::NOT_FOUND).into_response(),
    }
}

/// Request body for target registration.
#[derive(serde::Deserialize)]
pub struct CreateTargetRequest {
    pub namespace: String,
    pub name: String,
    pub resources: PodResources,
    pub autoscale: AutoscaleConfig,
    /// Replica count currently running, clamped into bounds.
    #[serde(default = "default_initial_replicas")]
    pub initial_replicas: u32,
}

fn default_initial_replicas() -> u32 {
    1
}

/// POST /api/v1/targets
pub async fn create_target(
    State(state): State<ApiState>,
    Json(req): Json<CreateTargetRequest>,
) -> impl IntoResponse {
    let now = epoch_secs();
    let spec = TargetSpec {
        id: format!("{}/{}", req.namespace, req.name),
        namespace: req.namespace,
        name: req.name,
        resources: req.resources,
        autoscale: req.autoscale,
        created_at: now,
        updated_at: now,
    };
    let key = spec.key();

    match state.registry.register(spec, req.initial_replicas).await {
        Ok(()) => (
            StatusCode::CREATED,
            ApiResponse::ok(serde_json::json!({ "id": key })),
        )
            .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    }
}

/// DELETE /api/v1/targets/{ns}/{name}
pub async fn delete_target(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> impl IntoResponse {
    if state.registry.remove(&format!("{ns}/{name}")).await {
        ApiResponse::ok("deleted").into_response()
    } else {
        error_response("target not found", StatusCode::NOT_FOUND).into_response()
    }
}

// ── Autoscale config ───────────────────────────────────────────

/// GET /api/v1/targets/{ns}/{name}/autoscale
pub async fn get_autoscale(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.registry.snapshot(&format!("{ns}/{name}")).await {
        Some((spec, _)) => ApiResponse::ok(spec.autoscale).into_response(),
        None => error_response("target not found", StatusCode::NOT_FOUND).into_response(),
    }
}

/// PUT /api/v1/targets/{ns}/{name}/autoscale
///
/// Stages the config write; the reconciler picks it up at the next
/// tick boundary. Invalid configs are rejected here and never reach
/// the policy engine.
pub async fn put_autoscale(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
    Json(config): Json<AutoscaleConfig>,
) -> impl IntoResponse {
    match state.registry.stage_config(&format!("{ns}/{name}"), config).await {
        Ok(true) => ApiResponse::ok("staged").into_response(),
        Ok(false) => error_response("target not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    }
}

// ── Manual override ────────────────────────────────────────────

/// Request body for the manual replica override.
#[derive(serde::Deserialize)]
pub struct SetReplicasRequest {
    pub replicas: u32,
}

/// POST /api/v1/targets/{ns}/{name}/replicas
pub async fn set_replicas(
    State(state): State<ApiState>,
    Path((ns, name)): Path<(String, String)>,
    Json(req): Json<SetReplicasRequest>,
) -> impl IntoResponse {
    match state
        .registry
        .stage_manual_replicas(&format!("{ns}/{name}"), req.replicas)
        .await
    {
        Ok(true) => ApiResponse::ok(serde_json::json!({
            "target": format!("{ns}/{name}"),
            "replicas": req.replicas,
            "status": "staged"
        }))
        .into_response(),
        Ok(false) => error_response("target not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    }
}

// ── Decisions ──────────────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct DecisionsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/decisions
pub async fn recent_decisions(
    State(state): State<ApiState>,
    Query(query): Query<DecisionsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50);
    ApiResponse::ok(state.registry.recent_decisions(limit).await)
}

// ── Events ─────────────────────────────────────────────────────

/// GET /api/v1/events — SSE stream of decision events.
///
/// Backed by the bounded event bus: a client that falls behind loses
/// the oldest events rather than stalling the reconciler.
pub async fn events_stream(
    State(state): State<ApiState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => match Event::default().json_data(&event) {
            Ok(sse_event) => Some(Ok(sse_event)),
            Err(_) => None,
        },
        // A lagged observer skips dropped events and keeps streaming.
        Err(BroadcastStreamRecvError::Lagged(_)) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use replicore_controller::TargetRegistry;
    use replicore_core::ScaleMode;
    use replicore_events::EventBus;
    use tower::util::ServiceExt;

    fn test_state() -> (TargetRegistry, EventBus) {
        (TargetRegistry::new(64), EventBus::new(16))
    }

    fn create_body(min: u32, max: u32) -> serde_json::Value {
        serde_json::json!({
            "namespace": "default",
            "name": "api",
            "resources": { "cpu_limit_millis": 500, "memory_limit_bytes": 268435456 },
            "autoscale": {
                "enabled": true,
                "mode": "auto",
                "manual_replicas": null,
                "min_replicas": min,
                "max_replicas": max,
                "targets": { "cpu": 50.0, "memory": null, "request_rate": null },
                "scale_up_window": "30s",
                "scale_down_window": "5m"
            },
            "initial_replicas": 3
        })
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_then_get_target() {
        let (registry, bus) = test_state();
        let app = crate::build_router(registry.clone(), bus);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/targets", create_body(2, 10)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/targets/default/api")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["id"], "default/api");
        assert_eq!(json["data"]["status"]["current_replicas"], 3);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_write_time() {
        let (registry, bus) = test_state();
        let app = crate::build_router(registry, bus);

        // min > max never reaches the policy engine.
        let response = app
            .oneshot(json_request("POST", "/api/v1/targets", create_body(8, 2)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn put_autoscale_stages_but_does_not_apply() {
        let (registry, bus) = test_state();
        let app = crate::build_router(registry.clone(), bus);

        app.clone()
            .oneshot(json_request("POST", "/api/v1/targets", create_body(2, 10)))
            .await
            .unwrap();

        let mut config = create_body(2, 10)["autoscale"].clone();
        config["max_replicas"] = serde_json::json!(20);
        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v1/targets/default/api/autoscale",
                config,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Live config unchanged until the reconciler's next tick.
        let (spec, _) = registry.snapshot("default/api").await.unwrap();
        assert_eq!(spec.autoscale.max_replicas, 10);
        let (_, new) = registry.apply_pending("default/api", 2000).await.unwrap();
        assert_eq!(new.max_replicas, 20);
    }

    #[tokio::test]
    async fn set_replicas_stages_manual_override() {
        let (registry, bus) = test_state();
        let app = crate::build_router(registry.clone(), bus);

        app.clone()
            .oneshot(json_request("POST", "/api/v1/targets", create_body(2, 10)))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/targets/default/api/replicas",
                serde_json::json!({ "replicas": 6 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, new) = registry.apply_pending("default/api", 2000).await.unwrap();
        assert_eq!(new.mode, ScaleMode::Manual);
        assert_eq!(new.manual_replicas, Some(6));
    }

    #[tokio::test]
    async fn out_of_bounds_override_is_rejected() {
        let (registry, bus) = test_state();
        let app = crate::build_router(registry, bus);

        app.clone()
            .oneshot(json_request("POST", "/api/v1/targets", create_body(2, 10)))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/targets/default/api/replicas",
                serde_json::json!({ "replicas": 50 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let (registry, bus) = test_state();
        let app = crate::build_router(registry, bus);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/targets/default/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn decisions_endpoint_returns_recent_first() {
        let (registry, bus) = test_state();
        for i in 0..3u32 {
            registry
                .record_decision(replicore_core::ScalingDecision {
                    target_id: "default/api".to_string(),
                    desired_replicas: i,
                    reason: replicore_core::DecisionReason::MetricsDriven,
                    timestamp: 1000 + i as u64,
                })
                .await;
        }
        let app = crate::build_router(registry, bus);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/decisions?limit=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        let data = json["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["desired_replicas"], 2);
    }
}
