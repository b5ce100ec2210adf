//! replicore-api — REST API for the Replicore control plane.
//!
//! Config writes land in the registry (validated here, applied by the
//! reconciler at the next tick boundary); live decisions stream out
//! over SSE from the event bus.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/targets` | List targets with status |
//! | POST | `/api/v1/targets` | Register a target |
//! | GET | `/api/v1/targets/{ns}/{name}` | Get one target |
//! | DELETE | `/api/v1/targets/{ns}/{name}` | Remove a target |
//! | GET | `/api/v1/targets/{ns}/{name}/autoscale` | Read autoscale config |
//! | PUT | `/api/v1/targets/{ns}/{name}/autoscale` | Stage an autoscale config write |
//! | POST | `/api/v1/targets/{ns}/{name}/replicas` | Manual replica override |
//! | GET | `/api/v1/decisions` | Recent scaling decisions |
//! | GET | `/api/v1/events` | SSE stream of decision events |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};

use replicore_controller::TargetRegistry;
use replicore_events::EventBus;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: TargetRegistry,
    pub bus: EventBus,
}

/// Build the complete API router.
pub fn build_router(registry: TargetRegistry, bus: EventBus) -> Router {
    let state = ApiState { registry, bus };

    let api_routes = Router::new()
        .route(
            "/targets",
            get(handlers::list_targets).post(handlers::create_target),
        )
        .route(
            "/targets/{ns}/{name}",
            get(handlers::get_target).delete(handlers::delete_target),
        )
        .route(
            "/targets/{ns}/{name}/autoscale",
            get(handlers::get_autoscale).put(handlers::put_autoscale),
        )
        .route("/targets/{ns}/{name}/replicas", post(handlers::set_replicas))
        .route("/decisions", get(handlers::recent_decisions))
        .route("/events", get(handlers::events_stream))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
