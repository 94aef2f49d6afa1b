//! HTTP routes
//!
//! Every handler goes through the scheduler's command channel, so HTTP
//! requests are serialized with ticks the same way operator commands are.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sylon_arena::{ArenaError, SchedulerHandle};
use sylon_types::{Arena, LeaderboardEntry, Prediction};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: SchedulerHandle,
    pub leaderboard_limit: u32,
    pub max_leaderboard_limit: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/leaderboard", get(leaderboard))
        .route("/arenas", get(list_open_arenas))
        .route("/arenas/:arena_id", get(get_arena))
        .route("/arenas/:arena_id/predictions", post(submit_prediction))
        .route("/arenas/:arena_id/resolve", post(resolve_arena))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

/// `ArenaError` rendered as `{ "error", "code" }`
#[derive(Debug)]
pub struct ApiError(ArenaError);

impl From<ArenaError> for ApiError {
    fn from(err: ArenaError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            ArenaError::InvalidPrediction(_)
            | ArenaError::InvalidOutcome(_)
            | ArenaError::InvalidUsername(_) => StatusCode::BAD_REQUEST,
            ArenaError::ArenaNotFound(_) => StatusCode::NOT_FOUND,
            ArenaError::DuplicatePrediction { .. }
            | ArenaError::AlreadyResolved(_)
            | ArenaError::ArenaClosed(_)
            | ArenaError::DeadlineNotReached(_)
            | ArenaError::ManualResolutionNotAllowed { .. } => StatusCode::CONFLICT,
            ArenaError::PriceOracleUnavailable(_)
            | ArenaError::NoOracle(_)
            | ArenaError::SchedulerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ArenaError::InvalidArena(_) | ArenaError::InvalidConfig(_) | ArenaError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.kind(), "Request failed");
        }
        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Handlers
// =============================================================================

async fn home() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Sylon",
        "description": "Public prediction leaderboard",
        "endpoints": [
            "/leaderboard",
            "/arenas",
            "/arenas/{arena_id}",
            "/arenas/{arena_id}/predictions",
            "/arenas/{arena_id}/resolve",
        ],
    }))
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<u32>,
}

/// Public leaderboard row; usernames are shown with a leading `@`
#[derive(Debug, Serialize)]
struct LeaderboardRow {
    rank: u32,
    username: String,
    accuracy: f64,
    wins: u32,
    losses: u32,
    current_streak: u32,
    max_streak: u32,
}

impl From<LeaderboardEntry> for LeaderboardRow {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            rank: entry.rank,
            username: format!("@{}", entry.username),
            accuracy: entry.accuracy,
            wins: entry.wins,
            losses: entry.losses,
            current_streak: entry.current_streak,
            max_streak: entry.max_streak,
        }
    }
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = query
        .limit
        .unwrap_or(state.leaderboard_limit)
        .min(state.max_leaderboard_limit);
    let rows: Vec<LeaderboardRow> = state
        .scheduler
        .leaderboard(limit)
        .await?
        .into_iter()
        .map(LeaderboardRow::from)
        .collect();
    Ok(Json(json!({ "leaderboard": rows })))
}

async fn list_open_arenas(State(state): State<AppState>) -> ApiResult<Json<Vec<Arena>>> {
    Ok(Json(state.scheduler.list_open().await?))
}

async fn get_arena(State(state): State<AppState>, Path(arena_id): Path<String>) -> ApiResult<Json<Arena>> {
    Ok(Json(state.scheduler.get_arena(&arena_id).await?))
}

#[derive(Debug, Deserialize)]
struct PredictionRequest {
    username: String,
    prediction: String,
}

async fn submit_prediction(
    State(state): State<AppState>,
    Path(arena_id): Path<String>,
    Json(request): Json<PredictionRequest>,
) -> ApiResult<(StatusCode, Json<Prediction>)> {
    let prediction = state
        .scheduler
        .predict(&arena_id, &request.username, &request.prediction)
        .await?;
    Ok((StatusCode::CREATED, Json(prediction)))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    outcome: String,
}

async fn resolve_arena(
    State(state): State<AppState>,
    Path(arena_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<Arena>> {
    Ok(Json(state.scheduler.resolve(&arena_id, &request.outcome).await?))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use sylon_arena::{
        command_channel, FactoryConfig, ManualOracle, OracleRegistry, RotationPolicy, Scheduler,
        SchedulerConfig,
    };
    use sylon_db::ArenaStore;
    use sylon_types::{ArenaCondition, ArenaId, ArenaStatus, ArenaType};
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        macro_id: String,
        price_id: String,
        _stop: oneshot::Sender<()>,
    }

    fn seeded(seq: u32, condition: ArenaCondition) -> Arena {
        // Yesterday's id keeps clear of the arenas the scheduler creates today
        let now = Utc::now();
        Arena {
            arena_id: ArenaId::for_slot((now - Duration::days(1)).date_naive(), seq),
            asset: condition.arena_type().is_price_based().then(|| "BTC".to_string()),
            condition,
            question: format!("seeded {seq}"),
            rules: "rules".to_string(),
            deadline: now + Duration::days(2),
            status: ArenaStatus::Open,
            outcome: None,
            resolved_price: None,
            created_at: now - Duration::days(1),
            resolved_at: None,
        }
    }

    async fn app() -> TestApp {
        let store = ArenaStore::in_memory().await.unwrap();
        let macro_arena = seeded(1, ArenaCondition::Macro);
        let price_arena = seeded(
            2,
            ArenaCondition::HitTarget {
                target: Decimal::from(90000),
            },
        );
        store.create_arena(&macro_arena).await.unwrap();
        store.create_arena(&price_arena).await.unwrap();

        let scheduler = Scheduler::new(
            store,
            FactoryConfig {
                rotation: RotationPolicy::Fixed {
                    arena_type: ArenaType::Macro,
                },
                ..Default::default()
            },
            OracleRegistry::new().with(ArenaType::Macro, Arc::new(ManualOracle)),
            SchedulerConfig::default(),
        )
        .unwrap();

        let (handle, commands) = command_channel(16);
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(scheduler.run(commands, async {
            let _ = stopped.await;
        }));

        TestApp {
            router: router(AppState {
                scheduler: handle,
                leaderboard_limit: 20,
                max_leaderboard_limit: 100,
            }),
            macro_id: macro_arena.arena_id.to_string(),
            price_id: price_arena.arena_id.to_string(),
            _stop: stop,
        }
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json");
        let body = match body {
            Some(json) => Body::from(serde_json::to_vec(&json).unwrap()),
            None => Body::empty(),
        };

        let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_home() {
        let app = app().await;
        let (status, body) = call(&app.router, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Sylon");
        assert!(body["endpoints"].as_array().unwrap().contains(&json!("/leaderboard")));
    }

    #[tokio::test]
    async fn test_prediction_flow_and_leaderboard() {
        let app = app().await;
        let predict = format!("/arenas/{}/predictions", app.macro_id);

        let (status, body) = call(
            &app.router,
            "POST",
            &predict,
            Some(json!({ "username": "@Alice", "prediction": "yes" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["prediction"], "YES");

        let (status, body) = call(
            &app.router,
            "POST",
            &predict,
            Some(json!({ "username": "alice", "prediction": "NO" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "DuplicatePrediction");

        let (status, body) = call(
            &app.router,
            "POST",
            &format!("/arenas/{}/resolve", app.macro_id),
            Some(json!({ "outcome": "YES" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "RESOLVED");
        assert_eq!(body["outcome"], "YES");

        let (status, body) = call(&app.router, "GET", "/leaderboard?limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["leaderboard"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["rank"], 1);
        assert_eq!(rows[0]["username"], "@alice");
        assert_eq!(rows[0]["accuracy"], 100.0);
        assert_eq!(rows[0]["wins"], 1);
        assert_eq!(rows[0]["max_streak"], 1);

        let (status, body) = call(
            &app.router,
            "POST",
            &predict,
            Some(json!({ "username": "bob", "prediction": "NO" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "ArenaClosed");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let app = app().await;

        let (status, body) = call(
            &app.router,
            "POST",
            &format!("/arenas/{}/predictions", app.price_id),
            Some(json!({ "username": "carol", "prediction": "maybe" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidPrediction");

        let (status, body) = call(
            &app.router,
            "POST",
            &format!("/arenas/{}/predictions", app.price_id),
            Some(json!({ "username": "@", "prediction": "YES" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidUsername");

        let (status, body) = call(&app.router, "GET", "/arenas/SYLON-19990101-001", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ArenaNotFound");

        let (status, body) = call(
            &app.router,
            "POST",
            &format!("/arenas/{}/resolve", app.price_id),
            Some(json!({ "outcome": "NO" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "ManualResolutionNotAllowed");

        let (status, body) = call(
            &app.router,
            "POST",
            &format!("/arenas/{}/resolve", app.macro_id),
            Some(json!({ "outcome": "perhaps" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidOutcome");
    }

    #[tokio::test]
    async fn test_arena_reads() {
        let app = app().await;

        let (status, body) = call(&app.router, "GET", &format!("/arenas/{}", app.price_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["arena_id"], app.price_id);
        assert_eq!(body["condition"]["type"], "HIT_TARGET");

        let (status, body) = call(&app.router, "GET", "/arenas", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a["arena_id"].as_str())
            .collect();
        assert!(ids.contains(&app.macro_id.as_str()));
        assert!(ids.contains(&app.price_id.as_str()));
    }
}
