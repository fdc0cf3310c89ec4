use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use log::{error, info};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;

use crate::config::SolverParams;
use crate::data::TimetableResponse;
use crate::error::TimetableError;
use crate::optimizer::{self, Failure};
use crate::solver::{HighsBackend, SolverBackend};

#[derive(Clone)]
struct AppState {
    params: Arc<SolverParams>,
    backend: Arc<dyn SolverBackend + Send + Sync>,
}

async fn solve_handler(
    State(state): State<AppState>,
    body: String,
) -> (StatusCode, Json<TimetableResponse>) {
    // the solve blocks for up to the time limit
    let solved = tokio::task::spawn_blocking(move || {
        optimizer::solve_payload(&body, &state.params, state.backend.as_ref())
    })
    .await;

    match solved {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)),
        Ok(Err(failure)) => failure_response(failure),
        Err(join_error) => {
            error!("Solve task failed: {}", join_error);
            failure_response(Failure::from_error(TimetableError::Internal(
                join_error.to_string(),
            )))
        }
    }
}

fn failure_response(failure: Failure) -> (StatusCode, Json<TimetableResponse>) {
    let status = if failure.error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(failure.response))
}

fn app(
    params: SolverParams,
    backend: Arc<dyn SolverBackend + Send + Sync>,
    max_concurrent_solves: usize,
) -> Router {
    let state = AppState {
        params: Arc::new(params),
        backend,
    };
    Router::new()
        .route("/v1/timetable/solve", post(solve_handler))
        .layer(ConcurrencyLimitLayer::new(max_concurrent_solves.max(1)))
        .with_state(state)
}

pub async fn run_server(
    bind: &str,
    params: SolverParams,
    max_concurrent_solves: usize,
) -> std::io::Result<()> {
    let app = app(params, Arc::new(HighsBackend), max_concurrent_solves);

    let listener = tokio::net::TcpListener::bind(bind).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
