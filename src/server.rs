use crate::allocator::{self, AllocationRequest, AllocatorConfig};
use crate::data::AllocationOutput;
use crate::error::AllocError;
use crate::geometry::{Day, LabWindow, PERIODS, Period, PeriodInfo};
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    defaults: Arc<AllocatorConfig>,
}

#[derive(Serialize)]
struct LabWindowView {
    window: LabWindow,
    periods: &'static [Period],
}

#[derive(Serialize)]
struct GeometryView {
    days: [Day; 5],
    periods: &'static [PeriodInfo],
    lab_windows: Vec<LabWindowView>,
}

fn status_for(e: &AllocError) -> StatusCode {
    match e {
        AllocError::Infeasible { .. } | AllocError::TimedOut { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AllocError::InvalidConfig(_) | AllocError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AllocError::Solver(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn allocate_handler(
    State(state): State<AppState>,
    Json(request): Json<AllocationRequest>,
) -> Result<Json<AllocationOutput>, (StatusCode, String)> {
    let defaults = Arc::clone(&state.defaults);
    let result = tokio::task::spawn_blocking(move || allocator::allocate(&request, &defaults))
        .await
        .map_err(|e| {
            error!("Allocation task failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("allocation task failed: {e}"))
        })?;

    match result {
        Ok(output) => Ok(Json(output)),
        Err(e) => Err((status_for(&e), e.to_string())),
    }
}

async fn geometry_handler() -> Json<GeometryView> {
    Json(GeometryView {
        days: Day::ALL,
        periods: &PERIODS,
        lab_windows: LabWindow::ALL
            .into_iter()
            .map(|window| LabWindowView {
                window,
                periods: window.periods(),
            })
            .collect(),
    })
}

pub fn router(defaults: AllocatorConfig) -> Router {
    Router::new()
        .route("/v1/timetable/allocate", post(allocate_handler))
        .route("/v1/timetable/geometry", get(geometry_handler))
        .with_state(AppState {
            defaults: Arc::new(defaults),
        })
}

pub async fn run_server(addr: SocketAddr, defaults: AllocatorConfig) -> anyhow::Result<()> {
    let app = router(defaults);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Strategy;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn heuristic() -> AllocatorConfig {
        AllocatorConfig {
            strategy: Strategy::Heuristic,
            ..AllocatorConfig::default()
        }
    }

    async fn post_json(app: Router, body: Value) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/timetable/allocate")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn allocate_returns_timetable() {
        let body = json!({
            "requirements": [
                {"teacher": "T1", "year": 1, "subject": "Math", "hours": 3}
            ]
        });
        let (status, bytes) = post_json(router(heuristic()), body).await;
        assert_eq!(status, StatusCode::OK);

        let out: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(out["strategy"], "heuristic");
        assert_eq!(out["year_labels"]["1"], "Semester 3");
        let math = out["timetable"]["1"]
            .as_object()
            .unwrap()
            .values()
            .flat_map(|row| row.as_array().unwrap().iter())
            .filter(|cell| cell.as_str() == Some("Math"))
            .count();
        assert_eq!(math, 3);
        assert_eq!(out["unallocated"], json!([]));
    }

    #[tokio::test]
    async fn infeasible_exact_request_is_unprocessable() {
        let body = json!({
            "requirements": [
                {"teacher": "T1", "year": 1, "subject": "Math", "hours": 2}
            ],
            "config": {"strategy": "exact"}
        });
        let (status, bytes) = post_json(router(heuristic()), body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(String::from_utf8_lossy(&bytes).contains("hard constraint"));
    }

    #[tokio::test]
    async fn bad_time_limit_is_bad_request() {
        let body = json!({
            "requirements": [],
            "config": {"strategy": "exact", "time_limit_secs": 0}
        });
        let (status, _) = post_json(router(heuristic()), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn geometry_lists_periods() {
        let response = router(AllocatorConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/v1/timetable/geometry")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let geometry: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(geometry["days"].as_array().unwrap().len(), 5);
        assert_eq!(geometry["periods"].as_array().unwrap().len(), 9);
        assert_eq!(geometry["periods"][5]["teaching"], false);
        assert_eq!(geometry["lab_windows"][2]["periods"], json!([6, 7, 8]));
    }
}
