//! HTTP request handlers.

use super::AppState;
use crate::data::DataError;
use crate::view::{ChartKind, FilterForm, TimeRange, ViewError};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::time::Duration;

// ============================================================================
// Templates
// ============================================================================

const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const DATASET_TEMPLATE: &str = include_str!("templates/dataset.html");
const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");

/// Longest a long-poll request may wait.
const MAX_POLL: Duration = Duration::from_secs(30);

fn render_page(title: &str, content: &str) -> Html<String> {
    Html(
        LAYOUT_TEMPLATE
            .replace("{{title}}", title)
            .replace("{{content}}", content),
    )
}

fn view_error_response(e: ViewError) -> Response {
    match e {
        ViewError::Data(DataError::NotFound(id)) => {
            (StatusCode::NOT_FOUND, format!("Dataset {} not found", id)).into_response()
        }
        ViewError::ViewNotOpen(id) => {
            (StatusCode::NOT_FOUND, format!("No open view for dataset {}", id)).into_response()
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

// ============================================================================
// Pages
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let summaries = state.dashboard.store().summaries();
    let datasets_json = serde_json::to_string(&summaries).unwrap_or_else(|_| "[]".to_string());

    let content = DASHBOARD_TEMPLATE
        .replace("{{datasets_json}}", &datasets_json)
        .replace("{{time_ranges}}", &time_range_options());

    render_page("Analytics Dashboard", &content)
}

#[derive(Debug, Deserialize)]
pub struct DrillDownQuery {
    pub id: String,
}

pub async fn handle_drill_down(
    State(state): State<AppState>,
    Query(query): Query<DrillDownQuery>,
) -> impl IntoResponse {
    let dataset = match state.dashboard.store().snapshot(&query.id) {
        Ok(ds) => ds,
        Err(_) => return Html("<h1>Dataset not found</h1>".to_string()),
    };

    let summary_json =
        serde_json::to_string(&dataset.summary()).unwrap_or_else(|_| "{}".to_string());

    let content = DATASET_TEMPLATE
        .replace("{{dataset_id}}", &dataset.id)
        .replace("{{dataset_name}}", &dataset.name)
        .replace("{{dataset_description}}", &dataset.description)
        .replace("{{summary_json}}", &summary_json)
        .replace("{{time_ranges}}", &time_range_options());

    render_page(&format!("Drill Down - {}", dataset.name), &content)
}

fn time_range_options() -> String {
    TimeRange::ALL
        .iter()
        .map(|r| format!("<option value=\"{0}\">{0}</option>", r.label()))
        .collect::<Vec<_>>()
        .join("")
}

// ============================================================================
// API: Datasets
// ============================================================================

pub async fn handle_get_datasets(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.store().summaries())
}

// ============================================================================
// API: Views
// ============================================================================

pub async fn handle_open_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.dashboard.open_view(&id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => view_error_response(e),
    }
}

pub async fn handle_close_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.dashboard.close_view(&id).await;
    StatusCode::NO_CONTENT
}

pub async fn handle_get_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.dashboard.current_view(&id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => view_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatesQuery {
    #[serde(default)]
    pub since: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl UpdatesQuery {
    fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(MAX_POLL)
            .min(MAX_POLL)
    }
}

pub async fn handle_view_updates(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UpdatesQuery>,
) -> impl IntoResponse {
    match state
        .dashboard
        .wait_for_update(&id, query.since, query.timeout())
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(e) => view_error_response(e),
    }
}

pub async fn handle_set_filters(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<FilterForm>,
) -> impl IntoResponse {
    match state.dashboard.apply_filter_form(&id, &form).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => view_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChartKindRequest {
    pub kind: String,
}

pub async fn handle_set_chart_kind(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChartKindRequest>,
) -> impl IntoResponse {
    let kind = match ChartKind::parse(&req.kind) {
        Some(k) => k,
        None => return (StatusCode::BAD_REQUEST, "Invalid chart kind").into_response(),
    };

    match state.dashboard.select_chart_kind(&id, kind).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => view_error_response(e),
    }
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <rect x="5" y="5" width="90" height="90" rx="18" fill="#4f46e5"/>
        <path d="M20 65 L38 45 L52 58 L80 28" stroke="white" stroke-width="7" fill="none"/>
    </svg>"##;

    ([(axum::http::header::CONTENT_TYPE, "image/svg+xml")], svg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_is_capped() {
        let q = UpdatesQuery { since: 0, timeout_ms: None };
        assert_eq!(q.timeout(), MAX_POLL);

        let q = UpdatesQuery { since: 0, timeout_ms: Some(1_500) };
        assert_eq!(q.timeout(), Duration::from_millis(1_500));

        let q = UpdatesQuery { since: 0, timeout_ms: Some(600_000) };
        assert_eq!(q.timeout(), MAX_POLL);
    }

    #[test]
    fn test_error_status_codes() {
        let r = view_error_response(ViewError::ViewNotOpen("1".to_string()));
        assert_eq!(r.status(), StatusCode::NOT_FOUND);

        let r = view_error_response(ViewError::Data(DataError::NotFound("x".to_string())));
        assert_eq!(r.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_time_range_options() {
        let html = time_range_options();
        for label in ["1h", "1d", "1w", "1m"] {
            assert!(html.contains(&format!("value=\"{}\"", label)));
        }
    }
}
