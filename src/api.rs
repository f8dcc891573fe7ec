use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::attractions::AttractionGenerator;
use crate::search::{PhotoSearch, PlaceResult, ProviderSection};

/// Largest candidate list accepted by `POST /api/filter`.
const MAX_FILTER_URLS: usize = 64;

#[derive(Clone)]
pub struct AppState {
    search: Arc<PhotoSearch>,
    generator: Option<Arc<dyn AttractionGenerator>>,
}

impl AppState {
    pub fn new(search: Arc<PhotoSearch>, generator: Option<Arc<dyn AttractionGenerator>>) -> Self {
        Self { search, generator }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/search", get(search))
        .route("/api/place", get(place))
        .route("/api/filter", post(filter))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind: String, state: AppState) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "placelens API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search(
    State(st): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ProviderSection>>, ApiErr> {
    let q = params.q.trim();
    if q.is_empty() {
        return Err(ApiErr::bad_request("Query parameter `q` is required"));
    }
    Ok(Json(st.search.search(q).await))
}

#[derive(Deserialize)]
struct PlaceParams {
    #[serde(default)]
    name: String,
}

async fn place(
    State(st): State<AppState>,
    Query(params): Query<PlaceParams>,
) -> Result<Json<PlaceResult>, ApiErr> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(ApiErr::bad_request("Query parameter `name` is required"));
    }
    let Some(generator) = st.generator.as_ref() else {
        return Err(ApiErr::generator_unavailable());
    };
    Ok(Json(st.search.search_place(name, generator.as_ref()).await))
}

#[derive(Deserialize)]
struct FilterReq {
    urls: Vec<String>,
    #[serde(default)]
    max_keep: Option<usize>,
}

#[derive(Serialize)]
struct FilterResp {
    urls: Vec<String>,
}

async fn filter(
    State(st): State<AppState>,
    Json(req): Json<FilterReq>,
) -> Result<Json<FilterResp>, ApiErr> {
    if req.urls.len() > MAX_FILTER_URLS {
        return Err(ApiErr::bad_request(format!("At most {MAX_FILTER_URLS} urls per request")));
    }
    let urls = st.search.filter().filter(&req.urls, req.max_keep).await;
    Ok(Json(FilterResp { urls }))
}

#[derive(Debug)]
struct ApiErr {
    status: StatusCode,
    code: String,
    message: String,
    suggestion: Option<String>,
}

impl ApiErr {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn generator_unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "generator_unavailable".to_string(),
            message: "Attraction generator is not configured".to_string(),
            suggestion: Some(
                "Enable `attractions` in the config and set its API key variable.".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> axum::response::Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            code: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            suggestion: Option<String>,
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
                suggestion: self.suggestion,
            }),
        )
            .into_response()
    }
}
