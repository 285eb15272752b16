//! HTTP surface of the product catalog.
//!
//! A thin JSON layer over [`CatalogRepository`]. Handlers bind query
//! strings, call the repository with a per-request cancellation token and
//! turn failures into short hints via [`ApiError`].

mod error;
mod params;

pub use error::{ApiError, error_chain};
pub use params::{ProductQuery, TopQuery};

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use catalog_core::{CatalogRepository, IdentityMode};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Rows returned by the top-N endpoints when `take` is not given.
const DEFAULT_TOP: u32 = 10;

/// Immutable state shared by all requests.
#[derive(Debug)]
pub struct AppState {
    /// Catalog queries
    pub repository: CatalogRepository,
    /// Identity the process authenticates as
    pub identity: IdentityMode,
    /// Page size of the product listing and cap for top-N endpoints
    pub take: u32,
}

type SharedState = Arc<AppState>;

/// Builds the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/identity", get(identity))
        .route("/api/categories", get(categories))
        .route("/api/products", get(products))
        .route("/api/filters", get(filters))
        .route("/api/best-sellers", get(best_sellers))
        .route("/api/price-analysis", get(price_analysis))
        .route("/api/category-hierarchy", get(category_hierarchy))
        .route("/api/recent-activity", get(recent_activity))
        .with_state(Arc::new(state))
}

/// Cancellation token that fires when the handler future is dropped, which
/// is what happens when the client disconnects.
fn request_token() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Reports which identity the process runs as; never the connection target.
async fn identity(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "mode": state.identity.label(),
        "clientId": state.identity.client_id(),
    }))
}

async fn categories(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let (cancel, _guard) = request_token();
    let categories = state.repository.categories(&cancel).await?;
    Ok(Json(json!(categories)))
}

async fn products(
    State(state): State<SharedState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = query.to_filter(state.take)?;
    let (cancel, _guard) = request_token();

    let products = if query.is_enriched()? {
        let rows = state.repository.products_enriched(&filter, &cancel).await?;
        json!(rows)
    } else {
        let rows = state.repository.products(&filter, &cancel).await?;
        json!(rows)
    };

    Ok(Json(json!({
        "sortBy": filter.sort,
        "count": products.as_array().map_or(0, Vec::len),
        "products": products,
    })))
}

async fn filters(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let (cancel, _guard) = request_token();
    let (colors, sizes) = tokio::try_join!(
        state.repository.distinct_colors(&cancel),
        state.repository.distinct_sizes(&cancel),
    )?;
    Ok(Json(json!({ "colors": colors, "sizes": sizes })))
}

async fn best_sellers(
    State(state): State<SharedState>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Value>, ApiError> {
    let take = query.resolve(DEFAULT_TOP, state.take)?;
    let (cancel, _guard) = request_token();
    let rows = state.repository.best_sellers(take, &cancel).await?;
    Ok(Json(json!(rows)))
}

async fn price_analysis(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let (cancel, _guard) = request_token();
    let rows = state.repository.price_analysis(&cancel).await?;
    Ok(Json(json!(rows)))
}

async fn category_hierarchy(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let (cancel, _guard) = request_token();
    let rows = state.repository.category_hierarchy(&cancel).await?;
    Ok(Json(json!(rows)))
}

async fn recent_activity(
    State(state): State<SharedState>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Value>, ApiError> {
    let take = query.resolve(DEFAULT_TOP, state.take)?;
    let (cancel, _guard) = request_token();
    let rows = state.repository.recent_activity(take, &cancel).await?;
    Ok(Json(json!(rows)))
}
