//! HTTP quote surface
//!
//! Four methods: quote, cached-route read, cached-route delete, and raw
//! cache-key inspection, plus a health probe. Errors map to the 400/404/
//! 500 taxonomy with an `error{code,message}` body; a 500 echoes the
//! request to the logs and fires the unhandled-error counter.

pub mod proto;

use crate::cache::CachedRoutesRepository;
use crate::chains::Chain;
use crate::engine::{QuoteEngine, QuoteError};
use crate::metrics::Metrics;
use crate::types::{TradeType, UsdBucket};
use alloy::primitives::Address;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use proto::{
    CacheKeyQuery, CachedRouteView, CachedRoutesQuery, ErrorBody, ErrorDetail, QuoteRequest,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Whole-request deadline; everything downstream inherits it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn router(engine: Arc<QuoteEngine>) -> Router {
    Router::new()
        .route("/quote", get(quote))
        .route(
            "/cachedRoutes",
            get(get_cached_routes).delete(delete_cached_routes),
        )
        .route("/inspectCacheKey", get(inspect_cache_key))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

fn error_response(code: StatusCode, message: String) -> Response {
    (
        code,
        Json(ErrorBody {
            error: ErrorDetail {
                code: code.as_u16(),
                message,
            },
        }),
    )
        .into_response()
}

async fn quote(
    State(engine): State<Arc<QuoteEngine>>,
    Query(request): Query<QuoteRequest>,
) -> Response {
    let debug_echo = format!("{:?}", request);
    let result = tokio::time::timeout(REQUEST_TIMEOUT, engine.quote(request)).await;
    match result {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(QuoteError::Validation(message))) => {
            Metrics::incr(&engine.metrics.requests_invalid);
            error_response(StatusCode::BAD_REQUEST, message)
        }
        Ok(Err(QuoteError::NotFound(message))) => {
            error_response(StatusCode::NOT_FOUND, message)
        }
        Ok(Err(QuoteError::Internal(e))) => {
            Metrics::incr(&engine.metrics.requests_unhandled_error);
            error!("Unhandled quote error: {:#} (request: {})", e, debug_echo);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            )
        }
        Err(_) => {
            Metrics::incr(&engine.metrics.requests_unhandled_error);
            error!("Quote timed out (request: {})", debug_echo);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Deadline exceeded".to_string())
        }
    }
}

fn parse_cached_routes_query(
    query: &CachedRoutesQuery,
) -> Result<(Chain, TradeType, Address, Address, UsdBucket), Response> {
    let chain = Chain::from_id(query.chain_id)
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Unsupported chain".into()))?;
    let trade_type = match query.trade_type.as_str() {
        "EXACT_IN" => TradeType::ExactIn,
        "EXACT_OUT" => TradeType::ExactOut,
        _ => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Invalid trade type".into(),
            ))
        }
    };
    let token_in: Address = query
        .token_in
        .parse()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid tokenIn".into()))?;
    let token_out: Address = query
        .token_out
        .parse()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid tokenOut".into()))?;
    let bucket = UsdBucket::parse(&query.bucket)
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Invalid bucket".into()))?;
    Ok((chain, trade_type, token_in, token_out, bucket))
}

async fn get_cached_routes(
    State(engine): State<Arc<QuoteEngine>>,
    Query(query): Query<CachedRoutesQuery>,
) -> Response {
    let (chain, trade_type, token_in, token_out, bucket) =
        match parse_cached_routes_query(&query) {
            Ok(parsed) => parsed,
            Err(response) => return response,
        };
    let lookup = engine
        .routes_cache()
        .get(chain, trade_type, token_in, token_out, bucket)
        .await;
    let views: Vec<CachedRouteView> = lookup
        .routes
        .iter()
        .map(|route| CachedRouteView {
            protocol: route.protocol,
            route_string: route.route_string(),
            pools: route
                .pools
                .iter()
                .map(|p| crate::types::PoolInfo::from_pool(p, 0.0, 0.0))
                .collect(),
        })
        .collect();
    Json(json!({
        "routes": views,
        "needsRefresh": lookup.needs_refresh,
    }))
    .into_response()
}

async fn delete_cached_routes(
    State(engine): State<Arc<QuoteEngine>>,
    Query(query): Query<CachedRoutesQuery>,
) -> Response {
    let (chain, trade_type, token_in, token_out, bucket) =
        match parse_cached_routes_query(&query) {
            Ok(parsed) => parsed,
            Err(response) => return response,
        };
    let key = CachedRoutesRepository::cache_key(chain, trade_type, token_in, token_out, bucket);
    match engine.routes_cache().delete(&key).await {
        Ok(removed) => Json(json!({ "key": key, "deleted": removed })).into_response(),
        Err(e) => {
            error!("Cache delete failed for {}: {:#}", key, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache delete failed".into())
        }
    }
}

/// Raw store inspection of one exact key: string, then list, then sorted
/// set.
async fn inspect_cache_key(
    State(engine): State<Arc<QuoteEngine>>,
    Query(query): Query<CacheKeyQuery>,
) -> Response {
    match engine.routes_cache().store().inspect(&query.key).await {
        Ok(value) => Json(json!({ "key": query.key, "result": value })).into_response(),
        Err(e) => {
            error!("Cache inspect failed for {}: {:#}", query.key, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache inspect failed".into())
        }
    }
}

async fn health(State(engine): State<Arc<QuoteEngine>>) -> Response {
    // The store answers a throwaway read; failure marks the component.
    let store_healthy = engine
        .routes_cache()
        .store()
        .get("HEALTHCHECK")
        .await
        .is_ok();
    Json(json!({
        "status": if store_healthy { "ok" } else { "degraded" },
        "service": "dexroute",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
        "components": {
            "cache": if store_healthy { "healthy" } else { "unhealthy" },
        }
    }))
    .into_response()
}
