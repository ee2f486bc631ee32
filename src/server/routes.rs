use crate::chain::store::{resolve_payload, OptionChain};
use crate::chain::types::TickOutcome;
use crate::state::{AppState, ChainView};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use portable_atomic::Ordering;
use std::sync::Arc;

/// Radius cap for the window endpoint.
const MAX_WINDOW_RADIUS: usize = 100;

#[derive(serde::Deserialize)]
pub struct WindowQuery {
    pub radius: Option<usize>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn unknown_index(index: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("unknown index: {index}") })),
    )
}

fn find_view(state: &AppState, index: &str) -> Result<ChainView, ApiError> {
    state
        .snapshot_rx
        .borrow()
        .chain(index)
        .cloned()
        .ok_or_else(|| unknown_index(index))
}

/// GET /api/chains -- one analytics summary per index (from watch channel, no lock)
pub async fn get_chains(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.snapshot_rx.borrow().clone();
    let chains: Vec<_> = snapshot
        .chains
        .iter()
        .map(|v| {
            serde_json::json!({
                "index": v.chain.index,
                "expiry": v.chain.expiry_label,
                "lot_size": v.chain.lot_size,
                "analytics": v.analytics,
                "last_greeks": v.last_greeks,
            })
        })
        .collect();
    Json(serde_json::json!({
        "session_id": snapshot.session_id,
        "engine_state": snapshot.engine_state,
        "updated_at": snapshot.updated_at,
        "chains": chains,
    }))
}

/// GET /api/chains/{index} -- full chain snapshot
pub async fn get_chain(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
) -> Result<Json<ChainView>, ApiError> {
    find_view(&state, &index).map(Json)
}

/// GET /api/chains/{index}/window?radius=N -- strikes around ATM for rendering
pub async fn get_window(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
    Query(params): Query<WindowQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let view = find_view(&state, &index)?;
    let radius = params
        .radius
        .unwrap_or(state.config.display_radius)
        .min(MAX_WINDOW_RADIUS);
    Ok(Json(serde_json::json!({
        "index": view.chain.index,
        "spot_price": view.chain.spot_price,
        "atm_strike": view.chain.atm_strike,
        "radius": radius,
        "strikes": view.chain.display_window(radius),
    })))
}

/// GET /api/chains/{index}/analytics
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(index): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let view = find_view(&state, &index)?;
    Ok(Json(serde_json::json!(view.analytics)))
}

/// POST /api/ticks -- publish one tick object or an array of them into the registry
pub async fn post_ticks(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let outcomes = ingest(&state, &items);

    let mut accepted = 0u64;
    let mut ignored = Vec::new();
    let mut rejected = Vec::new();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            TickOutcome::Applied { .. } => accepted += 1,
            TickOutcome::Ignored(reason) => {
                ignored.push(serde_json::json!({ "position": i, "reason": reason }))
            }
            TickOutcome::Malformed(error) => {
                rejected.push(serde_json::json!({ "position": i, "error": error }))
            }
        }
    }

    Json(serde_json::json!({
        "accepted": accepted,
        "ignored": ignored,
        "rejected": rejected,
    }))
}

/// Resolve posted payloads against the current chains. Only ticks that land on
/// a known leg reach the registry; the engine applies them on its next drain.
fn ingest(state: &AppState, items: &[serde_json::Value]) -> Vec<TickOutcome> {
    let snapshot = state.snapshot_rx.borrow();
    let chains: Vec<&OptionChain> = snapshot.chains.iter().map(|v| &v.chain).collect();

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let (outcome, tick) = resolve_payload(chains.iter().copied(), item);
            match (&outcome, tick) {
                (TickOutcome::Applied { .. }, Some(tick)) => {
                    state.registry.publish(tick.token.clone(), tick);
                }
                (TickOutcome::Malformed(error), _) => {
                    state.counters.ticks_malformed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(position = i, %error, "rejected posted tick");
                }
                _ => {
                    state.counters.ticks_ignored.fetch_add(1, Ordering::Relaxed);
                }
            }
            outcome
        })
        .collect()
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "ticks_published": state.registry.published_count(),
        "registry_size": state.registry.len(),
        "drains": state.counters.drains.load(Relaxed),
        "ticks_applied": state.counters.ticks_applied.load(Relaxed),
        "ticks_ignored": state.counters.ticks_ignored.load(Relaxed),
        "ticks_malformed": state.counters.ticks_malformed.load(Relaxed),
        "greeks_passes": state.counters.greeks_passes.load(Relaxed),
        "iv_unconverged": state.counters.iv_unconverged.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
    }))
}
