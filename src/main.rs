mod analytics;
mod chain;
mod config;
mod errors;
mod feeds;
mod models;
mod registry;
mod server;
mod state;

use crate::chain::store::{GreeksPass, OptionChain};
use crate::models::black_scholes::BlackScholes;
use crate::registry::TickRegistry;
use crate::state::*;
use chrono::NaiveDate;
use portable_atomic::Ordering;
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("chain_pulse engine starting");

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    // Instrument list (used once, at chain initialization)
    let today = chrono::Local::now().date_naive();
    let instruments = match (&cfg.instruments_path, cfg.demo_mode) {
        (Some(path), _) => match feeds::instruments::load_instruments(path) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("{e}");
                std::process::exit(1);
            }
        },
        (None, true) => feeds::instruments::demo_instruments(&cfg.indices, today),
        (None, false) => {
            tracing::error!("INSTRUMENTS_PATH is required when DEMO_MODE=false");
            std::process::exit(1);
        }
    };

    // One chain per index; an index without instruments is skipped
    let chains: Vec<OptionChain> = cfg
        .indices
        .iter()
        .filter_map(|spec| {
            match OptionChain::initialize(&spec.symbol, spec.strike_step, &instruments, spec.spot) {
                Ok(chain) => Some(chain),
                Err(e) => {
                    tracing::warn!(index = %spec.symbol, "chain not started: {e}");
                    None
                }
            }
        })
        .collect();

    if chains.is_empty() {
        tracing::error!("no option chain could be initialized");
        std::process::exit(1);
    }

    let tokens: Vec<chain::types::Token> = chains
        .iter()
        .flat_map(|c| c.tokens().cloned())
        .collect();

    // Shared state: the one registry instance every producer and the consumer use
    let registry = Arc::new(TickRegistry::new());
    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session = %session_id, chains = chains.len(), tokens = tokens.len(), "session ready");
    let app_state = AppState::new(cfg.clone(), registry.clone(), session_id);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Spawn tasks ──

    // 1. Demo tick producer
    if cfg.demo_mode {
        let feed_registry = registry.clone();
        let feed_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            feeds::simulator::run_demo_feed(
                feed_registry,
                tokens,
                std::time::Duration::from_secs(1),
                feed_shutdown,
            )
            .await;
        });
    }

    // 2. Engine task (single owner of every chain)
    let engine_state = app_state.clone();
    let engine_shutdown = shutdown_rx.clone();
    let engine = tokio::spawn(async move {
        run_engine(engine_state, chains, engine_shutdown).await;
    });

    // 3. Ctrl-C -> shutdown signal
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    // 4. Axum HTTP + WS server
    let server_state = app_state.clone();
    let port = cfg.server_port;

    let app = axum::Router::new()
        .route("/api/chains", axum::routing::get(server::routes::get_chains))
        .route("/api/chains/{index}", axum::routing::get(server::routes::get_chain))
        .route("/api/chains/{index}/window", axum::routing::get(server::routes::get_window))
        .route("/api/chains/{index}/analytics", axum::routing::get(server::routes::get_analytics))
        .route("/api/ticks", axum::routing::post(server::routes::post_ticks))
        .route("/api/counters", axum::routing::get(server::routes::get_counters))
        .route("/ws", axum::routing::get(server::ws::ws_handler))
        .fallback_service(
            tower_http::services::ServeDir::new("dashboard/dist")
                .fallback(tower_http::services::ServeFile::new("dashboard/dist/index.html")),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(server_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    let mut server_shutdown = shutdown_rx;
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    if let Err(e) = serve.await {
        tracing::error!("server error: {e}");
    }

    let _ = engine.await;
    tracing::info!("chain_pulse stopped");
}

/// What one drain/apply cycle did.
#[derive(Debug, Default)]
struct CycleReport {
    drained: usize,
    applied: u64,
    ignored: u64,
    /// (chain position, pass) for every chain whose greeks were refreshed
    greeks: SmallVec<[(usize, GreeksPass); 4]>,
}

/// Core engine loop. Drains the registry on every refresh tick, applies ticks
/// to the chains it owns, throttles greeks passes and publishes snapshots.
/// No locks on chain state: this task is its only owner.
async fn run_engine(
    state: Arc<AppState>,
    mut chains: Vec<OptionChain>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(chains = chains.len(), "engine task started");

    let model = BlackScholes::new();
    let mut engine_state = EngineState::Warming;
    let mut last_greeks: Vec<Option<GreeksPass>> = vec![None; chains.len()];
    let mut greeks_due_at = tokio::time::Instant::now();
    let greeks_every = tokio::time::Duration::from_secs(state.config.greeks_interval_secs);
    let mut refresh = tokio::time::interval(tokio::time::Duration::from_millis(
        state.config.refresh_interval_ms.max(10),
    ));

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                let now = tokio::time::Instant::now();
                let greeks_due = now >= greeks_due_at;
                if greeks_due {
                    greeks_due_at = now + greeks_every;
                }

                let today = chrono::Local::now().date_naive();
                let report = process_cycle(&state, &mut chains, &model, greeks_due, today);

                for &(idx, pass) in &report.greeks {
                    last_greeks[idx] = Some(pass);
                }

                if engine_state == EngineState::Warming && report.applied > 0 {
                    engine_state = EngineState::Streaming;
                    tracing::info!(applied = report.applied, "first ticks applied, entering Streaming");
                    state.broadcast(WsMessage::EngineStateMsg {
                        state: engine_state.to_string(),
                        reason: "first ticks applied".into(),
                    });
                }

                publish_snapshot(&state, &chains, &last_greeks, engine_state, &report);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    engine_state = EngineState::Halted;
    state.broadcast(WsMessage::EngineStateMsg {
        state: engine_state.to_string(),
        reason: "shutdown".into(),
    });
    state.snapshot_tx.send_modify(|s| s.engine_state = engine_state);
    tracing::info!("engine task shutting down");
}

/// One consumer pass: drain, apply, and (when due) refresh greeks.
/// Pure with respect to the outside world except for counters.
fn process_cycle(
    state: &AppState,
    chains: &mut [OptionChain],
    model: &BlackScholes,
    greeks_due: bool,
    today: NaiveDate,
) -> CycleReport {
    let ticks = state.registry.drain_all();
    state.counters.drains.fetch_add(1, Ordering::Relaxed);

    let mut report = CycleReport {
        drained: ticks.len(),
        ..CycleReport::default()
    };

    for chain in chains.iter_mut() {
        report.applied += chain.apply_batch(ticks.values()).applied;
    }
    // Each token belongs to at most one chain; the rest is other streams' noise.
    report.ignored = (report.drained as u64).saturating_sub(report.applied);

    state.counters.ticks_applied.fetch_add(report.applied, Ordering::Relaxed);
    state.counters.ticks_ignored.fetch_add(report.ignored, Ordering::Relaxed);

    if greeks_due {
        for (idx, chain) in chains.iter_mut().enumerate() {
            let days = chain
                .days_to_expiry(today)
                .unwrap_or(state.config.days_to_expiry);
            let pass = chain.recompute_greeks(model, state.config.risk_free_rate, days);

            state.counters.greeks_passes.fetch_add(1, Ordering::Relaxed);
            state
                .counters
                .iv_unconverged
                .fetch_add(u64::from(pass.unconverged), Ordering::Relaxed);
            if pass.unconverged > 0 {
                tracing::debug!(
                    index = %chain.index,
                    unconverged = pass.unconverged,
                    priced = pass.priced,
                    "implied volatility did not converge for some legs"
                );
            }
            report.greeks.push((idx, pass));
        }
    }

    report
}

/// Build the dashboard snapshot and stream per-index analytics.
fn publish_snapshot(
    state: &AppState,
    chains: &[OptionChain],
    last_greeks: &[Option<GreeksPass>],
    engine_state: EngineState,
    report: &CycleReport,
) {
    let now = chrono::Utc::now().to_rfc3339();

    let views: Vec<ChainView> = chains
        .iter()
        .zip(last_greeks.iter())
        .map(|(chain, greeks)| ChainView {
            chain: chain.clone(),
            analytics: analytics::summarize(chain),
            last_greeks: *greeks,
        })
        .collect();

    for &(idx, pass) in &report.greeks {
        if let Some(chain) = chains.get(idx) {
            state.broadcast(WsMessage::GreeksPassMsg {
                index: chain.index.clone(),
                pass,
                timestamp: now.clone(),
            });
        }
    }
    for view in &views {
        state.broadcast(WsMessage::Analytics(view.analytics.clone()));
    }

    state.snapshot_tx.send_modify(|s| {
        s.engine_state = engine_state;
        s.updated_at = now;
        s.chains = views;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{OptionSide, Tick};
    use crate::config::{AppConfig, IndexSpec};

    fn setup() -> (Arc<AppState>, Vec<OptionChain>) {
        let cfg = AppConfig::from_source(|_| None).unwrap();
        let specs = vec![
            IndexSpec { symbol: "NIFTY".into(), strike_step: 50.0, spot: 22_000.0 },
            IndexSpec { symbol: "BANKNIFTY".into(), strike_step: 100.0, spot: 47_000.0 },
        ];
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let rows = feeds::instruments::demo_instruments(&specs, today);
        let chains = specs
            .iter()
            .map(|s| OptionChain::initialize(&s.symbol, s.strike_step, &rows, s.spot).unwrap())
            .collect();
        let state = AppState::new(cfg, Arc::new(TickRegistry::new()), "test".into());
        (state, chains)
    }

    #[test]
    fn test_cycle_routes_ticks_to_owning_chain() {
        let (state, mut chains) = setup();
        let model = BlackScholes::new();
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        for token in ["NIFTY_22000_CE", "BANKNIFTY_47000_PE", "SENSEX_80000_CE"] {
            state
                .registry
                .publish(token.into(), Tick::new(token, 120.0, 5000.0, 10.0, 119.5, 120.5));
        }

        let report = process_cycle(&state, &mut chains, &model, false, today);
        assert_eq!(report.drained, 3);
        assert_eq!(report.applied, 2);
        assert_eq!(report.ignored, 1);
        assert!(report.greeks.is_empty());
        assert_eq!(chains[0].strike(22_000.0).unwrap().call.last_price, 120.0);
        assert_eq!(chains[1].strike(47_000.0).unwrap().put.last_price, 120.0);
        assert_eq!(state.counters.ticks_applied.load(Ordering::Relaxed), 2);

        // Registry is not cleared; re-applying zeroes the change fields.
        let again = process_cycle(&state, &mut chains, &model, false, today);
        assert_eq!(again.applied, 2);
        let leg = chains[0].strike(22_000.0).unwrap().leg(OptionSide::Call);
        assert_eq!(leg.price_change, 0.0);
        assert_eq!(leg.tick_count, 2);
    }

    #[test]
    fn test_cycle_refreshes_greeks_when_due() {
        let (state, mut chains) = setup();
        let model = BlackScholes::new();
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        state.registry.publish(
            "NIFTY_22000_CE".into(),
            Tick::new("NIFTY_22000_CE", 150.0, 5000.0, 10.0, 149.5, 150.5),
        );

        let report = process_cycle(&state, &mut chains, &model, true, today);
        assert_eq!(report.greeks.len(), 2);
        assert_eq!(report.greeks[0], (0, GreeksPass { priced: 1, unconverged: 0, skipped_unpriced: 41 }));
        assert_eq!(report.greeks[1].1.priced, 0);

        let leg = &chains[0].strike(22_000.0).unwrap().call;
        assert!(leg.implied_volatility > 0.0);
        assert!(leg.iv_converged);
        assert_eq!(state.counters.greeks_passes.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_snapshot_carries_analytics() {
        let (state, mut chains) = setup();
        let model = BlackScholes::new();
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        state.registry.publish(
            "NIFTY_22000_PE".into(),
            Tick::new("NIFTY_22000_PE", 90.0, 8000.0, 10.0, 89.5, 90.5),
        );
        state.registry.publish(
            "NIFTY_22000_CE".into(),
            Tick::new("NIFTY_22000_CE", 90.0, 4000.0, 10.0, 89.5, 90.5),
        );

        let report = process_cycle(&state, &mut chains, &model, false, today);
        let last_greeks = vec![None; chains.len()];
        publish_snapshot(&state, &chains, &last_greeks, EngineState::Streaming, &report);

        let snapshot = state.snapshot_rx.borrow().clone();
        assert_eq!(snapshot.engine_state, EngineState::Streaming);
        let nifty = snapshot.chain("nifty").unwrap();
        assert!((nifty.analytics.pcr.ratio - 2.0).abs() < 1e-12);
        assert_eq!(nifty.analytics.support, Some(22_000.0));
        assert_eq!(nifty.chain.display_window(3).len(), 7);
        assert!(snapshot.chain("SENSEX").is_none());
    }
}
