use crate::analytics::ChainAnalytics;
use crate::chain::store::{GreeksPass, OptionChain};
use crate::config::AppConfig;
use crate::registry::TickRegistry;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

// ── Engine State Machine ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Chains built, no tick applied yet.
    Warming,
    Streaming,
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warming => write!(f, "warming"),
            Self::Streaming => write!(f, "streaming"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

// ── Messages OUT of the engine ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "analytics")]
    Analytics(ChainAnalytics),

    #[serde(rename = "greeks_pass")]
    GreeksPassMsg {
        index: String,
        #[serde(flatten)]
        pass: GreeksPass,
        timestamp: String,
    },

    #[serde(rename = "engine_state")]
    EngineStateMsg { state: String, reason: String },
}

// ── Per-index view handed to the display layer ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChainView {
    pub chain: OptionChain,
    pub analytics: ChainAnalytics,
    pub last_greeks: Option<GreeksPass>,
}

// ── Engine snapshot for dashboard (sent via watch channel) ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineSnapshot {
    pub session_id: String,
    pub engine_state: EngineState,
    pub updated_at: String,
    pub chains: Vec<ChainView>,
}

impl EngineSnapshot {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            engine_state: EngineState::Warming,
            updated_at: String::new(),
            chains: Vec::new(),
        }
    }

    pub fn chain(&self, index: &str) -> Option<&ChainView> {
        let index = index.to_uppercase();
        self.chains.iter().find(|v| v.chain.index == index)
    }
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub drains: AtomicU64,
    pub ticks_applied: AtomicU64,
    pub ticks_ignored: AtomicU64,
    pub ticks_malformed: AtomicU64,
    pub greeks_passes: AtomicU64,
    pub iv_unconverged: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            drains: AtomicU64::new(0),
            ticks_applied: AtomicU64::new(0),
            ticks_ignored: AtomicU64::new(0),
            ticks_malformed: AtomicU64::new(0),
            greeks_passes: AtomicU64::new(0),
            iv_unconverged: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,

    // Producers -> Engine: last-value tick store
    pub registry: Arc<TickRegistry>,

    // Engine -> Dashboard: latest snapshot (watch = single producer, multi consumer)
    pub snapshot_tx: watch::Sender<EngineSnapshot>,
    pub snapshot_rx: watch::Receiver<EngineSnapshot>,

    // Engine -> Dashboard: event stream (broadcast for WS clients)
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Lock-free performance counters
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig, registry: Arc<TickRegistry>, session_id: String) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(2048);
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::new(session_id));

        Arc::new(Self {
            config,
            registry,
            snapshot_tx,
            snapshot_rx,
            ws_tx,
            counters: PerfCounters::new(),
        })
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }
}
