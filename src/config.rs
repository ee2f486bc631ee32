use crate::errors::{EngineError, EngineResult};
use std::path::PathBuf;

/// Per-index settings: strike spacing and the spot used to seed the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub symbol: String,
    pub strike_step: f64,
    pub spot: f64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub indices: Vec<IndexSpec>,
    pub instruments_path: Option<PathBuf>,
    pub demo_mode: bool,
    pub risk_free_rate: f64,
    pub days_to_expiry: f64,
    pub refresh_interval_ms: u64,
    pub greeks_interval_secs: u64,
    pub display_radius: usize,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. `from_env` passes the process environment.
    pub fn from_source<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mut indices = Vec::new();
        for symbol in var_or("INDICES", "NIFTY,BANKNIFTY").split(',') {
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() {
                continue;
            }
            let spot_key = format!("SPOT_{symbol}");
            let spot = match lookup(&spot_key) {
                Some(raw) => parse_num::<f64>(&spot_key, &raw)?,
                None => default_spot(&symbol)
                    .ok_or_else(|| EngineError::Config(format!("missing env var: {spot_key}")))?,
            };
            if spot <= 0.0 || !spot.is_finite() {
                return Err(EngineError::Config(format!("{spot_key}: spot must be positive")));
            }
            indices.push(IndexSpec {
                strike_step: strike_step(&symbol),
                symbol,
                spot,
            });
        }

        if indices.is_empty() {
            return Err(EngineError::Config("INDICES: no index configured".into()));
        }

        let demo_mode = match var_or("DEMO_MODE", "true").to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => return Err(EngineError::Config(format!("DEMO_MODE: invalid bool {other}"))),
        };

        Ok(Self {
            indices,
            instruments_path: lookup("INSTRUMENTS_PATH").map(PathBuf::from),
            demo_mode,
            risk_free_rate: parse_num("RISK_FREE_RATE", &var_or("RISK_FREE_RATE", "0.07"))?,
            days_to_expiry: parse_num("DAYS_TO_EXPIRY", &var_or("DAYS_TO_EXPIRY", "7"))?,
            refresh_interval_ms: parse_num(
                "REFRESH_INTERVAL_MS",
                &var_or("REFRESH_INTERVAL_MS", "1000"),
            )?,
            greeks_interval_secs: parse_num(
                "GREEKS_INTERVAL_SECS",
                &var_or("GREEKS_INTERVAL_SECS", "5"),
            )?,
            display_radius: parse_num("DISPLAY_RADIUS", &var_or("DISPLAY_RADIUS", "10"))?,
            server_port: parse_num("SERVER_PORT", &var_or("SERVER_PORT", "3001"))?,
        })
    }

    #[cfg(test)]
    pub fn index(&self, symbol: &str) -> Option<&IndexSpec> {
        self.indices.iter().find(|s| s.symbol == symbol)
    }
}

/// Strike spacing for an index family. Unknown indices use 100.
pub fn strike_step(symbol: &str) -> f64 {
    match symbol {
        "NIFTY" | "FINNIFTY" => 50.0,
        "MIDCPNIFTY" => 25.0,
        _ => 100.0,
    }
}

fn default_spot(symbol: &str) -> Option<f64> {
    match symbol {
        "NIFTY" => Some(22_000.0),
        "BANKNIFTY" => Some(47_000.0),
        _ => None,
    }
}

fn parse_num<T>(key: &str, raw: &str) -> EngineResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| EngineError::Config(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_source(lookup(&[])).unwrap();
        assert_eq!(cfg.indices.len(), 2);
        assert_eq!(cfg.index("NIFTY").unwrap().strike_step, 50.0);
        assert_eq!(cfg.index("BANKNIFTY").unwrap().strike_step, 100.0);
        assert_eq!(cfg.index("BANKNIFTY").unwrap().spot, 47_000.0);
        assert!(cfg.demo_mode);
        assert!((cfg.risk_free_rate - 0.07).abs() < 1e-12);
        assert_eq!(cfg.display_radius, 10);
        assert!(cfg.instruments_path.is_none());
    }

    #[test]
    fn test_unknown_index_needs_spot() {
        let err = AppConfig::from_source(lookup(&[("INDICES", "SENSEX")])).unwrap_err();
        assert!(err.to_string().contains("SPOT_SENSEX"));

        let cfg = AppConfig::from_source(lookup(&[("INDICES", "sensex"), ("SPOT_SENSEX", "73000")]))
            .unwrap();
        assert_eq!(cfg.indices[0].symbol, "SENSEX");
        assert_eq!(cfg.indices[0].strike_step, 100.0);
    }

    #[test]
    fn test_bad_number_names_variable() {
        let err = AppConfig::from_source(lookup(&[("RISK_FREE_RATE", "seven")])).unwrap_err();
        assert!(matches!(err, EngineError::Config(ref m) if m.starts_with("RISK_FREE_RATE")));
    }
}
