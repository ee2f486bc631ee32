use crate::chain::store::atm_strike_for;
use crate::chain::types::{Instrument, OptionSide};
use crate::config::IndexSpec;
use crate::errors::{EngineError, EngineResult};
use chrono::{Datelike, Duration, NaiveDate};
use std::path::Path;

/// Strikes generated on each side of the ATM strike in demo mode.
const DEMO_STRIKES_EACH_SIDE: i32 = 10;

/// Load an instrument master exported as a JSON array of rows:
///
/// [{"symbol": "NIFTY", "strike_price": 22000.0, "option_type": "CE",
///   "instrument_token": 40123, "expiry": "16OCT26", "lot_size": 50}, ...]
pub fn load_instruments(path: &Path) -> EngineResult<Vec<Instrument>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Instruments(format!("read {}: {e}", path.display())))?;

    let rows: Vec<Instrument> = serde_json::from_str(&raw)
        .map_err(|e| EngineError::Instruments(format!("parse {}: {e}", path.display())))?;

    tracing::info!(path = %path.display(), rows = rows.len(), "instrument master loaded");
    Ok(rows)
}

/// Synthetic option instruments: 21 strikes around each index's ATM, both
/// legs, expiring the coming Thursday.
pub fn demo_instruments(indices: &[IndexSpec], today: NaiveDate) -> Vec<Instrument> {
    let expiry = next_thursday(today).format("%d%b%y").to_string().to_uppercase();
    let mut rows = Vec::with_capacity(indices.len() * (2 * DEMO_STRIKES_EACH_SIDE as usize + 1) * 2);

    for spec in indices {
        let atm = atm_strike_for(spec.spot, spec.strike_step);
        let lot_size = if spec.symbol == "NIFTY" { 50 } else { 15 };

        for i in -DEMO_STRIKES_EACH_SIDE..=DEMO_STRIKES_EACH_SIDE {
            let strike = atm + f64::from(i) * spec.strike_step;
            for side in [OptionSide::Call, OptionSide::Put] {
                rows.push(Instrument {
                    symbol: spec.symbol.clone(),
                    strike_price: strike,
                    option_type: side,
                    instrument_token: format!("{}_{}_{}", spec.symbol, strike, side),
                    expiry: expiry.clone(),
                    lot_size,
                    trading_symbol: Some(format!("{}{}{}{}", spec.symbol, expiry, strike, side)),
                });
            }
        }
    }

    tracing::info!(rows = rows.len(), expiry = %expiry, "demo instruments generated");
    rows
}

/// Today if it is a Thursday, otherwise the next one.
pub fn next_thursday(today: NaiveDate) -> NaiveDate {
    let from_monday = i64::from(today.weekday().num_days_from_monday());
    let days_ahead = (3 - from_monday).rem_euclid(7);
    today + Duration::days(days_ahead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::store::OptionChain;
    use std::io::Write;

    fn specs() -> Vec<IndexSpec> {
        vec![
            IndexSpec { symbol: "NIFTY".into(), strike_step: 50.0, spot: 22_000.0 },
            IndexSpec { symbol: "BANKNIFTY".into(), strike_step: 100.0, spot: 47_000.0 },
        ]
    }

    #[test]
    fn test_next_thursday() {
        // 2026-10-16 is a Friday
        let fri = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(next_thursday(fri), NaiveDate::from_ymd_opt(2026, 10, 22).unwrap());
        let thu = NaiveDate::from_ymd_opt(2026, 10, 22).unwrap();
        assert_eq!(next_thursday(thu), thu);
    }

    #[test]
    fn test_demo_instruments_build_full_chains() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let rows = demo_instruments(&specs(), today);
        assert_eq!(rows.len(), 2 * 21 * 2);
        assert!(rows.iter().any(|r| r.instrument_token == "NIFTY_22000_CE"));
        assert!(rows.iter().all(|r| r.expiry == "22OCT26"));

        let chain = OptionChain::initialize("BANKNIFTY", 100.0, &rows, 47_000.0).unwrap();
        assert_eq!(chain.strikes().len(), 21);
        assert_eq!(chain.token_count(), 42);
        assert_eq!(chain.strikes()[0].strike, 46_000.0);
        assert_eq!(chain.lot_size, 15);
        assert_eq!(chain.days_to_expiry(today), Some(6.0));
    }

    #[test]
    fn test_load_instruments_from_file() {
        let path = std::env::temp_dir().join(format!("chain_pulse_instruments_{}.json", uuid::Uuid::new_v4()));
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"[{{"symbol":"NIFTY","strike_price":22000,"option_type":"CE","instrument_token":40123,"expiry":"22OCT26","lot_size":50}},
               {{"index_symbol":"NIFTY","strike_price":22000,"option_type":"PE","instrument_token":"40124"}}]"#
        )
        .unwrap();

        let rows = load_instruments(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].instrument_token, "40123");
        assert_eq!(rows[1].option_type, OptionSide::Put);
        assert_eq!(rows[1].lot_size, 0);
    }

    #[test]
    fn test_load_instruments_bad_file() {
        let missing = std::env::temp_dir().join("chain_pulse_does_not_exist.json");
        assert!(matches!(load_instruments(&missing), Err(EngineError::Instruments(_))));
    }
}
