use crate::chain::types::{Instrument, OptionSide, StrikeRow, Tick, TickOutcome, Token};
use crate::errors::{EngineError, EngineResult};
use crate::models::black_scholes::BlackScholes;
use crate::models::implied_vol::implied_volatility;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;

/// Floor on time to expiry for greeks passes (about 53 minutes).
pub const MIN_TTL_YEARS: f64 = 0.0001;

const EXPIRY_FORMATS: [&str; 4] = ["%d%b%y", "%Y-%m-%d", "%d-%b-%Y", "%d%b%Y"];

/// Per-index option chain: sorted strikes, each with a call and a put leg.
///
/// Owned by exactly one consumer, so nothing in here locks. Tokens that are
/// not in the routing table never create legs.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OptionChain {
    pub index: String,
    pub strike_step: f64,
    pub spot_price: f64,
    pub atm_strike: f64,
    pub expiry: Option<NaiveDate>,
    pub expiry_label: String,
    pub lot_size: u32,
    strikes: Vec<StrikeRow>,
    #[serde(skip)]
    routes: HashMap<Token, (usize, OptionSide)>,
}

/// Counts from one `apply_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub applied: u64,
    pub ignored: u64,
}

/// Counts from one `recompute_greeks` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GreeksPass {
    pub priced: u32,
    pub unconverged: u32,
    pub skipped_unpriced: u32,
}

impl OptionChain {
    /// Build the chain for `index` from a full instrument list.
    ///
    /// Rows for other indices are dropped. When rows span several dated
    /// expiries only the nearest is kept. Returns `EmptyChain` when nothing
    /// matches.
    pub fn initialize(
        index: &str,
        strike_step: f64,
        instruments: &[Instrument],
        spot_price: f64,
    ) -> EngineResult<Self> {
        let matching: Vec<&Instrument> = instruments
            .iter()
            .filter(|i| i.symbol == index && i.strike_price.is_finite() && i.strike_price > 0.0)
            .collect();

        let nearest = matching
            .iter()
            .filter_map(|i| parse_expiry(&i.expiry))
            .min();

        let selected: Vec<&Instrument> = match nearest {
            Some(date) => matching
                .into_iter()
                .filter(|i| parse_expiry(&i.expiry) == Some(date))
                .collect(),
            None => matching,
        };

        let first = selected.first().ok_or_else(|| EngineError::EmptyChain {
            index: index.to_string(),
        })?;
        let expiry_label = first.expiry.clone();
        let lot_size = first.lot_size;

        let mut strike_axis: Vec<f64> = selected.iter().map(|i| i.strike_price).collect();
        strike_axis.sort_by(f64::total_cmp);
        strike_axis.dedup();

        let mut strikes: Vec<StrikeRow> = strike_axis.iter().map(|&k| StrikeRow::new(k)).collect();
        let mut routes = HashMap::with_capacity(selected.len());

        for inst in &selected {
            let Ok(idx) = strike_axis.binary_search_by(|k| k.total_cmp(&inst.strike_price)) else {
                continue;
            };
            strikes[idx].leg_mut(inst.option_type).token = Some(inst.instrument_token.clone());
            if let Some((prev_idx, prev_side)) =
                routes.insert(inst.instrument_token.clone(), (idx, inst.option_type))
            {
                tracing::warn!(
                    index = %index,
                    token = %inst.instrument_token,
                    prev_strike = strike_axis[prev_idx],
                    prev_side = %prev_side,
                    "duplicate instrument token, later row wins"
                );
            }
        }

        let atm_strike = atm_strike_for(spot_price, strike_step);

        tracing::info!(
            index = %index,
            strikes = strikes.len(),
            tokens = routes.len(),
            spot = spot_price,
            atm = atm_strike,
            expiry = %expiry_label,
            "option chain initialized"
        );

        Ok(Self {
            index: index.to_string(),
            strike_step,
            spot_price,
            atm_strike,
            expiry: nearest,
            expiry_label,
            lot_size,
            strikes,
            routes,
        })
    }

    /// Hot path: route one tick to its leg.
    #[inline]
    pub fn apply_tick(&mut self, tick: &Tick) -> TickOutcome {
        let Some(&(idx, side)) = self.routes.get(&tick.token) else {
            return TickOutcome::Ignored("unknown token");
        };
        match self.strikes.get_mut(idx) {
            Some(row) => {
                row.leg_mut(side).absorb(tick);
                TickOutcome::Applied {
                    strike: row.strike,
                    side,
                }
            }
            None => TickOutcome::Ignored("routed strike missing"),
        }
    }

    /// Where a token lands on this chain, if it is one of ours.
    pub fn route(&self, token: &str) -> Option<(f64, OptionSide)> {
        let &(idx, side) = self.routes.get(token)?;
        self.strikes.get(idx).map(|row| (row.strike, side))
    }

    pub fn apply_batch<'a, I>(&mut self, ticks: I) -> ApplyStats
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        let mut stats = ApplyStats::default();
        for tick in ticks {
            if self.apply_tick(tick).is_applied() {
                stats.applied += 1;
            } else {
                stats.ignored += 1;
            }
        }
        stats
    }

    /// Refresh IV and Greeks on every leg with a traded price.
    /// Legs with no price are left as they are. O(strikes); callers throttle it.
    pub fn recompute_greeks(
        &mut self,
        model: &BlackScholes,
        risk_free_rate: f64,
        days_to_expiry: f64,
    ) -> GreeksPass {
        let mut pass = GreeksPass::default();
        if self.spot_price <= 0.0 || !self.spot_price.is_finite() {
            return pass;
        }

        let ttl_years = (days_to_expiry / 365.0).max(MIN_TTL_YEARS);
        let spot = self.spot_price;

        for row in self.strikes.iter_mut() {
            let strike = row.strike;
            for side in [OptionSide::Call, OptionSide::Put] {
                let leg = row.leg_mut(side);
                if leg.last_price <= 0.0 {
                    pass.skipped_unpriced += 1;
                    continue;
                }

                let is_call = side.is_call();
                let est = implied_volatility(
                    model,
                    leg.last_price,
                    spot,
                    strike,
                    ttl_years,
                    risk_free_rate,
                    is_call,
                );
                let g = model.price_and_greeks(spot, strike, ttl_years, risk_free_rate, est.sigma, is_call);

                leg.implied_volatility = est.sigma;
                leg.iv_converged = est.converged;
                leg.delta = g.delta;
                leg.gamma = g.gamma;
                leg.vega = g.vega;
                leg.theta = g.theta;

                pass.priced += 1;
                if !est.converged {
                    pass.unconverged += 1;
                }
            }
        }

        tracing::debug!(
            index = %self.index,
            priced = pass.priced,
            unconverged = pass.unconverged,
            ttl_years = ttl_years,
            "greeks pass complete"
        );
        pass
    }

    /// Strikes within `radius` positions of the ATM strike. If the ATM strike
    /// is not on the axis, the first `2 * radius` strikes are returned instead.
    pub fn display_window(&self, radius: usize) -> &[StrikeRow] {
        match self.atm_position() {
            Some(pos) => {
                let start = pos.saturating_sub(radius);
                let end = pos
                    .saturating_add(radius)
                    .saturating_add(1)
                    .min(self.strikes.len());
                &self.strikes[start..end]
            }
            None => {
                let end = radius.saturating_mul(2).min(self.strikes.len());
                &self.strikes[..end]
            }
        }
    }

    /// Days left until the chain's expiry, or `None` if the expiry is undated.
    pub fn days_to_expiry(&self, today: NaiveDate) -> Option<f64> {
        self.expiry
            .map(|e| (e - today).num_days().max(0) as f64)
    }

    #[inline]
    pub fn strikes(&self) -> &[StrikeRow] {
        &self.strikes
    }

    #[cfg(test)]
    pub fn strike(&self, strike: f64) -> Option<&StrikeRow> {
        self.strikes
            .binary_search_by(|row| row.strike.total_cmp(&strike))
            .ok()
            .map(|idx| &self.strikes[idx])
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.routes.keys()
    }

    #[cfg(test)]
    pub fn token_count(&self) -> usize {
        self.routes.len()
    }

    fn atm_position(&self) -> Option<usize> {
        self.strikes
            .iter()
            .position(|row| (row.strike - self.atm_strike).abs() < 1e-9)
    }
}

/// Ingestion boundary for raw payloads: parse, then resolve the leg the tick
/// targets across `chains`. The parsed tick comes back unless the payload is
/// malformed.
pub fn resolve_payload<'a, I>(chains: I, payload: &Value) -> (TickOutcome, Option<Tick>)
where
    I: IntoIterator<Item = &'a OptionChain>,
{
    let tick = match Tick::from_value(payload) {
        Ok(tick) => tick,
        Err(e) => return (TickOutcome::Malformed(e.to_string()), None),
    };
    let outcome = chains
        .into_iter()
        .find_map(|chain| chain.route(&tick.token))
        .map_or(TickOutcome::Ignored("unknown token"), |(strike, side)| {
            TickOutcome::Applied { strike, side }
        });
    (outcome, Some(tick))
}

/// `round(spot / step) * step` with halves rounded up (22175 / 50 -> 22200).
#[inline]
pub fn atm_strike_for(spot: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return spot;
    }
    (spot / step + 0.5).floor() * step
}

pub fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    EXPIRY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
