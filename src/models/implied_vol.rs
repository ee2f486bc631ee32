use crate::models::black_scholes::BlackScholes;

/// Starting guess for the Newton-Raphson search.
pub const INITIAL_SIGMA: f64 = 0.20;

/// Converged once model and market prices agree within this many currency units.
pub const PRICE_TOLERANCE: f64 = 0.01;

pub const MAX_ITERATIONS: u32 = 100;

/// Replacement for a step that would make sigma non-positive.
pub const SIGMA_FLOOR: f64 = 0.01;

/// Result of an implied-volatility solve. `sigma` is always the last
/// estimate reached; `converged` says whether callers can trust it.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct IvEstimate {
    pub sigma: f64,
    pub converged: bool,
    pub iterations: u32,
}

/// Newton-Raphson inversion of Black-Scholes, starting at sigma = 0.20.
///
/// Stops on price agreement (converged), on zero vega, or after
/// `MAX_ITERATIONS` pricing calls (both non-converged).
pub fn implied_volatility(
    model: &BlackScholes,
    market_price: f64,
    spot: f64,
    strike: f64,
    ttl_years: f64,
    rate: f64,
    is_call: bool,
) -> IvEstimate {
    let mut sigma = INITIAL_SIGMA;

    for i in 1..=MAX_ITERATIONS {
        let g = model.price_and_greeks(spot, strike, ttl_years, rate, sigma, is_call);
        let diff = market_price - g.price;

        if diff.abs() < PRICE_TOLERANCE {
            return IvEstimate { sigma, converged: true, iterations: i };
        }
        if g.vega == 0.0 {
            return IvEstimate { sigma, converged: false, iterations: i };
        }

        sigma += diff / g.vega;
        if sigma <= 0.0 || !sigma.is_finite() {
            sigma = SIGMA_FLOOR;
        }
    }

    IvEstimate {
        sigma,
        converged: false,
        iterations: MAX_ITERATIONS,
    }
}
