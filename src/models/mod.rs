pub mod black_scholes;
pub mod implied_vol;

/// Output of one Black-Scholes evaluation.
/// `vega` is per unit of volatility, `theta` is per year.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct OptionGreeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
}

/// Precomputed inputs for one evaluation. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy)]
pub struct ModelParams {
    pub spot: f64,
    pub strike: f64,
    pub ttl_years: f64,
    pub rate: f64,
    pub sigma: f64,
    // Precomputed
    pub ln_s_k: f64,
    pub sqrt_t: f64,
    pub sigma_sqrt_t: f64,
    pub discount: f64,
}

impl ModelParams {
    #[inline]
    pub fn new(spot: f64, strike: f64, ttl_years: f64, rate: f64, sigma: f64) -> Self {
        let sqrt_t = ttl_years.max(0.0).sqrt();
        Self {
            spot,
            strike,
            ttl_years,
            rate,
            sigma,
            ln_s_k: (spot / strike).ln(),
            sqrt_t,
            sigma_sqrt_t: sigma * sqrt_t,
            discount: (-rate * ttl_years).exp(),
        }
    }

    /// True when the closed form is defined for these inputs.
    #[inline]
    pub fn is_priceable(&self) -> bool {
        self.ttl_years > 0.0
            && self.spot > 0.0
            && self.strike > 0.0
            && self.sigma > 0.0
            && self.ln_s_k.is_finite()
            && self.sigma_sqrt_t > 1e-12
    }
}
