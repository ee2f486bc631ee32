use crate::models::{ModelParams, OptionGreeks};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// European Black-Scholes pricing with continuous compounding.
///
/// d1 = (ln(S/K) + (r + sigma^2/2)*T) / (sigma * sqrt(T))
/// d2 = d1 - sigma * sqrt(T)
///
/// Call = S*N(d1) - K*e^(-rT)*N(d2)
/// Put  = K*e^(-rT)*N(-d2) - S*N(-d1)
pub struct BlackScholes {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

impl BlackScholes {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }

    /// Price and Greeks for one option. Outputs are all zero when
    /// `ttl_years <= 0` or any of spot, strike, sigma is not positive.
    #[inline]
    pub fn price_and_greeks(
        &self,
        spot: f64,
        strike: f64,
        ttl_years: f64,
        rate: f64,
        sigma: f64,
        is_call: bool,
    ) -> OptionGreeks {
        self.evaluate(&ModelParams::new(spot, strike, ttl_years, rate, sigma), is_call)
    }

    pub fn evaluate(&self, p: &ModelParams, is_call: bool) -> OptionGreeks {
        if !p.is_priceable() {
            return OptionGreeks::default();
        }

        let d1 = (p.ln_s_k + (p.rate + 0.5 * p.sigma * p.sigma) * p.ttl_years) / p.sigma_sqrt_t;
        let d2 = d1 - p.sigma_sqrt_t;
        let pdf_d1 = self.normal.pdf(d1);
        let strike_pv = p.strike * p.discount;

        let gamma = pdf_d1 / (p.spot * p.sigma_sqrt_t);
        let vega = p.spot * pdf_d1 * p.sqrt_t;
        let decay = -(p.spot * pdf_d1 * p.sigma) / (2.0 * p.sqrt_t);

        if is_call {
            let nd1 = self.normal.cdf(d1);
            let nd2 = self.normal.cdf(d2);
            OptionGreeks {
                price: p.spot * nd1 - strike_pv * nd2,
                delta: nd1,
                gamma,
                vega,
                theta: decay - p.rate * strike_pv * nd2,
            }
        } else {
            let n_neg_d1 = self.normal.cdf(-d1);
            let n_neg_d2 = self.normal.cdf(-d2);
            OptionGreeks {
                price: strike_pv * n_neg_d2 - p.spot * n_neg_d1,
                delta: -n_neg_d1,
                gamma,
                vega,
                theta: decay + p.rate * strike_pv * n_neg_d2,
            }
        }
    }
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self::new()
    }
}
