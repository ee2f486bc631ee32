//! Chain analytics.
//! All functions are pure -- they take a strike snapshot and return computed values.

use crate::chain::store::OptionChain;
use crate::chain::types::{OptionSide, StrikeRow};

/// PCR above this reads as bullish positioning.
const BULLISH_PCR: f64 = 1.2;
/// PCR below this reads as bearish positioning.
const BEARISH_PCR: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PcrReading {
    pub ratio: f64,
    pub total_call_oi: f64,
    pub total_put_oi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OiBuildup {
    #[serde(rename = "Long Build-up")]
    LongBuildup,
    #[serde(rename = "Short Build-up")]
    ShortBuildup,
    #[serde(rename = "Short Covering")]
    ShortCovering,
    #[serde(rename = "Long Unwinding")]
    LongUnwinding,
    Neutral,
}

impl std::fmt::Display for OiBuildup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LongBuildup => write!(f, "Long Build-up"),
            Self::ShortBuildup => write!(f, "Short Build-up"),
            Self::ShortCovering => write!(f, "Short Covering"),
            Self::LongUnwinding => write!(f, "Long Unwinding"),
            Self::Neutral => write!(f, "Neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LegBuildup {
    pub strike: f64,
    pub side: OptionSide,
    pub buildup: OiBuildup,
    pub price_change: f64,
    pub oi_change: f64,
}

/// Everything the display layer shows next to the chain table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChainAnalytics {
    pub index: String,
    pub spot_price: f64,
    pub atm_strike: f64,
    pub pcr: PcrReading,
    pub max_pain: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub sentiment: Sentiment,
    pub buildups: Vec<LegBuildup>,
}

/// Put/call ratio of total open interest. Zero when there is no call OI.
pub fn pcr(strikes: &[StrikeRow]) -> PcrReading {
    let total_call_oi: f64 = strikes.iter().map(|r| r.call.open_interest).sum();
    let total_put_oi: f64 = strikes.iter().map(|r| r.put.open_interest).sum();
    let ratio = if total_call_oi > 0.0 {
        total_put_oi / total_call_oi
    } else {
        0.0
    };
    PcrReading {
        ratio,
        total_call_oi,
        total_put_oi,
    }
}

/// Expiry strike minimizing aggregate writer payout:
///
/// L(s) = sum_{k<s} call_oi(k)*(s-k) + sum_{k>s} put_oi(k)*(k-s)
///
/// O(n^2) in strikes. Strikes are ascending, so the first minimum is the
/// lowest strike among ties. `None` for an empty chain.
pub fn max_pain(strikes: &[StrikeRow]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;

    for candidate in strikes {
        let s = candidate.strike;
        let mut loss = 0.0;
        for row in strikes {
            if row.strike < s {
                loss += row.call.open_interest * (s - row.strike);
            } else if row.strike > s {
                loss += row.put.open_interest * (row.strike - s);
            }
        }
        match best {
            Some((_, best_loss)) if loss >= best_loss => {}
            _ => best = Some((s, loss)),
        }
    }

    best.map(|(strike, _)| strike)
}

/// Resistance = strike with the most call OI, support = strike with the most
/// put OI. Ties go to the first strike in order.
pub fn support_resistance(strikes: &[StrikeRow]) -> Option<SupportResistance> {
    let first = strikes.first()?;
    let mut resistance = (first.strike, first.call.open_interest);
    let mut support = (first.strike, first.put.open_interest);

    for row in &strikes[1..] {
        if row.call.open_interest > resistance.1 {
            resistance = (row.strike, row.call.open_interest);
        }
        if row.put.open_interest > support.1 {
            support = (row.strike, row.put.open_interest);
        }
    }

    Some(SupportResistance {
        support: support.0,
        resistance: resistance.0,
    })
}

/// Four-quadrant price/OI classification. Anything touching zero is neutral.
#[inline]
pub fn classify_oi_buildup(price_change: f64, oi_change: f64) -> OiBuildup {
    if price_change > 0.0 && oi_change > 0.0 {
        OiBuildup::LongBuildup
    } else if price_change < 0.0 && oi_change > 0.0 {
        OiBuildup::ShortBuildup
    } else if price_change > 0.0 && oi_change < 0.0 {
        OiBuildup::ShortCovering
    } else if price_change < 0.0 && oi_change < 0.0 {
        OiBuildup::LongUnwinding
    } else {
        OiBuildup::Neutral
    }
}

#[inline]
pub fn sentiment(pcr_ratio: f64) -> Sentiment {
    if pcr_ratio > BULLISH_PCR {
        Sentiment::Bullish
    } else if pcr_ratio < BEARISH_PCR {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}

/// Classify every leg that has seen at least one tick.
pub fn buildup_scan(strikes: &[StrikeRow]) -> Vec<LegBuildup> {
    strikes
        .iter()
        .flat_map(|row| {
            [OptionSide::Call, OptionSide::Put]
                .into_iter()
                .map(move |side| (row.strike, side, row.leg(side)))
        })
        .filter(|(_, _, leg)| leg.is_initialized())
        .map(|(strike, side, leg)| LegBuildup {
            strike,
            side,
            buildup: classify_oi_buildup(leg.price_change, leg.open_interest_change),
            price_change: leg.price_change,
            oi_change: leg.open_interest_change,
        })
        .collect()
}

pub fn summarize(chain: &OptionChain) -> ChainAnalytics {
    let strikes = chain.strikes();
    let reading = pcr(strikes);
    let levels = support_resistance(strikes);

    ChainAnalytics {
        index: chain.index.clone(),
        spot_price: chain.spot_price,
        atm_strike: chain.atm_strike,
        pcr: reading,
        max_pain: max_pain(strikes),
        support: levels.map(|l| l.support),
        resistance: levels.map(|l| l.resistance),
        sentiment: sentiment(reading.ratio),
        buildups: buildup_scan(strikes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::Tick;

    fn row(strike: f64, call_oi: f64, put_oi: f64) -> StrikeRow {
        let mut r = StrikeRow::new(strike);
        r.call.open_interest = call_oi;
        r.put.open_interest = put_oi;
        r
    }

    #[test]
    fn test_pcr_mixed() {
        let chain = vec![row(100.0, 100.0, 300.0), row(110.0, 200.0, 150.0), row(120.0, 100.0, 150.0)];
        let r = pcr(&chain);
        assert_eq!(r.total_call_oi, 400.0);
        assert_eq!(r.total_put_oi, 600.0);
        assert!((r.ratio - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_pcr_zero_call_oi() {
        let chain = vec![row(100.0, 0.0, 500.0), row(110.0, 0.0, 250.0)];
        let r = pcr(&chain);
        assert_eq!(r.ratio, 0.0);
        assert_eq!(r.total_put_oi, 750.0);
        assert_eq!(pcr(&[]).ratio, 0.0);
    }

    #[test]
    fn test_max_pain_hand_computed() {
        // L(100) = 50*10 + 100*20        = 2500
        // L(110) = 100*10 + 100*10       = 2000
        // L(120) = 100*20 + 50*10        = 2500
        let chain = vec![row(100.0, 100.0, 10.0), row(110.0, 50.0, 50.0), row(120.0, 10.0, 100.0)];
        assert_eq!(max_pain(&chain), Some(110.0));
    }

    #[test]
    fn test_max_pain_ties_take_lowest_strike() {
        let flat = vec![row(100.0, 0.0, 0.0), row(110.0, 0.0, 0.0), row(120.0, 0.0, 0.0)];
        assert_eq!(max_pain(&flat), Some(100.0));

        // L(100) = 10*20 = 200, L(110) = 10*10 + 10*10 = 200, L(120) = 10*20 = 200
        let tied = vec![row(100.0, 10.0, 0.0), row(110.0, 0.0, 0.0), row(120.0, 0.0, 10.0)];
        assert_eq!(max_pain(&tied), Some(100.0));

        assert_eq!(max_pain(&[]), None);
    }

    #[test]
    fn test_support_resistance() {
        let chain = vec![
            row(100.0, 10.0, 900.0),
            row(110.0, 500.0, 200.0),
            row(120.0, 800.0, 100.0),
            row(130.0, 800.0, 900.0),
        ];
        let levels = support_resistance(&chain).unwrap();
        assert_eq!(levels.resistance, 120.0);
        assert_eq!(levels.support, 100.0);
        assert_eq!(support_resistance(&[]), None);
    }

    #[test]
    fn test_classify_quadrants() {
        assert_eq!(classify_oi_buildup(5.0, 10.0), OiBuildup::LongBuildup);
        assert_eq!(classify_oi_buildup(-5.0, 10.0), OiBuildup::ShortBuildup);
        assert_eq!(classify_oi_buildup(5.0, -10.0), OiBuildup::ShortCovering);
        assert_eq!(classify_oi_buildup(-5.0, -10.0), OiBuildup::LongUnwinding);
        assert_eq!(classify_oi_buildup(0.0, 10.0), OiBuildup::Neutral);
        assert_eq!(classify_oi_buildup(5.0, 0.0), OiBuildup::Neutral);
        assert_eq!(classify_oi_buildup(0.0, 0.0), OiBuildup::Neutral);
        assert_eq!(OiBuildup::ShortCovering.to_string(), "Short Covering");
    }

    #[test]
    fn test_sentiment_bands() {
        assert_eq!(sentiment(1.3), Sentiment::Bullish);
        assert_eq!(sentiment(1.2), Sentiment::Neutral);
        assert_eq!(sentiment(0.8), Sentiment::Neutral);
        assert_eq!(sentiment(0.5), Sentiment::Bearish);
    }

    #[test]
    fn test_buildup_scan_only_initialized_legs() {
        let mut r = StrikeRow::new(22_000.0);
        r.call.absorb(&Tick::new("c", 100.0, 1000.0, 1.0, 1.0, 1.0));
        r.call.absorb(&Tick::new("c", 90.0, 1500.0, 1.0, 1.0, 1.0));
        let scan = buildup_scan(&[r]);
        assert_eq!(scan.len(), 1);
        assert_eq!(scan[0].side, OptionSide::Call);
        assert_eq!(scan[0].buildup, OiBuildup::ShortBuildup);
        assert_eq!(scan[0].oi_change, 500.0);
    }
}
