use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Opaque instrument identifier for one leg of one strike.
/// Venue masters use integers, the demo feed uses strings; both are kept as text.
pub type Token = String;

// ── Leg side ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE", alias = "ce")]
    Call,
    #[serde(rename = "PE", alias = "pe")]
    Put,
}

impl OptionSide {
    #[inline]
    pub fn is_call(self) -> bool {
        matches!(self, OptionSide::Call)
    }
}

impl std::fmt::Display for OptionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CE"),
            Self::Put => write!(f, "PE"),
        }
    }
}

// ── Instrument master row ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(alias = "index_symbol")]
    pub symbol: String,
    pub strike_price: f64,
    pub option_type: OptionSide,
    #[serde(deserialize_with = "deserialize_token")]
    pub instrument_token: Token,
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub lot_size: u32,
    #[serde(default)]
    pub trading_symbol: Option<String>,
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<Token, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    token_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom("instrument_token must be a string or integer"))
}

fn token_from_value(value: &Value) -> Option<Token> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Tick (ephemeral input record) ──

/// One parsed market update. Numeric fields are always finite and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub token: Token,
    pub last_price: f64,
    pub open_interest: f64,
    pub volume: f64,
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    pub fn new(
        token: impl Into<Token>,
        last_price: f64,
        open_interest: f64,
        volume: f64,
        bid: f64,
        ask: f64,
    ) -> Self {
        Self {
            token: token.into(),
            last_price: sanitize(last_price),
            open_interest: sanitize(open_interest),
            volume: sanitize(volume),
            bid: sanitize(bid),
            ask: sanitize(ask),
        }
    }

    /// Parse a loosely-typed payload. Accepts long field names or the venue
    /// short keys (`lp`, `oi`, `v`, `bp`, `ap`). Unusable numeric fields read
    /// as zero; only a missing or unusable token is an error.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| EngineError::MalformedTick("payload is not an object".into()))?;

        let token = obj
            .get("token")
            .and_then(token_from_value)
            .ok_or_else(|| EngineError::MalformedTick("missing or invalid token".into()))?;

        let field = |names: &[&str]| -> f64 {
            names
                .iter()
                .find_map(|n| obj.get(*n))
                .map(number_or_zero)
                .unwrap_or(0.0)
        };

        Ok(Self::new(
            token,
            field(&["last_price", "lp"]),
            field(&["open_interest", "oi"]),
            field(&["volume", "v"]),
            field(&["bid", "bp"]),
            field(&["ask", "ap"]),
        ))
    }
}

fn number_or_zero(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[inline]
fn sanitize(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        0.0
    }
}

// ── Leg state ──

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Leg {
    pub token: Option<Token>,
    pub last_price: f64,
    pub price_change: f64,
    pub open_interest: f64,
    pub open_interest_change: f64,
    pub volume: f64,
    pub bid: f64,
    pub ask: f64,
    /// Annualized, as a fraction (0.18 = 18%).
    pub implied_volatility: f64,
    pub iv_converged: bool,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub tick_count: u64,
}

impl Leg {
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.tick_count > 0
    }

    /// Overwrite market fields from a tick. Changes are only derived once a
    /// prior observation exists.
    #[inline]
    pub fn absorb(&mut self, tick: &Tick) {
        if self.is_initialized() {
            self.price_change = tick.last_price - self.last_price;
            self.open_interest_change = tick.open_interest - self.open_interest;
        }
        self.last_price = tick.last_price;
        self.open_interest = tick.open_interest;
        self.volume = tick.volume;
        self.bid = tick.bid;
        self.ask = tick.ask;
        self.tick_count += 1;
    }
}

// ── Strike row ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrikeRow {
    pub strike: f64,
    pub call: Leg,
    pub put: Leg,
}

impl StrikeRow {
    pub fn new(strike: f64) -> Self {
        Self {
            strike,
            call: Leg::default(),
            put: Leg::default(),
        }
    }

    #[inline]
    pub fn leg(&self, side: OptionSide) -> &Leg {
        match side {
            OptionSide::Call => &self.call,
            OptionSide::Put => &self.put,
        }
    }

    #[inline]
    pub fn leg_mut(&mut self, side: OptionSide) -> &mut Leg {
        match side {
            OptionSide::Call => &mut self.call,
            OptionSide::Put => &mut self.put,
        }
    }
}

// ── Tick application result ──

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Applied { strike: f64, side: OptionSide },
    Ignored(&'static str),
    Malformed(String),
}

impl TickOutcome {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, TickOutcome::Applied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tick_accepts_short_keys_and_strings() {
        let tick = Tick::from_value(&json!({
            "token": 53001, "lp": "101.5", "oi": 120000, "v": 3000, "bp": 101.0, "ap": "102"
        }))
        .unwrap();
        assert_eq!(tick.token, "53001");
        assert_eq!(tick.last_price, 101.5);
        assert_eq!(tick.open_interest, 120_000.0);
        assert_eq!(tick.volume, 3000.0);
        assert_eq!(tick.bid, 101.0);
        assert_eq!(tick.ask, 102.0);
    }

    #[test]
    fn test_invalid_numeric_fields_read_as_zero() {
        let tick = Tick::from_value(&json!({
            "token": "NIFTY_22000_CE", "last_price": "abc", "open_interest": -5, "volume": null, "bid": [1]
        }))
        .unwrap();
        assert_eq!(tick.last_price, 0.0);
        assert_eq!(tick.open_interest, 0.0);
        assert_eq!(tick.volume, 0.0);
        assert_eq!(tick.bid, 0.0);
        assert_eq!(tick.ask, 0.0);

        let direct = Tick::new("X", f64::NAN, f64::INFINITY, 10.0, -1.0, 2.0);
        assert_eq!(direct.last_price, 0.0);
        assert_eq!(direct.open_interest, 0.0);
        assert_eq!(direct.volume, 10.0);
        assert_eq!(direct.bid, 0.0);
    }

    #[test]
    fn test_missing_token_is_malformed() {
        assert!(Tick::from_value(&json!({"lp": 100.0})).is_err());
        assert!(Tick::from_value(&json!({"token": {"id": 1}, "lp": 100.0})).is_err());
        assert!(Tick::from_value(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_first_tick_has_no_change() {
        let mut leg = Leg::default();
        leg.absorb(&Tick::new("t", 100.0, 5000.0, 10.0, 99.5, 100.5));
        assert_eq!(leg.price_change, 0.0);
        assert_eq!(leg.open_interest_change, 0.0);

        leg.absorb(&Tick::new("t", 104.0, 4500.0, 12.0, 103.5, 104.5));
        assert_eq!(leg.price_change, 4.0);
        assert_eq!(leg.open_interest_change, -500.0);
        assert_eq!(leg.tick_count, 2);
    }

    #[test]
    fn test_instrument_token_from_integer() {
        let inst: Instrument = serde_json::from_value(json!({
            "symbol": "NIFTY", "strike_price": 22000.0, "option_type": "PE",
            "instrument_token": 40123, "expiry": "16OCT26", "lot_size": 50
        }))
        .unwrap();
        assert_eq!(inst.instrument_token, "40123");
        assert_eq!(inst.option_type, OptionSide::Put);
    }

    #[test]
    fn test_instrument_side_accepts_lowercase() {
        let rows: Vec<Instrument> = serde_json::from_value(json!([
            {"symbol": "NIFTY", "strike_price": 22000.0, "option_type": "ce", "instrument_token": "a"},
            {"symbol": "NIFTY", "strike_price": 22000.0, "option_type": "pe", "instrument_token": "b"},
        ]))
        .unwrap();
        assert_eq!(rows[0].option_type, OptionSide::Call);
        assert_eq!(rows[1].option_type, OptionSide::Put);
        assert_eq!(serde_json::to_value(OptionSide::Call).unwrap(), json!("CE"));
    }
}
