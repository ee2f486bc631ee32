use crate::chain::types::{Tick, Token};
use crate::registry::TickRegistry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::watch;

/// Demo producer. Publishes a randomized tick for every subscribed token
/// into the shared registry once per `interval`, until `shutdown` flips.
pub async fn run_demo_feed(
    registry: Arc<TickRegistry>,
    tokens: Vec<Token>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(tokens = tokens.len(), "demo tick feed started");

    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for tick in simulate_ticks(&mut rng, &tokens) {
                    registry.publish(tick.token.clone(), tick);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(published = registry.published_count(), "demo tick feed stopped");
}

/// One round of synthetic quotes: last price 100 +/- 5, OI 100k +/- 5k,
/// volume 1000..=5000, a one-rupee bid/ask spread around the last price.
pub fn simulate_ticks<R: Rng>(rng: &mut R, tokens: &[Token]) -> Vec<Tick> {
    tokens
        .iter()
        .map(|token| {
            let price = 100.0 + rng.gen_range(-5.0f64..=5.0);
            let oi = 100_000.0 + f64::from(rng.gen_range(-5_000i32..=5_000));
            let volume = f64::from(rng.gen_range(1_000u32..=5_000));
            Tick::new(token.clone(), price, oi, volume, price - 0.5, price + 0.5)
        })
        .collect()
}
