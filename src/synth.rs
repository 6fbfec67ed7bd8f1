use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::currency::Currency;
use crate::schema::Quote;

/// Largest jitter draw, in thousandths. Draws are inclusive: 0..=20.
pub const MAX_JITTER_MILLIS: u32 = 20;

/// Fractional digits of every published value.
pub const VALUE_SCALE: u32 = 3;

/// Source of the per-cycle jitter.
///
/// CONTRACT:
/// - Each call returns a fresh draw in `0..=MAX_JITTER_MILLIS`.
/// - Draws are independent between cycles.
///
/// Injected into the runner so tests can script the sequence.
pub trait JitterSource: Send {
    fn next_millis(&mut self) -> u32;
}

/// Uniform jitter backed by any `rand` generator.
pub struct RngJitter<R> {
    rng: R,
}

impl<R: Rng + Send> RngJitter<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngJitter<StdRng> {
    /// OS-seeded generator, used by the running worker.
    pub fn from_os() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng + Send> JitterSource for RngJitter<R> {
    fn next_millis(&mut self) -> u32 {
        self.rng.random_range(0..=MAX_JITTER_MILLIS)
    }
}

/// Builds quotes for the currency selected by the runner.
pub struct QuoteSynthesizer<J> {
    source: String,
    jitter: J,
}

impl<J: JitterSource> QuoteSynthesizer<J> {
    pub fn new(source: impl Into<String>, jitter: J) -> Self {
        Self {
            source: source.into(),
            jitter,
        }
    }

    /// Synthesize a quote for `currency`.
    ///
    /// `value = round(base + draw / 1000, 3)`, always with scale 3.
    pub fn synthesize(&mut self, currency: &Currency) -> Quote {
        let draw = self.jitter.next_millis().min(MAX_JITTER_MILLIS);
        Quote {
            symbol: currency.symbol.to_string(),
            source: self.source.clone(),
            timestamp: Local::now(),
            value: jittered_value(currency.base_value, draw),
        }
    }
}

fn jittered_value(base: Decimal, draw_millis: u32) -> Decimal {
    let mut value = (base + Decimal::new(i64::from(draw_millis), VALUE_SCALE)).round_dp(VALUE_SCALE);
    value.rescale(VALUE_SCALE);
    value
}
