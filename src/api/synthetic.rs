use crate::models::{DataSource, Quote};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Random-walk quote generator used when every upstream is unavailable
///
/// Each call moves the previous close by up to about 1%, with a slight upward drift.
pub struct SyntheticQuotes {
    rng: Mutex<StdRng>,
    base_price: f64,
}

impl SyntheticQuotes {
    /// Seeded generator for reproducible runs
    pub fn new(seed: u64, base_price: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            base_price,
        }
    }

    pub fn from_entropy(base_price: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            base_price,
        }
    }

    /// Next bar following `previous_close`, or the base price when there is no history
    pub fn next_quote(&self, previous_close: Option<f64>) -> Quote {
        let open = previous_close
            .filter(|p| *p > 0.0)
            .unwrap_or(self.base_price);

        // A panic while holding the lock cannot leave the RNG in a bad state
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let change = (rng.gen::<f64>() - 0.48) * open * 0.02;
        let close = (open + change).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen::<f64>() * 0.005);
        let low = open.min(close) * (1.0 - rng.gen::<f64>() * 0.005);
        let volume = rng.gen_range(100_000.0..1_000_000.0_f64).round();

        Quote {
            open,
            high,
            low,
            close,
            volume,
            source: DataSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_walk() {
        let a = SyntheticQuotes::new(42, 100.0);
        let b = SyntheticQuotes::new(42, 100.0);

        let mut prev_a = None;
        let mut prev_b = None;
        for _ in 0..20 {
            let qa = a.next_quote(prev_a);
            let qb = b.next_quote(prev_b);
            assert_eq!(qa, qb);
            prev_a = Some(qa.close);
            prev_b = Some(qb.close);
        }
    }

    #[test]
    fn test_step_is_bounded() {
        let quotes = SyntheticQuotes::new(7, 2500.0);
        let mut previous = 2500.0;

        for _ in 0..500 {
            let q = quotes.next_quote(Some(previous));
            assert_eq!(q.open, previous);
            assert!((q.close - previous).abs() <= previous * 0.0105);
            assert!(q.high >= q.open.max(q.close));
            assert!(q.low <= q.open.min(q.close));
            assert_eq!(q.source, DataSource::Fallback);
            previous = q.close;
        }
    }

    #[test]
    fn test_starts_from_base_price() {
        let quotes = SyntheticQuotes::new(1, 150.0);
        assert_eq!(quotes.next_quote(None).open, 150.0);
        assert_eq!(quotes.next_quote(Some(0.0)).open, 150.0);
    }
}
