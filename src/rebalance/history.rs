//! Per-pool tick and price history
//!
//! Bounded FIFO rings of recent observations, owned by the coordinator and
//! appended once per successful snapshot read. The decision engine only
//! reads them through `PoolHistory`.
//!
//! Volatility is a coarse step function over the population standard
//! deviation of successive tick deltas:
//!     < 6 samples → 1000 bps (not enough data, assume moderate risk)
//!     std < 5 → 500, < 15 → 800, < 30 → 1200, < 60 → 1500, else 2000

use crate::types::PoolId;
use alloy::primitives::U256;
use std::collections::{HashMap, VecDeque};

/// Default ring capacity per pool.
pub const DEFAULT_HISTORY_SIZE: usize = 48;

/// Below this many tick samples the volatility estimate is the default.
pub const MIN_VOLATILITY_SAMPLES: usize = 6;

/// Estimate reported while history is too short.
pub const DEFAULT_VOLATILITY_BPS: u32 = 1_000;

/// (upper std bound, bucket) pairs, checked in order.
const VOLATILITY_BUCKETS: [(f64, u32); 4] = [(5.0, 500), (15.0, 800), (30.0, 1_200), (60.0, 1_500)];
const MAX_VOLATILITY_BPS: u32 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSample {
    pub tick: i32,
    pub observed_at_millis: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub price: U256,
    pub observed_at_millis: i64,
}

/// Tick and price rings for every pool the keeper has observed.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    ticks: HashMap<PoolId, VecDeque<TickSample>>,
    prices: HashMap<PoolId, VecDeque<PriceSample>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ticks: HashMap::new(),
            prices: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_tick(&mut self, pool_id: PoolId, tick: i32, now_millis: i64) {
        push_bounded(
            self.ticks.entry(pool_id).or_default(),
            TickSample {
                tick,
                observed_at_millis: now_millis,
            },
            self.capacity,
        );
    }

    pub fn record_price(&mut self, pool_id: PoolId, price: U256, now_millis: i64) {
        push_bounded(
            self.prices.entry(pool_id).or_default(),
            PriceSample {
                price,
                observed_at_millis: now_millis,
            },
            self.capacity,
        );
    }

    pub fn volatility_bps(&self, pool_id: &PoolId) -> u32 {
        self.view(pool_id).volatility_bps()
    }

    /// Read-only view of one pool's history.
    pub fn view(&self, pool_id: &PoolId) -> PoolHistory<'_> {
        PoolHistory {
            ticks: self.ticks.get(pool_id),
            prices: self.prices.get(pool_id),
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, sample: T, capacity: usize) {
    ring.push_back(sample);
    while ring.len() > capacity {
        ring.pop_front();
    }
}

/// Borrowed history for one pool. Empty for pools never observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolHistory<'a> {
    ticks: Option<&'a VecDeque<TickSample>>,
    prices: Option<&'a VecDeque<PriceSample>>,
}

impl<'a> PoolHistory<'a> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.map_or(0, VecDeque::len)
    }

    pub fn price_count(&self) -> usize {
        self.prices.map_or(0, VecDeque::len)
    }

    /// The price sample recorded before the most recent one.
    ///
    /// The coordinator records the current observation before deciding, so
    /// this is the price the current spot is compared against.
    pub fn previous_price(&self) -> Option<U256> {
        let prices = self.prices?;
        if prices.len() < 2 {
            return None;
        }
        prices.get(prices.len() - 2).map(|s| s.price)
    }

    pub fn volatility_bps(&self) -> u32 {
        match self.ticks {
            Some(ticks) => volatility_from_ticks(ticks.iter().map(|s| s.tick)),
            None => DEFAULT_VOLATILITY_BPS,
        }
    }
}

/// Buckets the dispersion of successive tick deltas.
///
/// Floating point is acceptable here: the bucket is a coarse classifier
/// reported to the hook, not a monetary gate.
pub fn volatility_from_ticks<I>(ticks: I) -> u32
where
    I: IntoIterator<Item = i32>,
{
    let ticks: Vec<i64> = ticks.into_iter().map(i64::from).collect();
    if ticks.len() < MIN_VOLATILITY_SAMPLES {
        return DEFAULT_VOLATILITY_BPS;
    }

    let deltas: Vec<f64> = ticks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let n = deltas.len() as f64;
    let mean = deltas.iter().sum::<f64>() / n;
    let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    VOLATILITY_BUCKETS
        .iter()
        .find(|(bound, _)| std < *bound)
        .map(|(_, bps)| *bps)
        .unwrap_or(MAX_VOLATILITY_BPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn pool(byte: u8) -> PoolId {
        PoolId(B256::repeat_byte(byte))
    }

    /// Ticks whose deltas alternate +step / -step.
    fn zigzag(step: i32, len: usize) -> Vec<i32> {
        (0..len)
            .map(|i| if i % 2 == 0 { 0 } else { step })
            .collect()
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut store = HistoryStore::new(3);
        let id = pool(1);
        for (i, tick) in [10, 20, 30, 40].into_iter().enumerate() {
            store.record_tick(id, tick, i as i64);
        }
        let view = store.view(&id);
        assert_eq!(view.tick_count(), 3);
        let ticks: Vec<i32> = store.ticks[&id].iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![20, 30, 40]);
    }

    #[test]
    fn test_pools_are_independent() {
        let mut store = HistoryStore::new(4);
        store.record_tick(pool(1), 5, 0);
        assert_eq!(store.view(&pool(1)).tick_count(), 1);
        assert_eq!(store.view(&pool(2)).tick_count(), 0);
    }

    #[test]
    fn test_volatility_defaults_below_six_samples() {
        let mut store = HistoryStore::default();
        let id = pool(1);
        assert_eq!(store.volatility_bps(&id), DEFAULT_VOLATILITY_BPS);
        for i in 0..5 {
            store.record_tick(id, i * 1_000, i as i64);
        }
        assert_eq!(store.volatility_bps(&id), DEFAULT_VOLATILITY_BPS);
        store.record_tick(id, 0, 6);
        assert_ne!(store.volatility_bps(&id), DEFAULT_VOLATILITY_BPS);
    }

    #[test]
    fn test_volatility_buckets() {
        // Flat history has zero dispersion
        assert_eq!(volatility_from_ticks(vec![100; 10]), 500);
        // Constant drift also has zero dispersion of deltas
        assert_eq!(volatility_from_ticks((0..10).map(|i| i * 50)), 500);
        // 11 zigzag ticks → 10 deltas of ±step, mean 0, std = step
        assert_eq!(volatility_from_ticks(zigzag(10, 11)), 800);
        assert_eq!(volatility_from_ticks(zigzag(20, 11)), 1_200);
        assert_eq!(volatility_from_ticks(zigzag(45, 11)), 1_500);
        assert_eq!(volatility_from_ticks(zigzag(200, 11)), 2_000);
    }

    #[test]
    fn test_volatility_monotonic_in_dispersion() {
        let mut last = 0;
        for step in [0, 2, 4, 6, 10, 14, 16, 25, 29, 31, 50, 59, 61, 120, 1_000] {
            let bps = volatility_from_ticks(zigzag(step, 13));
            assert!(bps >= last, "step {} gave {} after {}", step, bps, last);
            last = bps;
        }
        assert_eq!(last, 2_000);
    }

    #[test]
    fn test_previous_price_is_second_to_last() {
        let mut store = HistoryStore::new(8);
        let id = pool(3);
        store.record_price(id, U256::from(100u64), 0);
        assert_eq!(store.view(&id).previous_price(), None);
        store.record_price(id, U256::from(110u64), 1);
        store.record_price(id, U256::from(120u64), 2);
        assert_eq!(store.view(&id).previous_price(), Some(U256::from(110u64)));
        assert_eq!(store.view(&id).price_count(), 3);
    }
}
