//! Execution Coordinator: one rebalance cycle at a time
//!
//! Purpose:
//!     Owns the per-pool history and rate-limit bookkeeping and drives every
//!     pool through read → decide → (maybe) maintain. Both the interval
//!     scheduler and the event-driven drain call into this type.
//!
//! Design:
//!     - Single-flight: an `AtomicBool` guards the cycle. A trigger while a
//!       cycle is running returns `CycleReport::AlreadyRunning` and does
//!       nothing else.
//!     - `run_cycle` drains the work queue, then sweeps every known pool.
//!       `run_drain` only drains.
//!     - Per pool: cooldown → rate limit → snapshot → history → screen →
//!       oracle → conclude → range guard → submit. Any failure skips that
//!       pool for this cycle only.
//!     - Cooldown and rate-limit state change only on a confirmed receipt.
//!       Dry runs log the plan and leave them untouched.
//!     - `PoolInitialized` for an unknown pool registers it with the default
//!       tunables.

use crate::clock::Clock;
use crate::error::ChainError;
use crate::oracle::{FeedSource, OracleReader};
use crate::pool::{PriceCalculator, SnapshotSource};
use crate::rebalance::decision::{conclude, screen, DecisionLimits};
use crate::rebalance::executor::MaintainSubmitter;
use crate::rebalance::history::HistoryStore;
use crate::rebalance::limiter::RateLimiter;
use crate::rebalance::queue::WorkQueue;
use crate::types::{
    Decision, MaintainReceipt, PoolConfig, PoolEntry, PoolId, PoolIdentity, RebalancePlan,
    SkipReason, WorkItem, WorkReason,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Policy knobs that apply to every pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub dry_run: bool,
    pub cooldown_secs: u64,
    pub max_rebalances_per_hour: u32,
    pub history_size: usize,
    pub limits: DecisionLimits,
    /// Tunables for pools discovered from `PoolInitialized`.
    pub default_pool_config: PoolConfig,
}

/// What happened to one pool in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOutcome {
    Skipped(SkipReason),
    DryRun(RebalancePlan),
    Rebalanced {
        plan: RebalancePlan,
        receipt: MaintainReceipt,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolResult {
    pub pool_id: PoolId,
    /// Set for work-queue items, `None` for the sweep.
    pub reason: Option<WorkReason>,
    pub outcome: PoolOutcome,
    /// Volatility the decision saw; `None` when a gate stopped the pool
    /// before the snapshot was screened.
    pub volatility_bps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub results: Vec<PoolResult>,
}

impl CycleSummary {
    pub fn rebalanced(&self) -> usize {
        self.count(|o| matches!(o, PoolOutcome::Rebalanced { .. }))
    }

    pub fn dry_runs(&self) -> usize {
        self.count(|o| matches!(o, PoolOutcome::DryRun(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PoolOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PoolOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&PoolOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    AlreadyRunning,
    Completed(CycleSummary),
}

impl CycleReport {
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            CycleReport::Completed(summary) => Some(summary),
            CycleReport::AlreadyRunning => None,
        }
    }
}

/// Releases the single-flight flag on drop.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinator-owned mutable state. Only touched while the guard is held.
struct EngineState {
    pools: Vec<PoolEntry>,
    history: HistoryStore,
    limiter: RateLimiter,
}

impl EngineState {
    fn entry(&self, pool_id: &PoolId) -> Option<&PoolEntry> {
        self.pools.iter().find(|p| p.identity.id == *pool_id)
    }
}

pub struct ExecutionCoordinator<C> {
    chain: Arc<C>,
    oracle: OracleReader<C>,
    queue: WorkQueue,
    clock: Arc<dyn Clock>,
    settings: CoordinatorSettings,
    running: AtomicBool,
    state: Mutex<EngineState>,
}

impl<C> ExecutionCoordinator<C>
where
    C: SnapshotSource + FeedSource + MaintainSubmitter + 'static,
{
    pub fn new(
        chain: Arc<C>,
        pools: Vec<PoolEntry>,
        queue: WorkQueue,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        let state = EngineState {
            pools,
            history: HistoryStore::new(settings.history_size),
            limiter: RateLimiter::new(),
        };
        Self {
            oracle: OracleReader::new(Arc::clone(&chain)),
            chain,
            queue,
            clock,
            settings,
            running: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Identities of every pool the coordinator currently sweeps.
    pub async fn known_pools(&self) -> Vec<PoolIdentity> {
        let state = self.state.lock().await;
        state.pools.iter().map(|p| p.identity.clone()).collect()
    }

    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    /// Drains queued work, then evaluates every known pool.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run(true).await
    }

    /// Evaluates queued work only.
    pub async fn run_drain(&self) -> CycleReport {
        self.run(false).await
    }

    async fn run(&self, sweep: bool) -> CycleReport {
        let Some(_guard) = self.try_begin() else {
            debug!("cycle already running, trigger dropped");
            return CycleReport::AlreadyRunning;
        };

        let mut state = self.state.lock().await;
        let mut summary = CycleSummary::default();

        while let Some(item) = self.queue.pop() {
            let result = self.process_item(&mut state, item).await;
            summary.results.push(result);
        }

        if sweep {
            let pools = state.pools.clone();
            for entry in &pools {
                let (outcome, volatility_bps) = self.evaluate_pool(&mut state, entry).await;
                summary.results.push(PoolResult {
                    pool_id: entry.identity.id,
                    reason: None,
                    outcome,
                    volatility_bps,
                });
            }
        }

        info!(
            sweep,
            evaluated = summary.results.len(),
            rebalanced = summary.rebalanced(),
            dry_run = summary.dry_runs(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "cycle complete"
        );
        CycleReport::Completed(summary)
    }

    async fn process_item(&self, state: &mut EngineState, item: WorkItem) -> PoolResult {
        let entry = match state.entry(&item.pool_id) {
            Some(entry) => entry.clone(),
            None => {
                let entry = PoolEntry {
                    identity: PoolIdentity::discovered(item.pool_id),
                    config: self.settings.default_pool_config.clone(),
                };
                if item.reason == WorkReason::PoolInitialized {
                    info!(pool = %item.pool_id, "registered newly initialized pool");
                    state.pools.push(entry.clone());
                }
                entry
            }
        };

        debug!(
            pool = %entry.identity.label,
            reason = %item.reason,
            waited_ms = self.clock.now_millis().saturating_sub(item.enqueued_at_millis),
            "processing queued pool"
        );
        let (outcome, volatility_bps) = self.evaluate_pool(state, &entry).await;
        PoolResult {
            pool_id: item.pool_id,
            reason: Some(item.reason),
            outcome,
            volatility_bps,
        }
    }

    /// Runs one pool through the gates. Also returns the volatility the
    /// decision saw, once the snapshot got past `screen`.
    async fn evaluate_pool(
        &self,
        state: &mut EngineState,
        entry: &PoolEntry,
    ) -> (PoolOutcome, Option<u32>) {
        let pool_id = entry.identity.id;
        let label = entry.identity.label.as_str();
        let now = self.clock.now_millis();

        if state.limiter.is_on_cooldown(&pool_id, now, self.settings.cooldown_secs) {
            info!(pool = label, reason = %SkipReason::Cooldown, "decision");
            return (PoolOutcome::Skipped(SkipReason::Cooldown), None);
        }
        if !state
            .limiter
            .can_rebalance(&pool_id, now, self.settings.max_rebalances_per_hour)
        {
            info!(pool = label, reason = %SkipReason::RateLimited, "decision");
            return (PoolOutcome::Skipped(SkipReason::RateLimited), None);
        }

        let snapshot = match self.chain.read_snapshot(pool_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(pool = label, error = %e, "snapshot read failed, skipping pool");
                return (PoolOutcome::Failed(e.to_string()), None);
            }
        };

        let spot_price = PriceCalculator::spot_price_x18(
            snapshot.sqrt_price_x96,
            snapshot.decimals0,
            snapshot.decimals1,
        );
        state.history.record_tick(pool_id, snapshot.current_tick, now);
        state.history.record_price(pool_id, spot_price, now);

        let screened = screen(
            &snapshot,
            &state.history.view(&pool_id),
            &entry.config,
            &self.settings.limits,
        );
        let volatility = screened.as_ref().ok().map(|s| s.volatility_bps);
        let decision = match screened {
            Err(reason) => Decision::Skip(reason),
            Ok(screened) => {
                let oracle_price = match self
                    .oracle
                    .read_reference_price(
                        snapshot.price_feed,
                        entry.config.quote_feed,
                        snapshot.price_feed_inverted,
                    )
                    .await
                {
                    Ok(price) => {
                        debug!(
                            pool = label,
                            spot = ?PriceCalculator::to_decimal(screened.spot_price),
                            oracle = ?PriceCalculator::to_decimal(price),
                            "prices"
                        );
                        Some(price)
                    }
                    Err(e) => {
                        warn!(pool = label, feed = %snapshot.price_feed, error = %e, "oracle read failed");
                        None
                    }
                };
                conclude(&screened, oracle_price)
            }
        };

        let plan = match decision {
            Decision::Skip(reason) => {
                info!(
                    pool = label,
                    reason = %reason,
                    tick = snapshot.current_tick,
                    range = %format!("[{},{}]", snapshot.active_tick_lower, snapshot.active_tick_upper),
                    volatility,
                    "decision"
                );
                return (PoolOutcome::Skipped(reason), volatility);
            }
            Decision::Rebalance(plan) => plan,
        };

        info!(
            pool = label,
            reason = %plan.trigger,
            tick = plan.current_tick,
            range = %format!("[{},{}]", plan.active_lower, plan.active_upper),
            new_range = %format!("[{},{}]", plan.new_lower, plan.new_upper),
            volatility = plan.volatility_bps,
            "decision"
        );

        if !plan.is_valid_range() {
            warn!(
                pool = label,
                new_lower = plan.new_lower,
                new_upper = plan.new_upper,
                "refusing to submit an empty or inverted range"
            );
            return (PoolOutcome::Skipped(SkipReason::InvalidNewRange), volatility);
        }

        if self.settings.dry_run {
            info!(pool = label, "dry run: maintain() not sent");
            return (PoolOutcome::DryRun(plan), volatility);
        }

        let outcome = match self
            .chain
            .submit_maintain(pool_id, plan.new_lower, plan.new_upper, plan.volatility_bps)
            .await
        {
            Ok(receipt) => {
                state.limiter.record_rebalance(pool_id, self.clock.now_millis());
                info!(
                    pool = label,
                    tx = %receipt.tx_hash,
                    block = ?receipt.block_number,
                    "maintain confirmed"
                );
                PoolOutcome::Rebalanced { plan, receipt }
            }
            Err(ChainError::Reverted(tx)) => {
                error!(pool = label, tx = %tx, "maintain reverted");
                PoolOutcome::Failed(format!("reverted: {}", tx))
            }
            Err(e) => {
                error!(pool = label, error = %e, "maintain failed");
                PoolOutcome::Failed(e.to_string())
            }
        };
        (outcome, volatility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::oracle::RoundData;
    use crate::testing::{parity_round, pool_id, snapshot_at, MockChain};
    use alloy::primitives::{Address, U256};

    const T0: i64 = 1_700_000_000_000;

    fn feed() -> Address {
        Address::repeat_byte(0xfe)
    }

    fn pool_config() -> PoolConfig {
        PoolConfig {
            half_width: 600,
            edge_bps: 2_000,
            max_slippage_bps: 300,
            tick_spacing_override: None,
            quote_feed: None,
        }
    }

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            dry_run: false,
            cooldown_secs: 120,
            max_rebalances_per_hour: 6,
            history_size: 48,
            limits: DecisionLimits::default(),
            default_pool_config: pool_config(),
        }
    }

    fn entry(byte: u8) -> PoolEntry {
        PoolEntry {
            identity: PoolIdentity::new(pool_id(byte), format!("pool-{}", byte)),
            config: pool_config(),
        }
    }

    struct Harness {
        chain: Arc<MockChain>,
        clock: Arc<ManualClock>,
        coordinator: Arc<ExecutionCoordinator<MockChain>>,
    }

    fn harness(pools: Vec<PoolEntry>, settings: CoordinatorSettings) -> Harness {
        let chain = Arc::new(MockChain::new());
        chain.set_feed(feed(), parity_round(), 8);
        let clock = Arc::new(ManualClock::new(T0));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::clone(&chain),
            pools,
            WorkQueue::new(),
            clock.clone(),
            settings,
        ));
        Harness {
            chain,
            clock,
            coordinator,
        }
    }

    fn completed(report: CycleReport) -> CycleSummary {
        match report {
            CycleReport::Completed(summary) => summary,
            CycleReport::AlreadyRunning => panic!("cycle unexpectedly skipped"),
        }
    }

    #[tokio::test]
    async fn test_sweep_rebalances_out_of_range_pool() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));

        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.rebalanced(), 1);

        let calls = h.chain.maintain_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!((calls[0].new_lower, calls[0].new_upper), (60, 1_260));
        assert_eq!(calls[0].volatility_bps, 1_000);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_until_elapsed() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));

        completed(h.coordinator.run_cycle().await);
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(
            summary.results[0].outcome,
            PoolOutcome::Skipped(SkipReason::Cooldown)
        );
        assert_eq!(h.chain.maintain_calls().len(), 1);

        h.clock.advance_secs(121);
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.rebalanced(), 1);
        assert_eq!(h.chain.maintain_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_caps_hourly_rebalances() {
        let mut s = settings();
        s.cooldown_secs = 0;
        s.max_rebalances_per_hour = 2;
        let h = harness(vec![entry(1)], s);
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));

        for _ in 0..2 {
            completed(h.coordinator.run_cycle().await);
            h.clock.advance_secs(60);
        }
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(
            summary.results[0].outcome,
            PoolOutcome::Skipped(SkipReason::RateLimited)
        );
        // No snapshot read for a rate-limited pool
        assert_eq!(h.chain.snapshot_reads(), 2);

        h.clock.advance_secs(3_600);
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.rebalanced(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_ledger_untouched() {
        let mut s = settings();
        s.dry_run = true;
        let h = harness(vec![entry(1)], s);
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));

        for _ in 0..3 {
            let summary = completed(h.coordinator.run_cycle().await);
            assert_eq!(summary.dry_runs(), 1);
        }
        assert!(h.chain.maintain_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_pool_does_not_abort_cycle() {
        let h = harness(vec![entry(1), entry(2)], settings());
        h.chain
            .fail_snapshot(pool_id(1), ChainError::Timeout(std::time::Duration::from_secs(15)));
        h.chain.set_snapshot(pool_id(2), snapshot_at(-700, feed()));

        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.rebalanced(), 1);
        assert_eq!(h.chain.maintain_calls()[0].pool_id, pool_id(2));
    }

    #[tokio::test]
    async fn test_reverted_maintain_does_not_start_cooldown() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));
        h.chain
            .fail_maintain(Some(ChainError::Reverted(Default::default())));

        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.failed(), 1);

        h.chain.fail_maintain(None);
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.rebalanced(), 1);
        assert_eq!(h.chain.maintain_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_oracle_never_submits() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(5_000, feed()));
        let mut stale: RoundData = parity_round();
        stale.round_id = U256::from(9u64);
        stale.answered_in_round = U256::from(8u64);
        h.chain.set_feed(feed(), stale, 8);

        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(
            summary.results[0].outcome,
            PoolOutcome::Skipped(SkipReason::OracleError)
        );
        assert!(h.chain.maintain_calls().is_empty());
    }

    #[tokio::test]
    async fn test_in_range_pool_is_left_alone() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(0, feed()));

        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(
            summary.results[0].outcome,
            PoolOutcome::Skipped(SkipReason::InRange)
        );
        // Screened skips still carry the volatility they were judged with
        assert_eq!(summary.results[0].volatility_bps, Some(1_000));
    }

    #[tokio::test]
    async fn test_volatility_absent_when_gated_before_screen() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));

        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.results[0].volatility_bps, Some(1_000));

        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(
            summary.results[0].outcome,
            PoolOutcome::Skipped(SkipReason::Cooldown)
        );
        assert_eq!(summary.results[0].volatility_bps, None);

        let mut snap = snapshot_at(700, feed());
        snap.is_initialized = false;
        h.chain.set_snapshot(pool_id(1), snap);
        h.clock.advance_secs(121);
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(
            summary.results[0].outcome,
            PoolOutcome::Skipped(SkipReason::NotInitialized)
        );
        assert_eq!(summary.results[0].volatility_bps, None);
    }

    #[tokio::test]
    async fn test_second_trigger_while_running_is_dropped() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));

        let (first, second) = tokio::join!(h.coordinator.run_cycle(), h.coordinator.run_cycle());
        let reports = [first, second];
        assert_eq!(
            reports
                .iter()
                .filter(|r| **r == CycleReport::AlreadyRunning)
                .count(),
            1
        );
        assert_eq!(h.chain.maintain_calls().len(), 1);
        assert!(!h.coordinator.is_running());
    }

    #[tokio::test]
    async fn test_drain_only_touches_queued_pools() {
        let h = harness(vec![entry(1), entry(2)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(700, feed()));
        h.chain.set_snapshot(pool_id(2), snapshot_at(700, feed()));

        let queue = h.coordinator.queue().clone();
        queue.enqueue(pool_id(2), WorkReason::TickCrossed, T0);
        queue.enqueue(pool_id(2), WorkReason::TickCrossed, T0);

        let summary = completed(h.coordinator.run_drain().await);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].pool_id, pool_id(2));
        assert_eq!(summary.results[0].reason, Some(WorkReason::TickCrossed));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_alone_covers_every_pool() {
        let h = harness(vec![entry(1), entry(2), entry(3)], settings());
        for byte in 1..=3 {
            h.chain.set_snapshot(pool_id(byte), snapshot_at(0, feed()));
        }
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.results.len(), 3);
        assert!(summary.results.iter().all(|r| r.reason.is_none()));
    }

    #[tokio::test]
    async fn test_pool_initialized_event_registers_pool() {
        let h = harness(vec![entry(1)], settings());
        h.chain.set_snapshot(pool_id(1), snapshot_at(0, feed()));
        h.chain.set_snapshot(pool_id(9), snapshot_at(0, feed()));

        h.coordinator
            .queue()
            .enqueue(pool_id(9), WorkReason::PoolInitialized, T0);
        completed(h.coordinator.run_drain().await);

        let known: Vec<PoolId> = h
            .coordinator
            .known_pools()
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(known, vec![pool_id(1), pool_id(9)]);

        // Registered pools join the sweep
        let summary = completed(h.coordinator.run_cycle().await);
        assert_eq!(summary.results.len(), 2);
    }

    #[tokio::test]
    async fn test_tick_crossed_for_unknown_pool_is_not_registered() {
        let h = harness(vec![], settings());
        h.chain.set_snapshot(pool_id(4), snapshot_at(0, feed()));
        h.coordinator
            .queue()
            .enqueue(pool_id(4), WorkReason::TickCrossed, T0);

        let summary = completed(h.coordinator.run_drain().await);
        assert_eq!(summary.results.len(), 1);
        assert!(h.coordinator.known_pools().await.is_empty());
    }
}
