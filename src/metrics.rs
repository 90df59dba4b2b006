//! Round and settlement counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct EngineMetrics {
    start_time: Instant,
    bets_placed: AtomicU64,
    rounds_sealed: AtomicU64,
    rounds_fulfilled: AtomicU64,
    bets_settled: AtomicU64,
    bets_won: AtomicU64,
    total_staked: AtomicU64,
    total_paid: AtomicU64,
    rejected_settlements: AtomicU64,
    oracle_timeouts: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub bets_placed: u64,
    pub rounds_sealed: u64,
    pub rounds_fulfilled: u64,
    pub bets_settled: u64,
    pub bets_won: u64,
    pub total_staked: u64,
    pub total_paid: u64,
    pub rejected_settlements: u64,
    pub oracle_timeouts: u64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bets_placed: AtomicU64::new(0),
            rounds_sealed: AtomicU64::new(0),
            rounds_fulfilled: AtomicU64::new(0),
            bets_settled: AtomicU64::new(0),
            bets_won: AtomicU64::new(0),
            total_staked: AtomicU64::new(0),
            total_paid: AtomicU64::new(0),
            rejected_settlements: AtomicU64::new(0),
            oracle_timeouts: AtomicU64::new(0),
        }
    }

    pub fn record_bet(&self, stake: u64) {
        self.bets_placed.fetch_add(1, Ordering::Relaxed);
        self.total_staked.fetch_add(stake, Ordering::Relaxed);
    }

    pub fn record_seal(&self) {
        self.rounds_sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fulfillment(&self) {
        self.rounds_fulfilled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement(&self, payout: u64) {
        self.bets_settled.fetch_add(1, Ordering::Relaxed);
        if payout > 0 {
            self.bets_won.fetch_add(1, Ordering::Relaxed);
            self.total_paid.fetch_add(payout, Ordering::Relaxed);
        }
    }

    pub fn record_rejected_settlement(&self) {
        self.rejected_settlements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oracle_timeout(&self) {
        self.oracle_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bets_placed: self.bets_placed.load(Ordering::Relaxed),
            rounds_sealed: self.rounds_sealed.load(Ordering::Relaxed),
            rounds_fulfilled: self.rounds_fulfilled.load(Ordering::Relaxed),
            bets_settled: self.bets_settled.load(Ordering::Relaxed),
            bets_won: self.bets_won.load(Ordering::Relaxed),
            total_staked: self.total_staked.load(Ordering::Relaxed),
            total_paid: self.total_paid.load(Ordering::Relaxed),
            rejected_settlements: self.rejected_settlements.load(Ordering::Relaxed),
            oracle_timeouts: self.oracle_timeouts.load(Ordering::Relaxed),
        }
    }
}
