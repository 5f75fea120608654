// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::model::BulkProgress;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Shared cancel flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkConfig {
    pub batch_size: usize,
    pub refresh_interval: Duration,
    pub batch_delay: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Completed { inserted: usize },
    Cancelled { inserted: usize },
    Failed { inserted: usize, error: String },
}

impl BulkOutcome {
    pub const fn inserted(&self) -> usize {
        match self {
            Self::Completed { inserted }
            | Self::Cancelled { inserted }
            | Self::Failed { inserted, .. } => *inserted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkStep {
    /// Generate and send a batch of this many rows.
    Issue(usize),
    /// The previous batch is still in flight.
    Busy,
    /// Throttle delay has not elapsed yet.
    Wait(Instant),
    /// The run is over. A final refresh is always due.
    Finished(BulkOutcome),
}

/// Split `total` rows into batches of at most `batch_size`.
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<usize> {
    let batch_size = batch_size.max(1);
    let mut remaining = total;
    let mut batches = Vec::with_capacity(total.div_ceil(batch_size));
    while remaining > 0 {
        let size = remaining.min(batch_size);
        batches.push(size);
        remaining -= size;
    }
    batches
}

/// Sequential, cancellable bulk insertion. Batch k+1 is never issued before
/// batch k settles; the token is checked before each new batch.
#[derive(Debug, Clone)]
pub struct BulkInsertion {
    total: usize,
    inserted: usize,
    batches: Vec<usize>,
    next_batch: usize,
    config: BulkConfig,
    token: CancellationToken,
    in_flight: Option<usize>,
    not_before: Option<Instant>,
    last_refresh: Instant,
    outcome: Option<BulkOutcome>,
}

impl BulkInsertion {
    pub fn new(total: usize, config: BulkConfig, token: CancellationToken, now: Instant) -> Self {
        info!(total, batch_size = config.batch_size, "bulk insertion started");
        Self {
            total,
            inserted: 0,
            batches: plan_batches(total, config.batch_size),
            next_batch: 0,
            config,
            token,
            in_flight: None,
            not_before: None,
            last_refresh: now,
            outcome: None,
        }
    }

    pub fn progress(&self) -> BulkProgress {
        BulkProgress {
            current: self.inserted,
            total: self.total,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn next_step(&mut self, now: Instant) -> BulkStep {
        if let Some(outcome) = &self.outcome {
            return BulkStep::Finished(outcome.clone());
        }
        if self.in_flight.is_some() {
            return BulkStep::Busy;
        }
        if self.token.is_cancelled() {
            info!(inserted = self.inserted, "bulk insertion cancelled");
            return self.finish(BulkOutcome::Cancelled {
                inserted: self.inserted,
            });
        }
        let Some(&size) = self.batches.get(self.next_batch) else {
            info!(inserted = self.inserted, "bulk insertion completed");
            return self.finish(BulkOutcome::Completed {
                inserted: self.inserted,
            });
        };
        if let Some(not_before) = self.not_before
            && now < not_before
        {
            return BulkStep::Wait(not_before);
        }
        self.in_flight = Some(size);
        debug!(size, inserted = self.inserted, "issuing bulk batch");
        BulkStep::Issue(size)
    }

    /// Record the result of the in-flight batch. Returns true when a
    /// rate-limited refresh is due.
    pub fn batch_succeeded(&mut self, now: Instant) -> bool {
        let Some(size) = self.in_flight.take() else {
            return false;
        };
        self.inserted += size;
        self.next_batch += 1;
        self.not_before = Some(now + self.config.batch_delay);
        if now.duration_since(self.last_refresh) >= self.config.refresh_interval {
            self.last_refresh = now;
            return true;
        }
        false
    }

    pub fn batch_failed(&mut self, error: impl Into<String>) {
        if self.in_flight.take().is_none() {
            return;
        }
        let error = error.into();
        warn!(inserted = self.inserted, error = %error, "bulk insertion aborted");
        self.outcome = Some(BulkOutcome::Failed {
            inserted: self.inserted,
            error,
        });
    }

    fn finish(&mut self, outcome: BulkOutcome) -> BulkStep {
        self.outcome = Some(outcome.clone());
        BulkStep::Finished(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BulkConfig {
        BulkConfig {
            batch_size: 1000,
            refresh_interval: Duration::from_secs(2),
            batch_delay: Duration::ZERO,
        }
    }

    fn run_to_end(run: &mut BulkInsertion, now: Instant) -> (Vec<usize>, BulkOutcome) {
        let mut progress = Vec::new();
        loop {
            match run.next_step(now) {
                BulkStep::Issue(_) => {
                    run.batch_succeeded(now);
                    progress.push(run.progress().current);
                }
                BulkStep::Finished(outcome) => return (progress, outcome),
                BulkStep::Busy | BulkStep::Wait(_) => unreachable!("no delay configured"),
            }
        }
    }

    #[test]
    fn plan_splits_into_fixed_batches() {
        assert_eq!(plan_batches(2500, 1000), vec![1000, 1000, 500]);
        assert_eq!(plan_batches(1000, 1000), vec![1000]);
        assert!(plan_batches(0, 1000).is_empty());
    }

    #[test]
    fn issued_batches_follow_the_plan() {
        let now = Instant::now();
        let small = BulkConfig {
            batch_size: 400,
            ..config()
        };
        let mut run = BulkInsertion::new(1000, small, CancellationToken::new(), now);
        let mut issued = Vec::new();
        while let BulkStep::Issue(size) = run.next_step(now) {
            issued.push(size);
            run.batch_succeeded(now);
        }
        assert_eq!(issued, plan_batches(1000, 400));
        assert_eq!(issued, vec![400, 400, 200]);
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_total() {
        let now = Instant::now();
        let mut run = BulkInsertion::new(2500, config(), CancellationToken::new(), now);
        let (progress, outcome) = run_to_end(&mut run, now);

        assert_eq!(progress, vec![1000, 2000, 2500]);
        assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(outcome, BulkOutcome::Completed { inserted: 2500 });
    }

    #[test]
    fn only_one_batch_in_flight() {
        let now = Instant::now();
        let mut run = BulkInsertion::new(3000, config(), CancellationToken::new(), now);
        assert_eq!(run.next_step(now), BulkStep::Issue(1000));
        assert_eq!(run.next_step(now), BulkStep::Busy);
    }

    #[test]
    fn cancel_stops_before_next_batch() {
        let now = Instant::now();
        let token = CancellationToken::new();
        let mut run = BulkInsertion::new(10_000, config(), token.clone(), now);

        for _ in 0..2 {
            assert_eq!(run.next_step(now), BulkStep::Issue(1000));
            run.batch_succeeded(now);
        }
        token.cancel();
        assert_eq!(
            run.next_step(now),
            BulkStep::Finished(BulkOutcome::Cancelled { inserted: 2000 })
        );
        assert!(run.is_finished());
    }

    #[test]
    fn cancel_during_batch_lets_it_finish() {
        let now = Instant::now();
        let token = CancellationToken::new();
        let mut run = BulkInsertion::new(5000, config(), token.clone(), now);
        assert_eq!(run.next_step(now), BulkStep::Issue(1000));
        token.cancel();
        assert_eq!(run.next_step(now), BulkStep::Busy);
        run.batch_succeeded(now);
        assert_eq!(
            run.next_step(now),
            BulkStep::Finished(BulkOutcome::Cancelled { inserted: 1000 })
        );
    }

    #[test]
    fn failure_aborts_remaining_batches() {
        let now = Instant::now();
        let mut run = BulkInsertion::new(5000, config(), CancellationToken::new(), now);
        run.next_step(now);
        run.batch_succeeded(now);
        run.next_step(now);
        run.batch_failed("disk full");

        assert_eq!(
            run.next_step(now),
            BulkStep::Finished(BulkOutcome::Failed {
                inserted: 1000,
                error: "disk full".to_owned(),
            })
        );
        assert_eq!(run.progress().current, 1000);
    }

    #[test]
    fn refresh_is_rate_limited() {
        let start = Instant::now();
        let mut run = BulkInsertion::new(10_000, config(), CancellationToken::new(), start);

        run.next_step(start);
        assert!(!run.batch_succeeded(start + Duration::from_millis(500)));
        run.next_step(start);
        assert!(!run.batch_succeeded(start + Duration::from_millis(1500)));
        run.next_step(start);
        assert!(run.batch_succeeded(start + Duration::from_millis(2100)));
        run.next_step(start);
        assert!(!run.batch_succeeded(start + Duration::from_millis(2500)));
    }

    #[test]
    fn delay_throttles_between_batches() {
        let start = Instant::now();
        let throttled = BulkConfig {
            batch_delay: Duration::from_millis(100),
            ..config()
        };
        let mut run = BulkInsertion::new(2000, throttled, CancellationToken::new(), start);
        run.next_step(start);
        run.batch_succeeded(start);

        assert_eq!(
            run.next_step(start + Duration::from_millis(50)),
            BulkStep::Wait(start + Duration::from_millis(100))
        );
        assert_eq!(
            run.next_step(start + Duration::from_millis(100)),
            BulkStep::Issue(1000)
        );
    }
}
