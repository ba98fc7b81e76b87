//! Timing hooks around each step of the link service.
//!
//! The service reports how long every backend call took through a
//! [`LinkObserver`]. The default [`TracingObserver`] turns those reports into
//! `debug` events; swap in [`NoopObserver`] to silence them or a custom
//! implementation to feed metrics.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Resolve,
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    DedupLookup,
    SeedCounter,
    NextId,
    Insert,
    CacheGet,
    CacheSet,
    IncrementClicks,
    FindById,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
}

impl Outcome {
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Outcome::Ok
        } else {
            Outcome::Failed
        }
    }
}

pub trait LinkObserver: Send + Sync {
    fn step(&self, op: Operation, step: Step, elapsed: Duration, outcome: Outcome);

    fn finished(&self, _op: Operation, _elapsed: Duration, _outcome: Outcome) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl LinkObserver for NoopObserver {
    fn step(&self, _: Operation, _: Step, _: Duration, _: Outcome) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl LinkObserver for TracingObserver {
    fn step(&self, op: Operation, step: Step, elapsed: Duration, outcome: Outcome) {
        tracing::debug!(
            ?op,
            ?step,
            ?outcome,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "link step"
        );
    }

    fn finished(&self, op: Operation, elapsed: Duration, outcome: Outcome) {
        tracing::debug!(
            ?op,
            ?outcome,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "link operation finished"
        );
    }
}
