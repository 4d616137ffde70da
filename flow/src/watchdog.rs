//! Deadlock watchdog (spec §9 Design Notes): cyclic topologies make
//! deadlock possible when every process is suspended waiting on another.
//! This task never terminates the network; it only samples suspension and
//! reports a `Severity::Warning` to the observer when everything looks
//! stuck for longer than the configured threshold.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::observability::{NetworkEvent, NetworkObserver};

/// Per-node suspension flag, flipped by a process's own port-operation
/// wrapper immediately before and after it suspends. Cheap enough to touch
/// on every port call; the watchdog only reads it periodically.
#[derive(Debug, Default)]
pub struct SuspicionFlag(AtomicBool);

impl SuspicionFlag {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn mark_suspended(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn mark_progressing(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Samples every node's `SuspicionFlag` on an interval; if all tracked
/// nodes read suspended for `threshold` consecutive samples, reports once
/// and keeps watching (it does not re-report until suspicion clears and
/// reoccurs, to avoid spamming the observer every poll).
pub async fn run(
    flags: Vec<(String, Arc<SuspicionFlag>)>,
    threshold: Duration,
    poll_interval: Duration,
    observer: Arc<dyn NetworkObserver>,
    ctx: flow_core::context::CancellationToken,
) {
    if flags.is_empty() {
        return;
    }

    let mut consecutive_stuck = Duration::ZERO;
    let mut already_reported = false;

    loop {
        futures::select! {
            () = compio::time::sleep(poll_interval).fuse() => {},
            () = ctx.cancelled().fuse() => return,
        }

        let all_suspended = flags.iter().all(|(_, flag)| flag.is_suspended());
        if all_suspended {
            consecutive_stuck += poll_interval;
            if consecutive_stuck >= threshold && !already_reported {
                let nodes: BTreeSet<String> = flags.iter().map(|(name, _)| name.clone()).collect();
                observer.observe(NetworkEvent::SuspectedDeadlock { nodes: nodes.into_iter().collect() });
                already_reported = true;
            }
        } else {
            consecutive_stuck = Duration::ZERO;
            already_reported = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::TracingObserver;

    #[test]
    fn empty_flag_set_returns_immediately() {
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = flow_core::context::CancellationToken::new();
            run(vec![], Duration::from_millis(10), Duration::from_millis(1), Arc::new(TracingObserver), ctx).await;
        });
    }

    #[test]
    fn suspicion_flag_round_trips() {
        let flag = SuspicionFlag::new();
        assert!(!flag.is_suspended());
        flag.mark_suspended();
        assert!(flag.is_suspended());
        flag.mark_progressing();
        assert!(!flag.is_suspended());
    }

    #[test]
    fn cancellation_stops_the_watchdog_promptly() {
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = flow_core::context::CancellationToken::new();
            let flag: Arc<SuspicionFlag> = Arc::new(SuspicionFlag::new());
            flag.mark_suspended();
            let flags = vec![("only".to_string(), flag)];
            let ctx2 = ctx.clone();
            let task = compio::runtime::spawn(async move {
                run(flags, Duration::from_secs(60), Duration::from_millis(1), Arc::new(TracingObserver), ctx2).await;
            });
            compio::time::sleep(Duration::from_millis(5)).await;
            ctx.cancel();
            task.await;
        });
    }
}
