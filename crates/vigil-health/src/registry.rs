//! Checker registry — an ordered, name-unique set of health checkers.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::warn;

use crate::checker::{Checker, Reporter};

/// The checkers an agent runs each tick, in registration order.
///
/// Ordering has no semantic meaning but is deterministic, so test runs
/// reproduce the same probe sequence.
#[derive(Default)]
pub struct Registry {
    checkers: Vec<Box<dyn Checker>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker.
    ///
    /// A checker with an already-registered name replaces the existing
    /// entry in place, keeping registration order stable.
    pub fn add_checker(&mut self, checker: Box<dyn Checker>) {
        match self.checkers.iter_mut().find(|c| c.name() == checker.name()) {
            Some(slot) => *slot = checker,
            None => self.checkers.push(checker),
        }
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Run every checker sequentially against `reporter`.
    ///
    /// A panicking checker contributes a single failed probe instead of
    /// unwinding out of the run. `deadline` bounds the run as a whole;
    /// checkers not reached in time are skipped while records already
    /// written are kept.
    pub async fn run_all(&self, deadline: Duration, reporter: &mut Reporter) {
        let run = async {
            for checker in &self.checkers {
                let name = checker.name().to_string();
                let outcome = AssertUnwindSafe(checker.check(reporter))
                    .catch_unwind()
                    .await;
                if outcome.is_err() {
                    warn!(checker = %name, "checker panicked");
                    reporter.add_failure(&name, "checker panicked");
                }
            }
        };
        if tokio::time::timeout(deadline, run).await.is_err() {
            warn!("checker run exceeded deadline, skipping remaining checkers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vigil_state::{Probe, ProbeStatus};

    struct FakeChecker {
        name: String,
        extra: String,
    }

    impl FakeChecker {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                extra: String::new(),
            }
        }

        fn with_extra(name: &str, extra: &str) -> Self {
            Self {
                name: name.to_string(),
                extra: extra.to_string(),
            }
        }
    }

    #[async_trait]
    impl Checker for FakeChecker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn check(&self, reporter: &mut Reporter) {
            reporter.add(Probe {
                checker: self.name.clone(),
                status: ProbeStatus::Running,
                extra: self.extra.clone(),
                ..Default::default()
            });
        }
    }

    struct PanickingChecker;

    #[async_trait]
    impl Checker for PanickingChecker {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn check(&self, _reporter: &mut Reporter) {
            panic!("boom");
        }
    }

    struct StuckChecker;

    #[async_trait]
    impl Checker for StuckChecker {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn check(&self, _reporter: &mut Reporter) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn runs_checkers_in_registration_order() {
        let mut registry = Registry::new();
        registry.add_checker(Box::new(FakeChecker::new("b")));
        registry.add_checker(Box::new(FakeChecker::new("a")));
        registry.add_checker(Box::new(FakeChecker::new("c")));

        let mut reporter = Reporter::new("node-1", 1000);
        registry.run_all(Duration::from_secs(5), &mut reporter).await;

        let order: Vec<&str> = reporter.probes().iter().map(|p| p.checker.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn duplicate_name_replaces_in_place() {
        let mut registry = Registry::new();
        registry.add_checker(Box::new(FakeChecker::with_extra("a", "first")));
        registry.add_checker(Box::new(FakeChecker::new("b")));
        registry.add_checker(Box::new(FakeChecker::with_extra("a", "second")));
        assert_eq!(registry.len(), 2);

        let mut reporter = Reporter::new("node-1", 1000);
        registry.run_all(Duration::from_secs(5), &mut reporter).await;

        assert_eq!(reporter.probes()[0].checker, "a");
        assert_eq!(reporter.probes()[0].extra, "second");
    }

    #[tokio::test]
    async fn panicking_checker_becomes_a_failed_probe() {
        let mut registry = Registry::new();
        registry.add_checker(Box::new(FakeChecker::new("before")));
        registry.add_checker(Box::new(PanickingChecker));
        registry.add_checker(Box::new(FakeChecker::new("after")));

        let mut reporter = Reporter::new("node-1", 1000);
        registry.run_all(Duration::from_secs(5), &mut reporter).await;

        assert_eq!(reporter.probes().len(), 3);
        let failed = &reporter.probes()[1];
        assert_eq!(failed.checker, "panicky");
        assert_eq!(failed.status, ProbeStatus::Failed);
        assert_eq!(failed.error, "checker panicked");
        // The panic never escapes the run.
        assert_eq!(reporter.probes()[2].checker, "after");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_keeps_earlier_records() {
        let mut registry = Registry::new();
        registry.add_checker(Box::new(FakeChecker::new("fast")));
        registry.add_checker(Box::new(StuckChecker));
        registry.add_checker(Box::new(FakeChecker::new("never-reached")));

        let mut reporter = Reporter::new("node-1", 1000);
        registry.run_all(Duration::from_secs(1), &mut reporter).await;

        let names: Vec<&str> = reporter.probes().iter().map(|p| p.checker.as_str()).collect();
        assert_eq!(names, vec!["fast"]);
    }

    #[tokio::test]
    async fn empty_registry_reports_nothing() {
        let registry = Registry::new();
        let mut reporter = Reporter::new("node-1", 1000);
        registry.run_all(Duration::from_secs(1), &mut reporter).await;
        assert!(reporter.probes().is_empty());
    }
}
