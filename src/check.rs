use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::{info, warn};

use crate::model::ThresholdSet;
use crate::notifier::Notifier;
use crate::source::PriceSource;
use crate::storage::StateStore;
use crate::threshold::evaluate;

#[derive(Debug, Display, Error)]
pub enum RunError {
    #[display("price unavailable")]
    Fetch,
    #[display("state persistence failed")]
    State,
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSummary {
    pub price: f64,
    pub first_run: bool,
    pub delivered: usize,
    pub failed: usize,
}

/// One scheduled run: fetch, evaluate, persist.
///
/// A fetch failure aborts before the state is touched. The state is written
/// even when some notifications failed, since failed levels stay armed. A
/// write failure is returned as an error; swallowing it would re-send every
/// delivered alert on the next run.
pub async fn run_check(
    source: &dyn PriceSource,
    store: &dyn StateStore,
    notifier: &dyn Notifier,
    thresholds: &ThresholdSet,
    persist: bool,
) -> Result<CheckSummary, Report<RunError>> {
    let price = source
        .fetch_price()
        .await
        .change_context(RunError::Fetch)
        .attach_with(|| format!("source: {}", source.name()))?;
    info!(price, source = source.name(), "price fetched");

    let state = store.load().change_context(RunError::State)?;
    info!(
        last_price = ?state.last_price,
        alerted_below = ?state.alerted_below,
        alerted_above = ?state.alerted_above,
        "state loaded"
    );

    let evaluation = evaluate(price, thresholds, state, notifier).await;

    if persist {
        store
            .save(&evaluation.state)
            .change_context(RunError::State)
            .attach_with(|| format!("unsaved state: {:?}", evaluation.state))?;
        info!(
            last_price = ?evaluation.state.last_price,
            alerted_below = ?evaluation.state.alerted_below,
            alerted_above = ?evaluation.state.alerted_above,
            "state saved"
        );
    } else {
        info!("dry run, state not written");
    }

    for outcome in evaluation.outcomes.iter().filter(|o| !o.delivered) {
        warn!(
            direction = %outcome.attempt.direction,
            threshold = outcome.attempt.threshold,
            price = outcome.attempt.price,
            "undelivered alert will be retried next run"
        );
    }

    Ok(CheckSummary {
        price,
        first_run: evaluation.first_run,
        delivered: evaluation.delivered(),
        failed: evaluation.failed(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::BoxFuture;

    use super::*;
    use crate::error::{FetchError, StateError};
    use crate::model::{EvaluationState, NotificationAttempt, PricePoint};
    use crate::storage::json_file::JsonFileStore;

    struct FixedSource(Option<f64>);

    impl PriceSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch_price(&self) -> BoxFuture<'_, Result<f64, Report<FetchError>>> {
            Box::pin(async move {
                self.0.ok_or_else(|| {
                    Report::new(FetchError::Unavailable {
                        source_name: "fixed".into(),
                        symbol: "GC=F".into(),
                    })
                })
            })
        }

        fn fetch_history(
            &self,
            _days: u32,
        ) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<FetchError>>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    struct StaticNotifier(bool);

    impl Notifier for StaticNotifier {
        fn send<'a>(&'a self, _attempt: &'a NotificationAttempt) -> BoxFuture<'a, bool> {
            Box::pin(async move { self.0 })
        }
    }

    /// In-memory store that can refuse writes.
    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<Option<EvaluationState>>,
        fail_save: bool,
        saves: Mutex<usize>,
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<EvaluationState, Report<StateError>> {
            Ok(self.state.lock().unwrap().clone().unwrap_or_default())
        }

        fn save(&self, state: &EvaluationState) -> Result<(), Report<StateError>> {
            if self.fail_save {
                return Err(Report::new(StateError::Write));
            }
            *self.saves.lock().unwrap() += 1;
            *self.state.lock().unwrap() = Some(state.clone());
            Ok(())
        }
    }

    fn thresholds() -> ThresholdSet {
        ThresholdSet {
            below: vec![3800.0, 3900.0, 4000.0],
            above: Vec::new(),
        }
    }

    fn seen(price: f64) -> MemoryStore {
        MemoryStore {
            state: Mutex::new(Some(EvaluationState::with_last_price(price))),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fetch_failure_leaves_state_untouched() {
        let store = seen(4100.0);
        let err = run_check(
            &FixedSource(None),
            &store,
            &StaticNotifier(true),
            &thresholds(),
            true,
        )
        .await
        .unwrap_err();

        assert!(matches!(err.current_context(), RunError::Fetch));
        assert_eq!(*store.saves.lock().unwrap(), 0);
        assert_eq!(store.load().unwrap().last_price, Some(4100.0));
    }

    #[tokio::test]
    async fn delivered_alerts_are_persisted() {
        let store = seen(4100.0);
        let summary = run_check(
            &FixedSource(Some(3750.0)),
            &store,
            &StaticNotifier(true),
            &thresholds(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(summary.delivered, 3);
        assert_eq!(summary.failed, 0);
        let state = store.load().unwrap();
        assert_eq!(state.alerted_below, vec![4000.0, 3900.0, 3800.0]);
        assert_eq!(state.last_price, Some(3750.0));
    }

    #[tokio::test]
    async fn failed_notifications_still_persist_state() {
        let store = seen(4100.0);
        let summary = run_check(
            &FixedSource(Some(3750.0)),
            &store,
            &StaticNotifier(false),
            &thresholds(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(summary.failed, 3);
        assert_eq!(*store.saves.lock().unwrap(), 1);
        let state = store.load().unwrap();
        assert!(state.alerted_below.is_empty());
        assert_eq!(state.last_price, Some(3750.0));
    }

    #[tokio::test]
    async fn save_failure_is_fatal() {
        let store = MemoryStore {
            fail_save: true,
            ..seen(4100.0)
        };
        let err = run_check(
            &FixedSource(Some(3750.0)),
            &store,
            &StaticNotifier(true),
            &thresholds(),
            true,
        )
        .await
        .unwrap_err();

        assert!(matches!(err.current_context(), RunError::State));
    }

    #[tokio::test]
    async fn dry_run_does_not_write() {
        let store = seen(4100.0);
        let summary = run_check(
            &FixedSource(Some(3750.0)),
            &store,
            &StaticNotifier(true),
            &thresholds(),
            false,
        )
        .await
        .unwrap();

        assert_eq!(summary.delivered, 3);
        assert_eq!(*store.saves.lock().unwrap(), 0);
        assert!(store.load().unwrap().alerted_below.is_empty());
    }

    #[tokio::test]
    async fn first_run_against_file_store_creates_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        let summary = run_check(
            &FixedSource(Some(3000.0)),
            &store,
            &StaticNotifier(true),
            &thresholds(),
            true,
        )
        .await
        .unwrap();
        assert!(summary.first_run);
        assert_eq!(summary.delivered, 0);

        let summary = run_check(
            &FixedSource(Some(3850.0)),
            &store,
            &StaticNotifier(true),
            &thresholds(),
            true,
        )
        .await
        .unwrap();
        assert!(!summary.first_run);
        assert_eq!(summary.delivered, 2);

        let summary = run_check(
            &FixedSource(Some(3850.0)),
            &store,
            &StaticNotifier(true),
            &ThresholdSet {
                below: vec![3900.0],
                above: vec![3800.0],
            },
            true,
        )
        .await
        .unwrap();
        assert_eq!(summary.delivered, 1);
        let state = store.load().unwrap();
        assert_eq!(state.alerted_below, vec![4000.0, 3900.0]);
        assert_eq!(state.alerted_above, vec![3800.0]);
    }
}
