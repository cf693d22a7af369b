pub mod email;
pub mod terminal;
pub mod whatsapp;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;
use crate::model::{AssetLabels, Message, NotificationAttempt};

/// Sink for alert notifications.
///
/// Reports one boolean per attempt; callers cannot tell which channel
/// delivered it.
pub trait Notifier: Send + Sync {
    fn send<'a>(&'a self, attempt: &'a NotificationAttempt) -> BoxFuture<'a, bool>;
}

/// A single delivery transport.
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    fn deliver<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), Report<NotifyError>>>;
}

/// Tries each channel in order and stops at the first success.
pub struct FallbackNotifier {
    labels: AssetLabels,
    channels: Vec<Box<dyn Channel>>,
}

impl FallbackNotifier {
    pub fn new(labels: AssetLabels, channels: Vec<Box<dyn Channel>>) -> Self {
        if channels.is_empty() {
            tracing::warn!("no notification channels configured; every delivery will fail");
        }
        Self { labels, channels }
    }
}

impl Notifier for FallbackNotifier {
    fn send<'a>(&'a self, attempt: &'a NotificationAttempt) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let message = attempt.render(&self.labels);
            for channel in &self.channels {
                match channel.deliver(&message).await {
                    Ok(()) => {
                        tracing::info!(
                            channel = channel.name(),
                            direction = %attempt.direction,
                            threshold = attempt.threshold,
                            "notification delivered"
                        );
                        return true;
                    }
                    Err(e) => {
                        tracing::warn!(
                            channel = channel.name(),
                            direction = %attempt.direction,
                            threshold = attempt.threshold,
                            error = ?e,
                            "notification channel failed, trying next"
                        );
                    }
                }
            }
            false
        })
    }
}

/// Environment variable that is set and not blank.
fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::Direction;

    struct CountingChannel {
        name: &'static str,
        succeed: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Channel for CountingChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn deliver<'a>(
            &'a self,
            _message: &'a Message,
        ) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.succeed {
                    Ok(())
                } else {
                    Err(Report::new(NotifyError::Request {
                        channel: self.name.into(),
                    }))
                }
            })
        }
    }

    fn labels() -> AssetLabels {
        AssetLabels {
            asset: "Gold".into(),
            currency: "EUR".into(),
        }
    }

    fn channel(name: &'static str, succeed: bool) -> (Box<dyn Channel>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let channel = CountingChannel {
            name,
            succeed,
            calls: Arc::clone(&calls),
        };
        (Box::new(channel), calls)
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let (primary, primary_calls) = channel("primary", true);
        let (fallback, fallback_calls) = channel("fallback", true);
        let notifier = FallbackNotifier::new(labels(), vec![primary, fallback]);

        let attempt = NotificationAttempt::crossing(Direction::Below, 4000.0, 3990.0);
        assert!(notifier.send(&attempt).await);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn primary_failure_uses_fallback() {
        let (primary, primary_calls) = channel("primary", false);
        let (fallback, fallback_calls) = channel("fallback", true);
        let notifier = FallbackNotifier::new(labels(), vec![primary, fallback]);

        let attempt = NotificationAttempt::crossing(Direction::Above, 4500.0, 4510.0);
        assert!(notifier.send(&attempt).await);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_channels_failing_reports_failure() {
        let (primary, _) = channel("primary", false);
        let (fallback, _) = channel("fallback", false);
        let notifier = FallbackNotifier::new(labels(), vec![primary, fallback]);

        assert!(!notifier.send(&NotificationAttempt::test(4100.0)).await);
    }

    #[tokio::test]
    async fn no_channels_reports_failure() {
        let notifier = FallbackNotifier::new(labels(), Vec::new());
        assert!(!notifier.send(&NotificationAttempt::test(4100.0)).await);
    }
}
