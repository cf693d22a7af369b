use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;
use crate::model::Message;
use crate::notifier::Channel;

/// Logs alerts instead of delivering them. Used for dry runs.
pub struct TerminalChannel;

impl Channel for TerminalChannel {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn deliver<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
        Box::pin(async move {
            tracing::warn!(subject = %message.subject, "ALERT: {}", message.body);
            Ok(())
        })
    }
}
