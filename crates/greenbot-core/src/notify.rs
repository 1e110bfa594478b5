use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

use crate::error::ServiceError;

/// Revision counter shared by the orchestrators.
///
/// Every observable state change bumps the revision. Subscribers wait on
/// `changed()` and redraw; they never receive the state itself.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify(&self) {
        // send_modify succeeds even with no receivers
        self.tx.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// A service call running on its own task.
///
/// The result is handed over before the notification fires, so an owner
/// woken by `changed()` always finds it with `try_take`.
pub(crate) struct InFlight<T> {
    rx: oneshot::Receiver<Result<T, ServiceError>>,
}

impl<T: Send + 'static> InFlight<T> {
    pub(crate) fn spawn<F>(notifier: &ChangeNotifier, call: F) -> Self
    where
        F: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let notifier = notifier.clone();
        tokio::spawn(async move {
            let result = call.await;
            let _ = tx.send(result);
            notifier.notify();
        });
        Self { rx }
    }

    /// The result, if the call has finished
    pub(crate) fn try_take(&mut self) -> Option<Result<T, ServiceError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(lost_task())),
        }
    }

    pub(crate) async fn wait(self) -> Result<T, ServiceError> {
        self.rx.await.unwrap_or_else(|_| Err(lost_task()))
    }
}

/// The task panicked or was aborted before sending a result
fn lost_task() -> ServiceError {
    ServiceError::Unavailable("service task ended without a result".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_change() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();
        let clone = notifier.clone();
        clone.notify();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(notifier.revision(), 1);
    }

    #[test]
    fn test_notify_without_subscribers() {
        let notifier = ChangeNotifier::new();
        notifier.notify();
        notifier.notify();
        assert_eq!(notifier.revision(), 2);
    }

    #[tokio::test]
    async fn test_result_ready_when_notified() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();
        let mut call = InFlight::spawn(&notifier, async { Ok::<_, ServiceError>(7) });
        assert!(call.try_take().is_none());

        rx.changed().await.unwrap();
        assert_eq!(call.try_take().unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_panicked_call_is_unavailable() {
        let notifier = ChangeNotifier::new();
        let call = InFlight::spawn(&notifier, async {
            let missing: Option<u8> = None;
            Ok(missing.expect("no value"))
        });
        assert!(matches!(call.wait().await, Err(ServiceError::Unavailable(_))));
    }
}
