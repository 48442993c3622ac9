use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::notify::{Notice, Notifier};

/// In-process queue decoupling state changes from notification delivery.
///
/// Services post notices after their storage write has committed; the
/// dispatcher task drains the queue and hands each notice to the
/// configured [`Notifier`]. Posting never blocks and never fails the
/// posting operation.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Outbox {
    /// Create an outbox and the receiving end for its dispatcher.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a notice, fire-and-forget.
    pub fn post(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            warn!("outbox closed, notice dropped");
        }
    }
}

/// Start the background dispatcher loop.
///
/// Returns a CancellationToken that stops the dispatcher when cancelled.
pub fn start_dispatcher(
    mut rx: mpsc::UnboundedReceiver<Notice>,
    notifier: Arc<dyn Notifier>,
) -> CancellationToken {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            info!("notice dispatcher started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("notice dispatcher stopped");
                        break;
                    }
                    maybe = rx.recv() => {
                        match maybe {
                            Some(notice) => {
                                if let Err(e) = notifier.notify(&notice) {
                                    warn!("notice delivery failed: {e}");
                                }
                            }
                            None => {
                                info!("outbox closed, notice dispatcher stopped");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::actor::Role;
    use crate::directory::Person;
    use crate::error::ServiceError;

    struct Capture(Mutex<Vec<Notice>>);

    impl Notifier for Capture {
        fn notify(&self, notice: &Notice) -> Result<(), ServiceError> {
            self.0.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    fn notice(id: &str) -> Notice {
        Notice::GateOutcome {
            recipient: Person {
                id: id.into(),
                name: id.into(),
                role: Role::Student,
                department: None,
                email: None,
            },
            direction: "exit".into(),
            approved: true,
            presence: "outside".into(),
        }
    }

    #[tokio::test]
    async fn post_reaches_receiver() {
        let (outbox, mut rx) = Outbox::channel();
        outbox.post(notice("s1"));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.recipient().id, "s1");
    }

    #[tokio::test]
    async fn dispatcher_delivers_and_stops() {
        let (outbox, rx) = Outbox::channel();
        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        let cancel = start_dispatcher(rx, capture.clone());

        outbox.post(notice("s1"));
        outbox.post(notice("s2"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let seen = capture.0.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].recipient().id, "s1");
        }

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        outbox.post(notice("s3"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(capture.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn post_after_receiver_dropped_is_silent() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        outbox.post(notice("s1"));
    }
}
