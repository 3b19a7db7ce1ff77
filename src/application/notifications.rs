//! Post-commit notification delivery.
//!
//! Committed units of work hand their notifications to a bounded queue. A
//! single background task drains it, giving every delivery its own timeout.
//! Failures end up in the log and in [`DispatchStats`], never with the caller.

use crate::config::WorkflowConfig;
use crate::domain::notification::Notification;
use crate::domain::ports::{SharedChat, SharedMailer};
use crate::error::NotifyError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Delivery counters since the dispatcher started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    /// Rejected because the queue was full or already closed.
    pub dropped: u64,
}

/// Cheap, cloneable handle for enqueueing notifications. Never blocks.
#[derive(Clone)]
pub struct NotificationSender {
    queue: mpsc::Sender<Notification>,
    counters: Arc<Counters>,
}

impl NotificationSender {
    pub fn dispatch(&self, notification: Notification) {
        match self.queue.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = n.kind(), "notification queue full, dropping notification");
            }
            Err(TrySendError::Closed(n)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = n.kind(), "notification dispatcher stopped, dropping notification");
            }
        }
    }
}

struct Deliverer {
    mailer: SharedMailer,
    chat: SharedChat,
    timeout: Duration,
    counters: Arc<Counters>,
}

impl Deliverer {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::AdminChat { text } => self.chat.notify(text).await,
            Notification::Email(email) => self.mailer.send(email).await,
        }
    }

    async fn deliver(&self, notification: Notification) {
        let kind = notification.kind();
        let result = match tokio::time::timeout(self.timeout, self.send(&notification)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout),
        };
        match result {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(kind, "notification delivered");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(kind, error = %e, "notification delivery failed");
            }
        }
    }
}

/// Owns the background delivery task.
pub struct NotificationDispatcher {
    sender: NotificationSender,
    stop: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl NotificationDispatcher {
    /// Spawns the delivery task on the current tokio runtime.
    pub fn spawn(mailer: SharedMailer, chat: SharedChat, config: &WorkflowConfig) -> Self {
        let (queue, rx) = mpsc::channel(config.notification_queue.max(1));
        let (stop, stop_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());
        let deliverer = Deliverer {
            mailer,
            chat,
            timeout: config.notify_timeout,
            counters: counters.clone(),
        };
        let worker = tokio::spawn(run(rx, stop_rx, deliverer));

        Self {
            sender: NotificationSender { queue, counters },
            stop,
            worker,
        }
    }

    pub fn sender(&self) -> NotificationSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> DispatchStats {
        let counters = &self.sender.counters;
        DispatchStats {
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting notifications, delivers what is already queued and
    /// waits for the task to finish.
    pub async fn shutdown(self) -> DispatchStats {
        let Self {
            sender,
            stop,
            worker,
        } = self;
        let _ = stop.send(());
        if let Err(e) = worker.await {
            error!(error = %e, "notification dispatcher task failed");
        }
        let counters = &sender.counters;
        DispatchStats {
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<Notification>,
    mut stop: oneshot::Receiver<()>,
    deliverer: Deliverer,
) {
    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(notification) => deliverer.deliver(notification).await,
                None => return,
            },
            _ = &mut stop => break,
        }
    }

    rx.close();
    while let Some(notification) = rx.recv().await {
        deliverer.deliver(notification).await;
    }
    debug!("notification dispatcher drained");
}
