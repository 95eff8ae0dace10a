//! # Input Collector
//!
//! Awaitable "next qualifying message" primitive. A flow registers a wait
//! for one (user, chat) pair with a predicate and a deadline; inbound
//! messages are offered to the collector before any other handling. A
//! matching message is handed to exactly one waiter and the wait closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::model::{ChatId, InboundMessage, UserId};

type Predicate = Box<dyn Fn(&InboundMessage) -> bool + Send + Sync>;

struct PendingWait {
    token: u64,
    predicate: Predicate,
    sender: oneshot::Sender<InboundMessage>,
}

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Received(InboundMessage),
    TimedOut,
    /// Cancelled, or replaced by a newer wait for the same user and chat
    Closed,
}

#[derive(Default)]
pub struct InputCollector {
    waits: Mutex<HashMap<(UserId, ChatId), PendingWait>>,
    next_token: AtomicU64,
}

impl InputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(UserId, ChatId), PendingWait>> {
        self.waits.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for the next message from `user_id` in `chat_id` that satisfies
    /// `predicate`. A newer wait for the same pair closes this one.
    pub async fn wait_for<P>(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        predicate: P,
        timeout: Duration,
    ) -> CollectOutcome
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let replaced = self.lock().insert(
            (user_id, chat_id),
            PendingWait {
                token,
                predicate: Box::new(predicate),
                sender,
            },
        );
        if replaced.is_some() {
            debug!(user_id, chat_id, "Replaced an open input wait");
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(message)) => CollectOutcome::Received(message),
            Ok(Err(_)) => CollectOutcome::Closed,
            Err(_) => {
                let mut waits = self.lock();
                if waits
                    .get(&(user_id, chat_id))
                    .is_some_and(|wait| wait.token == token)
                {
                    waits.remove(&(user_id, chat_id));
                }
                CollectOutcome::TimedOut
            }
        }
    }

    /// Hand `message` to the matching waiter. Returns true when consumed.
    pub fn offer(&self, message: &InboundMessage) -> bool {
        let key = (message.user_id, message.chat_id);
        let mut waits = self.lock();

        let matches = match waits.get(&key) {
            Some(wait) => (wait.predicate)(message),
            None => return false,
        };
        if !matches {
            return false;
        }

        match waits.remove(&key) {
            Some(wait) => wait.sender.send(message.clone()).is_ok(),
            None => false,
        }
    }

    /// Close an open wait, if any
    pub fn cancel(&self, user_id: UserId, chat_id: ChatId) -> bool {
        self.lock().remove(&(user_id, chat_id)).is_some()
    }

    pub fn is_waiting(&self, user_id: UserId, chat_id: ChatId) -> bool {
        self.lock().contains_key(&(user_id, chat_id))
    }
}

/// Predicate accepting messages that carry a still image
pub fn has_image(message: &InboundMessage) -> bool {
    message.first_image().is_some()
}
