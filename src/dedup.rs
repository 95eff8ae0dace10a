//! Short-lived seen-set so one inbound message never spawns two sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::clock::{elapsed_between, Clock};
use crate::model::{ChatId, MessageId};

pub struct SeenMessages {
    seen: Mutex<HashMap<(ChatId, MessageId), DateTime<Utc>>>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl SeenMessages {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            window,
            clock,
        }
    }

    /// Returns true the first time a message is offered within the window
    pub async fn first_sighting(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        let now = self.clock.now();
        let mut seen = self.seen.lock().await;
        seen.retain(|_, at| elapsed_between(*at, now) < self.window);

        if seen.contains_key(&(chat_id, message_id)) {
            return false;
        }
        seen.insert((chat_id, message_id), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_duplicate_within_window_is_rejected() {
        let clock = Arc::new(ManualClock::default());
        let seen = SeenMessages::new(Duration::from_secs(60), clock.clone());

        assert!(seen.first_sighting(-100, 7).await);
        assert!(!seen.first_sighting(-100, 7).await);
        assert!(seen.first_sighting(-100, 8).await);

        clock.advance(Duration::from_secs(61));
        assert!(seen.first_sighting(-100, 7).await);
    }
}
