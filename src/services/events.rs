//! Event system for learning progress
//!
//! Services publish every state transition here. Subscribers handle
//! audit logging and hand events to the notification collaborator.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Learning events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum LearningEvent {
    ChapterStarted {
        partner_id: String,
        chapter_id: String,
    },
    VideoWatched {
        partner_id: String,
        chapter_id: String,
    },
    ChapterCompleted {
        partner_id: String,
        chapter_id: String,
        course_id: String,
    },
    ChapterUnlocked {
        partner_id: String,
        chapter_id: String,
    },
    TestSubmitted {
        partner_id: String,
        test_id: String,
        attempt_seq: u32,
        score_percent: u32,
        passed: bool,
    },
    AttemptsExhausted {
        partner_id: String,
        test_id: String,
    },
    CertificateIssued {
        partner_id: String,
        course_id: String,
        certificate_number: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &LearningEvent);
}

/// Event bus for broadcasting learning events
pub struct EventBus {
    sender: broadcast::Sender<LearningEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: LearningEvent) {
        trace!(event = ?event, "Emitting learning event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LearningEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &LearningEvent) {
        match event {
            LearningEvent::ChapterCompleted { partner_id, chapter_id, course_id } => {
                info!(partner = %partner_id, chapter = %chapter_id, course = %course_id, "Chapter completed");
            }
            LearningEvent::TestSubmitted { partner_id, test_id, attempt_seq, score_percent, passed } => {
                info!(
                    partner = %partner_id,
                    test = %test_id,
                    attempt = attempt_seq,
                    score = score_percent,
                    passed = passed,
                    "Test submitted"
                );
            }
            LearningEvent::CertificateIssued { partner_id, course_id, certificate_number } => {
                info!(
                    partner = %partner_id,
                    course = %course_id,
                    number = %certificate_number,
                    "Certificate issued"
                );
            }
            _ => {
                debug!(event = ?event, "Learning event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(LearningEvent::ChapterStarted {
            partner_id: "p-1".into(),
            chapter_id: "ch-1".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            LearningEvent::ChapterStarted { partner_id, chapter_id } => {
                assert_eq!(partner_id, "p-1");
                assert_eq!(chapter_id, "ch-1");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        // Should not panic even with no subscribers
        bus.emit(LearningEvent::AttemptsExhausted {
            partner_id: "p-1".into(),
            test_id: "t-1".into(),
        });
    }
}
