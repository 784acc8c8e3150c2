//! Event system for story operations
//!
//! Services emit events after a write commits. The logging listener turns them
//! into an audit trail; tests subscribe directly.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::{Role, StoryStatus};

/// Events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum StoryEvent {
    // Graph events
    StoryCreated {
        id: i64,
        title: String,
    },
    StoryStatusChanged {
        id: i64,
        status: StoryStatus,
    },
    StoryDeleted {
        id: i64,
    },
    PageCreated {
        id: i64,
        story_id: i64,
        is_ending: bool,
    },
    PageDeleted {
        id: i64,
        story_id: i64,
    },
    ChoiceAdded {
        id: i64,
        page_id: i64,
        next_page_id: i64,
    },

    // Play events
    PlayStarted {
        session_id: String,
        story_id: i64,
        resumed: bool,
    },
    PlayCompleted {
        story_id: i64,
        ending_page_id: i64,
        player_id: Option<String>,
    },

    // Feedback and accounts
    ReportFiled {
        id: i64,
        story_id: i64,
    },
    RoleChanged {
        user_id: String,
        role: Role,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &StoryEvent);
}

/// Event bus for broadcasting story events
pub struct EventBus {
    sender: broadcast::Sender<StoryEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: StoryEvent) {
        trace!(event = ?event, "Emitting story event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoryEvent> {
        self.sender.subscribe()
    }

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
    fn on_event(&self, event: &StoryEvent) {
        match event {
            StoryEvent::StoryCreated { id, title } => {
                debug!(id, title = %title, "Story created");
            }
            StoryEvent::StoryStatusChanged { id, status } => {
                info!(id, status = %status, "Story status changed");
            }
            StoryEvent::StoryDeleted { id } => {
                info!(id, "Story deleted");
            }
            StoryEvent::PlayCompleted {
                story_id,
                ending_page_id,
                player_id,
            } => {
                info!(
                    story_id,
                    ending_page_id,
                    player = player_id.as_deref().unwrap_or("anonymous"),
                    "Playthrough completed"
                );
            }
            StoryEvent::RoleChanged { user_id, role } => {
                info!(user = %user_id, role = %role, "Role changed");
            }
            _ => {
                trace!(event = ?event, "Story event");
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
