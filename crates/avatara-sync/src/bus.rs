//! Typed in-process event bus
//!
//! Events are a closed enum. Each event has a `Topic`, and every topic
//! belongs to a `Category`, so a subscriber can listen to one topic, a whole
//! category, or everything. Subscribers receive events over an unbounded
//! channel; dropped receivers are pruned on the next publish.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use avatara_core::{MeshId, ParticipantIdentity};

use crate::{JoinSpaceConfirm, JoinSpaceRequest, PlaceObjectRequest, StudioSavedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Multiplayer,
    Participant,
    Studio,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::Multiplayer => "multiplayer",
            Category::Participant => "participant",
            Category::Studio => "studio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RequestJoinSpace,
    ConfirmJoinSpace,
    RequestBuildSpace,
    ConfirmBuildSpace,
    PlacingObject,
    PlaceObject,
    ParticipantLeft,
    Operation,
}

impl Topic {
    pub fn category(&self) -> Category {
        match self {
            Topic::RequestJoinSpace
            | Topic::ConfirmJoinSpace
            | Topic::RequestBuildSpace
            | Topic::ConfirmBuildSpace => Category::Multiplayer,
            Topic::PlacingObject | Topic::PlaceObject | Topic::ParticipantLeft => {
                Category::Participant
            }
            Topic::Operation => Category::Studio,
        }
    }

    fn event_name(&self) -> &'static str {
        match self {
            Topic::RequestJoinSpace => "requestJoinSpace",
            Topic::ConfirmJoinSpace => "confirmJoinSpace",
            Topic::RequestBuildSpace => "requestBuildSpace",
            Topic::ConfirmBuildSpace => "confirmBuildSpace",
            Topic::PlacingObject => "placingObject",
            Topic::PlaceObject => "placeObject",
            Topic::ParticipantLeft => "left",
            Topic::Operation => "operation",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category().name(), self.event_name())
    }
}

/// Bus message. `from` is the participant the intent originated with.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    RequestJoinSpace {
        from: ParticipantIdentity,
        request: JoinSpaceRequest,
    },
    ConfirmJoinSpace {
        from: ParticipantIdentity,
        confirm: JoinSpaceConfirm,
    },
    RequestBuildSpace {
        from: ParticipantIdentity,
        request: JoinSpaceRequest,
    },
    ConfirmBuildSpace {
        from: ParticipantIdentity,
        confirm: JoinSpaceConfirm,
    },
    PlacingObject {
        from: ParticipantIdentity,
        request: PlaceObjectRequest,
    },
    PlaceObject {
        from: ParticipantIdentity,
        request: PlaceObjectRequest,
        /// Committed object, for remote placements
        mesh: Option<MeshId>,
    },
    ParticipantLeft {
        identity: ParticipantIdentity,
    },
    StudioOperation {
        from: ParticipantIdentity,
        state: StudioSavedState,
    },
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::RequestJoinSpace { .. } => Topic::RequestJoinSpace,
            BusEvent::ConfirmJoinSpace { .. } => Topic::ConfirmJoinSpace,
            BusEvent::RequestBuildSpace { .. } => Topic::RequestBuildSpace,
            BusEvent::ConfirmBuildSpace { .. } => Topic::ConfirmBuildSpace,
            BusEvent::PlacingObject { .. } => Topic::PlacingObject,
            BusEvent::PlaceObject { .. } => Topic::PlaceObject,
            BusEvent::ParticipantLeft { .. } => Topic::ParticipantLeft,
            BusEvent::StudioOperation { .. } => Topic::Operation,
        }
    }
}

/// Which events a subscriber receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Topic(Topic),
    Category(Category),
    All,
}

impl Subscription {
    pub fn matches(&self, topic: Topic) -> bool {
        match self {
            Subscription::Topic(t) => *t == topic,
            Subscription::Category(c) => topic.category() == *c,
            Subscription::All => true,
        }
    }
}

impl From<Topic> for Subscription {
    fn from(topic: Topic) -> Self {
        Subscription::Topic(topic)
    }
}

impl From<Category> for Subscription {
    fn from(category: Category) -> Self {
        Subscription::Category(category)
    }
}

struct Subscriber {
    filter: Subscription,
    tx: mpsc::UnboundedSender<BusEvent>,
}

/// Cloneable handle to one bus
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, filter: impl Into<Subscription>) -> mpsc::UnboundedReceiver<BusEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            filter: filter.into(),
            tx,
        });
        rx
    }

    /// Deliver to every matching subscriber; returns how many received it
    pub fn publish(&self, event: BusEvent) -> usize {
        let topic = event.topic();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.filter.matches(topic)) {
            if subscriber.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::trace!(%topic, delivered, "bus publish");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
