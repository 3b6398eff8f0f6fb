//! Per-character publish/subscribe channel.
//!
//! Every character owns (or shares, by cloning the handle) an [`EventChannel`].
//! Producers inside the locomotion core publish [`LocomotionEvent`]s on it and
//! presentation layers (animation, audio, camera, UI) subscribe by
//! [`EventKind`].
//!
//! Delivery is synchronous: [`EventChannel::publish`] runs every handler that
//! was subscribed at the moment of the call before returning. The subscriber
//! list is snapshotted first, so a handler may subscribe or unsubscribe while
//! it is being invoked.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bevy::prelude::*;

use crate::animation::AnimationData;
use crate::input::InputButton;
use crate::jump::{ActionCommand, GroundPoundPhase};
use crate::state::LocomotionState;

/// Every concrete event kind that can be subscribed to.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InputEdge,
    StateChanged,
    AnimationData,
    GroundedChanged,
    Airborne,
    SlopeChanged,
    SlideStateChanged,
    JumpExecuted,
    RotatePlayer,
    GroundPoundPhase,
    Dive,
    LedgeGrabChanged,
}

/// Logical input edges, republished for consumers such as audio or UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Pressed(InputButton),
    Released(InputButton),
}

/// Signals describing the character's physical or logical state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateEvent {
    /// The resolved locomotion state differs from the previous one.
    StateChanged {
        from: LocomotionState,
        to: LocomotionState,
    },
    /// Per-tick animation snapshot.
    AnimationData(AnimationData),
    /// Grounded flag flipped (coyote time included).
    GroundedChanged { grounded: bool },
    /// The character left the ground; `departure_height` is the height of the
    /// last tick with real ground contact.
    Airborne { departure_height: f32 },
    /// Ground slope moved past the hysteresis band.
    SlopeChanged { previous: f32, angle: f32 },
    /// Slope slide started or stopped.
    SlideStateChanged { active: bool },
    /// Ledge hang started or ended.
    LedgeGrabChanged { grabbing: bool },
}

/// Commands raised by the action chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionEvent {
    /// A jump or action variant was executed.
    JumpExecuted(ActionCommand),
    /// The character must face `direction` (unit vector on the ground plane).
    RotatePlayer { direction: Vec3 },
    /// Ground-pound sequence moved to a new phase.
    GroundPoundPhase(GroundPoundPhase),
    /// A dive started; `grounded` is true for a ground dive.
    Dive { grounded: bool },
}

/// The closed set of events carried by an [`EventChannel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocomotionEvent {
    Input(InputEvent),
    State(StateEvent),
    Action(ActionEvent),
}

impl LocomotionEvent {
    /// The subscription kind this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            LocomotionEvent::Input(_) => EventKind::InputEdge,
            LocomotionEvent::State(state) => match state {
                StateEvent::StateChanged { .. } => EventKind::StateChanged,
                StateEvent::AnimationData(_) => EventKind::AnimationData,
                StateEvent::GroundedChanged { .. } => EventKind::GroundedChanged,
                StateEvent::Airborne { .. } => EventKind::Airborne,
                StateEvent::SlopeChanged { .. } => EventKind::SlopeChanged,
                StateEvent::SlideStateChanged { .. } => EventKind::SlideStateChanged,
                StateEvent::LedgeGrabChanged { .. } => EventKind::LedgeGrabChanged,
            },
            LocomotionEvent::Action(action) => match action {
                ActionEvent::JumpExecuted(_) => EventKind::JumpExecuted,
                ActionEvent::RotatePlayer { .. } => EventKind::RotatePlayer,
                ActionEvent::GroundPoundPhase(_) => EventKind::GroundPoundPhase,
                ActionEvent::Dive { .. } => EventKind::Dive,
            },
        }
    }
}

/// Handle returned by [`EventChannel::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&LocomotionEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    /// `None` subscribes to every kind.
    kind: Option<EventKind>,
    handler: Handler,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<Subscriber>,
}

/// Instance-owned publish/subscribe service.
///
/// Cloning an `EventChannel` yields another handle to the same subscriber
/// list. Two channels created with [`EventChannel::new`] never share
/// subscribers.
#[derive(Clone, Default)]
pub struct EventChannel {
    inner: Arc<Mutex<Subscribers>>,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe `handler` to events of one kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LocomotionEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(handler))
    }

    /// Subscribe `handler` to every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LocomotionEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    fn insert(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let mut subscribers = self.lock();
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.entries.push(Subscriber { id, kind, handler });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.entries.len();
        subscribers.entries.retain(|s| s.id != id);
        subscribers.entries.len() != before
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Deliver `event` to every matching subscriber.
    ///
    /// With no subscribers this does nothing.
    pub fn publish(&self, event: &LocomotionEvent) {
        let kind = event.kind();
        let snapshot: Vec<Handler> = {
            let subscribers = self.lock();
            subscribers
                .entries
                .iter()
                .filter(|s| s.kind.is_none_or(|k| k == kind))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in snapshot {
            handler(event);
        }
    }

    /// Shorthand for publishing a [`StateEvent`].
    pub fn publish_state(&self, event: StateEvent) {
        self.publish(&LocomotionEvent::State(event));
    }

    /// Shorthand for publishing an [`ActionEvent`].
    pub fn publish_action(&self, event: ActionEvent) {
        self.publish(&LocomotionEvent::Action(event));
    }

    /// Shorthand for publishing an [`InputEvent`].
    pub fn publish_input(&self, event: InputEvent) {
        self.publish(&LocomotionEvent::Input(event));
    }
}
