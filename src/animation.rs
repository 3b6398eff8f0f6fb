//! Animation data broadcast.
//!
//! A compact, per-tick snapshot for presentation layers. The broadcaster
//! holds no state of its own; it only projects values the rest of the
//! pipeline already computed.

use bevy::prelude::*;

use crate::config::AnimationSettings;
use crate::events::{EventChannel, StateEvent};
use crate::state::LocomotionState;

/// How sharply the input turns away from the facing direction.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TurnType {
    #[default]
    None,
    Gentle,
    Sharp,
}

/// Snapshot published every tick.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Default)]
pub struct AnimationData {
    /// Horizontal speed.
    pub speed: f32,
    /// Horizontal speed relative to the sprint speed, in [0, 1].
    pub normalized_speed: f32,
    /// Vertical velocity mapped to [-1, 1].
    pub vertical: f32,
    /// Signed turn from facing toward input, in [-1, 1] (positive turns left).
    pub turn: f32,
    /// Raw world input direction.
    pub input_direction: Vec3,
    pub grounded: bool,
    pub moving: bool,
    pub skidding: bool,
    pub turn_type: TurnType,
    pub state: LocomotionState,
}

/// Values the snapshot is projected from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationInputs {
    pub velocity: Vec3,
    pub facing: Vec3,
    pub input_direction: Vec3,
    pub grounded: bool,
    pub skidding: bool,
    pub state: LocomotionState,
    /// Speed that maps to a normalized speed of 1.
    pub max_speed: f32,
}

/// Signed angle in degrees from `from` to `to` on the ground plane.
fn signed_yaw(from: Vec3, to: Vec3) -> f32 {
    let a = Vec2::new(from.x, from.z);
    let b = Vec2::new(to.x, to.z);
    if a.length_squared() < 1e-6 || b.length_squared() < 1e-6 {
        return 0.0;
    }
    // Counter-clockwise seen from above is positive.
    -a.angle_to(b).to_degrees()
}

#[derive(Debug, Clone)]
pub struct AnimationBroadcaster {
    settings: AnimationSettings,
}

impl AnimationBroadcaster {
    pub fn new(settings: AnimationSettings) -> Self {
        Self { settings }
    }

    /// Project `inputs` into a snapshot without publishing it.
    pub fn project(&self, inputs: &AnimationInputs) -> AnimationData {
        let s = &self.settings;
        let speed = Vec2::new(inputs.velocity.x, inputs.velocity.z).length();
        let normalized_speed = if inputs.max_speed > 0.0 {
            (speed / inputs.max_speed).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let angle = signed_yaw(inputs.facing, inputs.input_direction);
        let turn_type = if angle.abs() >= s.sharp_turn_angle {
            TurnType::Sharp
        } else if angle.abs() >= s.gentle_turn_angle {
            TurnType::Gentle
        } else {
            TurnType::None
        };

        AnimationData {
            speed,
            normalized_speed,
            vertical: (inputs.velocity.y / s.max_vertical_speed).clamp(-1.0, 1.0),
            turn: (angle / 180.0).clamp(-1.0, 1.0),
            input_direction: inputs.input_direction,
            grounded: inputs.grounded,
            moving: speed > s.moving_threshold,
            skidding: inputs.skidding,
            turn_type,
            state: inputs.state,
        }
    }

    /// Project and publish.
    pub fn broadcast(&self, inputs: &AnimationInputs, events: &EventChannel) -> AnimationData {
        let data = self.project(inputs);
        events.publish_state(StateEvent::AnimationData(data));
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, LocomotionEvent};
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};

    fn inputs() -> AnimationInputs {
        AnimationInputs {
            velocity: Vec3::ZERO,
            facing: Vec3::NEG_Z,
            input_direction: Vec3::ZERO,
            grounded: true,
            skidding: false,
            state: LocomotionState::Idle,
            max_speed: 10.0,
        }
    }

    #[test]
    fn speed_and_vertical_normalized() {
        let b = AnimationBroadcaster::new(AnimationSettings::default());
        let data = b.project(&AnimationInputs {
            velocity: Vec3::new(3.0, -40.0, 4.0),
            ..inputs()
        });

        assert_relative_eq!(data.speed, 5.0);
        assert_relative_eq!(data.normalized_speed, 0.5);
        assert_eq!(data.vertical, -1.0);
        assert!(data.moving);
    }

    #[test]
    fn idle_is_not_moving() {
        let b = AnimationBroadcaster::new(AnimationSettings::default());
        let data = b.project(&inputs());
        assert!(!data.moving);
        assert_eq!(data.turn_type, TurnType::None);
        assert_eq!(data.turn, 0.0);
    }

    #[test]
    fn turn_classification() {
        let b = AnimationBroadcaster::new(AnimationSettings::default());

        let reverse = b.project(&AnimationInputs {
            input_direction: Vec3::Z,
            ..inputs()
        });
        assert_eq!(reverse.turn_type, TurnType::Sharp);
        assert_relative_eq!(reverse.turn.abs(), 1.0, epsilon = 1e-4);

        let slight = b.project(&AnimationInputs {
            input_direction: Vec3::new(-0.5, 0.0, -1.0),
            ..inputs()
        });
        assert_eq!(slight.turn_type, TurnType::Gentle);
        // Facing -Z, input toward -X: a left turn.
        assert!(slight.turn > 0.0);
    }

    #[test]
    fn broadcast_publishes_snapshot() {
        let b = AnimationBroadcaster::new(AnimationSettings::default());
        let events = EventChannel::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        events.subscribe(EventKind::AnimationData, move |e| {
            if let LocomotionEvent::State(StateEvent::AnimationData(data)) = e {
                *sink.lock().unwrap() = Some(*data);
            }
        });

        let data = b.broadcast(&inputs(), &events);
        assert_eq!(*seen.lock().unwrap(), Some(data));
    }
}
