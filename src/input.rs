//! Locomotion input.
//!
//! Game code writes raw held flags and a move axis into a [`LocomotionIntent`]
//! component. Once per tick the controller turns that into an immutable
//! [`InputSnapshot`] whose press/release edges are true for exactly one tick.
//! You handle device mapping in your code; the core only ever sees logical
//! buttons.

use bevy::prelude::*;

/// Logical buttons the core reacts to.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputButton {
    Jump,
    Crouch,
    Action,
    Sprint,
}

/// Held state and edges of one button for one tick.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub held: bool,
    /// Went from released to held this tick.
    pub pressed: bool,
    /// Went from held to released this tick.
    pub released: bool,
}

impl ButtonState {
    /// Derive edges from the previous and current held flag.
    pub fn from_held(previous: bool, held: bool) -> Self {
        Self {
            held,
            pressed: held && !previous,
            released: !held && previous,
        }
    }
}

/// Logical input for a single tick.
///
/// Replaced entirely every tick; nothing in the core mutates it.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    /// Raw 2D move axis (x = right, y = forward), length ≤ 1.
    pub move_axis: Vec2,
    /// Move axis rotated into world space on the XZ plane.
    pub move_direction: Vec3,
    /// Camera look delta, forwarded untouched.
    pub look_delta: Vec2,
    pub jump: ButtonState,
    pub crouch: ButtonState,
    pub action: ButtonState,
    pub sprint: ButtonState,
}

impl InputSnapshot {
    /// Stick magnitude in [0, 1].
    pub fn magnitude(&self) -> f32 {
        self.move_axis.length().min(1.0)
    }

    /// Whether there is any directional input.
    pub fn has_direction(&self) -> bool {
        self.move_direction.length_squared() > 1e-4
    }

    /// Unit world direction, or zero without input.
    pub fn direction(&self) -> Vec3 {
        self.move_direction.normalize_or_zero()
    }

    /// State of one button.
    pub fn button(&self, button: InputButton) -> ButtonState {
        match button {
            InputButton::Jump => self.jump,
            InputButton::Crouch => self.crouch,
            InputButton::Action => self.action,
            InputButton::Sprint => self.sprint,
        }
    }

    /// All buttons with their state, in a fixed order.
    pub fn buttons(&self) -> [(InputButton, ButtonState); 4] {
        [
            (InputButton::Jump, self.jump),
            (InputButton::Crouch, self.crouch),
            (InputButton::Action, self.action),
            (InputButton::Sprint, self.sprint),
        ]
    }
}

/// Converts a 2D move axis into a world direction for a camera looking along
/// `yaw` (radians around +Y, zero looks down -Z).
pub fn axis_to_world(axis: Vec2, yaw: f32) -> Vec3 {
    let axis = axis.clamp_length_max(1.0);
    let rotation = Quat::from_rotation_y(yaw);
    rotation * Vec3::new(axis.x, 0.0, -axis.y)
}

/// Desired movement for one character, written by player input or AI.
///
/// ```rust
/// use bevy::prelude::*;
/// use platformer_locomotion::prelude::*;
///
/// let mut intent = LocomotionIntent::new();
/// intent.set_move(Vec2::new(0.0, 1.0));
/// intent.set_held(InputButton::Jump, true);
///
/// let first = intent.snapshot();
/// assert!(first.jump.pressed);
///
/// // Still held: no new edge.
/// let second = intent.snapshot();
/// assert!(second.jump.held && !second.jump.pressed);
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct LocomotionIntent {
    /// Move axis (x = right, y = forward).
    pub move_axis: Vec2,
    /// Look delta for this tick.
    pub look_delta: Vec2,
    /// Yaw of the camera the move axis is relative to (radians).
    pub camera_yaw: f32,
    pub jump: bool,
    pub crouch: bool,
    pub action: bool,
    pub sprint: bool,
    /// Held flags of the previous snapshot, for edge detection.
    previous: [bool; 4],
}

impl LocomotionIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the move axis, clamped to unit length.
    pub fn set_move(&mut self, axis: Vec2) {
        self.move_axis = axis.clamp_length_max(1.0);
    }

    pub fn set_camera_yaw(&mut self, yaw: f32) {
        self.camera_yaw = yaw;
    }

    /// Set whether a button is held.
    pub fn set_held(&mut self, button: InputButton, held: bool) {
        match button {
            InputButton::Jump => self.jump = held,
            InputButton::Crouch => self.crouch = held,
            InputButton::Action => self.action = held,
            InputButton::Sprint => self.sprint = held,
        }
    }

    /// Release everything and zero the axes.
    pub fn clear(&mut self) {
        self.move_axis = Vec2::ZERO;
        self.look_delta = Vec2::ZERO;
        self.jump = false;
        self.crouch = false;
        self.action = false;
        self.sprint = false;
    }

    /// Produce this tick's snapshot and remember held flags for the next one.
    pub fn snapshot(&mut self) -> InputSnapshot {
        let held = [self.jump, self.crouch, self.action, self.sprint];
        let [jump, crouch, action, sprint] =
            std::array::from_fn(|i| ButtonState::from_held(self.previous[i], held[i]));
        self.previous = held;

        InputSnapshot {
            move_axis: self.move_axis,
            move_direction: axis_to_world(self.move_axis, self.camera_yaw),
            look_delta: self.look_delta,
            jump,
            crouch,
            action,
            sprint,
        }
    }
}
