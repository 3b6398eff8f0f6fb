//! The per-character locomotion pipeline.
//!
//! [`LocomotionCore::tick`] runs every stage once, in a fixed order:
//!
//! 1. ground and slope analysis
//! 2. momentum
//! 3. slope sliding
//! 4. ledge detection
//! 5. jump/action chain
//! 6. locomotion state
//! 7. animation broadcast
//!
//! Each stage owns its state and is only mutated through its own API. The
//! core returns the desired velocity; gravity and collision response stay
//! with the physics engine.

use bevy::prelude::*;

use crate::animation::{AnimationBroadcaster, AnimationData, AnimationInputs};
use crate::config::LocomotionSettings;
use crate::error::ConfigError;
use crate::events::{EventChannel, InputEvent};
use crate::ground::{Contact, GroundAnalyzer};
use crate::input::{InputButton, InputSnapshot};
use crate::jump::{ActionCommand, ActionVariant, ChainContext, JumpChainMachine};
use crate::ledge::LedgeDetector;
use crate::momentum::{MomentumBlender, MomentumSource};
use crate::sensor::TerrainSensor;
use crate::slide::SlopeSlideEngine;
use crate::state::{LocomotionState, LocomotionStateMachine, StateSignals};

/// Kinematic state of the character's body, reported by the engine.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyState {
    /// Feet position.
    pub position: Vec3,
    pub velocity: Vec3,
}

impl BodyState {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self { position, velocity }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionOutput {
    /// Desired body velocity.
    pub velocity: Vec3,
    /// The engine should not apply gravity this tick (hang time, ledges).
    pub suspend_gravity: bool,
    /// Unit facing direction on the ground plane.
    pub facing: Vec3,
    pub grounded: bool,
    pub state: LocomotionState,
    /// Commands executed this tick, in order.
    pub commands: Vec<ActionCommand>,
    pub animation: AnimationData,
}

/// Builder for [`LocomotionCore`].
#[derive(Debug, Clone)]
pub struct LocomotionCoreBuilder {
    settings: LocomotionSettings,
    events: Option<EventChannel>,
    facing: Vec3,
}

impl LocomotionCoreBuilder {
    /// Event channel the character publishes on. Required.
    pub fn events(mut self, events: EventChannel) -> Self {
        self.events = Some(events);
        self
    }

    /// Initial facing direction.
    pub fn facing(mut self, direction: Vec3) -> Self {
        self.facing = direction;
        self
    }

    /// Validate the settings and wire every stage.
    pub fn build(self) -> Result<LocomotionCore, ConfigError> {
        self.settings.validate()?;
        let events = self
            .events
            .ok_or(ConfigError::MissingCollaborator("event channel"))?;
        let s = self.settings;
        let facing = Vec3::new(self.facing.x, 0.0, self.facing.z).normalize_or(Vec3::NEG_Z);

        Ok(LocomotionCore {
            ground: GroundAnalyzer::new(s.ground.clone()),
            ledge: LedgeDetector::new(s.ledge.clone(), s.ground.walkable_angle, s.ground.layer_mask),
            momentum: MomentumBlender::new(s.momentum.clone()),
            slide: SlopeSlideEngine::new(s.slide.clone()),
            chain: JumpChainMachine::new(s.jump.clone()),
            states: LocomotionStateMachine::new(s.states.clone()),
            animation: AnimationBroadcaster::new(s.animation.clone()),
            settings: s,
            events,
            clock: 0.0,
            facing,
        })
    }
}

/// One character's locomotion and action core.
///
/// ```rust
/// use bevy::prelude::*;
/// use platformer_locomotion::prelude::*;
///
/// let events = EventChannel::new();
/// let mut core = LocomotionCore::builder(LocomotionSettings::default())
///     .events(events)
///     .build()
///     .unwrap();
///
/// let ground = PlaneTerrain::flat(0.0);
/// let output = core.tick(&ground, BodyState::default(), &InputSnapshot::default(), 1.0 / 60.0);
/// assert!(output.grounded);
/// assert_eq!(output.state, LocomotionState::Idle);
/// ```
#[derive(Debug)]
pub struct LocomotionCore {
    settings: LocomotionSettings,
    events: EventChannel,
    clock: f32,
    facing: Vec3,
    ground: GroundAnalyzer,
    ledge: LedgeDetector,
    momentum: MomentumBlender,
    slide: SlopeSlideEngine,
    chain: JumpChainMachine,
    states: LocomotionStateMachine,
    animation: AnimationBroadcaster,
}

fn flat(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

impl LocomotionCore {
    pub fn builder(settings: LocomotionSettings) -> LocomotionCoreBuilder {
        LocomotionCoreBuilder {
            settings,
            events: None,
            facing: Vec3::NEG_Z,
        }
    }

    pub fn settings(&self) -> &LocomotionSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Simulation clock (sum of all tick deltas).
    pub fn clock(&self) -> f32 {
        self.clock
    }

    pub fn facing(&self) -> Vec3 {
        self.facing
    }

    pub fn state(&self) -> LocomotionState {
        self.states.current()
    }

    pub fn contact(&self) -> &Contact {
        self.ground.contact()
    }

    pub fn ground(&self) -> &GroundAnalyzer {
        &self.ground
    }

    pub fn momentum(&self) -> &MomentumBlender {
        &self.momentum
    }

    pub fn slide(&self) -> &SlopeSlideEngine {
        &self.slide
    }

    pub fn chain(&self) -> &JumpChainMachine {
        &self.chain
    }

    pub fn ledge(&self) -> &LedgeDetector {
        &self.ledge
    }

    pub fn state_machine(&self) -> &LocomotionStateMachine {
        &self.states
    }

    /// Horizontal speed the input asks for.
    pub fn target_speed(&self, input: &InputSnapshot, grounded: bool) -> f32 {
        let s = &self.settings.states;
        let magnitude = input.magnitude();
        if magnitude <= 0.0 {
            0.0
        } else if input.crouch.held && grounded {
            s.crouch_speed * magnitude
        } else if input.sprint.held {
            s.sprint_speed * magnitude
        } else if magnitude < s.run_input_threshold {
            s.walk_speed * magnitude / s.run_input_threshold
        } else {
            s.run_speed * magnitude
        }
    }

    /// Run the pipeline once.
    pub fn tick(
        &mut self,
        sensor: &dyn TerrainSensor,
        body: BodyState,
        input: &InputSnapshot,
        dt: f32,
    ) -> MotionOutput {
        self.clock += dt;
        let now = self.clock;
        let events = self.events.clone();

        for (button, state) in input.buttons() {
            if state.pressed {
                events.publish_input(InputEvent::Pressed(button));
            } else if state.released {
                events.publish_input(InputEvent::Released(button));
            }
        }

        // Ground.
        let departure_height = self.ground.departure_height();
        let contact = *self.ground.sense(sensor, body.position, now, dt, &events);
        let grounded = contact.grounded;
        let direction = input.direction();
        let target_speed = self.target_speed(input, grounded);

        // Momentum.
        let frozen = self.chain.is_hanging() || self.ledge.is_hanging() || self.ledge.is_climbing();
        if !frozen {
            let speed = target_speed * self.slide.control_multiplier();
            self.momentum.update(direction, speed, grounded, dt);
        }
        let skidding = grounded
            && self.momentum.is_fighting()
            && self.momentum.magnitude() >= self.settings.states.skid_min_speed;

        // Slide.
        self.slide.update(&contact, grounded, direction, dt, &events);
        if let Some(carry) = self.slide.take_carryover() {
            self.momentum.add(carry, MomentumSource::Slide);
        }

        // Ledge. Pounds and dives fall past ledges.
        let can_grab = !self.chain.is_ground_pounding() && !self.chain.is_diving();
        self.ledge.update(
            sensor,
            body.position,
            self.facing,
            body.velocity.y,
            grounded,
            can_grab,
            now,
            &events,
        );

        // Jump/action chain.
        let mut ctx = ChainContext {
            now,
            grounded,
            landed_at: self.ground.landed_at(),
            steep: contact.steep,
            slide_engaged: self.slide.is_engaged(),
            surface_normal: contact.smoothed_normal,
            horizontal_speed: flat(body.velocity).length(),
            facing: self.facing,
            input_direction: direction,
            jump_held: input.jump.held,
            crouch_held: input.crouch.held,
            skidding,
            on_ledge: self.ledge.is_hanging(),
        };
        let commands = self.run_chain(&mut ctx, input, &events);

        // Velocity.
        let mut vertical = body.velocity.y;
        let mut launched = false;
        for command in &commands {
            launched |= self.apply_command(command, now, &mut vertical);
        }
        let (velocity, suspend_gravity) =
            self.compose_velocity(&contact, body, direction, target_speed, vertical, launched);

        if grounded && input.has_direction() && !self.slide.is_active() && commands.is_empty() {
            self.facing = flat(direction).normalize_or(self.facing);
        }

        // State.
        let signals = StateSignals {
            now,
            grounded,
            just_landed: self.ground.just_landed(),
            fall_distance: departure_height - body.position.y,
            ground_pound_landed: self.chain.landed_from_ground_pound(),
            ground_pound_phase: self.chain.ground_pound_phase(),
            hanging: self.chain.is_hanging(),
            on_ledge: self.ledge.is_hanging(),
            climbing: self.ledge.is_climbing(),
            executed: commands.last().copied(),
            sliding: self.slide.is_active(),
            skidding,
            horizontal_speed: flat(velocity).length(),
            vertical_velocity: velocity.y,
            crouch_held: input.crouch.held,
            has_input: input.has_direction(),
        };
        let state = self.states.tick(&signals, &events);

        // Animation.
        let animation = self.animation.broadcast(
            &AnimationInputs {
                velocity,
                facing: self.facing,
                input_direction: direction,
                grounded,
                skidding,
                state,
                max_speed: self.settings.states.sprint_speed,
            },
            &events,
        );

        trace!(?state, ?velocity, grounded, "locomotion tick");

        MotionOutput {
            velocity,
            suspend_gravity,
            facing: self.facing,
            grounded,
            state,
            commands,
            animation,
        }
    }

    fn run_chain(
        &mut self,
        ctx: &mut ChainContext,
        input: &InputSnapshot,
        events: &EventChannel,
    ) -> Vec<ActionCommand> {
        let mut commands = Vec::new();
        commands.extend(self.chain.tick(ctx, events));

        for button in [InputButton::Jump, InputButton::Crouch, InputButton::Action] {
            if input.button(button).released {
                self.chain.on_release(button);
            }
        }

        if input.crouch.pressed {
            if self.ledge.is_hanging() {
                self.ledge.release(ctx.now, events);
                ctx.on_ledge = false;
            } else {
                commands.extend(self.chain.on_crouch_edge(ctx, events));
            }
        }
        if input.jump.pressed {
            commands.extend(self.chain.on_jump_edge(ctx, events));
        }
        if input.action.pressed {
            commands.extend(self.chain.on_action_edge(ctx, events));
        }

        if commands.iter().any(|c| c.variant == ActionVariant::LedgeClimb) {
            self.ledge.climb(ctx.now, events);
        }
        commands
    }

    /// Apply a command's launch. Returns whether the body leaves the ground.
    fn apply_command(&mut self, command: &ActionCommand, now: f32, vertical: &mut f32) -> bool {
        if let Some(direction) = command.facing {
            self.facing = direction;
        }

        match command.variant {
            ActionVariant::GroundPound => {
                self.momentum.clear();
                *vertical = command.launch.y;
                false
            }
            ActionVariant::LedgeClimb => false,
            _ => {
                let horizontal = flat(command.launch);
                if horizontal != Vec3::ZERO {
                    self.momentum.set(horizontal, MomentumSource::Jump);
                }
                *vertical = command.launch.y;
                if command.launch.y > 0.0 {
                    self.ground.consume_coyote(now);
                }
                true
            }
        }
    }

    fn compose_velocity(
        &self,
        contact: &Contact,
        body: BodyState,
        direction: Vec3,
        target_speed: f32,
        vertical: f32,
        launched: bool,
    ) -> (Vec3, bool) {
        if self.ledge.is_hanging() {
            return (Vec3::ZERO, true);
        }
        if self.ledge.is_climbing() {
            let climb_speed = self.settings.jump.ledge_climb_speed;
            return (self.ledge.climb_velocity(body.position, climb_speed), true);
        }
        if self.chain.is_hanging() {
            return (Vec3::ZERO, true);
        }
        if self.chain.is_ground_pounding() {
            return (Vec3::Y * vertical, false);
        }

        let grounded = contact.grounded;
        let input_velocity = self.slide.lateral_input(direction * target_speed);
        let blend = if grounded {
            self.settings.momentum.ground_blend
        } else {
            self.settings.momentum.air_blend
        };
        let mut horizontal = self.momentum.combine(input_velocity, blend);
        let mut vertical = vertical;

        if self.slide.is_active() {
            let slide = self.slide.velocity();
            horizontal += flat(slide);
            vertical = vertical.min(slide.y);
        }

        if contact.touching && !launched && vertical <= 0.0 {
            // Follow the surface and press onto it.
            let along = contact.project(horizontal);
            let stick = -contact.smoothed_normal * self.settings.ground.stick_speed;
            return (along + stick, false);
        }

        (horizontal + Vec3::Y * vertical, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, LocomotionEvent};
    use crate::input::{ButtonState, LocomotionIntent};
    use crate::sensor::{BoxTerrain, CompositeTerrain, NoTerrain, PlaneTerrain};
    use std::sync::{Arc, Mutex};

    const DT: f32 = 1.0 / 60.0;

    fn core() -> LocomotionCore {
        LocomotionCore::builder(LocomotionSettings::default())
            .events(EventChannel::new())
            .build()
            .unwrap()
    }

    // ==================== Construction ====================

    #[test]
    fn missing_event_channel_is_fatal() {
        let err = LocomotionCore::builder(LocomotionSettings::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCollaborator("event channel")));
    }

    #[test]
    fn invalid_settings_rejected() {
        let settings = LocomotionSettings::default().with_walkable_angle(120.0);
        let result = LocomotionCore::builder(settings)
            .events(EventChannel::new())
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidSetting { .. })));
    }

    // ==================== Pipeline ====================

    #[test]
    fn idle_on_flat_ground() {
        let mut core = core();
        let output = core.tick(&PlaneTerrain::flat(0.0), BodyState::default(), &InputSnapshot::default(), DT);

        assert!(output.grounded);
        assert_eq!(output.state, LocomotionState::Idle);
        assert!(output.velocity.y <= 0.0);
        assert!(output.commands.is_empty());
    }

    #[test]
    fn no_terrain_falls() {
        let mut core = core();
        let body = BodyState::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -2.0, 0.0));
        let output = core.tick(&NoTerrain, body, &InputSnapshot::default(), DT);

        assert!(!output.grounded);
        assert_eq!(output.state, LocomotionState::Falling);
        assert_eq!(output.velocity.y, -2.0);
    }

    #[test]
    fn jump_press_launches() {
        let mut core = core();
        let ground = PlaneTerrain::flat(0.0);
        core.tick(&ground, BodyState::default(), &InputSnapshot::default(), DT);

        let mut intent = LocomotionIntent::new();
        intent.snapshot();
        intent.set_held(InputButton::Jump, true);
        let output = core.tick(&ground, BodyState::default(), &intent.snapshot(), DT);

        assert_eq!(output.commands.len(), 1);
        assert_eq!(output.state, LocomotionState::Jumping);
        assert_eq!(output.velocity.y, core.settings().jump.single_jump_speed);
    }

    #[test]
    fn ground_pound_falls_past_ledges() {
        let terrain = CompositeTerrain::new()
            .with(BoxTerrain::new(Vec3::new(-2.0, 0.0, -4.0), Vec3::new(2.0, 2.0, -1.0)))
            .with(PlaneTerrain::flat(-10.0));
        let beside_wall = BodyState::new(Vec3::new(0.0, 0.6, -0.5), Vec3::new(0.0, -1.0, 0.0));

        // A plain fall past the same spot grabs the ledge.
        let mut falling = core();
        falling.tick(&terrain, beside_wall, &InputSnapshot::default(), DT);
        assert!(falling.ledge().is_hanging());

        let mut pounding = core();
        let press = InputSnapshot {
            crouch: ButtonState {
                held: true,
                pressed: true,
                released: false,
            },
            ..default()
        };
        let above = BodyState::new(Vec3::new(0.0, 3.0, -0.5), Vec3::new(0.0, -1.0, 0.0));
        let output = pounding.tick(&terrain, above, &press, DT);
        assert_eq!(output.commands[0].variant, ActionVariant::GroundPound);

        let hold = InputSnapshot {
            crouch: ButtonState {
                held: true,
                ..default()
            },
            ..default()
        };
        for _ in 0..5 {
            let output = pounding.tick(&terrain, beside_wall, &hold, DT);
            assert_ne!(output.state, LocomotionState::LedgeGrab);
        }
        assert!(pounding.chain().is_ground_pounding());
        assert!(!pounding.ledge().is_hanging());
    }

    #[test]
    fn input_moves_and_faces() {
        let mut core = core();
        let ground = PlaneTerrain::flat(0.0);
        let input = InputSnapshot {
            move_axis: Vec2::X,
            move_direction: Vec3::X,
            ..default()
        };
        let mut body = BodyState::default();
        for _ in 0..60 {
            let output = core.tick(&ground, body, &input, DT);
            body.velocity = output.velocity;
        }

        assert!(body.velocity.x > 3.0);
        assert_eq!(core.facing(), Vec3::X);
        assert_eq!(core.state(), LocomotionState::Running);
    }

    #[test]
    fn input_edges_republished() {
        let mut core = core();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        core.events().subscribe(EventKind::InputEdge, move |e| {
            if let LocomotionEvent::Input(edge) = e {
                sink.lock().unwrap().push(*edge);
            }
        });

        let input = InputSnapshot {
            action: ButtonState {
                held: true,
                pressed: true,
                released: false,
            },
            ..default()
        };
        core.tick(&PlaneTerrain::flat(0.0), BodyState::default(), &input, DT);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![InputEvent::Pressed(InputButton::Action)]
        );
    }

    #[test]
    fn target_speed_bands() {
        let core = core();
        let s = &core.settings().states;
        let full = InputSnapshot {
            move_axis: Vec2::Y,
            move_direction: Vec3::NEG_Z,
            ..default()
        };
        assert_eq!(core.target_speed(&full, true), s.run_speed);

        let sprint = InputSnapshot {
            sprint: ButtonState {
                held: true,
                ..default()
            },
            ..full
        };
        assert_eq!(core.target_speed(&sprint, true), s.sprint_speed);

        let crouch = InputSnapshot {
            crouch: ButtonState {
                held: true,
                ..default()
            },
            ..full
        };
        assert_eq!(core.target_speed(&crouch, true), s.crouch_speed);
        assert_eq!(core.target_speed(&InputSnapshot::default(), true), 0.0);
    }
}
