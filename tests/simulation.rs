//! End-to-end tests of the locomotion core without an ECS.
//!
//! A small kinematic integrator stands in for the physics engine: it applies
//! gravity (unless the core suspends it), moves the feet by the returned
//! velocity and pushes them back out of the terrain.

use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use platformer_locomotion::prelude::*;

const DT: f32 = 1.0 / 60.0;
const GRAVITY: f32 = -20.0;

struct Harness {
    core: LocomotionCore,
    intent: LocomotionIntent,
    body: BodyState,
    states: Arc<Mutex<Vec<LocomotionState>>>,
}

impl Harness {
    fn new(position: Vec3) -> Self {
        Self::with_settings(LocomotionSettings::default(), position)
    }

    fn with_settings(settings: LocomotionSettings, position: Vec3) -> Self {
        let events = EventChannel::new();
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        events.subscribe(EventKind::StateChanged, move |e| {
            if let LocomotionEvent::State(StateEvent::StateChanged { to, .. }) = e {
                sink.lock().unwrap().push(*to);
            }
        });

        let core = LocomotionCore::builder(settings)
            .events(events)
            .build()
            .unwrap();
        Self {
            core,
            intent: LocomotionIntent::new(),
            body: BodyState::new(position, Vec3::ZERO),
            states,
        }
    }

    fn step(&mut self, terrain: &dyn TerrainSensor) -> MotionOutput {
        let input = self.intent.snapshot();
        let output = self.core.tick(terrain, self.body, &input, DT);

        let mut velocity = output.velocity;
        if !output.suspend_gravity {
            velocity.y += GRAVITY * DT;
        }
        let mut position = self.body.position + velocity * DT;
        // Push the feet back out of the terrain along its normal.
        if let Some(hit) = terrain.probe(position + Vec3::Y * 0.5, Vec3::NEG_Y, 0.5, u32::MAX) {
            let depth = (hit.point - position).dot(hit.normal);
            if depth > 0.0 {
                position += hit.normal * depth;
                let into = velocity.dot(hit.normal);
                if into < 0.0 {
                    velocity -= hit.normal * into;
                }
            }
        }
        self.body = BodyState::new(position, velocity);
        output
    }

    fn run(&mut self, terrain: &dyn TerrainSensor, ticks: usize) -> MotionOutput {
        let mut last = self.step(terrain);
        for _ in 1..ticks {
            last = self.step(terrain);
        }
        last
    }

    /// Step until the character is grounded again after having left the ground.
    fn until_landed(&mut self, terrain: &dyn TerrainSensor) -> MotionOutput {
        let mut left = false;
        for _ in 0..600 {
            let output = self.step(terrain);
            if !output.grounded {
                left = true;
            } else if left {
                return output;
            }
        }
        panic!("character never landed");
    }

    /// Press jump for one tick, release it and wait for the landing.
    fn jump_and_land(&mut self, terrain: &dyn TerrainSensor) -> ActionCommand {
        self.intent.set_held(InputButton::Jump, true);
        let output = self.step(terrain);
        self.intent.set_held(InputButton::Jump, false);
        let command = *output.commands.first().expect("jump press executed nothing");
        self.until_landed(terrain);
        command
    }

    fn states(&self) -> Vec<LocomotionState> {
        self.states.lock().unwrap().clone()
    }
}

// ==================== Landings ====================

#[test]
fn long_fall_lands_hard() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::new(0.0, 10.0, 0.0));

    h.until_landed(&ground);

    let states = h.states();
    assert!(states.contains(&LocomotionState::Falling));
    assert!(states.contains(&LocomotionState::HardLanding));
    assert!(!states.contains(&LocomotionState::Landing));
}

#[test]
fn short_fall_lands_softly() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::new(0.0, 4.0, 0.0));

    h.until_landed(&ground);

    let states = h.states();
    assert!(states.contains(&LocomotionState::Landing));
    assert!(!states.contains(&LocomotionState::HardLanding));
}

#[test]
fn one_landing_state_per_touchdown() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::new(0.0, 2.0, 0.0));

    h.until_landed(&ground);
    h.run(&ground, 60);

    let landings = h
        .states()
        .iter()
        .filter(|s| matches!(s, LocomotionState::Landing | LocomotionState::HardLanding))
        .count();
    assert_eq!(landings, 1);
    assert_eq!(h.core.state(), LocomotionState::Idle);
}

// ==================== Jump Chain ====================

#[test]
fn running_jumps_chain_up_to_the_triple() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::ZERO);
    h.intent.set_move(Vec2::Y);
    h.run(&ground, 60);

    let variants: Vec<(ActionVariant, ActionVariant)> = (0..4)
        .map(|_| {
            let command = h.jump_and_land(&ground);
            (command.variant, command.animation)
        })
        .collect();

    assert_eq!(
        variants,
        vec![
            (ActionVariant::Jump, ActionVariant::Jump),
            (ActionVariant::DoubleJump, ActionVariant::DoubleJump),
            (ActionVariant::TripleJump, ActionVariant::TripleJump),
            // Past the triple the physics is a plain jump with the triple animation.
            (ActionVariant::Jump, ActionVariant::TripleJump),
        ]
    );
}

#[test]
fn standing_jumps_do_not_chain() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::ZERO);
    h.run(&ground, 5);

    for _ in 0..3 {
        let command = h.jump_and_land(&ground);
        assert_eq!(command.variant, ActionVariant::Jump);
    }
}

#[test]
fn chain_resets_after_window() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::ZERO);
    h.intent.set_move(Vec2::Y);
    h.run(&ground, 60);

    assert_eq!(h.jump_and_land(&ground).variant, ActionVariant::Jump);
    // Wait longer than the chain window before jumping again.
    h.run(&ground, 60);
    assert_eq!(h.jump_and_land(&ground).variant, ActionVariant::Jump);
}

// ==================== Slopes ====================

#[test]
fn steep_slope_slides_after_delay() {
    let slope = PlaneTerrain::slope(Vec3::ZERO, 60.0, Vec3::X);
    let mut h = Harness::new(Vec3::ZERO);

    // 0.1s of steep contact: still pending.
    h.run(&slope, 6);
    assert!(!h.core.slide().is_active());
    assert!(h.core.slide().is_pending());

    // 0.25s: sliding downhill.
    h.run(&slope, 9);
    assert!(h.core.slide().is_active());
    h.run(&slope, 10);
    assert!(h.body.velocity.x > 0.0);
    assert!(h.states().contains(&LocomotionState::SlopeSliding));
}

#[test]
fn gentle_slope_never_slides() {
    let slope = PlaneTerrain::slope(Vec3::ZERO, 20.0, Vec3::X);
    let mut h = Harness::new(Vec3::ZERO);

    h.run(&slope, 60);
    assert!(!h.core.slide().is_active());
    assert!(!h.core.contact().steep);
}

// ==================== Momentum ====================

#[test]
fn reversing_input_fights_momentum_then_turns() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::ZERO);
    h.intent.set_move(Vec2::Y);
    h.run(&ground, 60);
    assert!(h.body.velocity.z < -3.0);

    h.intent.set_move(Vec2::NEG_Y);
    h.run(&ground, 2);
    assert!(h.core.momentum().is_fighting());
    assert!(h.states().contains(&LocomotionState::Skidding));

    h.run(&ground, 120);
    assert!(!h.core.momentum().is_fighting());
    assert!(h.body.velocity.z > 3.0);
}

#[test]
fn momentum_decays_without_input() {
    let ground = PlaneTerrain::flat(0.0);
    let mut h = Harness::new(Vec3::ZERO);
    h.intent.set_move(Vec2::Y);
    h.run(&ground, 60);

    h.intent.set_move(Vec2::ZERO);
    let mut previous = h.core.momentum().magnitude();
    for _ in 0..30 {
        h.step(&ground);
        let magnitude = h.core.momentum().magnitude();
        assert!(magnitude <= previous);
        previous = magnitude;
    }
}

// ==================== Events ====================

#[test]
fn channels_are_independent() {
    let ground = PlaneTerrain::flat(0.0);
    let mut a = Harness::new(Vec3::new(0.0, 3.0, 0.0));
    let mut b = Harness::new(Vec3::ZERO);

    a.until_landed(&ground);
    b.run(&ground, 10);

    assert!(a.states().contains(&LocomotionState::Landing));
    assert!(!b.states().contains(&LocomotionState::Landing));
}

#[test]
fn ticking_without_subscribers_is_silent() {
    let ground = PlaneTerrain::flat(0.0);
    let mut core = LocomotionCore::builder(LocomotionSettings::default())
        .events(EventChannel::new())
        .build()
        .unwrap();
    assert_eq!(core.events().subscriber_count(), 0);

    let output = core.tick(&ground, BodyState::default(), &InputSnapshot::default(), DT);
    assert!(output.grounded);
}
