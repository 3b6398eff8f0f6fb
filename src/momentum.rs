//! Momentum blending.
//!
//! Momentum is a horizontal velocity that outlives the input that created
//! it. Sources (locomotion, jumps, slides, ground pounds) feed it through
//! [`MomentumBlender::add`] and [`MomentumBlender::set`]; every tick
//! [`MomentumBlender::update`] decays it depending on how the current input
//! relates to it. Input opposing the momentum "fights" it with a force that
//! ramps up over time.
//!
//! Vertical motion belongs to the body, so momentum is kept on the ground
//! plane.

use bevy::prelude::*;

use crate::config::MomentumSettings;

/// Alignment below this counts as opposing input.
const OPPOSING: f32 = -0.3;
/// Alignment above this counts as aligned input.
const ALIGNED: f32 = 0.3;

/// Origin of a momentum contribution.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MomentumSource {
    Locomotion,
    Jump,
    Slide,
    GroundPound,
}

/// How the current input relates to the momentum direction.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputRelation {
    #[default]
    None,
    Aligned,
    Perpendicular,
    Opposing,
}

/// Momentum state owned by the [`MomentumBlender`].
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Default)]
pub struct MomentumVector {
    pub value: Vec3,
    pub magnitude: f32,
    /// Source of the last contribution.
    pub last_source: Option<MomentumSource>,
    pub relation: InputRelation,
    /// Input is opposing the momentum.
    pub fighting: bool,
    /// Fight force ramp in [0, 1].
    pub fight_progress: f32,
    /// Time since the current fight began.
    pub fight_time: f32,
}

/// Owns and updates a character's momentum.
#[derive(Debug, Clone)]
pub struct MomentumBlender {
    settings: MomentumSettings,
    vector: MomentumVector,
}

fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

impl MomentumBlender {
    pub fn new(settings: MomentumSettings) -> Self {
        Self {
            settings,
            vector: MomentumVector::default(),
        }
    }

    /// Read-only view of the momentum state.
    pub fn vector(&self) -> &MomentumVector {
        &self.vector
    }

    pub fn value(&self) -> Vec3 {
        self.vector.value
    }

    pub fn magnitude(&self) -> f32 {
        self.vector.magnitude
    }

    pub fn is_fighting(&self) -> bool {
        self.vector.fighting
    }

    /// Add a weighted contribution, then clamp.
    pub fn add(&mut self, velocity: Vec3, source: MomentumSource) {
        let weight = self.settings.weights.weight(source);
        self.vector.value += flatten(velocity) * weight;
        self.vector.last_source = Some(source);
        self.clamp();
    }

    /// Overwrite with a weighted contribution, then clamp.
    pub fn set(&mut self, velocity: Vec3, source: MomentumSource) {
        let weight = self.settings.weights.weight(source);
        self.vector.value = flatten(velocity) * weight;
        self.vector.last_source = Some(source);
        self.clear_fight();
        self.clamp();
    }

    /// Zero everything.
    pub fn clear(&mut self) {
        self.vector = MomentumVector::default();
    }

    /// Remove `factor` (0..=1) of the current momentum.
    pub fn reduce(&mut self, factor: f32) {
        self.vector.value *= (1.0 - factor).clamp(0.0, 1.0);
        self.clamp();
    }

    /// Blend an input velocity with momentum on the ground plane.
    ///
    /// `blend` 0 returns the input unchanged, 1 returns pure momentum. The
    /// vertical component of `input_velocity` is kept.
    pub fn combine(&self, input_velocity: Vec3, blend: f32) -> Vec3 {
        let blend = blend.clamp(0.0, 1.0);
        let horizontal = flatten(input_velocity).lerp(self.vector.value, blend);
        horizontal + Vec3::Y * input_velocity.y
    }

    /// Classify input against the current momentum.
    pub fn relation_to(&self, input_direction: Vec3) -> InputRelation {
        let input = flatten(input_direction).normalize_or_zero();
        if input == Vec3::ZERO {
            return InputRelation::None;
        }
        // No momentum yet: any input builds it.
        if self.vector.magnitude < self.settings.epsilon {
            return InputRelation::Aligned;
        }
        let alignment = input.dot(self.vector.value / self.vector.magnitude);
        if alignment < OPPOSING {
            InputRelation::Opposing
        } else if alignment > ALIGNED {
            InputRelation::Aligned
        } else {
            InputRelation::Perpendicular
        }
    }

    /// Per-tick decay and fight step.
    pub fn update(&mut self, input_direction: Vec3, input_speed: f32, grounded: bool, dt: f32) {
        let s = &self.settings;
        let scale = if grounded { 1.0 } else { s.air_decay_scale };
        let relation = if input_speed > 0.0 {
            self.relation_to(input_direction)
        } else {
            InputRelation::None
        };
        let input_velocity = flatten(input_direction).normalize_or_zero() * input_speed;

        let rate = match relation {
            InputRelation::None => s.base_decay,
            InputRelation::Aligned => s.aligned_decay,
            InputRelation::Perpendicular => s.perpendicular_decay,
            InputRelation::Opposing => s.opposing_decay,
        };

        if relation == InputRelation::Opposing {
            self.vector.fight_time += dt;
            self.vector.fight_progress = (self.vector.fight_time / s.fight_ramp_time).min(1.0);
            self.vector.fighting = true;
        } else {
            self.vector.fighting = false;
            self.vector.fight_progress = 0.0;
            self.vector.fight_time = 0.0;
        }

        let mut value = self.vector.value * (-rate * scale * dt).exp();

        if self.vector.fighting {
            let magnitude = value.length();
            let braking = s.fight_force * self.vector.fight_progress * dt;
            value = value.normalize_or_zero() * (magnitude - braking).max(0.0);
        }

        if relation == InputRelation::Aligned && input_speed > 0.5 * self.vector.magnitude {
            let drift = 1.0 - (-s.align_rate * dt).exp();
            value = value.lerp(input_velocity, drift);
        }

        self.vector.value = value;
        self.vector.relation = relation;
        self.clamp();

        trace!(
            magnitude = self.vector.magnitude,
            fighting = self.vector.fighting,
            progress = self.vector.fight_progress,
            "momentum update"
        );
    }

    fn clear_fight(&mut self) {
        self.vector.fighting = false;
        self.vector.fight_progress = 0.0;
        self.vector.fight_time = 0.0;
    }

    fn clamp(&mut self) {
        let value = self.vector.value.clamp_length_max(self.settings.max_magnitude);
        let magnitude = value.length();
        if magnitude < self.settings.epsilon {
            self.vector.value = Vec3::ZERO;
            self.vector.magnitude = 0.0;
            self.clear_fight();
        } else {
            self.vector.value = value;
            self.vector.magnitude = magnitude;
        }
    }
}
