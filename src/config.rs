//! Locomotion settings.
//!
//! All tuning lives here: probe layout, momentum decay rates, slide timing,
//! jump windows and forces, state durations. A [`LocomotionSettings`] value is
//! handed to the core when a character is built and is never mutated
//! afterwards; as a component, changing it rebuilds the character. Settings
//! can be written in code (presets plus `with_*` builders) or loaded from RON.
//!
//! Units are meters, seconds and degrees unless a field says otherwise.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::momentum::MomentumSource;

/// Complete tuning for one character.
#[derive(Component, Reflect, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[reflect(Component)]
#[serde(default)]
pub struct LocomotionSettings {
    pub ground: GroundSettings,
    pub ledge: LedgeSettings,
    pub momentum: MomentumSettings,
    pub slide: SlideSettings,
    pub jump: JumpSettings,
    pub states: StateSettings,
    pub animation: AnimationSettings,
}

/// Ground probing and slope classification.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GroundSettings {
    /// Number of offset probes placed on a ring around the center probe.
    pub probe_count: usize,
    /// Radius of the probe ring (roughly the character's footprint).
    pub probe_radius: f32,
    /// Height above the feet where probes start.
    pub probe_height: f32,
    /// Maximum gap between feet and surface that still counts as contact.
    pub ground_distance: f32,
    /// Steepest walkable slope (degrees from up).
    pub walkable_angle: f32,
    /// Exponential smoothing rate for the surface normal (1/s).
    pub normal_smoothing: f32,
    /// Grace period after losing contact during which the character still
    /// counts as grounded.
    pub coyote_time: f32,
    /// Slope change (degrees) required before a slope-changed event is emitted.
    pub slope_hysteresis: f32,
    /// Collision layers the probes may hit.
    pub layer_mask: u32,
    /// Downward speed applied along the surface normal while grounded.
    pub stick_speed: f32,
    /// After a jump, contacts are ignored for this long so the launch tick
    /// does not re-ground the character.
    pub detach_time: f32,
}

impl Default for GroundSettings {
    fn default() -> Self {
        Self {
            probe_count: 4,
            probe_radius: 0.3,
            probe_height: 0.5,
            ground_distance: 0.2,
            walkable_angle: 45.0,
            normal_smoothing: 15.0,
            coyote_time: 0.1,
            slope_hysteresis: 2.0,
            layer_mask: u32::MAX,
            stick_speed: 2.0,
            detach_time: 0.1,
        }
    }
}

/// Ledge detection and climbing.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LedgeSettings {
    /// Whether airborne characters look for ledges at all.
    pub enabled: bool,
    /// Forward reach of the wall probe.
    pub reach: f32,
    /// Height above the feet of the hands (wall probe height).
    pub grab_height: f32,
    /// Vertical tolerance around `grab_height` when searching for the ledge top.
    pub search_height: f32,
    /// Time a ledge climb takes.
    pub climb_duration: f32,
    /// Forward speed at the end of a climb.
    pub climb_forward_speed: f32,
    /// Time after releasing a ledge before another grab is allowed.
    pub regrab_cooldown: f32,
}

impl Default for LedgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reach: 0.6,
            grab_height: 1.6,
            search_height: 0.4,
            climb_duration: 0.5,
            climb_forward_speed: 2.0,
            regrab_cooldown: 0.3,
        }
    }
}

/// Relative weight applied to momentum contributions of each source.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SourceWeights {
    pub locomotion: f32,
    pub jump: f32,
    pub slide: f32,
    pub ground_pound: f32,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            locomotion: 1.0,
            jump: 1.0,
            slide: 0.8,
            ground_pound: 1.0,
        }
    }
}

impl SourceWeights {
    /// Weight for one source.
    pub fn weight(&self, source: MomentumSource) -> f32 {
        match source {
            MomentumSource::Locomotion => self.locomotion,
            MomentumSource::Jump => self.jump,
            MomentumSource::Slide => self.slide,
            MomentumSource::GroundPound => self.ground_pound,
        }
    }
}

/// Momentum decay and fighting.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MomentumSettings {
    /// Hard cap on momentum magnitude.
    pub max_magnitude: f32,
    /// Decay rate with no input (1/s).
    pub base_decay: f32,
    /// Decay rate while input is aligned with momentum.
    pub aligned_decay: f32,
    /// Decay rate while input is roughly perpendicular.
    pub perpendicular_decay: f32,
    /// Decay rate while input opposes momentum.
    pub opposing_decay: f32,
    /// Deceleration (m/s²) of the fight force once fully ramped.
    pub fight_force: f32,
    /// Time for the fight force to ramp from zero to full strength.
    pub fight_ramp_time: f32,
    /// Rate (1/s) at which aligned momentum drifts toward the input velocity.
    pub align_rate: f32,
    /// Multiplier on decay rates while airborne.
    pub air_decay_scale: f32,
    /// Magnitude under which momentum snaps to zero.
    pub epsilon: f32,
    /// Share of momentum in the combined ground velocity (0 = input only).
    pub ground_blend: f32,
    /// Share of momentum in the combined air velocity.
    pub air_blend: f32,
    /// Per-source weights.
    pub weights: SourceWeights,
}

impl Default for MomentumSettings {
    fn default() -> Self {
        Self {
            max_magnitude: 20.0,
            base_decay: 2.0,
            aligned_decay: 0.5,
            perpendicular_decay: 3.0,
            opposing_decay: 6.0,
            fight_force: 30.0,
            fight_ramp_time: 0.25,
            align_rate: 4.0,
            air_decay_scale: 0.5,
            epsilon: 0.05,
            ground_blend: 0.5,
            air_blend: 0.85,
            weights: SourceWeights::default(),
        }
    }
}

/// Slope sliding.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SlideSettings {
    /// Sustained steep contact required before sliding starts.
    pub activation_delay: f32,
    /// Time for slide influence to ramp from 0 to 1.
    pub ramp_time: f32,
    /// Downhill acceleration, scaled by the sine of the slope angle.
    pub acceleration: f32,
    /// Constant deceleration opposing the slide.
    pub friction: f32,
    /// Speed the slide starts with.
    pub initial_speed: f32,
    /// Maximum slide speed.
    pub max_speed: f32,
    /// Slides slower than this stop.
    pub min_speed: f32,
    /// Fraction of lateral input kept while sliding.
    pub control_factor: f32,
    /// Input more than this many degrees away from the slide direction cancels it.
    pub cancel_angle: f32,
    /// How long carried-over slide momentum lasts on walkable ground.
    pub carryover_time: f32,
    /// Weight of the multi-probe direction when several probes are steep.
    pub multi_contact_blend: f32,
}

impl Default for SlideSettings {
    fn default() -> Self {
        Self {
            activation_delay: 0.15,
            ramp_time: 0.3,
            acceleration: 20.0,
            friction: 2.0,
            initial_speed: 2.0,
            max_speed: 15.0,
            min_speed: 0.5,
            control_factor: 0.3,
            cancel_angle: 135.0,
            carryover_time: 0.4,
            multi_contact_blend: 0.5,
        }
    }
}

/// Jump and action chain.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct JumpSettings {
    /// Minimum time between two executed actions.
    pub min_jump_interval: f32,
    /// How long an unusable airborne jump press is remembered.
    pub jump_buffer_time: f32,
    /// Max time since landing for a jump to continue the chain.
    pub chain_window: f32,
    /// Minimum horizontal speed to continue the chain.
    pub chain_speed_threshold: f32,
    /// Launch speed of the first jump.
    pub single_jump_speed: f32,
    /// Launch speed of the second chained jump.
    pub double_jump_speed: f32,
    /// Launch speed of the third chained jump.
    pub triple_jump_speed: f32,
    /// Crouch hold time before crouch-jumps become available.
    pub crouch_hold_delay: f32,
    /// Horizontal speed above which a crouch-jump becomes a long jump.
    pub long_jump_speed_threshold: f32,
    pub long_jump_vertical: f32,
    pub long_jump_forward: f32,
    pub backflip_vertical: f32,
    pub backflip_backward: f32,
    /// Launch speed along the surface normal for slope jumps.
    pub slope_jump_speed: f32,
    /// Time after a ground-pound landing during which jump becomes a
    /// ground-pound jump.
    pub ground_pound_jump_window: f32,
    pub ground_pound_jump_speed: f32,
    /// Suspension before the ground-pound force is applied.
    pub ground_pound_hang_time: f32,
    /// Downward speed of the ground pound.
    pub ground_pound_speed: f32,
    /// Time after ground-pound start during which action cancels into a dive.
    pub dive_cancel_window: f32,
    /// Minimum horizontal speed for an air dive.
    pub dive_min_speed: f32,
    pub dive_forward: f32,
    pub dive_vertical: f32,
    /// Minimum horizontal speed for a ground dive.
    pub ground_dive_speed_threshold: f32,
    pub ground_dive_forward: f32,
    pub ground_dive_vertical: f32,
    /// Vertical speed of a ledge climb.
    pub ledge_climb_speed: f32,
}

impl Default for JumpSettings {
    fn default() -> Self {
        Self {
            min_jump_interval: 0.1,
            jump_buffer_time: 0.1,
            chain_window: 0.5,
            chain_speed_threshold: 3.0,
            single_jump_speed: 8.0,
            double_jump_speed: 10.0,
            triple_jump_speed: 13.0,
            crouch_hold_delay: 0.1,
            long_jump_speed_threshold: 5.0,
            long_jump_vertical: 6.0,
            long_jump_forward: 12.0,
            backflip_vertical: 14.0,
            backflip_backward: 3.0,
            slope_jump_speed: 9.0,
            ground_pound_jump_window: 0.25,
            ground_pound_jump_speed: 15.0,
            ground_pound_hang_time: 0.3,
            ground_pound_speed: 25.0,
            dive_cancel_window: 0.2,
            dive_min_speed: 2.0,
            dive_forward: 10.0,
            dive_vertical: 3.0,
            ground_dive_speed_threshold: 6.0,
            ground_dive_forward: 10.0,
            ground_dive_vertical: 4.0,
            ledge_climb_speed: 4.0,
        }
    }
}

/// Locomotion speeds, speed bands and state durations.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StateSettings {
    /// Target speed for light stick input.
    pub walk_speed: f32,
    /// Target speed for full stick input.
    pub run_speed: f32,
    /// Target speed while sprint is held.
    pub sprint_speed: f32,
    /// Target speed while crouching.
    pub crouch_speed: f32,
    /// Stick magnitude at which walking becomes running.
    pub run_input_threshold: f32,
    /// Below this speed the character is idle.
    pub idle_threshold: f32,
    /// At or above this speed the character is running.
    pub running_threshold: f32,
    /// At or above this speed the character is sprinting.
    pub sprinting_threshold: f32,
    pub landing_duration: f32,
    pub hard_landing_duration: f32,
    pub ground_pound_land_duration: f32,
    /// Fall distance at or above which a landing is hard.
    pub hard_landing_distance: f32,
    /// Protection for freshly entered jump states.
    pub jump_grace: f32,
    /// Vertical velocity under which a normal jump turns into a fall.
    pub falling_velocity_threshold: f32,
    /// Minimum time in a normal jump state before falling is allowed.
    pub min_jump_time: f32,
    /// Minimum speed for a momentum fight to read as a skid.
    pub skid_min_speed: f32,
    pub skid_turn_duration: f32,
    /// Wind-up time of the ground pound before hang time shows.
    pub ground_pound_start_duration: f32,
    /// Minimum duration of a ground dive belly slide.
    pub ground_dive_min_duration: f32,
    /// Ground dives slower than this end.
    pub ground_dive_end_speed: f32,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            walk_speed: 3.0,
            run_speed: 6.0,
            sprint_speed: 9.0,
            crouch_speed: 2.0,
            run_input_threshold: 0.5,
            idle_threshold: 0.1,
            running_threshold: 4.0,
            sprinting_threshold: 7.5,
            landing_duration: 0.1,
            hard_landing_duration: 0.5,
            ground_pound_land_duration: 0.3,
            hard_landing_distance: 5.0,
            jump_grace: 0.1,
            falling_velocity_threshold: -1.0,
            min_jump_time: 0.2,
            skid_min_speed: 3.0,
            skid_turn_duration: 0.25,
            ground_pound_start_duration: 0.15,
            ground_dive_min_duration: 0.3,
            ground_dive_end_speed: 1.0,
        }
    }
}

/// Normalization for the animation snapshot.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnimationSettings {
    /// Vertical speed mapped to ±1.
    pub max_vertical_speed: f32,
    /// Speed above which the character counts as moving.
    pub moving_threshold: f32,
    /// Input-vs-facing angle (degrees) above which a turn is sharp.
    pub sharp_turn_angle: f32,
    /// Input-vs-facing angle (degrees) above which a turn is gentle.
    pub gentle_turn_angle: f32,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            max_vertical_speed: 20.0,
            moving_threshold: 0.1,
            sharp_turn_angle: 90.0,
            gentle_turn_angle: 20.0,
        }
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(field, format!("must be finite and >= 0, got {value}")));
    }
    Ok(())
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(field, format!("must be finite and > 0, got {value}")));
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(field, format!("must be within [0, 1], got {value}")));
    }
    Ok(())
}

impl LocomotionSettings {
    /// Snappier tuning for a player-controlled character.
    pub fn player() -> Self {
        let mut settings = Self::default();
        settings.ground.coyote_time = 0.12;
        settings.jump.jump_buffer_time = 0.15;
        settings.momentum.fight_ramp_time = 0.2;
        settings.states.run_speed = 7.0;
        settings.states.sprint_speed = 10.0;
        settings
    }

    /// Parse settings from RON text and validate them.
    ///
    /// Missing fields keep their default values.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = ron::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a RON file and validate them.
    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Check every value the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.ground;
        if g.probe_count == 0 {
            return Err(ConfigError::invalid("ground.probe_count", "at least one offset probe is required"));
        }
        non_negative("ground.probe_radius", g.probe_radius)?;
        positive("ground.probe_height", g.probe_height)?;
        non_negative("ground.ground_distance", g.ground_distance)?;
        if !(g.walkable_angle > 0.0 && g.walkable_angle < 90.0) {
            return Err(ConfigError::invalid(
                "ground.walkable_angle",
                format!("must be within (0, 90) degrees, got {}", g.walkable_angle),
            ));
        }
        non_negative("ground.normal_smoothing", g.normal_smoothing)?;
        non_negative("ground.coyote_time", g.coyote_time)?;
        non_negative("ground.slope_hysteresis", g.slope_hysteresis)?;
        non_negative("ground.stick_speed", g.stick_speed)?;
        non_negative("ground.detach_time", g.detach_time)?;

        let l = &self.ledge;
        positive("ledge.reach", l.reach)?;
        positive("ledge.grab_height", l.grab_height)?;
        positive("ledge.search_height", l.search_height)?;
        positive("ledge.climb_duration", l.climb_duration)?;
        non_negative("ledge.climb_forward_speed", l.climb_forward_speed)?;
        non_negative("ledge.regrab_cooldown", l.regrab_cooldown)?;

        let m = &self.momentum;
        positive("momentum.max_magnitude", m.max_magnitude)?;
        non_negative("momentum.base_decay", m.base_decay)?;
        non_negative("momentum.aligned_decay", m.aligned_decay)?;
        non_negative("momentum.perpendicular_decay", m.perpendicular_decay)?;
        non_negative("momentum.opposing_decay", m.opposing_decay)?;
        non_negative("momentum.fight_force", m.fight_force)?;
        positive("momentum.fight_ramp_time", m.fight_ramp_time)?;
        non_negative("momentum.align_rate", m.align_rate)?;
        unit_interval("momentum.air_decay_scale", m.air_decay_scale)?;
        non_negative("momentum.epsilon", m.epsilon)?;
        unit_interval("momentum.ground_blend", m.ground_blend)?;
        unit_interval("momentum.air_blend", m.air_blend)?;
        for (field, weight) in [
            ("momentum.weights.locomotion", m.weights.locomotion),
            ("momentum.weights.jump", m.weights.jump),
            ("momentum.weights.slide", m.weights.slide),
            ("momentum.weights.ground_pound", m.weights.ground_pound),
        ] {
            non_negative(field, weight)?;
        }

        let s = &self.slide;
        non_negative("slide.activation_delay", s.activation_delay)?;
        positive("slide.ramp_time", s.ramp_time)?;
        non_negative("slide.acceleration", s.acceleration)?;
        non_negative("slide.friction", s.friction)?;
        non_negative("slide.initial_speed", s.initial_speed)?;
        positive("slide.max_speed", s.max_speed)?;
        non_negative("slide.min_speed", s.min_speed)?;
        unit_interval("slide.control_factor", s.control_factor)?;
        if !(0.0..=180.0).contains(&s.cancel_angle) {
            return Err(ConfigError::invalid("slide.cancel_angle", "must be within [0, 180] degrees"));
        }
        non_negative("slide.carryover_time", s.carryover_time)?;
        unit_interval("slide.multi_contact_blend", s.multi_contact_blend)?;

        let j = &self.jump;
        for (field, value) in [
            ("jump.min_jump_interval", j.min_jump_interval),
            ("jump.jump_buffer_time", j.jump_buffer_time),
            ("jump.chain_window", j.chain_window),
            ("jump.chain_speed_threshold", j.chain_speed_threshold),
            ("jump.crouch_hold_delay", j.crouch_hold_delay),
            ("jump.long_jump_speed_threshold", j.long_jump_speed_threshold),
            ("jump.ground_pound_jump_window", j.ground_pound_jump_window),
            ("jump.ground_pound_hang_time", j.ground_pound_hang_time),
            ("jump.dive_cancel_window", j.dive_cancel_window),
            ("jump.dive_min_speed", j.dive_min_speed),
            ("jump.ground_dive_speed_threshold", j.ground_dive_speed_threshold),
        ] {
            non_negative(field, value)?;
        }
        for (field, value) in [
            ("jump.single_jump_speed", j.single_jump_speed),
            ("jump.double_jump_speed", j.double_jump_speed),
            ("jump.triple_jump_speed", j.triple_jump_speed),
            ("jump.ground_pound_speed", j.ground_pound_speed),
            ("jump.ledge_climb_speed", j.ledge_climb_speed),
        ] {
            positive(field, value)?;
        }

        let st = &self.states;
        for (field, value) in [
            ("states.walk_speed", st.walk_speed),
            ("states.run_speed", st.run_speed),
            ("states.sprint_speed", st.sprint_speed),
            ("states.crouch_speed", st.crouch_speed),
        ] {
            positive(field, value)?;
        }
        unit_interval("states.run_input_threshold", st.run_input_threshold)?;
        non_negative("states.idle_threshold", st.idle_threshold)?;
        if !(st.idle_threshold < st.running_threshold
            && st.running_threshold < st.sprinting_threshold)
        {
            return Err(ConfigError::invalid(
                "states.running_threshold",
                "speed bands must ascend: idle < running < sprinting",
            ));
        }
        for (field, value) in [
            ("states.landing_duration", st.landing_duration),
            ("states.hard_landing_duration", st.hard_landing_duration),
            ("states.ground_pound_land_duration", st.ground_pound_land_duration),
            ("states.hard_landing_distance", st.hard_landing_distance),
            ("states.jump_grace", st.jump_grace),
            ("states.min_jump_time", st.min_jump_time),
            ("states.skid_min_speed", st.skid_min_speed),
            ("states.skid_turn_duration", st.skid_turn_duration),
            ("states.ground_pound_start_duration", st.ground_pound_start_duration),
            ("states.ground_dive_min_duration", st.ground_dive_min_duration),
            ("states.ground_dive_end_speed", st.ground_dive_end_speed),
        ] {
            non_negative(field, value)?;
        }
        if !st.falling_velocity_threshold.is_finite() {
            return Err(ConfigError::invalid("states.falling_velocity_threshold", "must be finite"));
        }

        let a = &self.animation;
        positive("animation.max_vertical_speed", a.max_vertical_speed)?;
        non_negative("animation.moving_threshold", a.moving_threshold)?;
        non_negative("animation.gentle_turn_angle", a.gentle_turn_angle)?;
        if a.sharp_turn_angle < a.gentle_turn_angle {
            return Err(ConfigError::invalid(
                "animation.sharp_turn_angle",
                "must not be smaller than gentle_turn_angle",
            ));
        }

        Ok(())
    }

    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.ground.coyote_time = time;
        self
    }

    /// Builder: set the steepest walkable slope (degrees).
    pub fn with_walkable_angle(mut self, degrees: f32) -> Self {
        self.ground.walkable_angle = degrees;
        self
    }

    /// Builder: set the jump chain window and speed threshold.
    pub fn with_chain(mut self, window: f32, speed_threshold: f32) -> Self {
        self.jump.chain_window = window;
        self.jump.chain_speed_threshold = speed_threshold;
        self
    }

    /// Builder: set walk, run and sprint target speeds.
    pub fn with_speeds(mut self, walk: f32, run: f32, sprint: f32) -> Self {
        self.states.walk_speed = walk;
        self.states.run_speed = run;
        self.states.sprint_speed = sprint;
        self
    }

    /// Builder: set the slide activation delay.
    pub fn with_slide_delay(mut self, delay: f32) -> Self {
        self.slide.activation_delay = delay;
        self
    }

    /// Builder: set the momentum cap.
    pub fn with_max_momentum(mut self, magnitude: f32) -> Self {
        self.momentum.max_magnitude = magnitude;
        self
    }

    /// Builder: set the ground-pound hang time.
    pub fn with_hang_time(mut self, time: f32) -> Self {
        self.jump.ground_pound_hang_time = time;
        self
    }

    /// Builder: disable ledge grabbing.
    pub fn without_ledges(mut self) -> Self {
        self.ledge.enabled = false;
        self
    }
}
