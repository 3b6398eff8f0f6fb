//! Ledge detection.
//!
//! While falling, the detector looks for a wall in front of the character's
//! chest with open space above it and a walkable top surface. Finding all
//! three grabs the ledge. From the hang the character can climb (jump) or let
//! go (crouch); letting go starts a short cooldown so the same ledge is not
//! re-grabbed on the next tick.

use bevy::prelude::*;

use crate::config::LedgeSettings;
use crate::events::{EventChannel, StateEvent};
use crate::ground::slope_angle;
use crate::sensor::TerrainSensor;

/// Distance past the wall face at which the top probe descends.
const TOP_PROBE_INSET: f32 = 0.1;

#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgePhase {
    #[default]
    None,
    Hanging,
    Climbing,
}

/// A ledge found by the probes.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct LedgeHit {
    /// Point on the walkable top surface, just past the edge.
    pub top: Vec3,
    /// Wall normal, pointing back at the character.
    pub wall_normal: Vec3,
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct LedgeState {
    pub phase: LedgePhase,
    pub ledge: Option<LedgeHit>,
    pub phase_started_at: f32,
    pub cooldown_until: f32,
}

impl Default for LedgeState {
    fn default() -> Self {
        Self {
            phase: LedgePhase::None,
            ledge: None,
            phase_started_at: 0.0,
            cooldown_until: f32::NEG_INFINITY,
        }
    }
}

/// Finds and tracks ledge grabs.
#[derive(Debug, Clone)]
pub struct LedgeDetector {
    settings: LedgeSettings,
    walkable_angle: f32,
    layer_mask: u32,
    state: LedgeState,
}

impl LedgeDetector {
    pub fn new(settings: LedgeSettings, walkable_angle: f32, layer_mask: u32) -> Self {
        Self {
            settings,
            walkable_angle,
            layer_mask,
            state: LedgeState::default(),
        }
    }

    pub fn state(&self) -> &LedgeState {
        &self.state
    }

    pub fn is_hanging(&self) -> bool {
        self.state.phase == LedgePhase::Hanging
    }

    pub fn is_climbing(&self) -> bool {
        self.state.phase == LedgePhase::Climbing
    }

    /// Run the three ledge probes from the feet `position` looking along `facing`.
    pub fn probe(&self, sensor: &dyn TerrainSensor, position: Vec3, facing: Vec3) -> Option<LedgeHit> {
        let s = &self.settings;
        let forward = Vec3::new(facing.x, 0.0, facing.z).try_normalize()?;

        let chest = position + Vec3::Y * (s.grab_height - s.search_height);
        let wall = sensor.probe(chest, forward, s.reach, self.layer_mask)?;
        // Only near-vertical faces count as walls.
        if wall.normal.y.abs() > 0.5 {
            return None;
        }

        let above = position + Vec3::Y * (s.grab_height + s.search_height);
        if sensor.probe(above, forward, s.reach, self.layer_mask).is_some() {
            return None;
        }

        let over_top = above + forward * (wall.distance + TOP_PROBE_INSET);
        let top = sensor.probe(over_top, Vec3::NEG_Y, 2.0 * s.search_height, self.layer_mask)?;
        if slope_angle(top.normal) > self.walkable_angle {
            return None;
        }

        Some(LedgeHit {
            top: top.point,
            wall_normal: wall.normal,
        })
    }

    /// Look for a ledge while falling and finish climbs.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        sensor: &dyn TerrainSensor,
        position: Vec3,
        facing: Vec3,
        vertical_velocity: f32,
        grounded: bool,
        can_grab: bool,
        now: f32,
        events: &EventChannel,
    ) -> &LedgeState {
        match self.state.phase {
            LedgePhase::Climbing => {
                if now - self.state.phase_started_at >= self.settings.climb_duration {
                    self.set_phase(LedgePhase::None, now);
                    self.state.ledge = None;
                }
            }
            LedgePhase::Hanging => {}
            LedgePhase::None => {
                let searching = self.settings.enabled
                    && can_grab
                    && !grounded
                    && vertical_velocity <= 0.0
                    && now >= self.state.cooldown_until;
                if searching {
                    if let Some(hit) = self.probe(sensor, position, facing) {
                        self.state.ledge = Some(hit);
                        self.set_phase(LedgePhase::Hanging, now);
                        debug!(top = ?hit.top, "ledge grabbed");
                        events.publish_state(StateEvent::LedgeGrabChanged { grabbing: true });
                    }
                }
            }
        }
        &self.state
    }

    /// Start climbing from the hang. Does nothing unless hanging.
    pub fn climb(&mut self, now: f32, events: &EventChannel) -> bool {
        if !self.is_hanging() {
            return false;
        }
        self.set_phase(LedgePhase::Climbing, now);
        debug!("ledge climb started");
        events.publish_state(StateEvent::LedgeGrabChanged { grabbing: false });
        true
    }

    /// Let go of the ledge. Does nothing unless hanging.
    pub fn release(&mut self, now: f32, events: &EventChannel) -> bool {
        if !self.is_hanging() {
            return false;
        }
        self.set_phase(LedgePhase::None, now);
        self.state.ledge = None;
        self.state.cooldown_until = now + self.settings.regrab_cooldown;
        debug!("ledge released");
        events.publish_state(StateEvent::LedgeGrabChanged { grabbing: false });
        true
    }

    /// Velocity that carries the character up and over the ledge.
    pub fn climb_velocity(&self, position: Vec3, climb_speed: f32) -> Vec3 {
        match (self.state.phase, self.state.ledge) {
            (LedgePhase::Climbing, Some(ledge)) if position.y < ledge.top.y => Vec3::Y * climb_speed,
            (LedgePhase::Climbing, Some(ledge)) => {
                let forward = Vec3::new(-ledge.wall_normal.x, 0.0, -ledge.wall_normal.z).normalize_or_zero();
                forward * self.settings.climb_forward_speed
            }
            _ => Vec3::ZERO,
        }
    }

    fn set_phase(&mut self, phase: LedgePhase, now: f32) {
        self.state.phase = phase;
        self.state.phase_started_at = now;
    }
}
