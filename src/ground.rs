//! Ground and slope analysis.
//!
//! Each tick the [`GroundAnalyzer`] casts one probe straight down from under
//! the character's center plus a ring of offset probes spanning its footprint.
//! Normals of all hits are averaged, then smoothed over time so uneven
//! geometry does not jitter the slope angle from tick to tick.
//!
//! "Grounded" includes coyote time: after the last real contact the character
//! keeps counting as grounded for a short grace window, unless a jump consumed
//! it.

use std::f32::consts::TAU;

use bevy::prelude::*;

use crate::config::GroundSettings;
use crate::events::{EventChannel, StateEvent};
use crate::sensor::{ProbeHit, SurfaceTag, TerrainSensor};

/// Ground contact for the current tick.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Real contact this tick, or within coyote time.
    pub grounded: bool,
    /// At least one probe hit this tick.
    pub touching: bool,
    /// Average normal of this tick's hits.
    pub normal: Vec3,
    /// Time-smoothed normal. Angle and steepness derive from this.
    pub smoothed_normal: Vec3,
    /// Angle between the smoothed normal and up, in degrees.
    pub angle: f32,
    /// The smoothed slope is steeper than the walkable angle.
    pub steep: bool,
    pub surface: SurfaceTag,
    pub object: Option<Entity>,
    /// Number of probes that hit.
    pub hit_count: usize,
    /// Number of probes whose own surface is too steep (or tagged for sliding).
    pub steep_hits: usize,
    /// Combined downhill direction of the steep hits (zero when none).
    pub steep_direction: Vec3,
    /// Average height of the hit points.
    pub height: f32,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            grounded: false,
            touching: false,
            normal: Vec3::Y,
            smoothed_normal: Vec3::Y,
            angle: 0.0,
            steep: false,
            surface: SurfaceTag::Default,
            object: None,
            hit_count: 0,
            steep_hits: 0,
            steep_direction: Vec3::ZERO,
            height: 0.0,
        }
    }
}

impl Contact {
    /// Downhill direction along the smoothed surface (zero on flat ground).
    pub fn downhill(&self) -> Vec3 {
        downhill(self.smoothed_normal)
    }

    /// Project `vector` onto the contact plane.
    pub fn project(&self, vector: Vec3) -> Vec3 {
        vector.reject_from_normalized(self.smoothed_normal)
    }
}

/// Direction of steepest descent on a surface with `normal`.
pub fn downhill(normal: Vec3) -> Vec3 {
    Vec3::NEG_Y.reject_from(normal).normalize_or_zero()
}

/// Angle between `normal` and up, in degrees.
pub fn slope_angle(normal: Vec3) -> f32 {
    normal.angle_between(Vec3::Y).to_degrees()
}

/// Samples the terrain under the character and classifies contact.
#[derive(Debug, Clone)]
pub struct GroundAnalyzer {
    settings: GroundSettings,
    contact: Contact,
    previous: Contact,
    /// Clock time of the last tick with real contact.
    last_touch_time: Option<f32>,
    /// Feet height on the last tick with real contact, or the spawn height
    /// for a character that has never touched ground.
    departure_height: Option<f32>,
    /// Clock time of the last airborne→grounded transition.
    landed_at: f32,
    coyote_consumed: bool,
    detached_until: f32,
    /// Slope angle last reported through a slope-changed event.
    reported_angle: f32,
}

impl GroundAnalyzer {
    pub fn new(settings: GroundSettings) -> Self {
        Self {
            settings,
            contact: Contact::default(),
            previous: Contact::default(),
            last_touch_time: None,
            departure_height: None,
            landed_at: f32::NEG_INFINITY,
            coyote_consumed: false,
            detached_until: f32::NEG_INFINITY,
            reported_angle: 0.0,
        }
    }

    /// Current contact.
    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    /// Contact of the previous tick.
    pub fn previous(&self) -> &Contact {
        &self.previous
    }

    /// The grounded flag went from false to true this tick.
    pub fn just_landed(&self) -> bool {
        self.contact.grounded && !self.previous.grounded
    }

    /// The grounded flag went from true to false this tick.
    pub fn just_left_ground(&self) -> bool {
        !self.contact.grounded && self.previous.grounded
    }

    /// Feet height on the last tick with real contact.
    pub fn departure_height(&self) -> f32 {
        self.departure_height.unwrap_or(0.0)
    }

    /// Clock time of the most recent landing.
    pub fn landed_at(&self) -> f32 {
        self.landed_at
    }

    /// End the coyote window and ignore contacts for the detach time.
    ///
    /// Called when a jump launches so the character cannot be re-grounded by
    /// the surface it is leaving.
    pub fn consume_coyote(&mut self, now: f32) {
        self.coyote_consumed = true;
        self.detached_until = now + self.settings.detach_time;
    }

    /// Offsets of every probe relative to the feet, center first.
    pub fn probe_offsets(&self) -> impl Iterator<Item = Vec3> + '_ {
        let count = self.settings.probe_count;
        let radius = self.settings.probe_radius;
        std::iter::once(Vec3::ZERO).chain((0..count).map(move |i| {
            let angle = TAU * i as f32 / count as f32;
            Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
        }))
    }

    /// Probe the terrain under `position` (the feet) and update the contact.
    pub fn sense(
        &mut self,
        sensor: &dyn TerrainSensor,
        position: Vec3,
        now: f32,
        dt: f32,
        events: &EventChannel,
    ) -> &Contact {
        self.previous = self.contact;

        let hits: Vec<ProbeHit> = if now < self.detached_until {
            Vec::new()
        } else {
            let lift = Vec3::Y * self.settings.probe_height;
            let reach = self.settings.probe_height + self.settings.ground_distance;
            self.probe_offsets()
                .filter_map(|offset| {
                    sensor.probe(position + offset + lift, Vec3::NEG_Y, reach, self.settings.layer_mask)
                })
                .collect()
        };

        let mut contact = if hits.is_empty() {
            self.sense_airborne(now)
        } else {
            self.sense_ground(&hits, dt)
        };

        if contact.touching {
            self.last_touch_time = Some(now);
            self.departure_height = Some(position.y);
            self.coyote_consumed = false;
        } else {
            self.departure_height.get_or_insert(position.y);
        }
        if contact.grounded && !self.previous.grounded {
            self.landed_at = now;
        }
        contact.steep = contact.touching && contact.angle > self.settings.walkable_angle;
        self.contact = contact;

        trace!(
            grounded = contact.grounded,
            hits = contact.hit_count,
            angle = contact.angle,
            steep = contact.steep,
            "ground contact"
        );
        self.publish_transitions(events);
        &self.contact
    }

    fn sense_ground(&self, hits: &[ProbeHit], dt: f32) -> Contact {
        let count = hits.len();
        let average = hits.iter().map(|h| h.normal).sum::<Vec3>() / count as f32;
        let normal = average.normalize_or(Vec3::Y);

        let smoothed = if self.previous.touching {
            let blend = 1.0 - (-self.settings.normal_smoothing * dt).exp();
            self.previous
                .smoothed_normal
                .lerp(normal, blend)
                .normalize_or(normal)
        } else {
            // First contact after being airborne snaps to the measured normal.
            normal
        };

        let mut steep_hits = 0;
        let mut steep_direction = Vec3::ZERO;
        for hit in hits {
            if hit.surface == SurfaceTag::Slide
                || slope_angle(hit.normal) > self.settings.walkable_angle
            {
                steep_hits += 1;
                steep_direction += downhill(hit.normal);
            }
        }

        // Probes run center first, so the center hit (if any) decides material and object.
        let primary = hits[0];
        Contact {
            grounded: true,
            touching: true,
            normal,
            smoothed_normal: smoothed,
            angle: slope_angle(smoothed),
            steep: false,
            surface: primary.surface,
            object: primary.object,
            hit_count: count,
            steep_hits,
            steep_direction: steep_direction.normalize_or_zero(),
            height: hits.iter().map(|h| h.point.y).sum::<f32>() / count as f32,
        }
    }

    fn sense_airborne(&self, now: f32) -> Contact {
        let in_coyote = !self.coyote_consumed
            && self
                .last_touch_time
                .is_some_and(|t| now - t < self.settings.coyote_time);

        if in_coyote && self.previous.grounded {
            // Keep the last surface during the grace window.
            Contact {
                touching: false,
                hit_count: 0,
                steep_hits: 0,
                steep_direction: Vec3::ZERO,
                ..self.previous
            }
        } else {
            Contact::default()
        }
    }

    fn publish_transitions(&mut self, events: &EventChannel) {
        let (previous, current) = (self.previous, self.contact);

        if previous.grounded != current.grounded {
            events.publish_state(StateEvent::GroundedChanged {
                grounded: current.grounded,
            });
            if !current.grounded {
                events.publish_state(StateEvent::Airborne {
                    departure_height: self.departure_height(),
                });
            }
        }

        if current.touching {
            if (current.angle - self.reported_angle).abs() >= self.settings.slope_hysteresis {
                events.publish_state(StateEvent::SlopeChanged {
                    previous: self.reported_angle,
                    angle: current.angle,
                });
                self.reported_angle = current.angle;
            }
        } else if !current.grounded {
            self.reported_angle = 0.0;
        }
    }
}
