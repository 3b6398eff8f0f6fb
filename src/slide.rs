//! Slope sliding.
//!
//! A character standing on a surface steeper than the walkable angle starts
//! sliding once that contact has lasted longer than the activation delay.
//! Slide influence then ramps from 0 to 1 so the onset is smooth. While
//! sliding, only lateral input survives, scaled by the control factor.
//!
//! Leaving the slope onto walkable ground grants a short momentum carryover;
//! losing contact altogether ends the slide outright.

use bevy::prelude::*;

use crate::config::SlideSettings;
use crate::events::{EventChannel, StateEvent};
use crate::ground::Contact;
use crate::sensor::SurfaceTag;

/// Slide state owned by the [`SlopeSlideEngine`].
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct SlideState {
    pub active: bool,
    /// Steep contact has lasted longer than the activation delay.
    pub delay_elapsed: bool,
    /// Time of uninterrupted steep contact.
    pub contact_time: f32,
    /// Unit direction of the slide, along the surface.
    pub direction: Vec3,
    pub speed: f32,
    /// Onset ramp in [0, 1].
    pub influence: f32,
    /// The last slide ended on walkable ground and its momentum carries over.
    pub momentum_carryover: bool,
    /// Time left in the carryover window.
    pub carryover_remaining: f32,
}

impl Default for SlideState {
    fn default() -> Self {
        Self {
            active: false,
            delay_elapsed: false,
            contact_time: 0.0,
            direction: Vec3::ZERO,
            speed: 0.0,
            influence: 0.0,
            momentum_carryover: false,
            carryover_remaining: 0.0,
        }
    }
}

/// Detects sustained steep contact and drives the slide.
#[derive(Debug, Clone)]
pub struct SlopeSlideEngine {
    settings: SlideSettings,
    state: SlideState,
    /// Carryover velocity not yet handed to momentum.
    pending_carryover: Option<Vec3>,
    /// The slide ran out of speed; it re-arms only after leaving the slope.
    exhausted: bool,
}

impl SlopeSlideEngine {
    pub fn new(settings: SlideSettings) -> Self {
        Self {
            settings,
            state: SlideState::default(),
            pending_carryover: None,
            exhausted: false,
        }
    }

    pub fn state(&self) -> &SlideState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Steep contact is building up but the activation delay has not elapsed.
    pub fn is_pending(&self) -> bool {
        !self.state.active && self.state.contact_time > 0.0 && !self.state.delay_elapsed
    }

    /// Standing on slide-eligible ground: sliding, waiting out the delay, or
    /// held off by input.
    pub fn is_engaged(&self) -> bool {
        self.state.active || self.state.contact_time > 0.0
    }

    /// Input multiplier: 1 when not sliding, down to the control factor at
    /// full influence.
    pub fn control_multiplier(&self) -> f32 {
        if self.state.active {
            1.0 + (self.settings.control_factor - 1.0) * self.state.influence
        } else {
            1.0
        }
    }

    /// Input projected onto the plane perpendicular to the slide direction,
    /// scaled by the control factor. Input passes through unchanged when not
    /// sliding.
    pub fn lateral_input(&self, input: Vec3) -> Vec3 {
        if !self.state.active {
            return input;
        }
        let input = Vec3::new(input.x, 0.0, input.z);
        let slide = Vec3::new(self.state.direction.x, 0.0, self.state.direction.z);
        if slide.length_squared() < 1e-6 {
            return input * self.settings.control_factor;
        }
        input.reject_from(slide) * self.settings.control_factor
    }

    /// Slide velocity weighted by influence.
    pub fn velocity(&self) -> Vec3 {
        if self.state.active {
            self.state.direction * self.state.speed * self.state.influence
        } else {
            Vec3::ZERO
        }
    }

    /// Carryover velocity from a slide that just ended on walkable ground.
    /// Returns it once.
    pub fn take_carryover(&mut self) -> Option<Vec3> {
        self.pending_carryover.take()
    }

    /// Advance the slide for one tick.
    pub fn update(
        &mut self,
        contact: &Contact,
        grounded: bool,
        input_direction: Vec3,
        dt: f32,
        events: &EventChannel,
    ) -> &SlideState {
        if self.state.momentum_carryover {
            self.state.carryover_remaining -= dt;
            if self.state.carryover_remaining <= 0.0 {
                self.state.momentum_carryover = false;
                self.state.carryover_remaining = 0.0;
            }
        }

        if !grounded || !contact.touching {
            if self.state.active {
                self.stop(false, events);
            }
            self.state.contact_time = 0.0;
            self.state.delay_elapsed = false;
            self.exhausted = false;
            return &self.state;
        }

        let eligible = contact.steep || contact.surface == SurfaceTag::Slide;
        if !eligible {
            if self.state.active {
                self.stop(true, events);
            }
            self.state.contact_time = 0.0;
            self.state.delay_elapsed = false;
            self.exhausted = false;
            return &self.state;
        }

        self.state.contact_time += dt;
        if self.state.contact_time < self.settings.activation_delay {
            return &self.state;
        }
        self.state.delay_elapsed = true;

        if self.exhausted {
            return &self.state;
        }

        let direction = self.slide_direction(contact);
        if direction == Vec3::ZERO {
            return &self.state;
        }

        // Input held against the slide keeps it disarmed; the delay stays
        // elapsed so the slide starts as soon as the input lets go.
        if opposes(input_direction, direction, self.settings.cancel_angle) {
            if self.state.active {
                self.stop(false, events);
            }
            return &self.state;
        }

        if !self.state.active {
            self.state.active = true;
            self.state.speed = self.settings.initial_speed;
            self.state.influence = 0.0;
            self.state.momentum_carryover = false;
            self.state.carryover_remaining = 0.0;
            debug!(angle = contact.angle, "slope slide started");
            events.publish_state(StateEvent::SlideStateChanged { active: true });
        }
        self.state.direction = direction;

        let drive = self.settings.acceleration * contact.angle.to_radians().sin();
        self.state.speed = (self.state.speed + (drive - self.settings.friction) * dt)
            .clamp(0.0, self.settings.max_speed);
        if self.state.speed < self.settings.min_speed {
            self.stop(false, events);
            self.exhausted = true;
            return &self.state;
        }

        self.state.influence = (self.state.influence + dt / self.settings.ramp_time).min(1.0);
        &self.state
    }

    fn slide_direction(&self, contact: &Contact) -> Vec3 {
        let base = contact.downhill();
        if contact.steep_hits > 1 && contact.steep_direction != Vec3::ZERO {
            // Keep the combined direction on the contact plane.
            let combined = contact.project(contact.steep_direction).normalize_or(base);
            base.lerp(combined, self.settings.multi_contact_blend)
                .normalize_or(base)
        } else {
            base
        }
    }

    fn stop(&mut self, carryover: bool, events: &EventChannel) {
        if carryover {
            self.pending_carryover = Some(self.state.direction * self.state.speed);
            self.state.momentum_carryover = true;
            self.state.carryover_remaining = self.settings.carryover_time;
        }
        self.state.active = false;
        self.state.influence = 0.0;
        self.state.speed = 0.0;
        debug!(carryover, "slope slide stopped");
        events.publish_state(StateEvent::SlideStateChanged { active: false });
    }
}

/// Horizontal input points more than `cancel_angle` degrees away from the
/// slide.
fn opposes(input: Vec3, slide: Vec3, cancel_angle: f32) -> bool {
    let input = Vec3::new(input.x, 0.0, input.z);
    let slide = Vec3::new(slide.x, 0.0, slide.z);
    if input.length_squared() < 1e-4 || slide.length_squared() < 1e-6 {
        return false;
    }
    input.angle_between(slide).to_degrees() > cancel_angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::ground::{slope_angle, Contact};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const DT: f32 = 1.0 / 60.0;

    fn steep(degrees: f32) -> Contact {
        let radians = degrees.to_radians();
        let normal = Vec3::new(radians.sin(), radians.cos(), 0.0);
        Contact {
            grounded: true,
            touching: true,
            normal,
            smoothed_normal: normal,
            angle: slope_angle(normal),
            steep: degrees > 45.0,
            hit_count: 5,
            steep_hits: if degrees > 45.0 { 5 } else { 0 },
            ..default()
        }
    }

    fn run(engine: &mut SlopeSlideEngine, contact: &Contact, seconds: f32) {
        let channel = EventChannel::new();
        let ticks = (seconds / DT).round() as usize;
        for _ in 0..ticks {
            engine.update(contact, contact.grounded, Vec3::ZERO, DT, &channel);
        }
    }

    // ==================== Activation ====================

    #[test]
    fn activates_only_after_delay() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        let contact = steep(60.0);

        run(&mut engine, &contact, 0.1);
        assert!(!engine.is_active());
        assert!(engine.is_pending());

        run(&mut engine, &contact, 0.1);
        assert!(engine.is_active());
        assert!(engine.state().delay_elapsed);
    }

    #[test]
    fn walkable_slope_never_slides() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        run(&mut engine, &steep(30.0), 1.0);
        assert!(!engine.is_active());
        assert_eq!(engine.state().contact_time, 0.0);
    }

    #[test]
    fn influence_ramps() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        let contact = steep(60.0);
        run(&mut engine, &contact, 0.2);
        let early = engine.state().influence;
        run(&mut engine, &contact, 0.5);

        assert!(early < 1.0);
        assert_eq!(engine.state().influence, 1.0);
        assert!(engine.velocity().x > 0.0);
        assert!(engine.velocity().y < 0.0);
    }

    // ==================== Exit ====================

    #[test]
    fn losing_contact_resets_without_carryover() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        run(&mut engine, &steep(60.0), 0.5);
        assert!(engine.is_active());

        run(&mut engine, &Contact::default(), DT);
        assert!(!engine.is_active());
        assert!(engine.take_carryover().is_none());
    }

    #[test]
    fn walkable_ground_grants_carryover() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        run(&mut engine, &steep(60.0), 0.5);
        run(&mut engine, &steep(10.0), DT);

        assert!(!engine.is_active());
        assert!(engine.state().momentum_carryover);
        let carry = engine.take_carryover().unwrap();
        assert!(carry.x > 0.0);
        assert!(engine.take_carryover().is_none());

        run(&mut engine, &steep(10.0), 1.0);
        assert!(!engine.state().momentum_carryover);
    }

    #[test]
    fn opposing_input_cancels() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        let contact = steep(60.0);
        let channel = EventChannel::new();
        run(&mut engine, &contact, 0.5);

        engine.update(&contact, true, Vec3::NEG_X, DT, &channel);
        assert!(!engine.is_active());

        // Releasing the input lets the slide resume without a new delay.
        engine.update(&contact, true, Vec3::ZERO, DT, &channel);
        assert!(engine.is_active());
    }

    fn counting_channel() -> (EventChannel, Arc<AtomicUsize>) {
        let channel = EventChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        channel.subscribe(EventKind::SlideStateChanged, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (channel, count)
    }

    #[test]
    fn uphill_input_holds_slide_off() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        let contact = steep(60.0);
        let (channel, count) = counting_channel();

        let mut active_ticks = 0;
        for _ in 0..60 {
            engine.update(&contact, true, Vec3::NEG_X, DT, &channel);
            if engine.is_active() {
                active_ticks += 1;
            }
        }

        assert_eq!(active_ticks, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!engine.is_pending());
        assert!(engine.is_engaged());
    }

    #[test]
    fn running_out_of_speed_stays_stopped() {
        let settings = SlideSettings {
            acceleration: 0.0,
            friction: 100.0,
            ..SlideSettings::default()
        };
        let mut engine = SlopeSlideEngine::new(settings);
        let contact = steep(60.0);
        let (channel, count) = counting_channel();

        for _ in 0..60 {
            engine.update(&contact, true, Vec3::ZERO, DT, &channel);
        }
        assert!(!engine.is_active());
        // One start and one stop.
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // Leaving the slope re-arms it.
        engine.update(&Contact::default(), false, Vec3::ZERO, DT, &channel);
        for _ in 0..15 {
            engine.update(&contact, true, Vec3::ZERO, DT, &channel);
        }
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    // ==================== Control ====================

    #[test]
    fn lateral_input_only_while_sliding() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        let input = Vec3::new(1.0, 0.0, 1.0);
        assert_eq!(engine.lateral_input(input), input);
        assert_eq!(engine.control_multiplier(), 1.0);

        run(&mut engine, &steep(60.0), 1.0);
        let lateral = engine.lateral_input(input);
        assert!(lateral.x.abs() < 1e-4);
        assert!((lateral.z - 0.3).abs() < 1e-4);
        assert!((engine.control_multiplier() - 0.3).abs() < 1e-4);
    }

    #[test]
    fn slide_events_published() {
        let mut engine = SlopeSlideEngine::new(SlideSettings::default());
        let channel = EventChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        channel.subscribe(EventKind::SlideStateChanged, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let contact = steep(60.0);
        for _ in 0..30 {
            engine.update(&contact, true, Vec3::ZERO, DT, &channel);
        }
        engine.update(&Contact::default(), false, Vec3::ZERO, DT, &channel);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
