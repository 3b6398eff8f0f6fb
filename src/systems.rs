//! Core locomotion systems.
//!
//! These systems drive one [`LocomotionCore`] per character entity. They are
//! generic over the physics backend so that different physics engines can
//! supply terrain probes and velocities.

use std::sync::{Arc, Mutex, PoisonError};

use bevy::ecs::system::StaticSystemParam;
use bevy::prelude::*;

use crate::animation::AnimationData;
use crate::backend::LocomotionBackend;
use crate::config::LocomotionSettings;
use crate::core::{BodyState, LocomotionCore, MotionOutput};
use crate::error::ConfigError;
use crate::events::{EventChannel, LocomotionEvent, SubscriptionId};
use crate::input::{InputSnapshot, LocomotionIntent};
use crate::sensor::TerrainSensor;

/// An event published on a character's channel, forwarded into Bevy.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct LocomotionMessage {
    pub entity: Entity,
    pub event: LocomotionEvent,
}

/// Latest animation data of a character, for ECS consumers.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct AnimationSnapshot(pub AnimationData);

/// Component wrapping a character's locomotion core.
///
/// Normally attached automatically when a [`LocomotionSettings`] component
/// is added; it can also be inserted by hand, e.g. to share an
/// [`EventChannel`] with subscribers created beforehand.
#[derive(Component)]
pub struct LocomotionController {
    core: LocomotionCore,
    outbox: Arc<Mutex<Vec<LocomotionEvent>>>,
    subscription: SubscriptionId,
    input: InputSnapshot,
    last_output: Option<MotionOutput>,
    missing_sensor_reported: bool,
    /// Distance from the entity's origin down to its feet.
    pub feet_offset: f32,
}

impl LocomotionController {
    /// Build a controller with its own event channel.
    pub fn new(settings: LocomotionSettings) -> Result<Self, ConfigError> {
        Self::with_events(settings, EventChannel::new())
    }

    /// Build a controller publishing on `events`.
    pub fn with_events(settings: LocomotionSettings, events: EventChannel) -> Result<Self, ConfigError> {
        let core = LocomotionCore::builder(settings).events(events).build()?;
        Ok(Self::from_core(core))
    }

    /// Wrap an already built core.
    pub fn from_core(core: LocomotionCore) -> Self {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outbox);
        let subscription = core.events().subscribe_all(move |event| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(*event);
        });
        Self {
            core,
            outbox,
            subscription,
            input: InputSnapshot::default(),
            last_output: None,
            missing_sensor_reported: false,
            feet_offset: 0.0,
        }
    }

    /// Builder: set the distance from the entity's origin to its feet.
    pub fn with_feet_offset(mut self, offset: f32) -> Self {
        self.feet_offset = offset;
        self
    }

    pub fn core(&self) -> &LocomotionCore {
        &self.core
    }

    pub fn events(&self) -> &EventChannel {
        self.core.events()
    }

    /// Input snapshot used by the next tick.
    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    /// Replace the input snapshot used by the next tick.
    pub fn set_input(&mut self, input: InputSnapshot) {
        self.input = input;
    }

    /// Output of the most recent tick.
    pub fn last_output(&self) -> Option<&MotionOutput> {
        self.last_output.as_ref()
    }

    /// Tick the core once with the stored input.
    pub fn step(&mut self, sensor: &dyn TerrainSensor, body: BodyState, dt: f32) -> &MotionOutput {
        let output = self.core.tick(sensor, body, &self.input, dt);
        self.last_output.insert(output)
    }

    fn drain_events(&self) -> Vec<LocomotionEvent> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Drop for LocomotionController {
    fn drop(&mut self) {
        self.core.events().unsubscribe(self.subscription);
    }
}

/// Build controllers for entities whose [`LocomotionSettings`] were added or
/// changed.
///
/// Invalid settings are logged and leave the entity without a controller, so
/// it is never ticked.
pub fn attach_controllers(
    mut commands: Commands,
    q: Query<(Entity, &LocomotionSettings, Option<&Transform>), Changed<LocomotionSettings>>,
) {
    for (entity, settings, transform) in &q {
        let facing = transform.map(|t| t.forward().as_vec3()).unwrap_or(Vec3::NEG_Z);
        let built = LocomotionCore::builder(settings.clone())
            .events(EventChannel::new())
            .facing(facing)
            .build();

        match built {
            Ok(core) => {
                debug!(?entity, "locomotion controller attached");
                commands
                    .entity(entity)
                    .insert((LocomotionController::from_core(core), AnimationSnapshot::default()))
                    .insert_if_new(LocomotionIntent::default());
            }
            Err(err) => {
                error!(?entity, %err, "locomotion settings rejected");
                commands.entity(entity).remove::<LocomotionController>();
            }
        }
    }
}

/// Snapshot each character's held input into press/release edges.
pub fn snapshot_input(mut q: Query<(&mut LocomotionIntent, &mut LocomotionController)>) {
    for (mut intent, mut controller) in &mut q {
        let snapshot = intent.snapshot();
        controller.set_input(snapshot);
    }
}

/// Tick every character against the backend's terrain and write its velocity.
pub fn run_locomotion<B: LocomotionBackend>(
    time: Res<Time>,
    terrain: StaticSystemParam<B::Terrain>,
    mut q: Query<(
        Entity,
        &mut LocomotionController,
        &Transform,
        &mut B::VelocityComponent,
    )>,
) {
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }

    for (entity, mut controller, transform, mut velocity) in &mut q {
        let Some(sensor) = B::terrain(&*terrain, entity) else {
            if !controller.missing_sensor_reported {
                error!(?entity, "no terrain sensor available, character is not ticked");
                controller.missing_sensor_reported = true;
            }
            continue;
        };
        controller.missing_sensor_reported = false;

        let body = BodyState::new(
            transform.translation - Vec3::Y * controller.feet_offset,
            B::get_velocity(&velocity),
        );
        let output = controller.step(&*sensor, body, dt);
        B::set_velocity(&mut velocity, output.velocity);
    }
}

/// Forward every event published on a character's channel as a
/// [`LocomotionMessage`].
pub fn forward_messages(
    q: Query<(Entity, &LocomotionController)>,
    mut writer: EventWriter<LocomotionMessage>,
) {
    for (entity, controller) in &q {
        for event in controller.drain_events() {
            writer.write(LocomotionMessage { entity, event });
        }
    }
}

/// Mirror the latest animation data into [`AnimationSnapshot`].
pub fn mirror_animation(mut q: Query<(&LocomotionController, &mut AnimationSnapshot)>) {
    for (controller, mut snapshot) in &mut q {
        if let Some(output) = controller.last_output() {
            snapshot.0 = output.animation;
        }
    }
}
