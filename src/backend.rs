//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement to
//! drive the locomotion core. A backend answers terrain probes for a
//! character and owns the velocity component the core writes to, which
//! allows swapping physics engines (Rapier3D, a bare kinematic integrator,
//! custom) without touching the simulation.

use std::sync::Arc;

use bevy::ecs::component::Mutable;
use bevy::ecs::system::{SystemParam, SystemParamItem};
use bevy::prelude::*;

use crate::sensor::TerrainSensor;
use crate::systems::LocomotionController;
use crate::LocomotionSet;

/// Trait for physics backend implementations.
///
/// Implement this trait to integrate a physics engine with the locomotion
/// plugin. The generic simulation system fetches [`Self::Terrain`] once per
/// tick, asks [`Self::terrain`] for a per-character sensor and writes the
/// core's desired velocity through [`Self::set_velocity`].
///
/// # Example
///
/// For an example implementation, see [`SensorResourceBackend`] below, or the
/// `rapier` module's `Rapier3dBackend` which implements this trait for Bevy
/// Rapier3D.
pub trait LocomotionBackend: 'static + Send + Sync {
    /// The velocity component type used by this backend.
    type VelocityComponent: Component<Mutability = Mutable>;

    /// System parameter the terrain sensor is built from.
    type Terrain: SystemParam + 'static;

    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Build the terrain sensor `entity` probes against this tick.
    ///
    /// Returns `None` when the backend's collaborators are missing (no
    /// physics context, no terrain resource); the character is then not
    /// ticked.
    fn terrain<'a>(
        terrain: &'a SystemParamItem<'_, '_, Self::Terrain>,
        entity: Entity,
    ) -> Option<Box<dyn TerrainSensor + 'a>>;

    /// Get the current linear velocity.
    fn get_velocity(velocity: &Self::VelocityComponent) -> Vec3;

    /// Set the linear velocity.
    fn set_velocity(velocity: &mut Self::VelocityComponent, value: Vec3);
}

/// Shared terrain sensor for [`SensorResourceBackend`].
///
/// Any [`TerrainSensor`] can be installed, from an analytic plane to a
/// game-specific heightfield.
#[derive(Resource, Clone)]
pub struct TerrainSensorResource {
    sensor: Arc<dyn TerrainSensor + Send + Sync>,
}

impl TerrainSensorResource {
    pub fn new<S: TerrainSensor + Send + Sync + 'static>(sensor: S) -> Self {
        Self {
            sensor: Arc::new(sensor),
        }
    }

    /// The installed sensor.
    pub fn sensor(&self) -> &(dyn TerrainSensor + Send + Sync) {
        self.sensor.as_ref()
    }
}

/// Velocity of a character moved by the kinematic integrator.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct KinematicVelocity {
    pub linvel: Vec3,
}

/// Gravity applied by the kinematic integrator.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct KinematicGravity(pub Vec3);

impl Default for KinematicGravity {
    fn default() -> Self {
        Self(Vec3::new(0.0, -20.0, 0.0))
    }
}

/// Backend without a physics engine.
///
/// Characters probe the [`TerrainSensorResource`] and are moved by a small
/// kinematic integrator: gravity (unless the core suspends it), then
/// position, then a push out of the terrain along its normal.
///
/// Characters need a `Transform` and a [`KinematicVelocity`].
pub struct SensorResourceBackend;

impl LocomotionBackend for SensorResourceBackend {
    type VelocityComponent = KinematicVelocity;
    type Terrain = Option<Res<'static, TerrainSensorResource>>;

    fn plugin() -> impl Plugin {
        SensorResourceBackendPlugin
    }

    fn terrain<'a>(
        terrain: &'a SystemParamItem<'_, '_, Self::Terrain>,
        _entity: Entity,
    ) -> Option<Box<dyn TerrainSensor + 'a>> {
        terrain
            .as_ref()
            .map(|resource| Box::new(resource.sensor()) as Box<dyn TerrainSensor + 'a>)
    }

    fn get_velocity(velocity: &KinematicVelocity) -> Vec3 {
        velocity.linvel
    }

    fn set_velocity(velocity: &mut KinematicVelocity, value: Vec3) {
        velocity.linvel = value;
    }
}

/// Plugin that sets up the kinematic integrator.
pub struct SensorResourceBackendPlugin;

impl Plugin for SensorResourceBackendPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<KinematicGravity>();
        app.add_systems(
            FixedUpdate,
            integrate_kinematic
                .in_set(LocomotionSet::Simulation)
                .after(crate::systems::run_locomotion::<SensorResourceBackend>),
        );
    }
}

/// Move kinematic characters by their velocity and keep them above terrain.
pub fn integrate_kinematic(
    time: Res<Time>,
    gravity: Res<KinematicGravity>,
    terrain: Option<Res<TerrainSensorResource>>,
    mut q: Query<(&LocomotionController, &mut Transform, &mut KinematicVelocity)>,
) {
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }

    for (controller, mut transform, mut velocity) in &mut q {
        let Some(output) = controller.last_output() else {
            continue;
        };
        if !output.suspend_gravity {
            velocity.linvel += gravity.0 * dt;
        }
        transform.translation += velocity.linvel * dt;

        let Some(terrain) = terrain.as_ref() else {
            continue;
        };
        let lift = controller.core().settings().ground.probe_height;
        let feet = transform.translation - Vec3::Y * controller.feet_offset;
        let mask = controller.core().settings().ground.layer_mask;
        let Some(hit) = terrain.sensor().probe(feet + Vec3::Y * lift, Vec3::NEG_Y, lift, mask) else {
            continue;
        };
        // Push out along the surface normal and drop the velocity into it.
        let depth = (hit.point - feet).dot(hit.normal);
        if depth > 0.0 {
            transform.translation += hit.normal * depth;
            let into = velocity.linvel.dot(hit.normal);
            if into < 0.0 {
                velocity.linvel -= hit.normal * into;
            }
        }
    }
}
