//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.

use bevy::ecs::system::SystemParamItem;
use bevy::prelude::*;
use bevy_rapier3d::geometry::Group;
use bevy_rapier3d::prelude::*;

use crate::backend::LocomotionBackend;
use crate::sensor::{ProbeHit, TerrainSensor};
use crate::systems::{run_locomotion, LocomotionController};
use crate::LocomotionSet;

/// Rapier3D physics backend for the locomotion plugin.
///
/// Terrain probes are Rapier ray casts that skip the character's own rigid
/// body and sensor colliders. The core's desired velocity is written to
/// [`Velocity`]; Rapier integrates gravity and resolves collisions.
pub struct Rapier3dBackend;

impl LocomotionBackend for Rapier3dBackend {
    type VelocityComponent = Velocity;
    type Terrain = ReadRapierContext<'static, 'static>;

    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn terrain<'a>(
        terrain: &'a SystemParamItem<'_, '_, Self::Terrain>,
        entity: Entity,
    ) -> Option<Box<dyn TerrainSensor + 'a>> {
        let context = terrain.single().ok()?;
        Some(Box::new(RapierTerrain {
            context,
            exclude: entity,
        }))
    }

    fn get_velocity(velocity: &Velocity) -> Vec3 {
        velocity.linvel
    }

    fn set_velocity(velocity: &mut Velocity, value: Vec3) {
        velocity.linvel = value;
    }
}

/// Terrain sensor backed by a Rapier context, probing on behalf of one
/// character.
pub struct RapierTerrain<'a> {
    context: RapierContext<'a>,
    exclude: Entity,
}

impl TerrainSensor for RapierTerrain<'_> {
    fn probe(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layer_mask: u32,
    ) -> Option<ProbeHit> {
        let filter = QueryFilter::default()
            .exclude_rigid_body(self.exclude)
            .exclude_sensors()
            .groups(CollisionGroups::new(
                Group::ALL,
                Group::from_bits_truncate(layer_mask),
            ));

        self.context
            .cast_ray_and_get_normal(origin, direction, max_distance, true, filter)
            .map(|(entity, hit)| {
                ProbeHit::new(hit.time_of_impact, hit.point, hit.normal, Some(entity))
            })
    }
}

/// Plugin that sets up Rapier3D-specific systems for the locomotion plugin.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            sync_gravity_scale
                .in_set(LocomotionSet::Simulation)
                .after(run_locomotion::<Rapier3dBackend>),
        );
    }
}

/// Turn Rapier gravity off while the core suspends it (ground-pound hang,
/// ledge hang and climb).
pub fn sync_gravity_scale(mut q: Query<(&LocomotionController, &mut GravityScale)>) {
    for (controller, mut scale) in &mut q {
        let Some(output) = controller.last_output() else {
            continue;
        };
        let target = if output.suspend_gravity { 0.0 } else { 1.0 };
        if scale.0 != target {
            scale.0 = target;
        }
    }
}

/// Rapier physics components for a locomotion character.
///
/// # Example
///
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use platformer_locomotion::prelude::*;
///
/// fn spawn_player(mut commands: Commands) {
///     commands.spawn((
///         Transform::from_xyz(0.0, 2.0, 0.0),
///         LocomotionSettings::player(),
///         Rapier3dCharacterBundle::new(),
///         Collider::capsule_y(0.5, 0.4),
///     ));
/// }
/// ```
///
/// The controller measures from the feet; with a capsule collider centered
/// on the entity, set [`LocomotionController::feet_offset`] to the capsule's
/// half height plus radius.
///
/// # Defaults
///
/// - `rigid_body`: [`RigidBody::Dynamic`]
/// - `velocity`: Zero velocity
/// - `locked_axes`: [`LockedAxes::ROTATION_LOCKED`], characters stay upright
/// - `gravity_scale`: 1.0, switched to 0.0 while the core suspends gravity
/// - `friction`: Zero with the `Min` combine rule, so walls do not hold the
///   character
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub locked_axes: LockedAxes,
    pub gravity_scale: GravityScale,
    pub friction: Friction,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            gravity_scale: GravityScale(1.0),
            friction: Friction {
                coefficient: 0.0,
                combine_rule: CoefficientCombineRule::Min,
            },
        }
    }

    /// Set the rigid body type, e.g. [`RigidBody::KinematicVelocityBased`]
    /// for scripted characters.
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    /// Set which axes are locked.
    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_defaults_keep_character_upright() {
        let bundle = Rapier3dCharacterBundle::new();
        assert_eq!(bundle.locked_axes, LockedAxes::ROTATION_LOCKED);
        assert_eq!(bundle.gravity_scale.0, 1.0);
        assert_eq!(bundle.friction.coefficient, 0.0);
    }

    #[test]
    fn with_body_overrides_rigid_body() {
        let bundle = Rapier3dCharacterBundle::new().with_body(RigidBody::KinematicVelocityBased);
        assert_eq!(bundle.rigid_body, RigidBody::KinematicVelocityBased);
    }
}
