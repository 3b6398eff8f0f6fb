//! # `platformer_locomotion`
//!
//! Locomotion and action core for third-person platformer characters, with a
//! Bevy plugin and an optional Rapier3D backend.
//!
//! This crate provides a per-character pipeline that:
//! - Samples the ground under the character's footprint with several probes
//! - Blends player input with accumulated momentum, including "fighting" it
//! - Slides the character down steep slopes after a short delay
//! - Chains jumps (double, triple) and special actions (long jump, backflip,
//!   ground pound, dive, ledge climb)
//! - Resolves a single locomotion state every tick for animation
//! - Publishes everything on a per-character event channel
//!
//! ## Architecture
//!
//! The simulation core ([`LocomotionCore`](crate::core::LocomotionCore)) is plain Rust: it takes a
//! [`sensor::TerrainSensor`], the body's position and velocity, and an input
//! snapshot, and returns the desired velocity. It never touches an ECS world.
//!
//! The [`LocomotionPlugin`] wraps the core in a component and drives it from
//! `FixedUpdate`, reading terrain through a [`backend::LocomotionBackend`].
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use platformer_locomotion::prelude::*;
//!
//! // A character's core, driven without any ECS
//! let mut core = LocomotionCore::builder(LocomotionSettings::player())
//!     .events(EventChannel::new())
//!     .build()
//!     .unwrap();
//!
//! let mut intent = LocomotionIntent::new();
//! intent.set_move(Vec2::Y);
//! let output = core.tick(
//!     &PlaneTerrain::flat(0.0),
//!     BodyState::default(),
//!     &intent.snapshot(),
//!     1.0 / 60.0,
//! );
//! assert!(output.velocity.z < 0.0);
//! ```

use bevy::prelude::*;

pub mod animation;
pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod ground;
pub mod input;
pub mod jump;
pub mod ledge;
pub mod momentum;
pub mod sensor;
pub mod slide;
pub mod state;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::animation::{AnimationData, TurnType};
    pub use crate::backend::{
        KinematicVelocity, LocomotionBackend, SensorResourceBackend, TerrainSensorResource,
    };
    pub use crate::config::{
        AnimationSettings, GroundSettings, JumpSettings, LedgeSettings, LocomotionSettings,
        MomentumSettings, SlideSettings, StateSettings,
    };
    pub use crate::core::{BodyState, LocomotionCore, MotionOutput};
    pub use crate::error::ConfigError;
    pub use crate::events::{
        ActionEvent, EventChannel, EventKind, InputEvent, LocomotionEvent, StateEvent,
        SubscriptionId,
    };
    pub use crate::ground::Contact;
    pub use crate::input::{InputButton, InputSnapshot, LocomotionIntent};
    pub use crate::jump::{ActionCommand, ActionVariant, GroundPoundPhase};
    pub use crate::momentum::MomentumSource;
    pub use crate::sensor::{
        BoxTerrain, CompositeTerrain, NoTerrain, PlaneTerrain, ProbeHit, SurfaceTag,
        TerrainSensor,
    };
    pub use crate::state::LocomotionState;
    pub use crate::systems::{AnimationSnapshot, LocomotionController, LocomotionMessage};
    pub use crate::{LocomotionPlugin, LocomotionSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// System sets for the locomotion pipeline, run in order in `FixedUpdate`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    /// Turn held input into per-tick snapshots.
    Input,
    /// Tick every character's core and write velocities.
    Simulation,
    /// Forward events and mirror animation data.
    Output,
}

/// Main plugin for the locomotion system.
///
/// This plugin is generic over a physics backend `B` which provides terrain
/// probing and velocity access.
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// Without a physics engine, probing a terrain resource:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use platformer_locomotion::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .insert_resource(TerrainSensorResource::new(PlaneTerrain::flat(0.0)))
///     .add_plugins(LocomotionPlugin::<SensorResourceBackend>::default())
///     .run();
/// ```
pub struct LocomotionPlugin<B: backend::LocomotionBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::LocomotionBackend> Default for LocomotionPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::LocomotionBackend> Plugin for LocomotionPlugin<B> {
    fn build(&self, app: &mut App) {
        app.register_type::<config::LocomotionSettings>();
        app.register_type::<input::LocomotionIntent>();
        app.register_type::<systems::AnimationSnapshot>();
        app.register_type::<state::LocomotionState>();
        app.register_type::<animation::AnimationData>();
        app.register_type::<backend::KinematicVelocity>();

        app.add_event::<systems::LocomotionMessage>();

        app.configure_sets(
            FixedUpdate,
            (
                LocomotionSet::Input,
                LocomotionSet::Simulation,
                LocomotionSet::Output,
            )
                .chain(),
        );

        app.add_plugins(B::plugin());

        app.add_systems(
            FixedUpdate,
            (
                systems::attach_controllers.in_set(LocomotionSet::Input),
                systems::snapshot_input
                    .in_set(LocomotionSet::Input)
                    .after(systems::attach_controllers),
                systems::run_locomotion::<B>.in_set(LocomotionSet::Simulation),
                (systems::forward_messages, systems::mirror_animation)
                    .in_set(LocomotionSet::Output),
            ),
        );
    }
}
