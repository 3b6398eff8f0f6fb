//! Terrain sensor abstraction.
//!
//! The locomotion core never talks to a physics engine directly. It asks a
//! [`TerrainSensor`] whether anything lies within a distance along a ray and
//! gets back a [`ProbeHit`]. Physics backends (see the `rapier` module) and
//! tests provide implementations.

use bevy::prelude::*;

/// Material tag reported by the terrain under a probe.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SurfaceTag {
    #[default]
    Default,
    Grass,
    Stone,
    Sand,
    Ice,
    Water,
    /// Surfaces that always count as slide-eligible.
    Slide,
}

/// Result of a single terrain probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeHit {
    /// Distance from the probe origin to the hit point.
    pub distance: f32,
    /// World position of the hit point.
    pub point: Vec3,
    /// Surface normal at the hit point.
    pub normal: Vec3,
    /// Object that was hit (if the sensor knows it).
    pub object: Option<Entity>,
    /// Material tag of the surface.
    pub surface: SurfaceTag,
}

impl ProbeHit {
    /// Create a probe hit on an untagged surface.
    pub fn new(distance: f32, point: Vec3, normal: Vec3, object: Option<Entity>) -> Self {
        Self {
            distance,
            point,
            normal,
            object,
            surface: SurfaceTag::Default,
        }
    }

    /// Builder: set the surface tag.
    pub fn with_surface(mut self, surface: SurfaceTag) -> Self {
        self.surface = surface;
        self
    }
}

/// Answers "is there terrain within `max_distance` along `direction`".
///
/// Implementations must support many independent probes per tick; the ground
/// analyzer alone issues one per footprint sample.
pub trait TerrainSensor {
    /// Cast a ray from `origin` along `direction` (normalized).
    ///
    /// `layer_mask` selects which collision layers may be hit. Returns `None`
    /// when nothing is within range; a miss is not an error.
    fn probe(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layer_mask: u32,
    ) -> Option<ProbeHit>;
}

impl<T: TerrainSensor + ?Sized> TerrainSensor for &T {
    fn probe(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layer_mask: u32,
    ) -> Option<ProbeHit> {
        (**self).probe(origin, direction, max_distance, layer_mask)
    }
}

impl<T: TerrainSensor + ?Sized> TerrainSensor for std::sync::Arc<T> {
    fn probe(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layer_mask: u32,
    ) -> Option<ProbeHit> {
        (**self).probe(origin, direction, max_distance, layer_mask)
    }
}

/// Sensor that never hits anything. A character probing it is always airborne.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTerrain;

impl TerrainSensor for NoTerrain {
    fn probe(&self, _: Vec3, _: Vec3, _: f32, _: u32) -> Option<ProbeHit> {
        None
    }
}

/// Analytic infinite plane, useful for tests and flat arenas.
///
/// The plane passes through `point` with the given `normal`. Vertical rays hit
/// it wherever they cross it; rays parallel to it miss.
#[derive(Debug, Clone, Copy)]
pub struct PlaneTerrain {
    pub point: Vec3,
    pub normal: Vec3,
    pub surface: SurfaceTag,
    pub object: Option<Entity>,
}

impl PlaneTerrain {
    /// Horizontal ground at `height`.
    pub fn flat(height: f32) -> Self {
        Self::new(Vec3::new(0.0, height, 0.0), Vec3::Y)
    }

    /// Plane through `point` with normal `normal`.
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalize_or(Vec3::Y),
            surface: SurfaceTag::Default,
            object: None,
        }
    }

    /// Plane through `point` tilted `degrees` from horizontal, descending
    /// towards `downhill` (projected onto the ground plane).
    pub fn slope(point: Vec3, degrees: f32, downhill: Vec3) -> Self {
        let downhill = Vec3::new(downhill.x, 0.0, downhill.z).normalize_or(Vec3::X);
        let angle = degrees.to_radians();
        let normal = Vec3::Y * angle.cos() + downhill * angle.sin();
        Self::new(point, normal)
    }

    /// Builder: set the surface tag.
    pub fn with_surface(mut self, surface: SurfaceTag) -> Self {
        self.surface = surface;
        self
    }
}

impl TerrainSensor for PlaneTerrain {
    fn probe(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        _layer_mask: u32,
    ) -> Option<ProbeHit> {
        let denom = direction.dot(self.normal);
        // Only surfaces facing the ray count.
        if denom >= -f32::EPSILON {
            return None;
        }
        let distance = (self.point - origin).dot(self.normal) / denom;
        if !(0.0..=max_distance).contains(&distance) {
            return None;
        }
        Some(ProbeHit {
            distance,
            point: origin + direction * distance,
            normal: self.normal,
            object: self.object,
            surface: self.surface,
        })
    }
}

/// Solid axis-aligned box. Rays starting inside it miss.
#[derive(Debug, Clone, Copy)]
pub struct BoxTerrain {
    pub min: Vec3,
    pub max: Vec3,
    pub surface: SurfaceTag,
    pub object: Option<Entity>,
}

impl BoxTerrain {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            surface: SurfaceTag::Default,
            object: None,
        }
    }

    /// Builder: set the hit object.
    pub fn with_object(mut self, object: Entity) -> Self {
        self.object = Some(object);
        self
    }
}

impl TerrainSensor for BoxTerrain {
    fn probe(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        _layer_mask: u32,
    ) -> Option<ProbeHit> {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let (o, d) = (origin[axis], direction[axis]);
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d.abs() < f32::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let (t1, t2) = ((lo - o) / d, (hi - o) / d);
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            if near > t_enter {
                t_enter = near;
                normal = Vec3::ZERO;
                normal[axis] = -d.signum();
            }
            t_exit = t_exit.min(far);
        }

        if t_enter > t_exit || t_enter < 0.0 || t_enter > max_distance {
            return None;
        }
        Some(ProbeHit {
            distance: t_enter,
            point: origin + direction * t_enter,
            normal,
            object: self.object,
            surface: self.surface,
        })
    }
}

/// Composite sensor returning the nearest hit among several sensors.
#[derive(Default)]
pub struct CompositeTerrain {
    parts: Vec<Box<dyn TerrainSensor + Send + Sync>>,
}

impl CompositeTerrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a sensor.
    pub fn with<S: TerrainSensor + Send + Sync + 'static>(mut self, sensor: S) -> Self {
        self.parts.push(Box::new(sensor));
        self
    }
}

impl TerrainSensor for CompositeTerrain {
    fn probe(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layer_mask: u32,
    ) -> Option<ProbeHit> {
        self.parts
            .iter()
            .filter_map(|s| s.probe(origin, direction, max_distance, layer_mask))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}
