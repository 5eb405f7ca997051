use glam::Vec3;
use log::warn;

/// Maximum number of simultaneously active lights presented to the shader.
pub const MAX_LIGHTS: usize = 8;

/// A scene light. Exactly one variant per light kind; consumers match
/// exhaustively instead of probing for properties.
#[derive(Clone, Copy, Debug)]
pub enum Light {
    Directional {
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        cast_shadows: bool,
    },
    Point {
        position: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        cast_shadows: bool,
    },
    Spot {
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        inner_angle: f32,
        outer_angle: f32,
        cast_shadows: bool,
    },
}

impl Light {
    pub fn intensity(&self) -> f32 {
        match self {
            Light::Directional { intensity, .. }
            | Light::Point { intensity, .. }
            | Light::Spot { intensity, .. } => *intensity,
        }
    }

    pub fn casts_shadows(&self) -> bool {
        match self {
            Light::Directional { cast_shadows, .. }
            | Light::Point { cast_shadows, .. }
            | Light::Spot { cast_shadows, .. } => *cast_shadows,
        }
    }

    /// World position for priority sorting; directional lights have none.
    pub fn position(&self) -> Option<Vec3> {
        match self {
            Light::Directional { .. } => None,
            Light::Point { position, .. } | Light::Spot { position, .. } => Some(*position),
        }
    }
}

/// Fixed-capacity light collection. Ordering is stable within a frame, which
/// keeps shadow-slot indices consistent between the shadow and main passes.
#[derive(Clone, Default)]
pub struct LightSet {
    lights: Vec<Light>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a light. Returns false (and logs) once the set is full.
    pub fn add(&mut self, light: Light) -> bool {
        if self.lights.len() >= MAX_LIGHTS {
            warn!("Light set is full ({MAX_LIGHTS} lights); ignoring additional light");
            return false;
        }
        self.lights.push(light);
        true
    }

    pub fn clear(&mut self) {
        self.lights.clear();
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(intensity: f32) -> Light {
        Light::Point {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity,
            range: 10.0,
            cast_shadows: true,
        }
    }

    #[test]
    fn set_rejects_lights_beyond_capacity() {
        let mut set = LightSet::new();
        for i in 0..MAX_LIGHTS {
            assert!(set.add(point(i as f32)));
        }
        assert!(!set.add(point(99.0)));
        assert_eq!(set.len(), MAX_LIGHTS);
    }

    #[test]
    fn ordering_is_insertion_order() {
        let mut set = LightSet::new();
        set.add(point(3.0));
        set.add(point(1.0));
        set.add(point(2.0));
        let intensities: Vec<f32> = set.lights().iter().map(Light::intensity).collect();
        assert_eq!(intensities, vec![3.0, 1.0, 2.0]);
    }
}
