use std::cell::Cell;

use glam::{Mat4, Vec3};

use crate::math;

#[derive(Clone, Copy)]
struct Matrices {
    view: Mat4,
    proj: Mat4,
}

/// Perspective camera. View and projection matrices are computed lazily and
/// cached; every setter invalidates the cache.
#[derive(Clone)]
pub struct Camera3D {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y: f32,
    near: f32,
    far: f32,
    aspect: f32,
    cached: Cell<Option<Matrices>>,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
            aspect: 16.0 / 9.0,
            cached: Cell::new(None),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.cached.set(None);
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.cached.set(None);
    }

    pub fn set_up(&mut self, up: Vec3) {
        self.up = up;
        self.cached.set(None);
    }

    pub fn set_fov_y(&mut self, fov_y: f32) {
        self.fov_y = fov_y;
        self.cached.set(None);
    }

    pub fn set_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far.max(near + f32::EPSILON);
        self.cached.set(None);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect != self.aspect {
            self.aspect = aspect;
            self.cached.set(None);
        }
    }

    fn matrices(&self) -> Matrices {
        if let Some(cached) = self.cached.get() {
            return cached;
        }
        let matrices = Matrices {
            view: math::look_at(self.position, self.target, self.up),
            proj: math::perspective(self.fov_y, self.aspect, self.near, self.far),
        };
        self.cached.set(Some(matrices));
        matrices
    }

    pub fn view(&self) -> Mat4 {
        self.matrices().view
    }

    pub fn proj(&self) -> Mat4 {
        self.matrices().proj
    }

    pub fn view_proj(&self) -> Mat4 {
        let m = self.matrices();
        m.proj * m.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_invalidate_the_cached_matrices() {
        let mut camera = Camera3D::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let before = camera.view_proj();
        camera.set_position(Vec3::new(0.0, 2.0, 5.0));
        let after = camera.view_proj();
        assert_ne!(before, after);
    }

    #[test]
    fn view_looks_from_position_to_target() {
        let camera = Camera3D::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        // The target should land on the view-space -Z axis.
        let target_view = camera.view() * Vec3::ZERO.extend(1.0);
        assert!(target_view.x.abs() < 1.0e-6);
        assert!(target_view.y.abs() < 1.0e-6);
        assert!((target_view.z + 5.0).abs() < 1.0e-6);
    }
}
