//! Shared transform math.
//!
//! Everything is column-major, right-handed, +Y-up, matching glam and the
//! camera/lighting conventions used by the shaders.

use glam::{Mat4, Quat, Vec3, Vec4};

/// Compose a translate/rotate/scale transform.
pub fn compose_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh(fov_y, aspect, near, far)
}

pub fn orthographic(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    Mat4::orthographic_rh(left, right, bottom, top, near, far)
}

pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, center, up)
}

/// Map NDC to texture space: x,y into [0,1] with y flipped, z passed through.
pub fn ndc_to_texture(ndc: Vec3) -> Vec3 {
    Vec3::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z)
}

/// An up vector that stays stable when the direction approaches +Y/-Y.
pub fn stable_up(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().dot(Vec3::Y).abs() > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// World-space corners of the camera frustum restricted to [near, far].
///
/// Order: near plane (bl, br, tr, tl), then far plane in the same winding.
pub fn frustum_slice_corners(
    view: Mat4,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
) -> [Vec3; 8] {
    let proj = perspective(fov_y, aspect, near, far);
    let inv = (proj * view).inverse();

    let mut corners = [Vec3::ZERO; 8];
    // wgpu clip space: z in [0, 1].
    let ndc = [
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
    ];
    for (corner, n) in corners.iter_mut().zip(ndc) {
        let h: Vec4 = inv * n.extend(1.0);
        *corner = h.truncate() / h.w;
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndc_mapping_flips_y() {
        let mapped = ndc_to_texture(Vec3::new(-1.0, 1.0, 0.25));
        assert_eq!(mapped, Vec3::new(0.0, 0.0, 0.25));
        let mapped = ndc_to_texture(Vec3::new(1.0, -1.0, 0.75));
        assert_eq!(mapped, Vec3::new(1.0, 1.0, 0.75));
    }

    #[test]
    fn stable_up_switches_near_vertical() {
        assert_eq!(stable_up(Vec3::new(0.0, -1.0, 0.0)), Vec3::Z);
        assert_eq!(stable_up(Vec3::new(1.0, -0.2, 0.0).normalize()), Vec3::Y);
    }

    #[test]
    fn frustum_corners_span_near_and_far() {
        let view = look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let corners = frustum_slice_corners(view, 60f32.to_radians(), 1.0, 1.0, 10.0);

        // Camera looks down -Z from z=5; near plane sits at z=4, far at z=-5.
        for c in &corners[..4] {
            assert!((c.z - 4.0).abs() < 1.0e-3, "near corner at {c:?}");
        }
        for c in &corners[4..] {
            assert!((c.z + 5.0).abs() < 1.0e-2, "far corner at {c:?}");
        }
    }
}
