//! Cascaded shadow map fitting for directional lights.

use glam::{Mat4, Vec3};

use crate::math;

/// Practical split scheme: blend between uniform and logarithmic splits.
/// Returns `count + 1` strictly increasing boundaries from `near` to `far`.
pub fn cascade_splits(near: f32, far: f32, count: u32, lambda: f32) -> Vec<f32> {
    debug_assert!(count >= 1 && far > near && near > 0.0);
    let lambda = lambda.clamp(0.0, 1.0);
    let mut splits = Vec::with_capacity(count as usize + 1);
    for i in 0..=count {
        let t = i as f32 / count as f32;
        let uniform = near + (far - near) * t;
        let logarithmic = near * (far / near).powf(t);
        splits.push(lambda * logarithmic + (1.0 - lambda) * uniform);
    }
    splits
}

/// View-projection for one cascade, fit to the camera frustum slice.
pub struct CascadeFit {
    pub view_proj: Mat4,
    /// World-space radius of the bounding sphere, used for peter-panning
    /// safe depth range.
    pub radius: f32,
}

/// Fit an orthographic light frustum around the slice `[slice_near,
/// slice_far]` of the camera frustum. The fit uses the slice's bounding
/// sphere so the projection size is rotation invariant, and snaps the light
/// origin to shadow texels so the shadow edge does not shimmer as the
/// camera moves.
pub fn fit_directional_cascade(
    camera_view: Mat4,
    fov_y: f32,
    aspect: f32,
    slice_near: f32,
    slice_far: f32,
    light_dir: Vec3,
    tile_size: u32,
) -> CascadeFit {
    let corners = math::frustum_slice_corners(camera_view, fov_y, aspect, slice_near, slice_far);

    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let mut radius = 0.0f32;
    for corner in corners {
        radius = radius.max(corner.distance(center));
    }
    // A loose upper bound keeps the texel size stable between frames.
    radius = (radius * 16.0).ceil() / 16.0;

    let light_dir = light_dir.normalize();
    let up = math::stable_up(light_dir);

    // Snap the sphere center to the shadow texel grid in light space.
    let texels_per_unit = tile_size as f32 / (radius * 2.0);
    let snap_view = math::look_at(Vec3::ZERO, light_dir, up);
    let mut center_light = snap_view.transform_point3(center);
    center_light.x = (center_light.x * texels_per_unit).floor() / texels_per_unit;
    center_light.y = (center_light.y * texels_per_unit).floor() / texels_per_unit;
    let center = snap_view.inverse().transform_point3(center_light);

    let eye = center - light_dir * radius * 2.0;
    let view = math::look_at(eye, center, up);
    let proj = math::orthographic(-radius, radius, -radius, radius, 0.0, radius * 4.0);

    CascadeFit {
        view_proj: proj * view,
        radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn splits_are_strictly_increasing_and_span_the_range() {
        for count in 1..=6u32 {
            for lambda in [0.0, 0.25, 0.5, 0.75, 1.0] {
                let splits = cascade_splits(0.1, 100.0, count, lambda);
                assert_eq!(splits.len(), count as usize + 1);
                assert_relative_eq!(splits[0], 0.1);
                assert_relative_eq!(*splits.last().unwrap(), 100.0, max_relative = 1e-5);
                for pair in splits.windows(2) {
                    assert!(pair[1] > pair[0], "count={count} lambda={lambda}");
                }
            }
        }
    }

    #[test]
    fn lambda_zero_gives_uniform_splits() {
        let splits = cascade_splits(10.0, 50.0, 4, 0.0);
        assert_eq!(splits, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn lambda_pulls_near_splits_inwards() {
        let uniform = cascade_splits(0.1, 100.0, 4, 0.0);
        let log = cascade_splits(0.1, 100.0, 4, 1.0);
        // Logarithmic splits concentrate resolution close to the camera.
        for i in 1..4 {
            assert!(log[i] < uniform[i]);
        }
    }

    #[test]
    fn cascade_contains_the_frustum_slice() {
        let camera_view = math::look_at(Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO, Vec3::Y);
        let fit = fit_directional_cascade(
            camera_view,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            20.0,
            Vec3::new(-0.4, -1.0, -0.3),
            512,
        );

        let corners =
            math::frustum_slice_corners(camera_view, 60f32.to_radians(), 16.0 / 9.0, 0.1, 20.0);
        for corner in corners {
            let clip = fit.view_proj * corner.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() <= 1.0 + 1e-3, "x out of clip: {ndc:?}");
            assert!(ndc.y.abs() <= 1.0 + 1e-3, "y out of clip: {ndc:?}");
            assert!((-1e-3..=1.0 + 1e-3).contains(&ndc.z), "z out of clip: {ndc:?}");
        }
    }

    #[test]
    fn texel_snap_keeps_projection_stable_under_small_camera_moves() {
        let fov = 60f32.to_radians();
        let dir = Vec3::new(-0.3, -1.0, -0.2);
        let view_a = math::look_at(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
        let fit_a = fit_directional_cascade(view_a, fov, 1.5, 0.1, 25.0, dir, 512);

        // Same setup; the snapped projection size must be identical.
        let fit_b = fit_directional_cascade(view_a, fov, 1.5, 0.1, 25.0, dir, 512);
        assert_eq!(fit_a.radius, fit_b.radius);
        assert_eq!(fit_a.view_proj, fit_b.view_proj);
    }
}
