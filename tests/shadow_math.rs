//! CPU checks for the shadow system: cascade fitting, atlas UV mapping and
//! the caster drop policy, driven through the public planning API.
//!
//! Conventions used in this codebase:
//! - Right-handed view space (camera looks down -Z).
//! - Clip/NDC depth range is [0, 1] (wgpu/D3D).
//! - Atlas UVs have origin at top-left (v = 0 at top, v = 1 at bottom).

use glam::{Mat4, Vec2, Vec3};

use radiance::math;
use radiance::renderer::lights::build_lights_uniform;
use radiance::renderer::shadow::{
    cascades, plan_shadows, AtlasLayout, ShadowKind, MAX_SHADOW_MATRICES,
};
use radiance::scene::{Camera3D, Light, LightSet};
use radiance::settings::RenderSettings;

const LIGHT_DIR: Vec3 = Vec3::new(-0.4, -1.0, -0.3);

fn project(matrix: Mat4, world: Vec3) -> Option<Vec3> {
    let clip = matrix * world.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    Some(clip.truncate() / clip.w)
}

fn ndc_to_tile_uv(ndc: Vec3) -> Vec2 {
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

fn camera() -> Camera3D {
    Camera3D::new(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO)
}

fn fit_first_cascade(camera: &Camera3D, settings: &RenderSettings) -> cascades::CascadeFit {
    let splits = cascades::cascade_splits(
        camera.near(),
        camera.far().min(settings.shadow_fade_end),
        settings.cascade_count,
        settings.cascade_lambda,
    );
    cascades::fit_directional_cascade(
        camera.view(),
        camera.fov_y(),
        camera.aspect(),
        splits[0],
        splits[1],
        LIGHT_DIR,
        settings.shadow_tile_size,
    )
}

fn directional(intensity: f32) -> Light {
    Light::Directional {
        direction: LIGHT_DIR,
        color: Vec3::ONE,
        intensity,
        cast_shadows: true,
    }
}

fn point(position: Vec3, intensity: f32) -> Light {
    Light::Point {
        position,
        color: Vec3::ONE,
        intensity,
        range: 12.0,
        cast_shadows: true,
    }
}

fn spot(position: Vec3, intensity: f32) -> Light {
    Light::Spot {
        position,
        direction: Vec3::NEG_Y,
        color: Vec3::ONE,
        intensity,
        range: 15.0,
        inner_angle: 0.4,
        outer_angle: 0.6,
        cast_shadows: true,
    }
}

#[test]
fn first_cascade_covers_its_entire_frustum_slice() {
    let camera = camera();
    let settings = RenderSettings::default();
    let fit = fit_first_cascade(&camera, &settings);

    let splits = cascades::cascade_splits(
        camera.near(),
        camera.far().min(settings.shadow_fade_end),
        settings.cascade_count,
        settings.cascade_lambda,
    );
    let corners =
        math::frustum_slice_corners(camera.view(), camera.fov_y(), camera.aspect(), splits[0], splits[1]);

    // Texel snapping may shift the projection by up to one shadow texel.
    let slack = 2.0 / settings.shadow_tile_size as f32;
    for corner in corners {
        let ndc = project(fit.view_proj, corner).expect("slice corner in front of the light");
        assert!(ndc.x.abs() <= 1.0 + slack, "x out of tile: {ndc:?}");
        assert!(ndc.y.abs() <= 1.0 + slack, "y out of tile: {ndc:?}");
        assert!((0.0..=1.0).contains(&ndc.z), "depth out of range: {ndc:?}");
    }
}

#[test]
fn cascade_keeps_depth_range_for_casters_above_the_slice() {
    // A roof one bounding-sphere radius towards the light must still land in
    // [0, 1] depth, otherwise geometry above the view frustum stops shadowing
    // the ground below it.
    let camera = camera();
    let settings = RenderSettings::default();
    let fit = fit_first_cascade(&camera, &settings);

    let ground = Vec3::new(0.0, 0.0, 4.0);
    let caster = ground - LIGHT_DIR.normalize() * fit.radius;
    let ndc = project(fit.view_proj, caster).expect("caster in front of the light");
    assert!(ndc.z >= 0.0, "caster clipped by the light near plane: {ndc:?}");
    assert!(ndc.z <= 1.0);

    let ground_ndc = project(fit.view_proj, ground).unwrap();
    assert!(
        ndc.z < ground_ndc.z,
        "the caster must be closer to the light than the ground"
    );
}

#[test]
fn cascade_footprint_is_rotation_invariant() {
    // The fit uses the slice bounding sphere, so spinning the camera in place
    // must not change the projected area (which would make texel density and
    // bias behave differently per view direction).
    let settings = RenderSettings::default();
    let eye = Vec3::new(0.0, 2.0, 8.0);

    let reference = fit_first_cascade(&Camera3D::new(eye, Vec3::ZERO), &settings);
    for yaw_deg in [30.0f32, 90.0, 145.0, 260.0] {
        let yaw = yaw_deg.to_radians();
        let target = eye + Vec3::new(yaw.sin(), -0.2, -yaw.cos());
        let fit = fit_first_cascade(&Camera3D::new(eye, target), &settings);
        assert_eq!(
            fit.radius.to_bits(),
            reference.radius.to_bits(),
            "radius changed at yaw {yaw_deg}"
        );
    }
}

#[test]
fn cascade_origin_moves_in_whole_texel_steps() {
    // Sub-texel camera movement must not move the shadow-map origin, or the
    // shadow edges shimmer. A fixed world point therefore projects to UVs
    // that differ by (near) whole texels between the two fits.
    let settings = RenderSettings::default();
    let fit_a = fit_first_cascade(&Camera3D::new(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO), &settings);
    let fit_b = fit_first_cascade(
        &Camera3D::new(Vec3::new(0.037, 2.0, 8.011), Vec3::new(0.037, 0.0, 0.011)),
        &settings,
    );
    assert_eq!(fit_a.radius.to_bits(), fit_b.radius.to_bits());

    let probe = Vec3::new(0.5, 0.0, 3.0);
    let uv_a = ndc_to_tile_uv(project(fit_a.view_proj, probe).unwrap());
    let uv_b = ndc_to_tile_uv(project(fit_b.view_proj, probe).unwrap());
    let texels = (uv_a - uv_b) * settings.shadow_tile_size as f32;

    for delta in [texels.x, texels.y] {
        let frac = (delta - delta.round()).abs();
        assert!(frac < 1e-2, "origin moved a fraction of a texel: {texels:?}");
    }
}

#[test]
fn granted_tiles_sample_inside_their_atlas_region() {
    let camera = camera();
    let settings = RenderSettings::default();
    let layout = AtlasLayout::new(settings.shadow_atlas_size, settings.shadow_tile_size);

    let mut lights = LightSet::new();
    lights.add(directional(1.0));
    lights.add(spot(Vec3::new(2.0, 6.0, 0.0), 3.0));
    let plan = plan_shadows(&lights, &camera, &settings, &layout);

    let probe = Vec3::new(0.5, 0.0, 2.0);
    for assignment in &plan.assignments {
        for (offset, matrix) in assignment.matrices.iter().enumerate() {
            let Some(ndc) = project(*matrix, probe) else {
                continue;
            };
            if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 {
                continue;
            }
            let tile = assignment.first_tile + offset as u32;
            let [u0, v0, su, sv] = layout.region(tile).uv_offset_scale;
            let uv = ndc_to_tile_uv(ndc);
            let atlas_u = u0 + uv.x * su;
            let atlas_v = v0 + uv.y * sv;
            assert!((u0..=u0 + su).contains(&atlas_u));
            assert!((v0..=v0 + sv).contains(&atlas_v));
        }
    }
}

#[test]
fn point_casters_beyond_the_matrix_budget_are_dropped_dimmest_first() {
    // Eight point casters want 48 matrices; only 32 exist, so the five
    // brightest are granted and the other three render unshadowed.
    let mut lights = LightSet::new();
    for i in 0..8 {
        lights.add(point(Vec3::new(i as f32 * 2.0, 2.0, 0.0), 8.0 - i as f32));
    }
    let settings = RenderSettings::default();
    let layout = AtlasLayout::new(settings.shadow_atlas_size, settings.shadow_tile_size);

    let plan = plan_shadows(&lights, &camera(), &settings, &layout);
    assert_eq!(plan.assignments.len(), 5);
    assert_eq!(plan.dropped, 3);
    assert!(plan.total_tiles() as usize <= MAX_SHADOW_MATRICES);

    // Lights 0..5 are the brightest and keep their grants.
    let granted: Vec<usize> = plan.assignments.iter().map(|a| a.light_index).collect();
    assert_eq!(granted, vec![0, 1, 2, 3, 4]);
}

#[test]
fn eight_spot_casters_each_get_one_slot() {
    let mut lights = LightSet::new();
    for i in 0..8 {
        assert!(lights.add(spot(Vec3::new(i as f32, 5.0, 0.0), 1.0 + i as f32)));
    }
    let settings = RenderSettings::default();
    let layout = AtlasLayout::new(settings.shadow_atlas_size, settings.shadow_tile_size);

    let plan = plan_shadows(&lights, &camera(), &settings, &layout);
    assert_eq!(plan.assignments.len(), 8);
    assert_eq!(plan.dropped, 0);
    assert!(plan
        .assignments
        .iter()
        .all(|a| a.kind == ShadowKind::Spot && a.tile_count() == 1));
}

#[test]
fn small_atlas_drops_the_overflowing_caster() {
    // Four tiles total: the directional light's four cascades fill the atlas
    // and the spot light is turned away.
    let mut lights = LightSet::new();
    lights.add(directional(1.0));
    lights.add(spot(Vec3::new(0.0, 5.0, 0.0), 50.0));
    let settings = RenderSettings::default();
    let layout = AtlasLayout::new(1024, 512);
    assert_eq!(layout.capacity(), 4);

    let plan = plan_shadows(&lights, &camera(), &settings, &layout);
    assert_eq!(plan.assignments.len(), 1);
    assert_eq!(plan.assignments[0].kind, ShadowKind::Directional);
    assert_eq!(plan.dropped, 1);
}

#[test]
fn lights_uniform_routes_shadow_slots() {
    let mut lights = LightSet::new();
    lights.add(point(Vec3::new(0.0, 2.0, 0.0), 1.0));
    lights.add(directional(1.0));
    lights.add(Light::Point {
        position: Vec3::new(3.0, 2.0, 0.0),
        color: Vec3::ONE,
        intensity: 1.0,
        range: 10.0,
        cast_shadows: false,
    });
    let settings = RenderSettings::default();
    let layout = AtlasLayout::new(settings.shadow_atlas_size, settings.shadow_tile_size);
    let plan = plan_shadows(&lights, &camera(), &settings, &layout);

    let uniform = build_lights_uniform(&lights, &plan);
    assert_eq!(uniform.counts[0], 3);
    // The directional light ranks first and owns slot 0; the casting point
    // light gets slot 1; the non-caster carries the no-shadow sentinel.
    assert_eq!(uniform.lights[1].kind_outer_shadow[2], 0.0);
    assert_eq!(uniform.lights[0].kind_outer_shadow[2], 1.0);
    assert_eq!(uniform.lights[2].kind_outer_shadow[2], -1.0);
}
