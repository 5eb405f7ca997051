//! Packing of scene lights and the shadow plan into their GPU layouts.

use crate::scene::{Light, LightSet, MAX_LIGHTS};
use crate::settings::RenderSettings;

use super::shadow::{AtlasLayout, ShadowPlan};
use super::uniforms::{
    LightRaw, LightsUniform, ShadowSlotRaw, ShadowsUniform, LIGHT_KIND_DIRECTIONAL,
    LIGHT_KIND_POINT, LIGHT_KIND_SPOT,
};

const NO_SHADOW_SLOT: f32 = -1.0;

fn pack_light(light: &Light, shadow_slot: f32) -> LightRaw {
    match *light {
        Light::Directional {
            direction,
            color,
            intensity,
            ..
        } => LightRaw {
            position_range: [0.0, 0.0, 0.0, 0.0],
            direction_inner: [direction.x, direction.y, direction.z, 0.0],
            color_intensity: [color.x, color.y, color.z, intensity],
            kind_outer_shadow: [LIGHT_KIND_DIRECTIONAL, 0.0, shadow_slot, 0.0],
        },
        Light::Point {
            position,
            color,
            intensity,
            range,
            ..
        } => LightRaw {
            position_range: [position.x, position.y, position.z, range],
            direction_inner: [0.0, 0.0, 0.0, 0.0],
            color_intensity: [color.x, color.y, color.z, intensity],
            kind_outer_shadow: [LIGHT_KIND_POINT, 0.0, shadow_slot, 0.0],
        },
        Light::Spot {
            position,
            direction,
            color,
            intensity,
            range,
            inner_angle,
            outer_angle,
            ..
        } => LightRaw {
            position_range: [position.x, position.y, position.z, range],
            direction_inner: [direction.x, direction.y, direction.z, inner_angle.cos()],
            color_intensity: [color.x, color.y, color.z, intensity],
            kind_outer_shadow: [LIGHT_KIND_SPOT, outer_angle.cos(), shadow_slot, 0.0],
        },
    }
}

pub fn build_lights_uniform(lights: &LightSet, plan: &ShadowPlan) -> LightsUniform {
    let mut uniform = LightsUniform::default();
    let count = lights.len().min(MAX_LIGHTS);
    uniform.counts[0] = count as u32;

    for (i, light) in lights.lights().iter().take(MAX_LIGHTS).enumerate() {
        let slot = plan
            .assignments
            .iter()
            .position(|a| a.light_index == i)
            .map_or(NO_SHADOW_SLOT, |slot| slot as f32);
        uniform.lights[i] = pack_light(light, slot);
    }
    uniform
}

pub fn build_shadows_uniform(
    plan: &ShadowPlan,
    layout: &AtlasLayout,
    settings: &RenderSettings,
    contact_shadows: bool,
) -> ShadowsUniform {
    let mut uniform = ShadowsUniform::default();

    for (slot_index, assignment) in plan.assignments.iter().enumerate() {
        uniform.slots[slot_index] = ShadowSlotRaw {
            params: [
                assignment.kind.encoded(),
                assignment.first_tile,
                assignment.tile_count(),
                assignment.light_index as u32,
            ],
        };
        for (offset, matrix) in assignment.matrices.iter().enumerate() {
            let tile = assignment.first_tile as usize + offset;
            uniform.matrices[tile] = matrix.to_cols_array_2d();
            uniform.regions[tile] = layout.region(tile as u32).uv_offset_scale;
        }
    }

    uniform.set_splits(&plan.splits);
    uniform.params0 = [
        settings.pcf_kernel.taps() as f32,
        layout.texel_size(),
        settings.shadow_fade_start,
        settings.shadow_fade_end,
    ];
    uniform.params1 = [
        settings.cascade_blend,
        settings.normal_offset,
        settings.cascade_count as f32,
        if contact_shadows { 1.0 } else { 0.0 },
    ];
    uniform
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Camera3D;
    use glam::Vec3;

    fn scene() -> (LightSet, Camera3D, RenderSettings, AtlasLayout) {
        let mut lights = LightSet::new();
        lights.add(Light::Directional {
            direction: Vec3::new(-0.3, -1.0, -0.2),
            color: Vec3::ONE,
            intensity: 2.0,
            cast_shadows: true,
        });
        lights.add(Light::Point {
            position: Vec3::new(2.0, 1.0, 0.0),
            color: Vec3::new(1.0, 0.5, 0.2),
            intensity: 5.0,
            range: 12.0,
            cast_shadows: false,
        });
        (
            lights,
            Camera3D::new(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO),
            RenderSettings::default(),
            AtlasLayout::new(4096, 512),
        )
    }

    #[test]
    fn shadow_slot_is_minus_one_for_unshadowed_lights() {
        let (lights, camera, settings, layout) = scene();
        let plan = crate::renderer::shadow::plan_shadows(&lights, &camera, &settings, &layout);
        let uniform = build_lights_uniform(&lights, &plan);

        assert_eq!(uniform.counts[0], 2);
        assert_eq!(uniform.lights[0].kind_outer_shadow[2], 0.0);
        assert_eq!(uniform.lights[1].kind_outer_shadow[2], -1.0);
    }

    #[test]
    fn spot_angles_are_packed_as_cosines() {
        let light = Light::Spot {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
            cast_shadows: false,
        };
        let raw = pack_light(&light, NO_SHADOW_SLOT);
        assert!((raw.direction_inner[3] - 0.3f32.cos()).abs() < 1e-6);
        assert!((raw.kind_outer_shadow[1] - 0.5f32.cos()).abs() < 1e-6);
    }

    #[test]
    fn shadows_uniform_mirrors_the_plan() {
        let (lights, camera, settings, layout) = scene();
        let plan = crate::renderer::shadow::plan_shadows(&lights, &camera, &settings, &layout);
        let uniform = build_shadows_uniform(&plan, &layout, &settings, true);

        // One directional caster: slot 0 holds 4 cascades from tile 0.
        assert_eq!(uniform.slots[0].params, [0, 0, 4, 0]);
        assert_eq!(uniform.params1[2], 4.0);
        assert_eq!(uniform.params1[3], 1.0);
        // Region for tile 1 sits one tile to the right.
        assert_eq!(uniform.regions[1][0], 512.0 / 4096.0);
    }
}
