//! GPU-side data layouts. Every struct here is `repr(C)` and mirrored by a
//! WGSL declaration; the size tests at the bottom pin the ABI.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::scene::Camera3D;

use super::material::Material;
use super::shadow::{MAX_SHADOW_MATRICES, MAX_SHADOW_SLOTS};
use crate::scene::MAX_LIGHTS;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    /// xyz = world position, w unused.
    pub position: [f32; 4],
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera3D) -> Self {
        let view = camera.view();
        let view_proj = camera.view_proj();
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            position: camera.position().extend(1.0).to_array(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct EnvironmentUniform {
    /// x = intensity, y = exposure, z = prefiltered mip count, w = 1 when the
    /// IBL chain is ready to sample.
    pub params: [f32; 4],
    /// Solid-color fallback, linear RGB; w unused.
    pub solid_color: [f32; 4],
}

impl EnvironmentUniform {
    pub fn new(intensity: f32, exposure: f32, prefilter_mips: u32, ibl_ready: bool) -> Self {
        Self {
            params: [
                intensity,
                exposure,
                prefilter_mips as f32,
                if ibl_ready { 1.0 } else { 0.0 },
            ],
            solid_color: [0.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn with_solid_color(mut self, color: [f32; 3]) -> Self {
        self.solid_color = [color[0], color[1], color[2], 1.0];
        self
    }
}

/// Per-draw record in the objects storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ObjectData {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model matrix, for normals under
    /// non-uniform scale.
    pub normal: [[f32; 4]; 4],
    /// x = material index, yzw padding.
    pub material_index: [u32; 4],
}

impl ObjectData {
    pub fn new(model: Mat4, material_index: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            material_index: [material_index, 0, 0, 0],
        }
    }
}

/// Per-material record in the materials storage buffer. Texture bindings are
/// handled by the material bind group; this carries only the factors.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct MaterialData {
    pub base_color: [f32; 4],
    /// x = metallic, y = roughness, z = wrap factor, w = alpha cutoff.
    pub factors: [f32; 4],
    /// xyz = emissive color, w = emissive strength.
    pub emissive: [f32; 4],
    /// MaterialFlags bits.
    pub flags: u32,
    pub normal_scale: f32,
    pub ao_strength: f32,
    pub _pad: u32,
}

impl MaterialData {
    pub fn from_material(material: &Material) -> Self {
        Self {
            base_color: material.base_color,
            factors: [
                material.metallic,
                material.roughness,
                material.wrap_factor,
                material.alpha_cutoff(),
            ],
            emissive: [
                material.emissive[0],
                material.emissive[1],
                material.emissive[2],
                material.emissive_strength,
            ],
            flags: material.flags().bits(),
            normal_scale: material.normal_scale,
            ao_strength: material.ao_strength,
            _pad: 0,
        }
    }
}

/// View-projection bound during a single shadow tile pass.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ShadowViewUniform {
    pub view_proj: [[f32; 4]; 4],
}

pub const LIGHT_KIND_DIRECTIONAL: f32 = 0.0;
pub const LIGHT_KIND_POINT: f32 = 1.0;
pub const LIGHT_KIND_SPOT: f32 = 2.0;

/// One packed light. Shadow slot is -1 when the light has no atlas space.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default)]
pub struct LightRaw {
    /// xyz = position (unused for directional), w = range.
    pub position_range: [f32; 4],
    /// xyz = direction, w = cos(inner angle) for spots.
    pub direction_inner: [f32; 4],
    /// xyz = linear color, w = intensity.
    pub color_intensity: [f32; 4],
    /// x = kind, y = cos(outer angle), z = shadow slot, w unused.
    pub kind_outer_shadow: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct LightsUniform {
    /// x = active light count, yzw padding.
    pub counts: [u32; 4],
    pub lights: [LightRaw; MAX_LIGHTS],
}

impl Default for LightsUniform {
    fn default() -> Self {
        Self {
            counts: [0; 4],
            lights: [LightRaw::default(); MAX_LIGHTS],
        }
    }
}

/// One shadow-casting light's atlas bookkeeping.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default)]
pub struct ShadowSlotRaw {
    /// x = kind, y = first matrix/region index, z = matrix count,
    /// w = light index.
    pub params: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ShadowsUniform {
    pub matrices: [[[f32; 4]; 4]; MAX_SHADOW_MATRICES],
    /// Per tile: xy = uv offset, zw = uv scale inside the atlas.
    pub regions: [[f32; 4]; MAX_SHADOW_MATRICES],
    pub slots: [ShadowSlotRaw; MAX_SHADOW_SLOTS],
    /// Cascade split distances, padded to vec4 stride.
    pub splits: [[f32; 4]; 2],
    /// x = pcf taps, y = atlas texel size, z = fade start, w = fade end.
    pub params0: [f32; 4],
    /// x = cascade blend fraction, y = normal offset, z = cascade count,
    /// w = contact shadows enabled.
    pub params1: [f32; 4],
}

impl Default for ShadowsUniform {
    fn default() -> Self {
        Self {
            matrices: [Mat4::IDENTITY.to_cols_array_2d(); MAX_SHADOW_MATRICES],
            regions: [[0.0; 4]; MAX_SHADOW_MATRICES],
            slots: [ShadowSlotRaw::default(); MAX_SHADOW_SLOTS],
            splits: [[0.0; 4]; 2],
            params0: [1.0, 0.0, 0.0, 0.0],
            params1: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

impl ShadowsUniform {
    pub fn set_splits(&mut self, splits: &[f32]) {
        for (i, &split) in splits.iter().take(8).enumerate() {
            self.splits[i / 4][i % 4] = split;
        }
    }
}

/// Per-instance overlay quad, already converted to clip space.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct OverlayInstance {
    /// xy = clip-space center, zw = clip-space half extents.
    pub rect: [f32; 4],
    pub color: [f32; 4],
    /// x = 1 when a texture is bound, yzw padding.
    pub textured: [u32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::mem::size_of;

    #[test]
    fn uniform_sizes_match_the_wgsl_declarations() {
        assert_eq!(size_of::<CameraUniform>(), 208);
        assert_eq!(size_of::<EnvironmentUniform>(), 32);
        assert_eq!(size_of::<ObjectData>(), 144);
        assert_eq!(size_of::<MaterialData>(), 64);
        assert_eq!(size_of::<LightRaw>(), 64);
        assert_eq!(size_of::<LightsUniform>(), 16 + 64 * MAX_LIGHTS);
        assert_eq!(size_of::<ShadowSlotRaw>(), 16);
        assert_eq!(
            size_of::<ShadowsUniform>(),
            64 * MAX_SHADOW_MATRICES + 16 * MAX_SHADOW_MATRICES + 16 * MAX_SHADOW_SLOTS + 32 + 32
        );
        assert_eq!(size_of::<OverlayInstance>(), 48);
    }

    #[test]
    fn every_gpu_struct_is_16_byte_aligned_in_size() {
        assert_eq!(size_of::<CameraUniform>() % 16, 0);
        assert_eq!(size_of::<LightsUniform>() % 16, 0);
        assert_eq!(size_of::<ShadowsUniform>() % 16, 0);
        assert_eq!(size_of::<ObjectData>() % 16, 0);
        assert_eq!(size_of::<MaterialData>() % 16, 0);
    }

    #[test]
    fn material_scalar_factors_survive_packing() {
        let material = Material {
            normal_scale: 0.5,
            ao_strength: 0.25,
            ..Material::default()
        };
        let data = MaterialData::from_material(&material);
        assert_eq!(data.normal_scale, 0.5);
        assert_eq!(data.ao_strength, 0.25);
    }

    #[test]
    fn solid_color_carries_a_presence_flag() {
        let env = EnvironmentUniform::new(1.0, 1.0, 5, false);
        assert_eq!(env.solid_color[3], 0.0);
        let env = env.with_solid_color([0.2, 0.3, 0.4]);
        assert_eq!(env.solid_color, [0.2, 0.3, 0.4, 1.0]);
    }

    #[test]
    fn splits_pack_into_vec4_rows() {
        let mut uniform = ShadowsUniform::default();
        uniform.set_splits(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(uniform.splits[0], [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(uniform.splits[1][0], 5.0);
    }

    #[test]
    fn normal_matrix_handles_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let data = ObjectData::new(model, 0);
        let normal = Mat4::from_cols_array_2d(&data.normal);
        // A +X normal on a surface stretched along X shrinks, then
        // renormalizes to unit length.
        let n = normal.transform_vector3(Vec3::X).normalize();
        assert!((n - Vec3::X).length() < 1e-5);
    }
}
