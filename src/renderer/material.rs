use std::path::PathBuf;

use bitflags::bitflags;
use serde::Deserialize;

use super::cache::ResourceCache;
use super::texture::Texture;
use super::TextureHandle;

/// Texture slots a material may bind, in bind-group order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureSlot {
    BaseColor = 0,
    MetallicRoughness = 1,
    Normal = 2,
    Occlusion = 3,
    Emissive = 4,
    Wrap = 5,
}

pub const TEXTURE_SLOT_COUNT: usize = 6;

/// Per-slot color-space handling. Base color and emissive are authored in
/// sRGB; everything else is raw data.
pub const SLOT_SCHEMA: [(TextureSlot, bool); TEXTURE_SLOT_COUNT] = [
    (TextureSlot::BaseColor, true),
    (TextureSlot::MetallicRoughness, false),
    (TextureSlot::Normal, false),
    (TextureSlot::Occlusion, false),
    (TextureSlot::Emissive, true),
    (TextureSlot::Wrap, false),
];

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MaterialFlags: u32 {
        const USE_BASE_COLOR_TEXTURE = 1 << 0;
        const USE_METALLIC_ROUGHNESS_TEXTURE = 1 << 1;
        const USE_NORMAL_TEXTURE = 1 << 2;
        const USE_OCCLUSION_TEXTURE = 1 << 3;
        const USE_EMISSIVE_TEXTURE = 1 << 4;
        const USE_WRAP_TEXTURE = 1 << 5;
        const ALPHA_MASK = 1 << 6;
        const ALPHA_BLEND = 1 << 7;
        const DOUBLE_SIDED = 1 << 8;
        const UNLIT = 1 << 9;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AlphaMode {
    Opaque,
    /// Discard fragments whose alpha falls below the cutoff.
    Mask { cutoff: f32 },
    Blend,
}

#[derive(Clone, Copy)]
pub struct Material {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    /// Multiplier on the tangent-space normal map before renormalizing.
    pub normal_scale: f32,
    /// 0 ignores the baked occlusion texture, 1 applies it fully.
    pub ao_strength: f32,
    pub emissive: [f32; 3],
    pub emissive_strength: f32,
    pub wrap_factor: f32,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    pub unlit: bool,
    pub textures: [Option<TextureHandle>; TEXTURE_SLOT_COUNT],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 0.5,
            normal_scale: 1.0,
            ao_strength: 1.0,
            emissive: [0.0, 0.0, 0.0],
            emissive_strength: 0.0,
            wrap_factor: 0.0,
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
            unlit: false,
            textures: [None; TEXTURE_SLOT_COUNT],
        }
    }
}

impl Material {
    pub fn new(base_color: [f32; 4]) -> Self {
        Self {
            base_color,
            ..Self::default()
        }
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_emissive(mut self, color: [f32; 3], strength: f32) -> Self {
        self.emissive = color;
        self.emissive_strength = strength.max(0.0);
        self
    }

    pub fn with_alpha_mode(mut self, mode: AlphaMode) -> Self {
        self.alpha_mode = mode;
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot, handle: TextureHandle) -> Self {
        self.textures[slot as usize] = Some(handle);
        self
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        self.textures[slot as usize]
    }

    pub fn flags(&self) -> MaterialFlags {
        let mut flags = MaterialFlags::empty();
        let texture_flags = [
            MaterialFlags::USE_BASE_COLOR_TEXTURE,
            MaterialFlags::USE_METALLIC_ROUGHNESS_TEXTURE,
            MaterialFlags::USE_NORMAL_TEXTURE,
            MaterialFlags::USE_OCCLUSION_TEXTURE,
            MaterialFlags::USE_EMISSIVE_TEXTURE,
            MaterialFlags::USE_WRAP_TEXTURE,
        ];
        for (slot, flag) in self.textures.iter().zip(texture_flags) {
            if slot.is_some() {
                flags |= flag;
            }
        }
        match self.alpha_mode {
            AlphaMode::Opaque => {}
            AlphaMode::Mask { .. } => flags |= MaterialFlags::ALPHA_MASK,
            AlphaMode::Blend => flags |= MaterialFlags::ALPHA_BLEND,
        }
        if self.double_sided {
            flags |= MaterialFlags::DOUBLE_SIDED;
        }
        if self.unlit {
            flags |= MaterialFlags::UNLIT;
        }
        flags
    }

    pub fn alpha_cutoff(&self) -> f32 {
        match self.alpha_mode {
            AlphaMode::Mask { cutoff } => cutoff,
            _ => 0.0,
        }
    }

    /// Blended materials render after the opaque pass, back to front.
    pub fn requires_separate_pass(&self) -> bool {
        matches!(self.alpha_mode, AlphaMode::Blend)
    }

    /// Drop this material's texture references.
    pub fn release(&self, textures: &mut ResourceCache<PathBuf, Texture>) {
        for handle in self.textures.into_iter().flatten() {
            textures.release(handle);
        }
    }
}

/// On-disk material description, deserialized from JSON.
#[derive(Debug, Deserialize)]
pub struct MaterialDescriptor {
    #[serde(default = "default_base_color")]
    pub base_color: [f32; 4],
    #[serde(default)]
    pub metallic: f32,
    #[serde(default = "default_roughness")]
    pub roughness: f32,
    #[serde(default = "default_unit")]
    pub normal_scale: f32,
    #[serde(default = "default_unit")]
    pub ao_strength: f32,
    #[serde(default)]
    pub emissive: [f32; 3],
    #[serde(default)]
    pub emissive_strength: f32,
    /// When absent the renderer-wide wrap factor applies.
    #[serde(default)]
    pub wrap_factor: Option<f32>,
    #[serde(default)]
    pub alpha_cutoff: Option<f32>,
    #[serde(default)]
    pub alpha_blend: bool,
    #[serde(default)]
    pub double_sided: bool,
    #[serde(default)]
    pub unlit: bool,
    #[serde(default)]
    pub base_color_texture: Option<PathBuf>,
    #[serde(default)]
    pub metallic_roughness_texture: Option<PathBuf>,
    #[serde(default)]
    pub normal_texture: Option<PathBuf>,
    #[serde(default)]
    pub occlusion_texture: Option<PathBuf>,
    #[serde(default)]
    pub emissive_texture: Option<PathBuf>,
    #[serde(default)]
    pub wrap_texture: Option<PathBuf>,
}

fn default_base_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn default_roughness() -> f32 {
    0.5
}

fn default_unit() -> f32 {
    1.0
}

impl MaterialDescriptor {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse material: {e}"))
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        if self.alpha_blend {
            AlphaMode::Blend
        } else if let Some(cutoff) = self.alpha_cutoff {
            AlphaMode::Mask { cutoff }
        } else {
            AlphaMode::Opaque
        }
    }

    /// Per-material wrap factor, or the renderer-wide default when absent.
    pub fn wrap_factor_or(&self, default: f32) -> f32 {
        self.wrap_factor.unwrap_or(default).clamp(0.0, 1.0)
    }

    pub fn texture_path(&self, slot: TextureSlot) -> Option<&PathBuf> {
        match slot {
            TextureSlot::BaseColor => self.base_color_texture.as_ref(),
            TextureSlot::MetallicRoughness => self.metallic_roughness_texture.as_ref(),
            TextureSlot::Normal => self.normal_texture.as_ref(),
            TextureSlot::Occlusion => self.occlusion_texture.as_ref(),
            TextureSlot::Emissive => self.emissive_texture.as_ref(),
            TextureSlot::Wrap => self.wrap_texture.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::cache::Handle;

    #[test]
    fn flags_reflect_bound_textures_and_alpha_mode() {
        let material = Material::default()
            .with_texture(TextureSlot::BaseColor, Handle::new(0))
            .with_texture(TextureSlot::Normal, Handle::new(1))
            .with_alpha_mode(AlphaMode::Mask { cutoff: 0.4 });

        let flags = material.flags();
        assert!(flags.contains(MaterialFlags::USE_BASE_COLOR_TEXTURE));
        assert!(flags.contains(MaterialFlags::USE_NORMAL_TEXTURE));
        assert!(flags.contains(MaterialFlags::ALPHA_MASK));
        assert!(!flags.contains(MaterialFlags::ALPHA_BLEND));
        assert_eq!(material.alpha_cutoff(), 0.4);
    }

    #[test]
    fn only_blended_materials_use_the_separate_pass() {
        assert!(!Material::default().requires_separate_pass());
        assert!(!Material::default()
            .with_alpha_mode(AlphaMode::Mask { cutoff: 0.5 })
            .requires_separate_pass());
        assert!(Material::default()
            .with_alpha_mode(AlphaMode::Blend)
            .requires_separate_pass());
    }

    #[test]
    fn descriptor_defaults_are_sensible() {
        let desc = MaterialDescriptor::from_json("{}").unwrap();
        assert_eq!(desc.base_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(desc.roughness, 0.5);
        assert_eq!(desc.normal_scale, 1.0);
        assert_eq!(desc.ao_strength, 1.0);
        assert_eq!(desc.alpha_mode(), AlphaMode::Opaque);
    }

    #[test]
    fn descriptor_scalar_factors_parse() {
        let desc =
            MaterialDescriptor::from_json(r#"{ "normal_scale": 0.5, "ao_strength": 0.2 }"#)
                .unwrap();
        assert_eq!(desc.normal_scale, 0.5);
        assert_eq!(desc.ao_strength, 0.2);
    }

    #[test]
    fn wrap_factor_falls_back_to_the_renderer_default() {
        let desc = MaterialDescriptor::from_json("{}").unwrap();
        assert_eq!(desc.wrap_factor_or(0.25), 0.25);

        let desc = MaterialDescriptor::from_json(r#"{ "wrap_factor": 0.6 }"#).unwrap();
        assert_eq!(desc.wrap_factor_or(0.25), 0.6);

        let desc = MaterialDescriptor::from_json(r#"{ "wrap_factor": 3.0 }"#).unwrap();
        assert_eq!(desc.wrap_factor_or(0.25), 1.0);
    }

    #[test]
    fn descriptor_alpha_mode_resolution() {
        let masked =
            MaterialDescriptor::from_json(r#"{ "alpha_cutoff": 0.3 }"#).unwrap();
        assert_eq!(masked.alpha_mode(), AlphaMode::Mask { cutoff: 0.3 });

        // Blend wins when both are present.
        let both =
            MaterialDescriptor::from_json(r#"{ "alpha_cutoff": 0.3, "alpha_blend": true }"#)
                .unwrap();
        assert_eq!(both.alpha_mode(), AlphaMode::Blend);
    }
}
