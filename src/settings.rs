use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Percentage-closer filtering kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcfKernel {
    Single,
    Box3,
    Poisson5,
}

impl PcfKernel {
    /// Tap count encoded into the shadow uniform.
    pub fn taps(self) -> u32 {
        match self {
            PcfKernel::Single => 1,
            PcfKernel::Box3 => 9,
            PcfKernel::Poisson5 => 25,
        }
    }
}

impl Default for PcfKernel {
    fn default() -> Self {
        PcfKernel::Box3
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,

    // Shadow atlas.
    #[serde(default = "RenderSettings::default_shadow_atlas_size")]
    pub shadow_atlas_size: u32,
    #[serde(default = "RenderSettings::default_shadow_tile_size")]
    pub shadow_tile_size: u32,

    // Cascaded shadow maps.
    #[serde(default = "RenderSettings::default_cascade_count")]
    pub cascade_count: u32,
    /// 0 = linear split distribution, 1 = logarithmic.
    #[serde(default = "RenderSettings::default_cascade_lambda")]
    pub cascade_lambda: f32,
    /// Fraction of a cascade band over which neighbouring cascades blend.
    #[serde(default = "RenderSettings::default_cascade_blend")]
    pub cascade_blend: f32,

    // Depth bias.
    #[serde(default = "RenderSettings::default_depth_bias_constant")]
    pub depth_bias_constant: i32,
    #[serde(default = "RenderSettings::default_depth_bias_slope")]
    pub depth_bias_slope: f32,
    /// World-space offset along the geometric normal before the depth compare.
    #[serde(default = "RenderSettings::default_normal_offset")]
    pub normal_offset: f32,

    #[serde(default)]
    pub pcf_kernel: PcfKernel,

    // Shadow distance fade.
    #[serde(default = "RenderSettings::default_shadow_fade_start")]
    pub shadow_fade_start: f32,
    #[serde(default = "RenderSettings::default_shadow_fade_end")]
    pub shadow_fade_end: f32,

    // Screen-space contact shadows.
    #[serde(default = "RenderSettings::default_contact_shadow_steps")]
    pub contact_shadow_steps: u32,
    #[serde(default = "RenderSettings::default_contact_shadow_distance")]
    pub contact_shadow_distance: f32,
    #[serde(default = "RenderSettings::default_contact_shadow_thickness")]
    pub contact_shadow_thickness: f32,

    // Shading.
    #[serde(default = "RenderSettings::default_exposure")]
    pub exposure: f32,
    /// Wrap-lighting factor softening the lit/unlit terminator.
    #[serde(default)]
    pub wrap_factor: f32,

    // Texture cache budget.
    #[serde(default = "RenderSettings::default_max_texture_bytes")]
    pub max_texture_bytes: u64,
    #[serde(default = "RenderSettings::default_max_textures")]
    pub max_textures: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty settings object must deserialize")
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if self.shadow_atlas_size == 0 || self.shadow_tile_size == 0 {
            warn!("Shadow atlas/tile size must be greater than zero. Using defaults.");
            self.shadow_atlas_size = Self::default_shadow_atlas_size();
            self.shadow_tile_size = Self::default_shadow_tile_size();
        }

        if self.shadow_tile_size > self.shadow_atlas_size {
            warn!(
                "Shadow tile size {} exceeds atlas size {}. Clamping.",
                self.shadow_tile_size, self.shadow_atlas_size
            );
            self.shadow_tile_size = self.shadow_atlas_size;
        }

        if self.cascade_count == 0 {
            warn!("Cascade count must be at least 1. Using default.");
            self.cascade_count = Self::default_cascade_count();
        }

        self.cascade_lambda = self.cascade_lambda.clamp(0.0, 1.0);
        self.cascade_blend = self.cascade_blend.clamp(0.0, 0.5);

        if self.shadow_fade_end <= self.shadow_fade_start {
            warn!("Shadow fade end must exceed fade start. Using defaults.");
            self.shadow_fade_start = Self::default_shadow_fade_start();
            self.shadow_fade_end = Self::default_shadow_fade_end();
        }

        if self.contact_shadow_steps == 0 {
            self.contact_shadow_steps = Self::default_contact_shadow_steps();
        }

        self.exposure = self.exposure.max(0.0);
        self.wrap_factor = self.wrap_factor.clamp(0.0, 1.0);

        self
    }

    /// Tiles available in the shadow atlas.
    pub fn atlas_tile_capacity(&self) -> u32 {
        let per_row = self.shadow_atlas_size / self.shadow_tile_size.max(1);
        per_row * per_row
    }

    const fn default_shadow_atlas_size() -> u32 {
        4096
    }

    const fn default_shadow_tile_size() -> u32 {
        512
    }

    const fn default_cascade_count() -> u32 {
        4
    }

    const fn default_cascade_lambda() -> f32 {
        0.5
    }

    const fn default_cascade_blend() -> f32 {
        0.1
    }

    const fn default_depth_bias_constant() -> i32 {
        2
    }

    const fn default_depth_bias_slope() -> f32 {
        2.0
    }

    const fn default_normal_offset() -> f32 {
        0.02
    }

    const fn default_shadow_fade_start() -> f32 {
        80.0
    }

    const fn default_shadow_fade_end() -> f32 {
        100.0
    }

    const fn default_contact_shadow_steps() -> u32 {
        16
    }

    const fn default_contact_shadow_distance() -> f32 {
        0.3
    }

    const fn default_contact_shadow_thickness() -> f32 {
        0.05
    }

    const fn default_exposure() -> f32 {
        1.0
    }

    const fn default_max_texture_bytes() -> u64 {
        256 * 1024 * 1024
    }

    const fn default_max_textures() -> usize {
        256
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

impl Default for PresentModeSetting {
    fn default() -> Self {
        PresentModeSetting::Fifo
    }
}

impl RenderSettings {
    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = RenderSettings::default().validate();
        assert_eq!(settings.cascade_count, 4);
        assert_eq!(settings.pcf_kernel, PcfKernel::Box3);
        assert!(settings.shadow_fade_end > settings.shadow_fade_start);
        assert_eq!(settings.atlas_tile_capacity(), 64);
    }

    #[test]
    fn validate_replaces_invalid_values() {
        let mut settings = RenderSettings::default();
        settings.cascade_count = 0;
        settings.cascade_lambda = 7.0;
        settings.shadow_tile_size = 1 << 20;
        let validated = settings.validate();
        assert_eq!(validated.cascade_count, 4);
        assert_eq!(validated.cascade_lambda, 1.0);
        assert_eq!(validated.shadow_tile_size, validated.shadow_atlas_size);
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];
        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn unknown_fields_do_not_reset_everything() {
        let parsed: RenderSettings =
            serde_json::from_str(r#"{"cascade_count": 2, "exposure": 1.5}"#).unwrap();
        assert_eq!(parsed.cascade_count, 2);
        assert_eq!(parsed.exposure, 1.5);
        assert_eq!(parsed.shadow_atlas_size, 4096);
    }
}
