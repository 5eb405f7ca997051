use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Where the environment comes from.
#[derive(Clone, Debug)]
pub enum SkyboxSource {
    /// Six face images in +X, -X, +Y, -Y, +Z, -Z order.
    Cubemap { faces: [PathBuf; 6] },
    /// One equirectangular image, reprojected onto a cubemap.
    Equirect { path: PathBuf },
    /// Flat color, linear RGB.
    SolidColor([f32; 3]),
}

#[derive(Clone, Debug)]
pub struct Skybox {
    pub source: SkyboxSource,
    pub intensity: f32,
}

impl Skybox {
    pub fn new(source: SkyboxSource) -> Self {
        Self {
            source,
            intensity: 1.0,
        }
    }

    /// Identity of the source material. IBL artifacts are regenerated only
    /// when this changes; intensity tweaks do not invalidate them.
    pub fn source_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match &self.source {
            SkyboxSource::Cubemap { faces } => {
                0u8.hash(&mut hasher);
                for face in faces {
                    face.hash(&mut hasher);
                }
            }
            SkyboxSource::Equirect { path } => {
                1u8.hash(&mut hasher);
                path.hash(&mut hasher);
            }
            SkyboxSource::SolidColor(color) => {
                2u8.hash(&mut hasher);
                for channel in color {
                    channel.to_bits().hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_tracks_the_source_not_the_intensity() {
        let mut a = Skybox::new(SkyboxSource::SolidColor([0.1, 0.2, 0.3]));
        let key = a.source_key();
        a.intensity = 4.0;
        assert_eq!(key, a.source_key());

        let b = Skybox::new(SkyboxSource::SolidColor([0.1, 0.2, 0.4]));
        assert_ne!(key, b.source_key());
    }
}
