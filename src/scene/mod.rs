//! Scene-side data model: what the external scene layer hands the renderer
//! each frame.

pub mod camera;
pub mod light;
pub mod node;
pub mod skybox;

pub use camera::Camera3D;
pub use light::{Light, LightSet, MAX_LIGHTS};
pub use node::{DrawItem, MeshNode, Transform};
pub use skybox::{Skybox, SkyboxSource};

use glam::Mat4;

use crate::renderer::{Assets, TextureHandle};

/// One quad of the pass-through 2D overlay draw list, in surface pixels.
#[derive(Clone, Copy)]
pub struct OverlayQuad {
    /// x, y, width, height.
    pub rect: [f32; 4],
    pub color: [f32; 4],
    pub texture: Option<TextureHandle>,
}

/// Everything the renderer consumes for one frame.
#[derive(Default)]
pub struct SceneSnapshot {
    pub camera: Option<Camera3D>,
    pub roots: Vec<MeshNode>,
    pub lights: LightSet,
    pub skybox: Option<Skybox>,
    pub overlay: Vec<OverlayQuad>,
}

impl SceneSnapshot {
    /// Flatten the node tree into an ordered drawable list. The order is
    /// parent-before-child in insertion order, so it is deterministic for a
    /// given scene state and blending results are reproducible.
    pub fn flatten(&self) -> Vec<DrawItem> {
        let mut items = Vec::new();
        for root in &self.roots {
            root.flatten_into(Mat4::IDENTITY, &mut items);
        }
        items
    }

    /// Release every mesh and material-texture reference held by this scene.
    /// Called on scene unload so cache entries become evictable promptly.
    pub fn release(&self, assets: &mut Assets) {
        for item in self.flatten() {
            assets.meshes.release(item.mesh);
            item.material.release(&mut assets.textures);
        }
    }
}
