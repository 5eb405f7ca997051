pub mod buffers;
pub mod cache;
pub mod context;
pub mod ibl;
pub mod lights;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod overlay;
pub mod pipeline;
pub mod pipeline_builder;
pub mod prepass;
pub mod primitives;
pub mod renderer;
pub mod shadow;
pub mod texture;
pub mod uniforms;
pub mod vertex;

pub use cache::{CacheLimits, Handle, ResourceCache};
pub use material::{AlphaMode, Material, MaterialDescriptor, MaterialFlags, TextureSlot};
pub use mesh::Mesh;
pub use primitives::PrimitiveKind;
pub use renderer::Renderer;
pub use texture::Texture;
pub use vertex::Vertex;

use std::path::PathBuf;

use crate::settings::RenderSettings;

use loader::TextureLoader;
use material::{SLOT_SCHEMA, TEXTURE_SLOT_COUNT};

pub type MeshHandle = Handle<Mesh>;
pub type TextureHandle = Handle<Texture>;

/// Shared GPU resource pools: procedural meshes keyed by their build
/// parameters and file textures keyed by path, both reference counted.
pub struct Assets {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pub meshes: ResourceCache<PrimitiveKind, Mesh>,
    pub textures: ResourceCache<PathBuf, Texture>,
    loader: TextureLoader,
    white: Texture,
    default_normal: Texture,
    default_wrap: f32,
}

impl Assets {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, settings: &RenderSettings) -> Self {
        let white = Texture::white(&device, &queue);
        let default_normal = Texture::default_normal(&device, &queue);
        let mut textures = ResourceCache::default();
        textures.set_limits(CacheLimits {
            max_bytes: settings.max_texture_bytes,
            max_entries: settings.max_textures,
        });
        Self {
            device,
            queue,
            meshes: ResourceCache::default(),
            textures,
            loader: TextureLoader::new(),
            white,
            default_normal,
            default_wrap: settings.wrap_factor,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Build (or share) the mesh for a primitive. Identical parameters yield
    /// the same cache entry, so repeated spheres cost one vertex buffer.
    pub fn acquire_primitive(&mut self, kind: PrimitiveKind) -> MeshHandle {
        let device = &self.device;
        self.meshes
            .acquire_with(kind, || {
                let (vertices, indices) = primitives::build(kind);
                let mesh = Mesh::new(device, &vertices, &indices);
                let bytes = Mesh::byte_size(&vertices, &indices);
                Ok::<_, std::convert::Infallible>((mesh, bytes))
            })
            .unwrap_or_else(|never| match never {})
    }

    /// Acquire a file texture. A placeholder is resident immediately; the
    /// decode runs in the background and hot-swaps in on a later frame.
    pub fn texture(&mut self, path: PathBuf, srgb: bool) -> TextureHandle {
        let device = &self.device;
        let queue = &self.queue;
        let mut miss = false;
        let handle = self
            .textures
            .acquire_with(path.clone(), || {
                miss = true;
                let placeholder = Texture::placeholder(device, queue);
                let bytes = placeholder.byte_size();
                Ok::<_, std::convert::Infallible>((placeholder, bytes))
            })
            .unwrap_or_else(|never| match never {});
        if miss {
            self.loader.request(path, srgb);
        }
        handle
    }

    /// Resolve a descriptor into a material, acquiring every referenced
    /// texture in the color space its slot calls for.
    pub fn load_material(&mut self, descriptor: &MaterialDescriptor) -> Material {
        let mut material = Material {
            base_color: descriptor.base_color,
            metallic: descriptor.metallic.clamp(0.0, 1.0),
            roughness: descriptor.roughness.clamp(0.0, 1.0),
            normal_scale: descriptor.normal_scale.max(0.0),
            ao_strength: descriptor.ao_strength.clamp(0.0, 1.0),
            emissive: descriptor.emissive,
            emissive_strength: descriptor.emissive_strength.max(0.0),
            wrap_factor: descriptor.wrap_factor_or(self.default_wrap),
            alpha_mode: descriptor.alpha_mode(),
            double_sided: descriptor.double_sided,
            unlit: descriptor.unlit,
            textures: [None; TEXTURE_SLOT_COUNT],
        };
        for (slot, srgb) in SLOT_SCHEMA {
            if let Some(path) = descriptor.texture_path(slot) {
                material.textures[slot as usize] = Some(self.texture(path.clone(), srgb));
            }
        }
        material
    }

    /// Upload finished background decodes. Returns how many textures were
    /// swapped in, so the caller knows bind groups may be stale.
    pub fn drain_loader(&mut self) -> usize {
        self.loader
            .drain(&self.device, &self.queue, &mut self.textures)
    }

    pub fn set_texture_limits(&mut self, limits: CacheLimits) {
        self.textures.set_limits(limits);
    }

    pub fn white_view(&self) -> &wgpu::TextureView {
        &self.white.view
    }

    /// Fallback view for an unbound material slot. Normal maps need a flat
    /// normal; every other slot reads white as "no effect".
    pub fn default_view(&self, slot: usize) -> &wgpu::TextureView {
        if slot == TextureSlot::Normal as usize {
            &self.default_normal.view
        } else {
            &self.white.view
        }
    }
}
