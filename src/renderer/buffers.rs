//! Frame-persistent GPU buffers: the camera uniform, the per-object and
//! per-material storage buffers, and the scene bind group that bundles
//! lights, shadows and environment resources for the shading passes.

use std::collections::HashMap;
use std::mem;
use std::num::NonZeroU64;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::scene::DrawItem;

use super::uniforms::{
    CameraUniform, EnvironmentUniform, LightsUniform, MaterialData, ObjectData, ShadowsUniform,
};

pub(crate) struct CameraBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
}

impl CameraBuffer {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let initial = CameraUniform::zeroed();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CameraBuffer"),
            contents: bytemuck::bytes_of(&initial),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CameraBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        NonZeroU64::new(mem::size_of::<CameraUniform>() as u64).unwrap(),
                    ),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CameraBindGroup"),
            layout: &bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            buffer,
            bind_group,
            bind_layout,
        }
    }

    pub(crate) fn update(&self, queue: &wgpu::Queue, uniform: &CameraUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniform));
    }
}

/// Per-frame object and material storage, grown on demand. Materials are
/// deduplicated by their packed bytes so identical materials across many
/// draw items share one record.
pub(crate) struct FrameBuffers {
    objects: wgpu::Buffer,
    materials: wgpu::Buffer,
    object_capacity: u32,
    material_capacity: u32,
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
    object_scratch: Vec<ObjectData>,
    material_scratch: Vec<MaterialData>,
    material_lookup: HashMap<[u8; mem::size_of::<MaterialData>()], u32>,
}

impl FrameBuffers {
    pub(crate) fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("FrameBindLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let objects = Self::create_storage::<ObjectData>(device, "ObjectsBuffer", capacity);
        let materials = Self::create_storage::<MaterialData>(device, "MaterialsBuffer", capacity);
        let bind_group = Self::create_bind_group(device, &bind_layout, &objects, &materials);

        Self {
            objects,
            materials,
            object_capacity: capacity,
            material_capacity: capacity,
            bind_group,
            bind_layout,
            object_scratch: Vec::with_capacity(capacity as usize),
            material_scratch: Vec::with_capacity(capacity as usize),
            material_lookup: HashMap::new(),
        }
    }

    fn create_storage<T>(device: &wgpu::Device, label: &str, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (capacity.max(1) as usize * mem::size_of::<T>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        objects: &wgpu::Buffer,
        materials: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FrameBindGroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: objects.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: materials.as_entire_binding(),
                },
            ],
        })
    }

    /// Rebuild both scratch lists from this frame's draw items and upload.
    /// The object at index `i` corresponds to `items[i]`.
    pub(crate) fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        items: &[DrawItem],
    ) {
        self.object_scratch.clear();
        self.material_scratch.clear();
        self.material_lookup.clear();

        for item in items {
            let data = MaterialData::from_material(&item.material);
            let key: [u8; mem::size_of::<MaterialData>()] =
                bytemuck::bytes_of(&data).try_into().unwrap();
            let material_index = *self.material_lookup.entry(key).or_insert_with(|| {
                self.material_scratch.push(data);
                (self.material_scratch.len() - 1) as u32
            });
            self.object_scratch
                .push(ObjectData::new(item.model, material_index));
        }

        let mut regrown = false;
        let required_objects = self.object_scratch.len() as u32;
        if required_objects > self.object_capacity {
            let new_capacity = required_objects.max(self.object_capacity * 2);
            log::info!(
                "Growing objects buffer: {} -> {}",
                self.object_capacity,
                new_capacity
            );
            self.objects = Self::create_storage::<ObjectData>(device, "ObjectsBuffer", new_capacity);
            self.object_capacity = new_capacity;
            regrown = true;
        }

        let required_materials = self.material_scratch.len() as u32;
        if required_materials > self.material_capacity {
            let new_capacity = required_materials.max(self.material_capacity * 2);
            log::info!(
                "Growing materials buffer: {} -> {}",
                self.material_capacity,
                new_capacity
            );
            self.materials =
                Self::create_storage::<MaterialData>(device, "MaterialsBuffer", new_capacity);
            self.material_capacity = new_capacity;
            regrown = true;
        }

        if regrown {
            self.bind_group =
                Self::create_bind_group(device, &self.bind_layout, &self.objects, &self.materials);
        }

        if !self.object_scratch.is_empty() {
            queue.write_buffer(&self.objects, 0, bytemuck::cast_slice(&self.object_scratch));
        }
        if !self.material_scratch.is_empty() {
            queue.write_buffer(
                &self.materials,
                0,
                bytemuck::cast_slice(&self.material_scratch),
            );
        }
    }

    pub(crate) fn material_count(&self) -> usize {
        self.material_scratch.len()
    }
}

/// Group of everything the shading pass samples besides per-object data:
/// light and shadow uniforms, the shadow atlas, the contact shadow target
/// and the IBL chain.
pub(crate) struct SceneBindings {
    pub(crate) lights_buffer: wgpu::Buffer,
    pub(crate) shadows_buffer: wgpu::Buffer,
    pub(crate) environment_buffer: wgpu::Buffer,
    pub(crate) bind_layout: wgpu::BindGroupLayout,
    pub(crate) bind_group: Option<wgpu::BindGroup>,
    contact_sampler: wgpu::Sampler,
}

impl SceneBindings {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let lights = LightsUniform::default();
        let lights_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("LightsBuffer"),
            contents: bytemuck::bytes_of(&lights),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shadows = ShadowsUniform::default();
        let shadows_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ShadowsBuffer"),
            contents: bytemuck::bytes_of(&shadows),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let environment = EnvironmentUniform::new(1.0, 1.0, 0, false);
        let environment_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("EnvironmentBuffer"),
            contents: bytemuck::bytes_of(&environment),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let contact_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ContactSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let cube_texture = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::Cube,
                multisampled: false,
            },
            count: None,
        };
        let uniform = |binding: u32, size: usize| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: Some(NonZeroU64::new(size as u64).unwrap()),
            },
            count: None,
        };

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SceneBindLayout"),
            entries: &[
                uniform(0, mem::size_of::<LightsUniform>()),
                uniform(1, mem::size_of::<ShadowsUniform>()),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                uniform(6, mem::size_of::<EnvironmentUniform>()),
                cube_texture(7),
                cube_texture(8),
                wgpu::BindGroupLayoutEntry {
                    binding: 9,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                cube_texture(10),
                wgpu::BindGroupLayoutEntry {
                    binding: 11,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        Self {
            lights_buffer,
            shadows_buffer,
            environment_buffer,
            bind_layout,
            bind_group: None,
            contact_sampler,
        }
    }

    /// (Re)create the bind group. Called whenever any bound view changed
    /// identity, e.g. after a resize or an environment rebuild.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn rebuild(
        &mut self,
        device: &wgpu::Device,
        atlas_view: &wgpu::TextureView,
        atlas_sampler: &wgpu::Sampler,
        contact_view: &wgpu::TextureView,
        irradiance_view: &wgpu::TextureView,
        prefilter_view: &wgpu::TextureView,
        brdf_view: &wgpu::TextureView,
        skybox_view: &wgpu::TextureView,
        environment_sampler: &wgpu::Sampler,
    ) {
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SceneBindGroup"),
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.lights_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.shadows_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(atlas_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(atlas_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(contact_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.contact_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: self.environment_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::TextureView(irradiance_view),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(prefilter_view),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::TextureView(brdf_view),
                },
                wgpu::BindGroupEntry {
                    binding: 10,
                    resource: wgpu::BindingResource::TextureView(skybox_view),
                },
                wgpu::BindGroupEntry {
                    binding: 11,
                    resource: wgpu::BindingResource::Sampler(environment_sampler),
                },
            ],
        }));
    }
}
