//! Shading pipelines and the per-material texture bind group.

use crate::error::RenderError;
use crate::renderer::material::{Material, TEXTURE_SLOT_COUNT};

use super::pipeline_builder::PipelineBuilder;
use super::prepass::DEPTH_FORMAT;
use super::vertex::Vertex;
use super::Assets;

/// Compile WGSL under a validation error scope so a broken shader becomes a
/// `RenderError` carrying the naga diagnostic instead of a panic deep in a
/// later draw call.
pub fn create_validated_shader(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::ShaderCompile(error.to_string()));
    }
    Ok(module)
}

fn pbr_shader_source() -> String {
    format!(
        "{}\n{}\n{}",
        include_str!("shader/constants.wgsl"),
        include_str!("shader/pbr_lighting.wgsl"),
        include_str!("shader/pbr.wgsl"),
    )
}

fn skybox_shader_source() -> String {
    format!(
        "{}\n{}\n{}",
        include_str!("shader/constants.wgsl"),
        include_str!("shader/pbr_lighting.wgsl"),
        include_str!("shader/skybox.wgsl"),
    )
}

pub struct MainPipelines {
    pub opaque: wgpu::RenderPipeline,
    pub blend: wgpu::RenderPipeline,
    pub skybox: wgpu::RenderPipeline,
    pub material_layout: wgpu::BindGroupLayout,
    material_sampler: wgpu::Sampler,
}

impl MainPipelines {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        camera_layout: &wgpu::BindGroupLayout,
        frame_layout: &wgpu::BindGroupLayout,
        scene_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self, RenderError> {
        let material_layout = Self::create_material_layout(device);

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("MaterialSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shader = create_validated_shader(device, "PbrShader", &pbr_shader_source())?;

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("PbrPipelineLayout"),
            bind_group_layouts: &[camera_layout, frame_layout, scene_layout, &material_layout],
            push_constant_ranges: &[],
        });

        // Opaque and alpha-masked surfaces share the prepass depth with an
        // equal-friendly compare; masked fragments discard in the shader.
        let opaque = PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("PbrOpaquePipeline")
            .with_vertex_buffer(Vertex::layout())
            .with_color_target(surface_format, Some(wgpu::BlendState::REPLACE))
            .with_depth_stencil(DEPTH_FORMAT, false, wgpu::CompareFunction::LessEqual)
            .build();

        let blend = PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("PbrBlendPipeline")
            .with_vertex_buffer(Vertex::layout())
            .with_color_target(surface_format, Some(wgpu::BlendState::ALPHA_BLENDING))
            .with_depth_stencil(DEPTH_FORMAT, false, wgpu::CompareFunction::LessEqual)
            .without_culling()
            .build();

        let skybox_shader =
            create_validated_shader(device, "SkyboxShader", &skybox_shader_source())?;
        let skybox_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SkyboxPipelineLayout"),
            bind_group_layouts: &[camera_layout, scene_layout],
            push_constant_ranges: &[],
        });

        // Drawn at depth 1.0 after the opaque pass; LessEqual passes only
        // where no geometry wrote depth.
        let skybox = PipelineBuilder::new(device, &skybox_layout, &skybox_shader)
            .with_label("SkyboxPipeline")
            .with_color_target(surface_format, Some(wgpu::BlendState::REPLACE))
            .with_depth_stencil(DEPTH_FORMAT, false, wgpu::CompareFunction::LessEqual)
            .without_culling()
            .build();

        Ok(Self {
            opaque,
            blend,
            skybox,
            material_layout,
            material_sampler,
        })
    }

    fn create_material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let mut entries = Vec::with_capacity(TEXTURE_SLOT_COUNT + 1);
        for binding in 0..TEXTURE_SLOT_COUNT as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: TEXTURE_SLOT_COUNT as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("MaterialBindLayout"),
            entries: &entries,
        })
    }

    /// Bind group for one material's texture slots. Unbound slots fall back
    /// to the appropriate default so the layout never varies.
    pub fn material_bind_group(
        &self,
        device: &wgpu::Device,
        assets: &Assets,
        material: &Material,
    ) -> wgpu::BindGroup {
        let views: Vec<&wgpu::TextureView> = (0..TEXTURE_SLOT_COUNT)
            .map(|slot| {
                material.textures[slot]
                    .and_then(|handle| assets.textures.peek(handle))
                    .map(|texture| &texture.view)
                    .unwrap_or_else(|| assets.default_view(slot))
            })
            .collect();

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: TEXTURE_SLOT_COUNT as u32,
            resource: wgpu::BindingResource::Sampler(&self.material_sampler),
        });

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("MaterialBindGroup"),
            layout: &self.material_layout,
            entries: &entries,
        })
    }
}
