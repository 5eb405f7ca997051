//! 2D overlay pass. Quads are given in surface pixels and drawn after
//! tonemapping, so overlay colors are never touched by exposure.

use wgpu::util::DeviceExt;

use crate::error::RenderError;
use crate::scene::OverlayQuad;

use super::pipeline::create_validated_shader;
use super::uniforms::OverlayInstance;
use super::Assets;

const INSTANCE_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x4,
    1 => Float32x4,
    2 => Uint32x4,
];

fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<OverlayInstance>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRS,
    }
}

/// Convert a pixel rect (x, y, width, height, origin top-left) into the
/// clip-space center/half-extent encoding the shader expands.
pub fn quad_to_instance(quad: &OverlayQuad, surface_width: u32, surface_height: u32) -> OverlayInstance {
    let sw = surface_width.max(1) as f32;
    let sh = surface_height.max(1) as f32;
    let [x, y, w, h] = quad.rect;
    let center_x = (x + w * 0.5) / sw * 2.0 - 1.0;
    let center_y = 1.0 - (y + h * 0.5) / sh * 2.0;
    OverlayInstance {
        rect: [center_x, center_y, w / sw, h / sh],
        color: quad.color,
        textured: [quad.texture.is_some() as u32, 0, 0, 0],
    }
}

pub struct OverlayPass {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    scratch: Vec<OverlayInstance>,
}

impl OverlayPass {
    const INITIAL_CAPACITY: usize = 64;

    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, RenderError> {
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("OverlayBindLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shader = create_validated_shader(
            device,
            "OverlayShader",
            include_str!("shader/overlay.wgsl"),
        )?;

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("OverlayPipelineLayout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = super::pipeline_builder::PipelineBuilder::new(device, &layout, &shader)
            .with_label("OverlayPipeline")
            .with_vertex_buffer(instance_layout())
            .with_color_target(surface_format, Some(wgpu::BlendState::ALPHA_BLENDING))
            .without_culling()
            .build();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("OverlaySampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let instance_buffer = Self::create_instance_buffer(device, Self::INITIAL_CAPACITY);

        Ok(Self {
            pipeline,
            bind_layout,
            sampler,
            instance_buffer,
            instance_capacity: Self::INITIAL_CAPACITY,
            scratch: Vec::new(),
        })
    }

    fn create_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("OverlayInstances"),
            size: (capacity * std::mem::size_of::<OverlayInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        assets: &Assets,
        quads: &[OverlayQuad],
        surface_width: u32,
        surface_height: u32,
    ) {
        if quads.is_empty() {
            return;
        }

        self.scratch.clear();
        self.scratch
            .extend(quads.iter().map(|q| quad_to_instance(q, surface_width, surface_height)));

        if self.scratch.len() > self.instance_capacity {
            let new_capacity = self.scratch.len().next_power_of_two();
            log::info!(
                "Growing overlay instance buffer: {} -> {}",
                self.instance_capacity,
                new_capacity
            );
            self.instance_buffer = Self::create_instance_buffer(device, new_capacity);
            self.instance_capacity = new_capacity;
        }
        queue.write_buffer(
            &self.instance_buffer,
            0,
            bytemuck::cast_slice(&self.scratch),
        );

        // One bind group per quad; untextured quads bind the white default so
        // the pipeline layout stays uniform.
        let bind_groups: Vec<wgpu::BindGroup> = quads
            .iter()
            .map(|quad| {
                let view = quad
                    .texture
                    .and_then(|handle| assets.textures.peek(handle))
                    .map(|texture| &texture.view)
                    .unwrap_or_else(|| assets.white_view());
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("OverlayBindGroup"),
                    layout: &self.bind_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("OverlayPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_vertex_buffer(0, self.instance_buffer.slice(..));
        for (i, bind_group) in bind_groups.iter().enumerate() {
            let i = i as u32;
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..6, i..i + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_rect_maps_to_clip_space() {
        let quad = OverlayQuad {
            rect: [0.0, 0.0, 800.0, 600.0],
            color: [1.0; 4],
            texture: None,
        };
        let instance = quad_to_instance(&quad, 800, 600);
        assert_eq!(instance.rect, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(instance.textured[0], 0);
    }

    #[test]
    fn top_left_quarter_quad() {
        let quad = OverlayQuad {
            rect: [0.0, 0.0, 400.0, 300.0],
            color: [1.0; 4],
            texture: None,
        };
        let instance = quad_to_instance(&quad, 800, 600);
        assert_eq!(instance.rect, [-0.5, 0.5, 0.5, 0.5]);
    }
}
