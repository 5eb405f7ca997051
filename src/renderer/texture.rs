use std::path::Path;

use crate::io;

struct RgbaTextureSource<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    texture_format: wgpu::TextureFormat,
    view_format: Option<wgpu::TextureFormat>,
    label: Option<&'a str>,
}

/// A sampled 2D texture with a full mip chain.
#[derive(Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    bytes: u64,
}

/// CPU-side decoded image, produced off-thread and uploaded on drain.
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub srgb: bool,
}

impl DecodedImage {
    /// Decode an image file to rgba8. Runs on a worker thread; no GPU work.
    pub fn decode(path: &Path, srgb: bool) -> Result<Self, String> {
        let bytes = io::load_binary(path)?;
        let img = image::load_from_memory(&bytes)
            .map_err(|e| format!("Failed to decode image {:?}: {}", path, e))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
            srgb,
        })
    }
}

impl Texture {
    fn calculate_mip_levels(width: u32, height: u32) -> u32 {
        let max_dimension = width.max(height).max(1);
        u32::BITS - max_dimension.leading_zeros()
    }

    /// GPU residency of this texture, mip chain included.
    pub fn byte_size(&self) -> u64 {
        self.bytes
    }

    fn chain_bytes(width: u32, height: u32, mip_levels: u32) -> u64 {
        let mut total = 0u64;
        let (mut w, mut h) = (width.max(1), height.max(1));
        for _ in 0..mip_levels {
            total += w as u64 * h as u64 * 4;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        total
    }

    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, image: &DecodedImage) -> Self {
        let (texture_format, view_format) = Self::formats_for_color_space(image.srgb);
        Self::from_rgba8(
            device,
            queue,
            RgbaTextureSource {
                data: &image.pixels,
                width: image.width,
                height: image.height,
                texture_format,
                view_format,
                label: None,
            },
        )
    }

    fn from_rgba8(device: &wgpu::Device, queue: &wgpu::Queue, source: RgbaTextureSource<'_>) -> Self {
        let mip_level_count = Self::calculate_mip_levels(source.width, source.height);

        let size = wgpu::Extent3d {
            width: source.width,
            height: source.height,
            depth_or_array_layers: 1,
        };

        let mut view_formats = Vec::new();
        if let Some(format) = source.view_format {
            view_formats.push(format);
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: source.label,
            size,
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: source.texture_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &view_formats,
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            source.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * source.width),
                rows_per_image: Some(source.height),
            },
            size,
        );

        Self::generate_mipmaps(device, queue, &texture, mip_level_count, source.texture_format);

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            format: source.view_format.or(Some(source.texture_format)),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            bytes: Self::chain_bytes(source.width, source.height, mip_level_count),
        }
    }

    /// Downsample mip N-1 into mip N with a fullscreen blit.
    fn generate_mipmaps(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        mip_level_count: u32,
        format: wgpu::TextureFormat,
    ) {
        if mip_level_count <= 1 {
            return;
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader/blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mip Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Mipmap Generator"),
        });

        for target_mip in 1..mip_level_count {
            let src_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Mip Source"),
                format: Some(format),
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: target_mip - 1,
                mip_level_count: Some(1),
                base_array_layer: 0,
                array_layer_count: Some(1),
                usage: Some(wgpu::TextureUsages::TEXTURE_BINDING),
            });

            let dst_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Mip Destination"),
                format: Some(format),
                dimension: Some(wgpu::TextureViewDimension::D2),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: target_mip,
                mip_level_count: Some(1),
                base_array_layer: 0,
                array_layer_count: Some(1),
                usage: Some(wgpu::TextureUsages::RENDER_ATTACHMENT),
            });

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Mip Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mipmap Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &dst_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_pipeline(&pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        queue.submit(Some(encoder.finish()));
    }

    pub fn from_color(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color: [u8; 4],
        label: Option<&str>,
    ) -> Self {
        Self::from_rgba8(
            device,
            queue,
            RgbaTextureSource {
                data: &color,
                width: 1,
                height: 1,
                texture_format: wgpu::TextureFormat::Rgba8Unorm,
                view_format: Some(wgpu::TextureFormat::Rgba8UnormSrgb),
                label,
            },
        )
    }

    pub fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::from_color(device, queue, [255, 255, 255, 255], Some("White"))
    }

    /// 1x1 flat normal, stored linear.
    pub fn default_normal(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::from_rgba8(
            device,
            queue,
            RgbaTextureSource {
                data: &[128, 128, 255, 255],
                width: 1,
                height: 1,
                texture_format: wgpu::TextureFormat::Rgba8Unorm,
                view_format: None,
                label: Some("DefaultNormal"),
            },
        )
    }

    /// 1x1 placeholder shown while an asynchronous decode is in flight.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::from_color(device, queue, [180, 180, 180, 255], Some("Placeholder"))
    }

    fn formats_for_color_space(is_srgb: bool) -> (wgpu::TextureFormat, Option<wgpu::TextureFormat>) {
        if is_srgb {
            (
                wgpu::TextureFormat::Rgba8Unorm,
                Some(wgpu::TextureFormat::Rgba8UnormSrgb),
            )
        } else {
            (wgpu::TextureFormat::Rgba8Unorm, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_level_calculation() {
        assert_eq!(Texture::calculate_mip_levels(1, 1), 1);
        assert_eq!(Texture::calculate_mip_levels(2, 2), 2);
        assert_eq!(Texture::calculate_mip_levels(256, 256), 9);
        assert_eq!(Texture::calculate_mip_levels(256, 128), 9);
        assert_eq!(Texture::calculate_mip_levels(1920, 1080), 11);
    }

    #[test]
    fn chain_bytes_counts_every_mip() {
        // 4x4 chain: 64 + 16 + 4 bytes.
        assert_eq!(Texture::chain_bytes(4, 4, 3), 84);
        assert_eq!(Texture::chain_bytes(1, 1, 1), 4);
    }

    #[test]
    fn srgb_textures_use_renderable_storage_format() {
        let (storage, view) = Texture::formats_for_color_space(true);
        assert_eq!(storage, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(view, Some(wgpu::TextureFormat::Rgba8UnormSrgb));

        let (storage_linear, view_linear) = Texture::formats_for_color_space(false);
        assert_eq!(storage_linear, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(view_linear, None);
    }
}
