//! Image-based lighting. The environment cube feeds a precomputed chain
//! (diffuse irradiance cube, specular prefiltered cube) that is built
//! incrementally: one render per frame, so a new skybox never stalls a
//! frame. The BRDF lookup table is environment-independent and renders once
//! at startup. Until the chain is complete the shading falls back to
//! sampling the environment cube directly.

use bytemuck::{bytes_of, Pod, Zeroable};
use half::f16;
use log::{error, info};

use crate::scene::{Skybox, SkyboxSource};

pub const IRRADIANCE_SIZE: u32 = 32;
pub const PREFILTER_SIZE: u32 = 128;
pub const PREFILTER_MIPS: u32 = 5;
pub const BRDF_LUT_SIZE: u32 = 512;

const CUBE_FACES: u32 = 6;
const CUBE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Where the incremental precompute currently stands. Exactly one render
/// target is produced per `advance`, so the enum is also the work queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IblStage {
    /// Reproject the equirectangular source onto one cube face.
    Convert { face: u32 },
    /// Convolve one face of the diffuse irradiance cube.
    Irradiance { face: u32 },
    /// Prefilter one mip/face of the specular cube.
    Prefilter { mip: u32, face: u32 },
    Done,
}

impl IblStage {
    /// First stage for a source that needs equirect conversion.
    pub fn from_equirect() -> Self {
        IblStage::Convert { face: 0 }
    }

    /// First stage for a source already in cube form.
    pub fn from_cube() -> Self {
        IblStage::Irradiance { face: 0 }
    }

    pub fn is_done(self) -> bool {
        self == IblStage::Done
    }

    pub fn next(self) -> Self {
        match self {
            IblStage::Convert { face } if face + 1 < CUBE_FACES => {
                IblStage::Convert { face: face + 1 }
            }
            IblStage::Convert { .. } => IblStage::Irradiance { face: 0 },
            IblStage::Irradiance { face } if face + 1 < CUBE_FACES => {
                IblStage::Irradiance { face: face + 1 }
            }
            IblStage::Irradiance { .. } => IblStage::Prefilter { mip: 0, face: 0 },
            IblStage::Prefilter { mip, face } if face + 1 < CUBE_FACES => {
                IblStage::Prefilter { mip, face: face + 1 }
            }
            IblStage::Prefilter { mip, .. } if mip + 1 < PREFILTER_MIPS => {
                IblStage::Prefilter {
                    mip: mip + 1,
                    face: 0,
                }
            }
            IblStage::Prefilter { .. } => IblStage::Done,
            IblStage::Done => IblStage::Done,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FaceParams {
    /// x = face index, y = roughness, zw unused.
    params: [f32; 4],
}

struct CubeTexture {
    _texture: wgpu::Texture,
    cube_view: wgpu::TextureView,
    face_views: Vec<wgpu::TextureView>,
}

impl CubeTexture {
    fn new(device: &wgpu::Device, label: &str, size: u32, mips: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: CUBE_FACES,
            },
            mip_level_count: mips,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CUBE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{label}CubeView")),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let mut face_views = Vec::with_capacity((mips * CUBE_FACES) as usize);
        for mip in 0..mips {
            for face in 0..CUBE_FACES {
                face_views.push(texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("{label}Mip{mip}Face{face}")),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    base_array_layer: face,
                    array_layer_count: Some(1),
                    usage: Some(wgpu::TextureUsages::RENDER_ATTACHMENT),
                    ..Default::default()
                }));
            }
        }

        Self {
            _texture: texture,
            cube_view,
            face_views,
        }
    }

    fn face_view(&self, mip: u32, face: u32) -> &wgpu::TextureView {
        &self.face_views[(mip * CUBE_FACES + face) as usize]
    }

    fn write_face(
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        face: u32,
        size: u32,
        texels: &[u16],
    ) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: face,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size * 8),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn rgba_f16(pixels: &[f32]) -> Vec<u16> {
    pixels.iter().map(|&v| f16::from_f32(v).to_bits()).collect()
}

fn solid_face(color: [f32; 3]) -> Vec<u16> {
    rgba_f16(&[color[0], color[1], color[2], 1.0])
}

struct Pipelines {
    convert: wgpu::RenderPipeline,
    irradiance: wgpu::RenderPipeline,
    prefilter: wgpu::RenderPipeline,
    equirect_layout: wgpu::BindGroupLayout,
    cube_layout: wgpu::BindGroupLayout,
}

fn source_layout(
    device: &wgpu::Device,
    label: &str,
    dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: dimension,
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
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<FaceParams>() as u64
                    ),
                },
                count: None,
            },
        ],
    })
}

fn face_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: Option<&wgpu::BindGroupLayout>,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let layouts: Vec<&wgpu::BindGroupLayout> = layout.into_iter().collect();
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label}Layout")),
        bind_group_layouts: &layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
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
                format: CUBE_FORMAT,
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
    })
}

/// Owns the environment cube, the precomputed IBL chain and the incremental
/// state machine that fills it.
pub struct IblPrecompute {
    skybox: CubeTexture,
    irradiance: CubeTexture,
    prefilter: CubeTexture,
    brdf_lut: wgpu::Texture,
    brdf_view: wgpu::TextureView,
    equirect: Option<wgpu::Texture>,
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    pipelines: Pipelines,
    stage: IblStage,
    source_key: Option<u64>,
    intensity: f32,
    solid_color: Option<[f32; 3]>,
}

impl IblPrecompute {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let skybox = CubeTexture::new(device, "EnvironmentCube", 1, 1);
        let irradiance = CubeTexture::new(device, "IrradianceCube", IRRADIANCE_SIZE, 1);
        let prefilter =
            CubeTexture::new(device, "PrefilterCube", PREFILTER_SIZE, PREFILTER_MIPS);

        // Start black so an unset environment contributes nothing.
        let black = solid_face([0.0, 0.0, 0.0]);
        for face in 0..CUBE_FACES {
            CubeTexture::write_face(queue, &skybox._texture, face, 1, &black);
        }

        let brdf_lut = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("BrdfLut"),
            size: wgpu::Extent3d {
                width: BRDF_LUT_SIZE,
                height: BRDF_LUT_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CUBE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let brdf_view = brdf_lut.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("EnvironmentSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: PREFILTER_MIPS as f32,
            ..Default::default()
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("IblFaceParams"),
            size: std::mem::size_of::<FaceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let equirect_layout = source_layout(
            device,
            "EquirectSourceLayout",
            wgpu::TextureViewDimension::D2,
        );
        let cube_layout = source_layout(
            device,
            "CubeSourceLayout",
            wgpu::TextureViewDimension::Cube,
        );

        let pipelines = Pipelines {
            convert: face_pipeline(
                device,
                "EquirectToCube",
                include_str!("shader/equirect_to_cube.wgsl"),
                Some(&equirect_layout),
            ),
            irradiance: face_pipeline(
                device,
                "IrradianceConvolution",
                include_str!("shader/irradiance.wgsl"),
                Some(&cube_layout),
            ),
            prefilter: face_pipeline(
                device,
                "SpecularPrefilter",
                include_str!("shader/prefilter.wgsl"),
                Some(&cube_layout),
            ),
            equirect_layout,
            cube_layout,
        };

        // The BRDF lookup table depends only on roughness and view angle,
        // never on the environment, so it renders exactly once here.
        let brdf_pipeline = face_pipeline(
            device,
            "BrdfIntegration",
            include_str!("shader/brdf_lut.wgsl"),
            None,
        );
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("BrdfLutEncoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("BrdfLutPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &brdf_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&brdf_pipeline);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));

        Self {
            skybox,
            irradiance,
            prefilter,
            brdf_lut,
            brdf_view,
            equirect: None,
            sampler,
            params_buffer,
            pipelines,
            stage: IblStage::Done,
            source_key: None,
            intensity: 1.0,
            solid_color: None,
        }
    }

    pub fn skybox_view(&self) -> &wgpu::TextureView {
        &self.skybox.cube_view
    }

    pub fn irradiance_view(&self) -> &wgpu::TextureView {
        &self.irradiance.cube_view
    }

    pub fn prefilter_view(&self) -> &wgpu::TextureView {
        &self.prefilter.cube_view
    }

    pub fn brdf_view(&self) -> &wgpu::TextureView {
        &self.brdf_view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn solid_color(&self) -> Option<[f32; 3]> {
        self.solid_color
    }

    /// The full chain is built and may be sampled by the shading pass.
    pub fn ready(&self) -> bool {
        self.stage.is_done() && self.source_key.is_some()
    }

    /// Adopt a skybox. A changed source abandons any precompute in flight
    /// and restarts the chain; an unchanged source only refreshes intensity.
    pub fn set_skybox(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, skybox: &Skybox) {
        self.intensity = skybox.intensity;
        let key = skybox.source_key();
        if self.source_key == Some(key) {
            return;
        }

        info!("Environment source changed; rebuilding IBL chain");
        self.solid_color = None;
        self.equirect = None;

        match &skybox.source {
            SkyboxSource::SolidColor(color) => {
                let face = solid_face(*color);
                // The previous source may have left a larger cube behind;
                // a solid color only needs one texel per face.
                self.skybox = CubeTexture::new(device, "EnvironmentCube", 1, 1);
                for f in 0..CUBE_FACES {
                    CubeTexture::write_face(queue, &self.skybox._texture, f, 1, &face);
                }
                self.solid_color = Some(*color);
                self.stage = IblStage::from_cube();
            }
            SkyboxSource::Cubemap { faces } => {
                match self.load_cubemap(device, queue, faces) {
                    Ok(()) => self.stage = IblStage::from_cube(),
                    Err(err) => {
                        error!("Failed to load cubemap: {err}");
                        self.source_key = None;
                        self.stage = IblStage::Done;
                        return;
                    }
                }
            }
            SkyboxSource::Equirect { path } => match self.load_equirect(device, queue, path) {
                Ok(()) => self.stage = IblStage::from_equirect(),
                Err(err) => {
                    error!("Failed to load environment {path:?}: {err}");
                    self.source_key = None;
                    self.stage = IblStage::Done;
                    return;
                }
            },
        }
        self.source_key = Some(key);
    }

    fn load_cubemap(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        faces: &[std::path::PathBuf; 6],
    ) -> Result<(), String> {
        let mut decoded = Vec::with_capacity(6);
        let mut size = 0u32;
        for path in faces {
            let image = image::open(path)
                .map_err(|err| format!("failed to open cube face {path:?}: {err}"))?
                .to_rgba32f();
            let (width, height) = image.dimensions();
            if width != height {
                return Err(format!("cube face {path:?} is not square ({width}x{height})"));
            }
            if size == 0 {
                size = width;
            } else if width != size {
                return Err(format!("cube face {path:?} size differs from the first face"));
            }
            decoded.push(rgba_f16(&image.into_raw()));
        }

        self.skybox = CubeTexture::new(device, "EnvironmentCube", size, 1);
        for (face, texels) in decoded.iter().enumerate() {
            CubeTexture::write_face(queue, &self.skybox._texture, face as u32, size, texels);
        }
        Ok(())
    }

    fn load_equirect(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &std::path::Path,
    ) -> Result<(), String> {
        let image = image::open(path)
            .map_err(|err| format!("failed to open {path:?}: {err}"))?
            .to_rgba32f();
        let (width, height) = image.dimensions();
        let texels = rgba_f16(&image.into_raw());

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("EquirectSource"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CUBE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 8),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        // The conversion renders into a fresh 512 cube.
        self.skybox = CubeTexture::new(device, "EnvironmentCube", 512, 1);
        self.equirect = Some(texture);
        Ok(())
    }

    /// Run at most one precompute render. Called once per frame; a complete
    /// chain is a no-op.
    pub fn advance(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        let stage = self.stage;
        match stage {
            IblStage::Done => return,
            IblStage::Convert { face } => {
                let Some(equirect) = &self.equirect else {
                    self.stage = IblStage::from_cube();
                    return;
                };
                let source_view = equirect.create_view(&wgpu::TextureViewDescriptor::default());
                self.face_pass(
                    device,
                    queue,
                    encoder,
                    &self.pipelines.convert,
                    &self.pipelines.equirect_layout,
                    &source_view,
                    self.skybox.face_view(0, face),
                    face,
                    0.0,
                );
            }
            IblStage::Irradiance { face } => {
                self.face_pass(
                    device,
                    queue,
                    encoder,
                    &self.pipelines.irradiance,
                    &self.pipelines.cube_layout,
                    &self.skybox.cube_view,
                    self.irradiance.face_view(0, face),
                    face,
                    0.0,
                );
            }
            IblStage::Prefilter { mip, face } => {
                let roughness = mip as f32 / (PREFILTER_MIPS - 1) as f32;
                self.face_pass(
                    device,
                    queue,
                    encoder,
                    &self.pipelines.prefilter,
                    &self.pipelines.cube_layout,
                    &self.skybox.cube_view,
                    self.prefilter.face_view(mip, face),
                    face,
                    roughness,
                );
            }
        }

        self.stage = stage.next();
        if self.stage.is_done() {
            info!("IBL precompute complete");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn face_pass(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        layout: &wgpu::BindGroupLayout,
        source_view: &wgpu::TextureView,
        target_view: &wgpu::TextureView,
        face: u32,
        roughness: f32,
    ) {
        let params = FaceParams {
            params: [face as f32, roughness, 0.0, 0.0],
        };
        queue.write_buffer(&self.params_buffer, 0, bytes_of(&params));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("IblFaceBindGroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("IblFacePass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target_view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_sequence_visits_every_render_exactly_once() {
        let mut stage = IblStage::from_equirect();
        let mut renders = 0;
        while !stage.is_done() {
            renders += 1;
            stage = stage.next();
            assert!(renders < 100, "stage machine does not terminate");
        }
        // 6 convert + 6 irradiance + 5 mips x 6 faces.
        assert_eq!(renders, 6 + 6 + 30);
    }

    #[test]
    fn cube_sources_skip_the_conversion_stage() {
        let mut stage = IblStage::from_cube();
        let mut renders = 0;
        while !stage.is_done() {
            assert!(!matches!(stage, IblStage::Convert { .. }));
            renders += 1;
            stage = stage.next();
        }
        assert_eq!(renders, 6 + 30);
    }

    #[test]
    fn prefilter_walks_faces_before_mips() {
        let stage = IblStage::Prefilter { mip: 0, face: 5 };
        assert_eq!(stage.next(), IblStage::Prefilter { mip: 1, face: 0 });
        let last = IblStage::Prefilter {
            mip: PREFILTER_MIPS - 1,
            face: 5,
        };
        assert_eq!(last.next(), IblStage::Done);
    }

    #[test]
    fn done_is_terminal() {
        assert_eq!(IblStage::Done.next(), IblStage::Done);
    }
}
