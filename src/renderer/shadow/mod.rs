//! Shadow atlas planning and rendering.
//!
//! Planning is pure CPU math: shadow-casting lights are ranked, granted
//! atlas tiles until either the tile grid or the matrix budget runs out,
//! and each granted light gets its view-projection matrices fit. The GPU
//! half renders every granted tile into one shared depth atlas through
//! per-tile viewports.

pub mod atlas;
pub mod cascades;
pub mod contact;

use glam::{Mat4, Vec3};
use log::warn;

use crate::math;
use crate::scene::{Camera3D, DrawItem, Light, LightSet};
use crate::settings::RenderSettings;

use super::uniforms::ShadowViewUniform;
use super::vertex::Vertex;
use super::Assets;

pub use atlas::{AtlasLayout, AtlasRegion};
pub use contact::ContactShadowPass;

/// Matrix slots shared by all shadow views in a frame.
pub const MAX_SHADOW_MATRICES: usize = 32;
/// Lights that can cast shadows simultaneously.
pub const MAX_SHADOW_SLOTS: usize = 8;

const POINT_FACE_COUNT: usize = 6;
const SHADOW_NEAR: f32 = 0.05;

/// Lifecycle of an atlas grant within a frame. A slot must be rendered
/// before the main pass samples it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Reserved,
    Rendered,
    Sampled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowKind {
    Directional,
    Point,
    Spot,
}

impl ShadowKind {
    pub fn encoded(self) -> u32 {
        match self {
            ShadowKind::Directional => 0,
            ShadowKind::Point => 1,
            ShadowKind::Spot => 2,
        }
    }
}

/// One light's granted atlas space for the current frame.
#[derive(Clone, Debug)]
pub struct ShadowAssignment {
    pub light_index: usize,
    pub kind: ShadowKind,
    /// Index of the first tile; also the first matrix slot.
    pub first_tile: u32,
    pub matrices: Vec<Mat4>,
    pub state: SlotState,
}

impl ShadowAssignment {
    pub fn tile_count(&self) -> u32 {
        self.matrices.len() as u32
    }
}

#[derive(Default)]
pub struct ShadowPlan {
    pub assignments: Vec<ShadowAssignment>,
    /// Cascade split boundaries, `cascade_count + 1` entries.
    pub splits: Vec<f32>,
    /// Shadow-casting lights that did not fit this frame.
    pub dropped: usize,
}

impl ShadowPlan {
    pub fn assignment_for_light(&self, light_index: usize) -> Option<&ShadowAssignment> {
        self.assignments
            .iter()
            .find(|a| a.light_index == light_index)
    }

    pub fn total_tiles(&self) -> u32 {
        self.assignments.iter().map(ShadowAssignment::tile_count).sum()
    }

    pub fn mark_rendered(&mut self) {
        for assignment in &mut self.assignments {
            assignment.state = SlotState::Rendered;
        }
    }

    pub fn mark_sampled(&mut self) {
        for assignment in &mut self.assignments {
            debug_assert_eq!(assignment.state, SlotState::Rendered);
            assignment.state = SlotState::Sampled;
        }
    }
}

fn tiles_for(light: &Light, cascade_count: u32) -> u32 {
    match light {
        Light::Directional { .. } => cascade_count,
        Light::Point { .. } => POINT_FACE_COUNT as u32,
        Light::Spot { .. } => 1,
    }
}

/// Rank shadow casters: directional lights first, then brighter lights,
/// then lights closer to the camera.
fn caster_order(lights: &LightSet, camera_pos: Vec3) -> Vec<usize> {
    let mut order: Vec<usize> = lights
        .lights()
        .iter()
        .enumerate()
        .filter(|(_, light)| light.casts_shadows())
        .map(|(i, _)| i)
        .collect();

    order.sort_by(|&a, &b| {
        let la = &lights.lights()[a];
        let lb = &lights.lights()[b];
        let dir_a = matches!(la, Light::Directional { .. });
        let dir_b = matches!(lb, Light::Directional { .. });
        dir_b
            .cmp(&dir_a)
            .then(
                lb.intensity()
                    .partial_cmp(&la.intensity())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| {
                let da = la.position().map_or(0.0, |p| p.distance_squared(camera_pos));
                let db = lb.position().map_or(0.0, |p| p.distance_squared(camera_pos));
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    order
}

fn point_face_matrices(position: Vec3, range: f32) -> Vec<Mat4> {
    const DIRS: [Vec3; POINT_FACE_COUNT] = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    let proj = math::perspective(std::f32::consts::FRAC_PI_2, 1.0, SHADOW_NEAR, range);
    DIRS.iter()
        .map(|&dir| {
            let up = math::stable_up(dir);
            proj * math::look_at(position, position + dir, up)
        })
        .collect()
}

/// Decide which lights get atlas space this frame and fit their matrices.
pub fn plan_shadows(
    lights: &LightSet,
    camera: &Camera3D,
    settings: &RenderSettings,
    layout: &AtlasLayout,
) -> ShadowPlan {
    let shadow_far = camera.far().min(settings.shadow_fade_end);
    let splits = cascades::cascade_splits(
        camera.near(),
        shadow_far.max(camera.near() * 2.0),
        settings.cascade_count,
        settings.cascade_lambda,
    );

    let mut plan = ShadowPlan {
        splits,
        ..Default::default()
    };

    let mut next_tile = 0u32;
    for light_index in caster_order(lights, camera.position()) {
        let light = &lights.lights()[light_index];
        let tiles = tiles_for(light, settings.cascade_count);

        let fits = plan.assignments.len() < MAX_SHADOW_SLOTS
            && next_tile + tiles <= layout.capacity()
            && (next_tile + tiles) as usize <= MAX_SHADOW_MATRICES;
        if !fits {
            plan.dropped += 1;
            continue;
        }

        let (kind, matrices) = match *light {
            Light::Directional { direction, .. } => {
                let matrices = plan
                    .splits
                    .windows(2)
                    .map(|band| {
                        cascades::fit_directional_cascade(
                            camera.view(),
                            camera.fov_y(),
                            camera.aspect(),
                            band[0],
                            band[1],
                            direction,
                            layout.tile_size(),
                        )
                        .view_proj
                    })
                    .collect();
                (ShadowKind::Directional, matrices)
            }
            Light::Point {
                position, range, ..
            } => (ShadowKind::Point, point_face_matrices(position, range)),
            Light::Spot {
                position,
                direction,
                range,
                outer_angle,
                ..
            } => {
                let fov = (outer_angle * 2.0).min(std::f32::consts::PI - 0.01);
                let proj = math::perspective(fov, 1.0, SHADOW_NEAR, range);
                let up = math::stable_up(direction);
                let view = math::look_at(position, position + direction.normalize(), up);
                (ShadowKind::Spot, vec![proj * view])
            }
        };

        plan.assignments.push(ShadowAssignment {
            light_index,
            kind,
            first_tile: next_tile,
            matrices,
            state: SlotState::Reserved,
        });
        next_tile += tiles;
    }

    if plan.dropped > 0 {
        warn!(
            "Shadow atlas full: {} shadow caster(s) dropped this frame",
            plan.dropped
        );
    }
    plan
}

/// GPU side: the atlas texture, the depth-only pipeline and the per-tile
/// view uniform plumbing.
pub struct ShadowResources {
    layout: AtlasLayout,
    _texture: wgpu::Texture,
    atlas_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    view_uniform: wgpu::Buffer,
    view_bind_group: wgpu::BindGroup,
    staging: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
}

impl ShadowResources {
    pub fn new(
        device: &wgpu::Device,
        objects_layout: &wgpu::BindGroupLayout,
        settings: &RenderSettings,
    ) -> Self {
        let layout = AtlasLayout::new(settings.shadow_atlas_size, settings.shadow_tile_size);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("ShadowAtlas"),
            size: wgpu::Extent3d {
                width: layout.atlas_size(),
                height: layout.atlas_size(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let atlas_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 1.0,
            ..Default::default()
        });

        let uniform_size = std::mem::size_of::<ShadowViewUniform>() as u64;
        let view_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowViewUniform"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowStagingBuffer"),
            size: uniform_size * MAX_SHADOW_MATRICES as u64,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ShadowViewLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(uniform_size),
                },
                count: None,
            }],
        });

        let view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ShadowViewBindGroup"),
            layout: &view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: view_uniform.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ShadowShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/shadow.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ShadowPipelineLayout"),
            bind_group_layouts: &[&view_layout, objects_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("ShadowPipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: settings.depth_bias_constant,
                    slope_scale: settings.depth_bias_slope,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            layout,
            _texture: texture,
            atlas_view,
            sampler,
            view_uniform,
            view_bind_group,
            staging,
            pipeline,
        }
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn atlas_view(&self) -> &wgpu::TextureView {
        &self.atlas_view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Render every granted tile. Each tile gets its own render pass so the
    /// per-view uniform can be updated between draws; the first pass clears
    /// the whole atlas.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        assets: &Assets,
        items: &[DrawItem],
        objects_bind_group: &wgpu::BindGroup,
        plan: &mut ShadowPlan,
    ) {
        if plan.assignments.is_empty() {
            // Nothing to render, but the atlas must still hold "no occluder"
            // depth from a previous frame being sampled; clear it.
            self.clear_pass(encoder);
            return;
        }

        // Stage every view matrix up front, then copy one at a time into the
        // bound uniform between passes.
        let uniform_size = std::mem::size_of::<ShadowViewUniform>() as u64;
        let mut staged: Vec<ShadowViewUniform> = Vec::new();
        for assignment in &plan.assignments {
            for matrix in &assignment.matrices {
                staged.push(ShadowViewUniform {
                    view_proj: matrix.to_cols_array_2d(),
                });
            }
        }
        queue.write_buffer(&self.staging, 0, bytemuck::cast_slice(&staged));

        let mut first = true;
        let mut matrix_index = 0u64;
        for assignment in &mut plan.assignments {
            for tile_offset in 0..assignment.matrices.len() as u32 {
                encoder.copy_buffer_to_buffer(
                    &self.staging,
                    matrix_index * uniform_size,
                    &self.view_uniform,
                    0,
                    uniform_size,
                );
                matrix_index += 1;

                let region = self.layout.region(assignment.first_tile + tile_offset);
                self.tile_pass(
                    encoder,
                    region,
                    first,
                    assets,
                    items,
                    objects_bind_group,
                );
                first = false;
            }
            assignment.state = SlotState::Rendered;
        }
    }

    fn clear_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ShadowAtlasClear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.atlas_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn tile_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        region: AtlasRegion,
        clear: bool,
        assets: &Assets,
        items: &[DrawItem],
        objects_bind_group: &wgpu::BindGroup,
    ) {
        let load = if clear {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ShadowTilePass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.atlas_view,
                depth_ops: Some(wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_viewport(
            region.x as f32,
            region.y as f32,
            region.size as f32,
            region.size as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(region.x, region.y, region.size, region.size);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.view_bind_group, &[]);
        pass.set_bind_group(1, objects_bind_group, &[]);

        for (object_index, item) in items.iter().enumerate() {
            // Blended surfaces do not write the shadow map.
            if item.material.requires_separate_pass() || item.material.unlit {
                continue;
            }
            let Some(mesh) = assets.meshes.peek(item.mesh) else {
                continue;
            };
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            let instance = object_index as u32;
            pass.draw_indexed(0..mesh.index_count, 0, instance..instance + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn settings() -> RenderSettings {
        RenderSettings::default()
    }

    fn camera() -> Camera3D {
        Camera3D::new(Vec3::new(0.0, 3.0, 10.0), Vec3::ZERO)
    }

    fn directional(intensity: f32) -> Light {
        Light::Directional {
            direction: Vec3::new(-0.3, -1.0, -0.2),
            color: Vec3::ONE,
            intensity,
            cast_shadows: true,
        }
    }

    fn point(position: Vec3, intensity: f32) -> Light {
        Light::Point {
            position,
            color: Vec3::ONE,
            intensity,
            range: 10.0,
            cast_shadows: true,
        }
    }

    #[test]
    fn directional_light_gets_one_tile_per_cascade() {
        let mut lights = LightSet::new();
        lights.add(directional(1.0));
        let layout = AtlasLayout::new(4096, 512);

        let plan = plan_shadows(&lights, &camera(), &settings(), &layout);
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].tile_count(), 4);
        assert_eq!(plan.splits.len(), 5);
        assert_eq!(plan.dropped, 0);
    }

    #[test]
    fn point_lights_take_six_tiles_each() {
        let mut lights = LightSet::new();
        lights.add(point(Vec3::new(1.0, 1.0, 0.0), 2.0));
        let layout = AtlasLayout::new(4096, 512);

        let plan = plan_shadows(&lights, &camera(), &settings(), &layout);
        assert_eq!(plan.assignments[0].tile_count(), 6);
        assert_eq!(plan.assignments[0].kind, ShadowKind::Point);
    }

    #[test]
    fn directional_outranks_brighter_point_lights() {
        let mut lights = LightSet::new();
        lights.add(point(Vec3::ZERO, 100.0));
        lights.add(directional(0.1));
        let layout = AtlasLayout::new(4096, 512);

        let plan = plan_shadows(&lights, &camera(), &settings(), &layout);
        assert_eq!(plan.assignments[0].kind, ShadowKind::Directional);
        assert_eq!(plan.assignments[0].first_tile, 0);
    }

    #[test]
    fn matrix_budget_drops_the_overflowing_caster() {
        // 4 cascades + 4 point lights x 6 faces = 28 matrices; a fifth point
        // light would need 34 and is dropped even though tiles remain.
        let mut lights = LightSet::new();
        lights.add(directional(1.0));
        for i in 0..5 {
            lights.add(point(Vec3::new(i as f32, 1.0, 0.0), 5.0 - i as f32));
        }
        let layout = AtlasLayout::new(4096, 512);

        let plan = plan_shadows(&lights, &camera(), &settings(), &layout);
        assert_eq!(plan.assignments.len(), 5);
        assert_eq!(plan.dropped, 1);
        assert!(plan.total_tiles() as usize <= MAX_SHADOW_MATRICES);
    }

    #[test]
    fn non_casting_lights_are_ignored() {
        let mut lights = LightSet::new();
        lights.add(Light::Point {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 5.0,
            cast_shadows: false,
        });
        let layout = AtlasLayout::new(4096, 512);

        let plan = plan_shadows(&lights, &camera(), &settings(), &layout);
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.dropped, 0);
    }

    #[test]
    fn assignments_start_reserved_and_tiles_do_not_overlap() {
        let mut lights = LightSet::new();
        lights.add(directional(1.0));
        lights.add(point(Vec3::ONE, 1.0));
        let layout = AtlasLayout::new(4096, 512);

        let plan = plan_shadows(&lights, &camera(), &settings(), &layout);
        assert!(plan
            .assignments
            .iter()
            .all(|a| a.state == SlotState::Reserved));
        assert_eq!(plan.assignments[0].first_tile, 0);
        assert_eq!(
            plan.assignments[1].first_tile,
            plan.assignments[0].tile_count()
        );
    }
}
