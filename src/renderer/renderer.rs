//! Frame orchestration. One `render_frame` walks the whole pipeline:
//! shadow atlas, depth/normal prepass, contact shadows, one IBL precompute
//! step, the PBR shading pass and the 2D overlay.

use std::sync::Arc;

use glam::Vec3;
use log::warn;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::RenderError;
use crate::scene::{Camera3D, DrawItem, Light, SceneSnapshot};
use crate::settings::RenderSettings;

use super::buffers::{CameraBuffer, FrameBuffers, SceneBindings};
use super::context::RenderContext;
use super::ibl::{IblPrecompute, PREFILTER_MIPS};
use super::lights::{build_lights_uniform, build_shadows_uniform};
use super::overlay::OverlayPass;
use super::pipeline::MainPipelines;
use super::prepass::Prepass;
use super::shadow::{plan_shadows, ContactShadowPass, ShadowResources};
use super::uniforms::{CameraUniform, EnvironmentUniform};
use super::Assets;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};

pub struct Renderer {
    context: RenderContext,
    settings: RenderSettings,
    camera_buffer: CameraBuffer,
    frame_buffers: FrameBuffers,
    scene_bindings: SceneBindings,
    pipelines: MainPipelines,
    shadows: ShadowResources,
    prepass: Prepass,
    contact: ContactShadowPass,
    ibl: IblPrecompute,
    overlay: OverlayPass,
    bindings_dirty: bool,
    last_env_key: Option<u64>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, settings: RenderSettings) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let context = pollster::block_on(RenderContext::new(window, size, &settings))?;
        let device = &context.device;

        let camera_buffer = CameraBuffer::new(device);
        let frame_buffers = FrameBuffers::new(device, 256);
        let scene_bindings = SceneBindings::new(device);

        let shadows = ShadowResources::new(device, &frame_buffers.bind_layout, &settings);
        let prepass = Prepass::new(
            device,
            &camera_buffer.bind_layout,
            &frame_buffers.bind_layout,
            size.width,
            size.height,
        );
        let contact = ContactShadowPass::new(
            device,
            &camera_buffer.bind_layout,
            size.width,
            size.height,
        );
        let ibl = IblPrecompute::new(device, &context.queue);

        let pipelines = MainPipelines::new(
            device,
            context.surface_format(),
            &camera_buffer.bind_layout,
            &frame_buffers.bind_layout,
            &scene_bindings.bind_layout,
        )?;
        let overlay = OverlayPass::new(device, context.surface_format())?;

        Ok(Self {
            context,
            settings,
            camera_buffer,
            frame_buffers,
            scene_bindings,
            pipelines,
            shadows,
            prepass,
            contact,
            ibl,
            overlay,
            bindings_dirty: true,
            last_env_key: None,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Resource pools sharing this renderer's device.
    pub fn create_assets(&self) -> Assets {
        Assets::new(
            self.context.device.clone(),
            self.context.queue.clone(),
            &self.settings,
        )
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.context.resize(new_size);

        let device = self.context.device.clone();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.prepass.resize(&device, new_size.width, new_size.height);
        self.contact.resize(&device, new_size.width, new_size.height);
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            warn!("Out of memory while resizing render targets: {error}");
        }
        // The prepass depth and contact target views changed identity.
        self.bindings_dirty = true;
    }

    /// Render one frame from an immutable scene snapshot. A missing camera
    /// clears the surface and still draws the overlay.
    pub fn render_frame(
        &mut self,
        scene: &SceneSnapshot,
        assets: &mut Assets,
    ) -> Result<(), RenderError> {
        // Finished decodes swap in here; material bind groups are rebuilt
        // each frame so the new views are picked up immediately.
        assets.drain_loader();

        let device = self.context.device.clone();
        let queue = self.context.queue.clone();

        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context
                    .surface
                    .configure(&device, &self.context.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Surface frame acquisition timed out; skipping frame");
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let width = self.context.config.width;
        let height = self.context.config.height;

        let Some(scene_camera) = &scene.camera else {
            self.render_overlay_only(&device, &queue, &frame_view, assets, scene);
            frame.present();
            return Ok(());
        };
        let mut camera = scene_camera.clone();
        camera.set_aspect(width as f32 / height.max(1) as f32);

        self.camera_buffer
            .update(&queue, &CameraUniform::from_camera(&camera));

        let items = scene.flatten();
        self.frame_buffers.update(&device, &queue, &items);

        let mut plan = plan_shadows(&scene.lights, &camera, &self.settings, self.shadows.layout());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("FrameEncoder"),
        });

        // Environment: adopt the snapshot's skybox and run at most one
        // precompute render this frame.
        if let Some(skybox) = &scene.skybox {
            let key = skybox.source_key();
            if self.last_env_key != Some(key) {
                self.bindings_dirty = true;
                self.last_env_key = Some(key);
            }
            self.ibl.set_skybox(&device, &queue, skybox);
        }
        self.ibl.advance(&device, &queue, &mut encoder);

        self.shadows.render(
            &queue,
            &mut encoder,
            assets,
            &items,
            &self.frame_buffers.bind_group,
            &mut plan,
        );

        self.prepass.render(
            &mut encoder,
            assets,
            &items,
            &self.camera_buffer.bind_group,
            &self.frame_buffers.bind_group,
        );

        let contact_dir = primary_directional(scene);
        self.contact.render(
            &device,
            &queue,
            &mut encoder,
            &self.camera_buffer.bind_group,
            self.prepass.depth_view(),
            contact_dir,
            &self.settings,
        );

        let lights_uniform = build_lights_uniform(&scene.lights, &plan);
        queue.write_buffer(
            &self.scene_bindings.lights_buffer,
            0,
            bytemuck::bytes_of(&lights_uniform),
        );
        let shadows_uniform = build_shadows_uniform(
            &plan,
            self.shadows.layout(),
            &self.settings,
            contact_dir.is_some(),
        );
        queue.write_buffer(
            &self.scene_bindings.shadows_buffer,
            0,
            bytemuck::bytes_of(&shadows_uniform),
        );
        let mut environment = EnvironmentUniform::new(
            self.ibl.intensity(),
            self.settings.exposure,
            PREFILTER_MIPS,
            self.ibl.ready(),
        );
        if let Some(color) = self.ibl.solid_color() {
            environment = environment.with_solid_color(color);
        }
        queue.write_buffer(
            &self.scene_bindings.environment_buffer,
            0,
            bytemuck::bytes_of(&environment),
        );

        if self.bindings_dirty || self.scene_bindings.bind_group.is_none() {
            self.scene_bindings.rebuild(
                &device,
                self.shadows.atlas_view(),
                self.shadows.sampler(),
                self.contact.target_view(),
                self.ibl.irradiance_view(),
                self.ibl.prefilter_view(),
                self.ibl.brdf_view(),
                self.ibl.skybox_view(),
                self.ibl.sampler(),
            );
            self.bindings_dirty = false;
        }

        self.main_pass(&device, &mut encoder, &frame_view, assets, scene, &camera, &items);
        plan.mark_sampled();

        self.overlay.render(
            &device,
            &queue,
            &mut encoder,
            &frame_view,
            assets,
            &scene.overlay,
            width,
            height,
        );

        queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn main_pass(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        frame_view: &wgpu::TextureView,
        assets: &Assets,
        scene: &SceneSnapshot,
        camera: &Camera3D,
        items: &[DrawItem],
    ) {
        // Bind groups outlive the pass, so build them all up front.
        let material_bind_groups: Vec<wgpu::BindGroup> = items
            .iter()
            .map(|item| self.pipelines.material_bind_group(device, assets, &item.material))
            .collect();

        let mut opaque: Vec<usize> = Vec::with_capacity(items.len());
        let mut blended: Vec<usize> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            if item.material.requires_separate_pass() {
                blended.push(i);
            } else {
                opaque.push(i);
            }
        }
        // Blended surfaces draw back to front.
        let camera_pos = camera.position();
        blended.sort_by(|&a, &b| {
            let da = distance_to_camera(&items[a], camera_pos);
            let db = distance_to_camera(&items[b], camera_pos);
            db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
        });

        let scene_bind_group = self
            .scene_bindings
            .bind_group
            .as_ref()
            .expect("scene bind group was rebuilt before the main pass");

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("MainPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: frame_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.prepass.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    // Depth was resolved by the prepass.
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipelines.opaque);
        pass.set_bind_group(0, &self.camera_buffer.bind_group, &[]);
        pass.set_bind_group(1, &self.frame_buffers.bind_group, &[]);
        pass.set_bind_group(2, scene_bind_group, &[]);
        for &i in &opaque {
            Self::draw_item(&mut pass, assets, items, &material_bind_groups, i);
        }

        if scene.skybox.is_some() {
            pass.set_pipeline(&self.pipelines.skybox);
            pass.set_bind_group(0, &self.camera_buffer.bind_group, &[]);
            pass.set_bind_group(1, scene_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        if !blended.is_empty() {
            pass.set_pipeline(&self.pipelines.blend);
            pass.set_bind_group(0, &self.camera_buffer.bind_group, &[]);
            pass.set_bind_group(1, &self.frame_buffers.bind_group, &[]);
            pass.set_bind_group(2, scene_bind_group, &[]);
            for &i in &blended {
                Self::draw_item(&mut pass, assets, items, &material_bind_groups, i);
            }
        }
    }

    fn draw_item(
        pass: &mut wgpu::RenderPass<'_>,
        assets: &Assets,
        items: &[DrawItem],
        material_bind_groups: &[wgpu::BindGroup],
        index: usize,
    ) {
        let Some(mesh) = assets.meshes.peek(items[index].mesh) else {
            return;
        };
        pass.set_bind_group(3, &material_bind_groups[index], &[]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        let instance = index as u32;
        pass.draw_indexed(0..mesh.index_count, 0, instance..instance + 1);
    }

    fn render_overlay_only(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame_view: &wgpu::TextureView,
        assets: &Assets,
        scene: &SceneSnapshot,
    ) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("OverlayOnlyEncoder"),
        });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ClearPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: frame_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.overlay.render(
            device,
            queue,
            &mut encoder,
            frame_view,
            assets,
            &scene.overlay,
            self.context.config.width,
            self.context.config.height,
        );
        queue.submit(Some(encoder.finish()));
    }
}

/// The light the contact shadow march follows: the first directional light.
fn primary_directional(scene: &SceneSnapshot) -> Option<Vec3> {
    scene.lights.lights().iter().find_map(|light| match light {
        Light::Directional { direction, .. } => Some(*direction),
        _ => None,
    })
}

fn distance_to_camera(item: &DrawItem, camera_pos: Vec3) -> f32 {
    let translation = item.model.w_axis.truncate();
    translation.distance_squared(camera_pos)
}
