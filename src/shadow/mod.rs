//! Two-pass shadow mapping
//!
//! [`ShadowPipeline`] owns the off-screen depth target, renders the scene into
//! it from the light, and hands the main pass a [`ShadowBinding`] together with
//! the matrix that projects view-space points into the map.

pub mod light_frame;
pub mod sampling;
pub mod target;

pub use light_frame::{shadow_matrix, LightFrame, SHADOW_BIAS};
pub use target::{ClampMode, SamplerPolicy, ShadowBinding, ShadowTarget};

use glam::{Mat4, Vec3};
use thiserror::Error;

use crate::backend::*;
use crate::config::RenderSettings;

#[derive(Error, Debug)]
pub enum ShadowError {
    #[error("Shadow map resolution must be positive, got {0}")]
    InvalidResolution(u32),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Depth written where nothing was drawn
pub const DEPTH_CLEAR: f32 = 1.0;

pub struct ShadowPipeline {
    target: ShadowTarget,
    depth_bias: Option<DepthBias>,
}

impl ShadowPipeline {
    /// `with_color` adds a gray-scale debug attachment next to the depth map
    pub fn new(resolution: u32, with_color: bool) -> Result<Self, ShadowError> {
        Ok(Self {
            target: ShadowTarget::new(resolution, with_color)?,
            depth_bias: None,
        })
    }

    /// Set target size and clamp policy.
    ///
    /// Reallocation happens lazily in [`ShadowPipeline::render_depth`] and only
    /// when `resolution` differs from the allocated size.
    pub fn configure(
        &mut self,
        resolution: u32,
        clamp: ClampMode,
        border_shadowed: bool,
    ) -> Result<(), ShadowError> {
        self.target.request_resolution(resolution)?;
        self.target.set_policy(SamplerPolicy {
            clamp,
            border_shadowed,
            ..self.target.policy()
        });
        Ok(())
    }

    /// Polygon offset used while rendering depth; `None` disables it
    pub fn set_depth_bias(&mut self, bias: Option<DepthBias>) {
        self.depth_bias = bias;
    }

    pub fn depth_bias(&self) -> Option<DepthBias> {
        self.depth_bias
    }

    pub fn set_hardware_pcf(&mut self, enabled: bool) {
        self.target.set_policy(SamplerPolicy {
            hardware_pcf: enabled,
            ..self.target.policy()
        });
    }

    /// Pick up every shadow-related field of the runtime settings
    pub fn apply_settings(&mut self, settings: &RenderSettings) -> Result<(), ShadowError> {
        self.configure(
            settings.shadow_resolution,
            settings.clamp_mode,
            settings.border_shadowed,
        )?;
        self.set_depth_bias(settings.depth_bias());
        self.set_hardware_pcf(settings.hardware_pcf);
        Ok(())
    }

    pub fn compute_light_frame(light_position: Vec3) -> LightFrame {
        LightFrame::from_position(light_position)
    }

    pub fn compute_shadow_matrix(light_view: Mat4, light_proj: Mat4, camera_view: Mat4) -> Mat4 {
        shadow_matrix(light_view, light_proj, camera_view)
    }

    /// Render scene depth from the light.
    ///
    /// Allocates or resizes the target if needed, clears it, enables the depth
    /// bias, and calls `draw(backend, light_view, light_proj)` inside the pass.
    /// The backend's previous bias is restored before the pass ends.
    pub fn render_depth<B, F>(
        &mut self,
        backend: &mut B,
        light: &LightFrame,
        mut draw: F,
    ) -> Result<(), ShadowError>
    where
        B: GraphicsBackend,
        F: FnMut(&mut B, &Mat4, &Mat4),
    {
        self.target.prepare(backend)?;
        let Some(depth_view) = self.target.depth_view() else {
            return Err(BackendError::InvalidHandle("shadow depth view".into()).into());
        };

        let color_attachments = self
            .target
            .color_view()
            .map(|view| ColorAttachment {
                view,
                load_op: LoadOp::Clear([1.0, 1.0, 1.0, 1.0]),
                store_op: StoreOp::Store,
            })
            .into_iter()
            .collect();

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Shadow Depth Pass".into()),
            color_attachments,
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: depth_view,
                depth_load_op: LoadOp::Clear([DEPTH_CLEAR, 0.0, 0.0, 0.0]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: DEPTH_CLEAR,
            }),
        });

        let size = self.target.resolution() as f32;
        backend.set_viewport(0.0, 0.0, size, size, 0.0, 1.0);

        let previous_bias = backend.depth_bias();
        backend.set_depth_bias(self.depth_bias);
        draw(backend, &light.view, &light.proj);
        backend.set_depth_bias(previous_bias);

        backend.end_render_pass();
        Ok(())
    }

    /// Depth map and sampler for the main pass, once the target exists
    pub fn shadow_binding(&self) -> Option<ShadowBinding> {
        self.target.binding()
    }

    pub fn target(&self) -> &ShadowTarget {
        &self.target
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.target.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> LightFrame {
        ShadowPipeline::compute_light_frame(Vec3::new(40.0, 40.0, 0.0))
    }

    #[test]
    fn configure_same_resolution_does_not_reallocate() {
        let mut backend = HeadlessBackend::new();
        let mut shadow = ShadowPipeline::new(128, false).unwrap();
        for _ in 0..3 {
            shadow.configure(128, ClampMode::Border, false).unwrap();
            shadow.render_depth(&mut backend, &light(), |_, _, _| {}).unwrap();
        }
        assert_eq!(shadow.target().allocations(), 1);
    }

    #[test]
    fn configure_new_resolution_reallocates_once() {
        let mut backend = HeadlessBackend::new();
        let mut shadow = ShadowPipeline::new(128, false).unwrap();
        shadow.render_depth(&mut backend, &light(), |_, _, _| {}).unwrap();

        shadow.configure(512, ClampMode::Border, false).unwrap();
        shadow.configure(512, ClampMode::Border, false).unwrap();
        shadow.render_depth(&mut backend, &light(), |_, _, _| {}).unwrap();
        shadow.render_depth(&mut backend, &light(), |_, _, _| {}).unwrap();

        assert_eq!(shadow.target().allocations(), 2);
        assert_eq!(shadow.target().resolution(), 512);
        let view = shadow.shadow_binding().unwrap().depth_view;
        assert_eq!(backend.view_descriptor(view).unwrap().width, 512);
        assert_eq!(backend.live_textures(), 1);
    }

    #[test]
    fn configure_rejects_zero() {
        let mut shadow = ShadowPipeline::new(128, false).unwrap();
        assert!(matches!(
            shadow.configure(0, ClampMode::Edge, false),
            Err(ShadowError::InvalidResolution(0))
        ));
        assert_eq!(shadow.target().requested_resolution(), 128);
    }

    #[test]
    fn render_depth_passes_light_matrices_and_restores_bias() {
        let mut backend = HeadlessBackend::new();
        let outer = DepthBias::new(0.5, 2.0);
        backend.set_depth_bias(Some(outer));

        let mut shadow = ShadowPipeline::new(64, false).unwrap();
        let bias = DepthBias::new(1.87, 1.0);
        shadow.set_depth_bias(Some(bias));

        let frame = light();
        let mut seen = None;
        shadow
            .render_depth(&mut backend, &frame, |backend, view, proj| {
                seen = Some((*view, *proj, backend.depth_bias()));
            })
            .unwrap();

        assert_eq!(seen, Some((frame.view, frame.proj, Some(bias))));
        assert_eq!(backend.depth_bias(), Some(outer));
    }

    #[test]
    fn render_depth_clears_the_target() {
        let mut backend = HeadlessBackend::new();
        let mut shadow = ShadowPipeline::new(8, true).unwrap();
        shadow.render_depth(&mut backend, &light(), |_, _, _| {}).unwrap();

        let binding = shadow.shadow_binding().unwrap();
        backend.depth_image_mut(binding.depth_view).unwrap().fill(0.25);
        shadow.render_depth(&mut backend, &light(), |_, _, _| {}).unwrap();

        let image = backend.depth_image(binding.depth_view).unwrap();
        assert!(image.texels.iter().all(|&d| d == DEPTH_CLEAR));
        match &backend.commands()[0] {
            RecordedCommand::BeginRenderPass {
                color_attachments,
                depth_cleared,
                ..
            } => {
                assert_eq!(color_attachments.len(), 1);
                assert!(*depth_cleared);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clamp_modes_resolve_out_of_frustum_lookups() {
        let mut backend = HeadlessBackend::new();
        let mut shadow = ShadowPipeline::new(4, false).unwrap();
        shadow.render_depth(&mut backend, &light(), |_, _, _| {}).unwrap();

        // an occluder along the right edge of the map
        let view = shadow.shadow_binding().unwrap().depth_view;
        let image = backend.depth_image_mut(view).unwrap();
        for y in 0..4 {
            image.set_texel(3, y, 0.3);
        }

        let sample = |shadow: &ShadowPipeline, backend: &HeadlessBackend, u: f32| {
            let binding = shadow.shadow_binding().unwrap();
            backend.sample_depth(binding.depth_view, binding.sampler, u, 0.5).unwrap()
        };

        assert_eq!(sample(&shadow, &backend, 1.5), 1.0);
        assert_eq!(sample(&shadow, &backend, 0.9), 0.3);

        shadow.configure(4, ClampMode::Border, true).unwrap();
        shadow.target.prepare(&mut backend).unwrap();
        assert_eq!(sample(&shadow, &backend, 1.5), 0.0);

        shadow.configure(4, ClampMode::Edge, true).unwrap();
        shadow.target.prepare(&mut backend).unwrap();
        assert_eq!(sample(&shadow, &backend, 1.5), 0.3);
        assert_eq!(shadow.target().allocations(), 1);
    }
}
