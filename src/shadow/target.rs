//! Off-screen shadow target: depth texture, optional color attachment, sampler

use serde::{Deserialize, Serialize};

use crate::backend::*;
use crate::shadow::ShadowError;

/// How shadow lookups outside [0, 1] are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClampMode {
    /// Repeat the outermost texel
    Edge,
    /// Read a fixed border depth
    #[default]
    Border,
}

/// Everything that decides the shadow sampler's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerPolicy {
    pub clamp: ClampMode,
    /// Border reads as shadowed (depth 0) instead of lit (depth 1)
    pub border_shadowed: bool,
    /// Linear filtering of comparison results
    pub hardware_pcf: bool,
}

impl SamplerPolicy {
    /// Comparison sampler for this policy; `clamp_to_border` is the device capability
    pub fn descriptor(&self, clamp_to_border: bool) -> SamplerDescriptor {
        let (address_mode, border_color) = match self.clamp {
            ClampMode::Border if clamp_to_border => (
                AddressMode::ClampToBorder,
                Some(if self.border_shadowed {
                    BorderColor::OpaqueBlack
                } else {
                    BorderColor::OpaqueWhite
                }),
            ),
            _ => (AddressMode::ClampToEdge, None),
        };
        let filter = if self.hardware_pcf {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        };

        SamplerDescriptor {
            label: Some("Shadow Sampler".into()),
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: FilterMode::Nearest,
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            compare: Some(CompareFunction::LessEqual),
            border_color,
        }
    }
}

/// Resources the main pass binds to read the shadow map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowBinding {
    pub depth_view: TextureViewHandle,
    pub sampler: SamplerHandle,
    /// Gray-scale depth written alongside, for debug display
    pub debug_color_view: Option<TextureViewHandle>,
}

#[derive(Debug, Clone, Copy)]
struct Attachment {
    texture: TextureHandle,
    view: TextureViewHandle,
}

/// Square depth target that reallocates only when its requested size changes
#[derive(Debug)]
pub struct ShadowTarget {
    requested: u32,
    allocated: u32,
    with_color: bool,
    depth: Option<Attachment>,
    color: Option<Attachment>,
    sampler: Option<SamplerHandle>,
    policy: SamplerPolicy,
    applied_policy: Option<SamplerPolicy>,
    allocations: u32,
    generation: u64,
    border_fallback_warned: bool,
}

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
pub const DEBUG_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

impl ShadowTarget {
    pub fn new(resolution: u32, with_color: bool) -> Result<Self, ShadowError> {
        if resolution == 0 {
            return Err(ShadowError::InvalidResolution(resolution));
        }
        Ok(Self {
            requested: resolution,
            allocated: 0,
            with_color,
            depth: None,
            color: None,
            sampler: None,
            policy: SamplerPolicy::default(),
            applied_policy: None,
            allocations: 0,
            generation: 0,
            border_fallback_warned: false,
        })
    }

    /// Ask for a new size; nothing is allocated until [`ShadowTarget::prepare`]
    pub fn request_resolution(&mut self, resolution: u32) -> Result<(), ShadowError> {
        if resolution == 0 {
            return Err(ShadowError::InvalidResolution(resolution));
        }
        self.requested = resolution;
        Ok(())
    }

    pub fn set_policy(&mut self, policy: SamplerPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> SamplerPolicy {
        self.policy
    }

    /// Size requested by the last configuration
    pub fn requested_resolution(&self) -> u32 {
        self.requested
    }

    /// Size of the textures currently allocated, 0 before the first prepare
    pub fn resolution(&self) -> u32 {
        self.allocated
    }

    /// Number of times the textures have been (re)created
    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    /// Changes whenever a view or the sampler is replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_color(&self) -> bool {
        self.with_color
    }

    pub fn depth_view(&self) -> Option<TextureViewHandle> {
        self.depth.map(|a| a.view)
    }

    pub fn color_view(&self) -> Option<TextureViewHandle> {
        self.color.map(|a| a.view)
    }

    pub fn sampler(&self) -> Option<SamplerHandle> {
        self.sampler
    }

    pub fn binding(&self) -> Option<ShadowBinding> {
        Some(ShadowBinding {
            depth_view: self.depth_view()?,
            sampler: self.sampler?,
            debug_color_view: self.color_view(),
        })
    }

    /// Bring GPU resources in line with the requested size and sampler policy
    pub fn prepare<B: GraphicsBackend>(&mut self, backend: &mut B) -> Result<(), ShadowError> {
        if self.depth.is_none() || self.allocated != self.requested {
            self.reallocate(backend)?;
        }
        if self.sampler.is_none() || self.applied_policy != Some(self.policy) {
            self.rebuild_sampler(backend)?;
        }
        Ok(())
    }

    fn reallocate<B: GraphicsBackend>(&mut self, backend: &mut B) -> Result<(), ShadowError> {
        log::info!(
            "Allocating {}x{} shadow target (was {})",
            self.requested,
            self.requested,
            self.allocated
        );
        self.release_textures(backend);

        let size = self.requested;
        let depth = Self::create_attachment(
            backend,
            "Shadow Depth",
            size,
            DEPTH_FORMAT,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )?;
        self.depth = Some(depth);

        if self.with_color {
            let color = Self::create_attachment(
                backend,
                "Shadow Debug Color",
                size,
                DEBUG_COLOR_FORMAT,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            )?;
            self.color = Some(color);
        }

        self.allocated = size;
        self.allocations += 1;
        self.generation += 1;
        Ok(())
    }

    fn create_attachment<B: GraphicsBackend>(
        backend: &mut B,
        label: &str,
        size: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Result<Attachment, ShadowError> {
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some(label.into()),
            width: size,
            height: size,
            format,
            usage,
        })?;
        let view = backend.create_texture_view(texture)?;
        Ok(Attachment { texture, view })
    }

    fn rebuild_sampler<B: GraphicsBackend>(&mut self, backend: &mut B) -> Result<(), ShadowError> {
        let clamp_to_border = backend.supports_clamp_to_border();
        if self.policy.clamp == ClampMode::Border && !clamp_to_border && !self.border_fallback_warned {
            log::warn!(
                "{} cannot clamp to border; shadow lookups outside the light frustum use edge clamping",
                backend.name()
            );
            self.border_fallback_warned = true;
        }

        let desc = self.policy.descriptor(clamp_to_border);
        log::debug!(
            "Shadow sampler: {:?} border {:?}, {:?} filtering",
            desc.address_mode_u,
            desc.border_color,
            desc.mag_filter
        );
        let sampler = backend.create_sampler(&desc)?;
        if let Some(old) = self.sampler.replace(sampler) {
            backend.destroy_sampler(old);
        }
        self.applied_policy = Some(self.policy);
        self.generation += 1;
        Ok(())
    }

    fn release_textures<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for attachment in [self.depth.take(), self.color.take()].into_iter().flatten() {
            backend.destroy_texture(attachment.texture);
        }
        self.allocated = 0;
    }

    /// Destroy every GPU resource; the next prepare starts from scratch
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.release_textures(backend);
        if let Some(sampler) = self.sampler.take() {
            backend.destroy_sampler(sampler);
        }
        self.applied_policy = None;
    }
}
