//! Capability flags and variant selection

/// Capability flags read once at technique construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Deferred shading requested
    pub deferred_shading: bool,
    /// Device supports bindless resources
    pub bindless: bool,
    /// Visibility buffer requested
    pub visibility_buffer: bool,
    /// Compute resolve requested for the visibility buffer
    pub compute_resolve: bool,
}

/// How the visibility buffer is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveMode {
    Raster,
    Compute,
}

/// Prepass variant a technique is built with. Terminal once selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TechniqueVariant {
    Forward,
    Deferred,
    VisibilityBuffer { resolve: ResolveMode },
}

impl TechniqueVariant {
    /// Map capability flags to exactly one variant.
    ///
    /// The visibility buffer needs bindless support and compute resolve needs
    /// the visibility buffer. Missing capabilities select a lesser variant and
    /// are only reported.
    pub fn select(caps: &Capabilities) -> Self {
        if caps.visibility_buffer && !caps.bindless {
            log::info!("Visibility buffer requested without bindless support, falling back");
        }
        if caps.visibility_buffer && caps.bindless {
            let resolve = if caps.compute_resolve {
                ResolveMode::Compute
            } else {
                ResolveMode::Raster
            };
            let variant = TechniqueVariant::VisibilityBuffer { resolve };
            log::debug!("Selected {:?}", variant);
            return variant;
        }

        if caps.compute_resolve {
            log::info!("Compute resolve requested without a visibility buffer, ignored");
        }
        let variant = if caps.deferred_shading {
            TechniqueVariant::Deferred
        } else {
            TechniqueVariant::Forward
        };
        log::debug!("Selected {:?}", variant);
        variant
    }

    pub fn is_visibility_buffer(&self) -> bool {
        matches!(self, TechniqueVariant::VisibilityBuffer { .. })
    }
}
