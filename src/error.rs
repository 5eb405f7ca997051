use thiserror::Error;

/// Errors surfaced by the rendering pipeline.
///
/// Only `ShaderCompile` and the device/surface variants are fatal; everything
/// else (missing textures, capacity pressure, transient allocation failures)
/// is absorbed inside the renderer and logged.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A WGSL module failed validation at pipeline initialization. The
    /// compiler diagnostic is carried verbatim.
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to create rendering surface: {0}")]
    Surface(String),

    #[error("failed to create device: {0}")]
    Device(String),
}
