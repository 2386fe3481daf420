use thiserror::Error;

/// Failure taxonomy for the mask and tint pipeline.
///
/// `Decode` and `Raster` are fatal to the call that raised them. In the
/// single-pass strategy `Generation` is fatal to the whole run; in the
/// multi-step strategy it is contained per step. Nothing here is retried.
#[derive(Debug, Error)]
pub enum TintError {
    #[error("failed to decode source image: {0}")]
    Decode(image::ImageError),
    #[error("mask raster failure: {0}")]
    Raster(String),
    #[error("inpainting generation failed: {0}")]
    Generation(String),
    #[error("object detection failed: {0}")]
    Detection(String),
}

impl TintError {
    /// Short machine-readable tag used in pipeline events.
    pub fn kind(&self) -> &'static str {
        match self {
            TintError::Decode(_) => "decode",
            TintError::Raster(_) => "raster",
            TintError::Generation(_) => "generation",
            TintError::Detection(_) => "detection",
        }
    }
}
