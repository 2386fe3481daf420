//! Mask synthesis and inpainting orchestration.
//!
//! The engine rasterizes filtered detection regions into binary edit-masks
//! and drives an [`providers::InpaintProvider`] either as one combined edit
//! (single-pass) or as a chained sequence of per-region edits (multi-step).
//! All entry points take explicit arguments; nothing here holds ambient
//! state between runs.

pub mod error;
pub mod mask;
pub mod orchestrator;
pub mod providers;

pub use error::TintError;
pub use mask::{synthesize_mask, Mask};
pub use orchestrator::{
    default_step_prompt, run_multi_step, run_single_pass, ChainOutcome, ChainPlan, StepFailure,
    TintPlan,
};
pub use providers::{
    DetectionProvider, DryrunInpaintProvider, HttpDetectionProvider, HttpInpaintProvider,
    InpaintProvider,
};
