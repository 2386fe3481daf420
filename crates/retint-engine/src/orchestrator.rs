use std::sync::atomic::{AtomicBool, Ordering};

use retint_contracts::detect::Region;
use retint_contracts::dimensions::OutputSize;
use retint_contracts::events::{EventWriter, PipelineEvent};
use retint_contracts::request::{
    GenerationRequest, DEFAULT_CFG_SCALE, DEFAULT_FULL_PROMPT, DEFAULT_NEGATIVE_TEXT,
    DEFAULT_SEED,
};

use crate::error::TintError;
use crate::mask::synthesize_mask;
use crate::providers::InpaintProvider;

/// Default per-region prompt used by the multi-step strategy.
pub fn default_step_prompt(region: &Region) -> String {
    format!("Change {0} by a {0} pink variation", region.label)
}

/// Inputs for one single-pass run: one mask, one model call.
#[derive(Debug, Clone)]
pub struct TintPlan {
    pub image: Vec<u8>,
    pub mask: Vec<u8>,
    pub prompt: String,
    pub negative_text: String,
    pub size: OutputSize,
    pub seed: i64,
    pub cfg_scale: f64,
}

impl TintPlan {
    pub fn new(image: Vec<u8>, mask: Vec<u8>, size: OutputSize) -> Self {
        Self {
            image,
            mask,
            prompt: DEFAULT_FULL_PROMPT.to_string(),
            negative_text: DEFAULT_NEGATIVE_TEXT.to_string(),
            size,
            seed: DEFAULT_SEED,
            cfg_scale: DEFAULT_CFG_SCALE,
        }
    }
}

/// Inputs for one multi-step run: one model call per region, each step's
/// output feeding the next step's input.
pub struct ChainPlan<'a> {
    pub image: Vec<u8>,
    pub regions: Vec<Region>,
    pub negative_text: String,
    pub size: OutputSize,
    pub seed: i64,
    pub cfg_scale: f64,
    /// Checked before each step's provider call and again when the call
    /// returns; a set flag skips the remaining steps. Mid-flight calls are
    /// not aborted, but their results are discarded.
    pub cancel: Option<&'a AtomicBool>,
    pub prompt_builder: &'a dyn Fn(&Region) -> String,
}

impl<'a> ChainPlan<'a> {
    pub fn new(image: Vec<u8>, regions: Vec<Region>, size: OutputSize) -> Self {
        Self {
            image,
            regions,
            negative_text: DEFAULT_NEGATIVE_TEXT.to_string(),
            size,
            seed: DEFAULT_SEED,
            cfg_scale: DEFAULT_CFG_SCALE,
            cancel: None,
            prompt_builder: &default_step_prompt,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_prompt_builder(mut self, builder: &'a dyn Fn(&Region) -> String) -> Self {
        self.prompt_builder = builder;
        self
    }
}

/// One recorded per-step failure of a multi-step run.
#[derive(Debug)]
pub struct StepFailure {
    pub step: usize,
    pub label: String,
    pub error: TintError,
}

/// Result of a multi-step run. The run always completes and always carries
/// an image; when every step failed the image equals the input and callers
/// see that only through `failures`.
#[derive(Debug)]
pub struct ChainOutcome {
    pub image: Vec<u8>,
    pub applied: Vec<Region>,
    pub failures: Vec<StepFailure>,
    pub skipped: usize,
}

impl ChainOutcome {
    pub fn fully_applied(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }

    pub fn nothing_applied(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Accumulator threaded through the multi-step fold. Owned by one run and
/// discarded at its end; never shared or persisted.
struct PipelineState {
    current_image: Vec<u8>,
    applied_regions: Vec<Region>,
}

/// Single-pass strategy: exactly one provider call over the caller's mask.
/// A generation failure is fatal to the run; nothing is retried.
pub fn run_single_pass(
    provider: &dyn InpaintProvider,
    events: Option<&EventWriter>,
    plan: &TintPlan,
) -> Result<Vec<u8>, TintError> {
    emit(
        events,
        PipelineEvent::TintStarted {
            provider: provider.name().to_string(),
            size: plan.size.name.to_string(),
        },
    );
    let request =
        GenerationRequest::new(plan.image.clone(), plan.mask.clone(), plan.prompt.clone())
            .with_size(plan.size.width, plan.size.height)
            .with_negative_text(plan.negative_text.clone())
            .with_seed(plan.seed)
            .with_cfg_scale(plan.cfg_scale);
    match provider.inpaint(&request) {
        Ok(image) => {
            emit(events, PipelineEvent::TintCompleted { bytes: image.len() });
            Ok(image)
        }
        Err(error) => {
            emit(
                events,
                PipelineEvent::TintFailed {
                    kind: error.kind().to_string(),
                    error: error.to_string(),
                },
            );
            Err(error)
        }
    }
}

/// Multi-step strategy: a fold over the region list in filter output
/// order. Each step synthesizes a single-region mask against the current
/// image, issues one provider call, and on success replaces the current
/// image. A failed step is recorded and never aborts the remaining steps.
/// Bounding boxes are computed once against the original image and reused
/// verbatim for every step. A step whose call was in flight when the
/// cancel flag was raised has its result discarded and counts as skipped.
pub fn run_multi_step(
    provider: &dyn InpaintProvider,
    events: Option<&EventWriter>,
    plan: &ChainPlan<'_>,
) -> ChainOutcome {
    emit(
        events,
        PipelineEvent::ChainStarted {
            provider: provider.name().to_string(),
            regions: plan.regions.len(),
        },
    );

    let mut state = PipelineState {
        current_image: plan.image.clone(),
        applied_regions: Vec::new(),
    };
    let mut failures = Vec::new();
    let mut skipped = 0;

    for (index, region) in plan.regions.iter().enumerate() {
        if cancelled(plan) {
            skipped = skip_remaining(events, plan, index);
            break;
        }

        emit(
            events,
            PipelineEvent::StepStarted {
                step: index,
                label: region.label.clone(),
            },
        );
        let result = run_step(provider, plan, &state.current_image, index);
        if cancelled(plan) {
            skipped = skip_remaining(events, plan, index);
            break;
        }
        match result {
            Ok(image) => {
                state.current_image = image;
                state.applied_regions.push(region.clone());
                emit(
                    events,
                    PipelineEvent::StepCompleted {
                        step: index,
                        label: region.label.clone(),
                    },
                );
            }
            Err(error) => {
                emit(
                    events,
                    PipelineEvent::StepFailed {
                        step: index,
                        label: region.label.clone(),
                        kind: error.kind().to_string(),
                        error: error.to_string(),
                    },
                );
                failures.push(StepFailure {
                    step: index,
                    label: region.label.clone(),
                    error,
                });
            }
        }
    }

    emit(
        events,
        PipelineEvent::ChainCompleted {
            applied: state.applied_regions.len(),
            failed: failures.len(),
            skipped,
        },
    );

    ChainOutcome {
        image: state.current_image,
        applied: state.applied_regions,
        failures,
        skipped,
    }
}

fn cancelled(plan: &ChainPlan<'_>) -> bool {
    plan.cancel
        .map(|flag| flag.load(Ordering::SeqCst))
        .unwrap_or(false)
}

/// Emits a skip event for every step from `from` onward and returns how
/// many were skipped.
fn skip_remaining(events: Option<&EventWriter>, plan: &ChainPlan<'_>, from: usize) -> usize {
    for (index, region) in plan.regions.iter().enumerate().skip(from) {
        emit(
            events,
            PipelineEvent::StepSkipped {
                step: index,
                label: region.label.clone(),
            },
        );
    }
    plan.regions.len() - from
}

fn run_step(
    provider: &dyn InpaintProvider,
    plan: &ChainPlan<'_>,
    current_image: &[u8],
    index: usize,
) -> Result<Vec<u8>, TintError> {
    let mask = synthesize_mask(current_image, &plan.regions, Some(index))?.to_png_bytes()?;
    let prompt = (plan.prompt_builder)(&plan.regions[index]);
    let request = GenerationRequest::new(current_image.to_vec(), mask, prompt)
        .with_size(plan.size.width, plan.size.height)
        .with_negative_text(plan.negative_text.clone())
        .with_seed(plan.seed)
        .with_cfg_scale(plan.cfg_scale);
    provider.inpaint(&request)
}

// Event loss must not abort an edit run; emission failures are dropped.
fn emit(events: Option<&EventWriter>, event: PipelineEvent) {
    if let Some(writer) = events {
        let _ = writer.emit(&event);
    }
}
