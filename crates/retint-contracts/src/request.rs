use serde::{Deserialize, Serialize};

/// Service-side defaults recovered from the inpainting backend contract.
pub const DEFAULT_SEED: i64 = 0;
pub const DEFAULT_CFG_SCALE: f64 = 8.0;
pub const DEFAULT_NEGATIVE_TEXT: &str = "No hate, blood or violence";
/// Default prompt used by the single-pass strategy when the caller
/// supplies none.
pub const DEFAULT_FULL_PROMPT: &str = "Change the objects by a pink variations";

/// The contract handed to the external inpainting service: one source
/// image, one edit mask of identical dimensions, and the generation knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub image: Vec<u8>,
    pub mask: Vec<u8>,
    pub prompt: String,
    pub negative_text: String,
    pub width: u32,
    pub height: u32,
    pub seed: i64,
    pub cfg_scale: f64,
}

impl GenerationRequest {
    pub fn new(image: Vec<u8>, mask: Vec<u8>, prompt: impl Into<String>) -> Self {
        Self {
            image,
            mask,
            prompt: prompt.into(),
            negative_text: DEFAULT_NEGATIVE_TEXT.to_string(),
            width: 1024,
            height: 1024,
            seed: DEFAULT_SEED,
            cfg_scale: DEFAULT_CFG_SCALE,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_negative_text(mut self, negative_text: impl Into<String>) -> Self {
        self.negative_text = negative_text.into();
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cfg_scale(mut self, cfg_scale: f64) -> Self {
        self.cfg_scale = cfg_scale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_the_service_contract() {
        let request = GenerationRequest::new(vec![1], vec![2], "prompt");
        assert_eq!(request.seed, 0);
        assert_eq!(request.cfg_scale, 8.0);
        assert_eq!(request.negative_text, "No hate, blood or violence");
    }

    #[test]
    fn builder_overrides_apply() {
        let request = GenerationRequest::new(vec![], vec![], "p")
            .with_size(576, 384)
            .with_seed(42)
            .with_cfg_scale(5.0)
            .with_negative_text("none");
        assert_eq!((request.width, request.height), (576, 384));
        assert_eq!(request.seed, 42);
        assert_eq!(request.cfg_scale, 5.0);
        assert_eq!(request.negative_text, "none");
    }
}
