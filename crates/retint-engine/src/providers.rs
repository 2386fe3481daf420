use std::env;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::Rgba;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use retint_contracts::detect::DetectedLabel;
use retint_contracts::request::GenerationRequest;

use crate::error::TintError;
use crate::mask::EDIT;

/// A generative inpainting backend. Implementations make exactly one
/// attempt per call; retry policy belongs to callers.
pub trait InpaintProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Returns the encoded output image bytes for one generation request.
    fn inpaint(&self, request: &GenerationRequest) -> Result<Vec<u8>, TintError>;
}

/// An object-detection backend returning raw, possibly partial label
/// records for an encoded image.
pub trait DetectionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, image: &[u8], min_confidence: f64)
        -> Result<Vec<DetectedLabel>, TintError>;
}

/// Inpainting over HTTP: posts the INPAINTING task payload to the endpoint
/// in `RETINT_TINT_URL` and expects a JSON body carrying base64 output
/// images under `images`.
pub struct HttpInpaintProvider {
    endpoint: String,
    api_token: Option<String>,
    http: HttpClient,
}

impl HttpInpaintProvider {
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token,
            http: HttpClient::new(),
        }
    }

    /// Reads `RETINT_TINT_URL` (and optionally `RETINT_API_TOKEN`); `None`
    /// when no endpoint is configured.
    pub fn from_env() -> Option<Self> {
        non_empty_env("RETINT_TINT_URL")
            .map(|endpoint| Self::new(endpoint, non_empty_env("RETINT_API_TOKEN")))
    }
}

impl InpaintProvider for HttpInpaintProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn inpaint(&self, request: &GenerationRequest) -> Result<Vec<u8>, TintError> {
        let payload = inpainting_payload(request);
        let mut builder = self.http.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().map_err(|err| {
            TintError::Generation(format!("inpainting request failed ({}): {err}", self.endpoint))
        })?;
        let body = response_json_or_error("inpainting", response)?;
        image_from_response(&body)
    }
}

/// Detection over HTTP: posts `{image, minConfidence}` to the endpoint in
/// `RETINT_DETECT_URL` and deserializes the raw label records.
pub struct HttpDetectionProvider {
    endpoint: String,
    api_token: Option<String>,
    http: HttpClient,
}

impl HttpDetectionProvider {
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token,
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        non_empty_env("RETINT_DETECT_URL")
            .map(|endpoint| Self::new(endpoint, non_empty_env("RETINT_API_TOKEN")))
    }
}

impl DetectionProvider for HttpDetectionProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn detect(
        &self,
        image: &[u8],
        min_confidence: f64,
    ) -> Result<Vec<DetectedLabel>, TintError> {
        let payload = json!({
            "image": BASE64.encode(image),
            "minConfidence": min_confidence,
        });
        let mut builder = self.http.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().map_err(|err| {
            TintError::Detection(format!("detection request failed ({}): {err}", self.endpoint))
        })?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| TintError::Detection(format!("detection body read failed: {err}")))?;
        if !status.is_success() {
            return Err(TintError::Detection(format!(
                "detection request failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }
        serde_json::from_str(&body)
            .map_err(|err| TintError::Detection(format!("detection returned invalid JSON: {err}")))
    }
}

/// Offline provider for demos and tests. Recolors the mask's edit pixels
/// with a color derived from the prompt and seed, so chained runs visibly
/// accumulate per-region edits without any network access.
pub struct DryrunInpaintProvider;

impl InpaintProvider for DryrunInpaintProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn inpaint(&self, request: &GenerationRequest) -> Result<Vec<u8>, TintError> {
        let source = image::load_from_memory(&request.image)
            .map_err(|err| TintError::Generation(format!("dryrun could not decode image: {err}")))?
            .to_rgba8();
        let mask = image::load_from_memory(&request.mask)
            .map_err(|err| TintError::Generation(format!("dryrun could not decode mask: {err}")))?
            .to_rgba8();
        if mask.dimensions() != source.dimensions() {
            return Err(TintError::Generation(format!(
                "dryrun mask dimensions {:?} do not match image {:?}",
                mask.dimensions(),
                source.dimensions()
            )));
        }

        let (r, g, b) = color_from_prompt(&request.prompt, request.seed);
        let mut output = source;
        for (x, y, pixel) in output.enumerate_pixels_mut() {
            if *mask.get_pixel(x, y) == EDIT {
                *pixel = Rgba([r, g, b, 255]);
            }
        }

        let mut bytes = Vec::new();
        output
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .map_err(|err| TintError::Generation(format!("dryrun encode failed: {err}")))?;
        Ok(bytes)
    }
}

/// Builds the INPAINTING task payload the inpainting backend consumes.
pub fn inpainting_payload(request: &GenerationRequest) -> Value {
    json!({
        "taskType": "INPAINTING",
        "inPaintingParams": {
            "image": BASE64.encode(&request.image),
            "text": request.prompt,
            "negativeText": request.negative_text,
            "maskImage": BASE64.encode(&request.mask),
        },
        "imageGenerationConfig": {
            "numberOfImages": 1,
            "width": request.width,
            "height": request.height,
            "cfgScale": request.cfg_scale,
            "seed": request.seed,
        },
    })
}

/// Extracts and decodes `images[0]` from a generation response body.
fn image_from_response(body: &Value) -> Result<Vec<u8>, TintError> {
    let encoded = body
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.first())
        .and_then(Value::as_str)
        .ok_or_else(|| {
            TintError::Generation("inpainting response carried no output image".to_string())
        })?;
    BASE64
        .decode(encoded)
        .map_err(|err| TintError::Generation(format!("inpainting image was not valid base64: {err}")))
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, TintError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| TintError::Generation(format!("{provider} response body read failed: {err}")))?;
    if !status.is_success() {
        return Err(TintError::Generation(format!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body)
        .map_err(|_| TintError::Generation(format!("{provider} returned invalid JSON payload")))
}

fn color_from_prompt(prompt: &str, seed: i64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;
    use retint_contracts::detect::{BoundingBox, Region};

    use crate::mask::synthesize_mask;

    use super::*;

    fn png_bytes(width: u32, height: u32, fill: Rgba<u8>) -> Vec<u8> {
        let raster = RgbaImage::from_pixel(width, height, fill);
        let mut bytes = Vec::new();
        raster
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    fn left_half_region() -> Region {
        Region {
            label: "Couch".to_string(),
            confidence: 99.0,
            bounding_box: BoundingBox {
                left: 0.0,
                top: 0.0,
                width: 0.5,
                height: 1.0,
            },
        }
    }

    #[test]
    fn payload_matches_the_inpainting_wire_contract() {
        let request = GenerationRequest::new(vec![1, 2], vec![3, 4], "make it pink")
            .with_size(576, 384)
            .with_seed(7)
            .with_cfg_scale(8.0);
        let payload = inpainting_payload(&request);

        assert_eq!(payload["taskType"], "INPAINTING");
        assert_eq!(payload["inPaintingParams"]["text"], "make it pink");
        assert_eq!(
            payload["inPaintingParams"]["image"],
            BASE64.encode([1u8, 2])
        );
        assert_eq!(
            payload["inPaintingParams"]["maskImage"],
            BASE64.encode([3u8, 4])
        );
        assert_eq!(payload["imageGenerationConfig"]["numberOfImages"], 1);
        assert_eq!(payload["imageGenerationConfig"]["width"], 576);
        assert_eq!(payload["imageGenerationConfig"]["height"], 384);
        assert_eq!(payload["imageGenerationConfig"]["seed"], 7);
        assert_eq!(payload["imageGenerationConfig"]["cfgScale"], 8.0);
    }

    #[test]
    fn response_image_extraction_decodes_the_first_entry() {
        let body = json!({ "images": [BASE64.encode([9u8, 8, 7])] });
        assert_eq!(image_from_response(&body).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn responses_without_images_fail_with_generation() {
        let err = image_from_response(&json!({ "images": [] })).unwrap_err();
        assert_eq!(err.kind(), "generation");
        let err = image_from_response(&json!({})).unwrap_err();
        assert_eq!(err.kind(), "generation");
    }

    #[test]
    fn dryrun_recolors_only_masked_pixels_deterministically() {
        let image = png_bytes(8, 8, Rgba([10, 20, 30, 255]));
        let mask = synthesize_mask(&image, &[left_half_region()], None)
            .unwrap()
            .to_png_bytes()
            .unwrap();
        let request = GenerationRequest::new(image, mask, "pink couch").with_size(8, 8);

        let provider = DryrunInpaintProvider;
        let first = provider.inpaint(&request).unwrap();
        let second = provider.inpaint(&request).unwrap();
        assert_eq!(first, second);

        let output = image::load_from_memory(&first).unwrap().to_rgba8();
        let (r, g, b) = color_from_prompt("pink couch", 0);
        assert_eq!(*output.get_pixel(0, 0), Rgba([r, g, b, 255]));
        assert_eq!(*output.get_pixel(7, 0), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn dryrun_rejects_mismatched_mask_dimensions() {
        let image = png_bytes(8, 8, Rgba([0, 0, 0, 255]));
        let mask = png_bytes(4, 4, Rgba([255, 255, 255, 255]));
        let request = GenerationRequest::new(image, mask, "pink");
        let err = DryrunInpaintProvider.inpaint(&request).unwrap_err();
        assert_eq!(err.kind(), "generation");
    }

    #[test]
    fn prompt_color_varies_with_prompt_and_seed() {
        let base = color_from_prompt("pink couch", 0);
        assert_ne!(base, color_from_prompt("pink chair", 0));
        assert_ne!(base, color_from_prompt("pink couch", 1));
    }
}
