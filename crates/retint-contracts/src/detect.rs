use serde::{Deserialize, Serialize};

/// Confidence threshold applied when the caller does not supply one,
/// on the detection service's 0-100 scale.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 50.0;

/// Normalized box geometry, each field a fraction of the image dimension.
///
/// Upstream does not guarantee `left + width <= 1.0`; consumers clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One spatial instance inside a raw detection record. Detection services
/// emit partial records, so every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectedInstance {
    pub confidence: Option<f64>,
    pub bounding_box: Option<RawBoundingBox>,
}

/// Box geometry as received from the detection service, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RawBoundingBox {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl RawBoundingBox {
    /// Returns the validated geometry when every field is present.
    pub fn complete(&self) -> Option<BoundingBox> {
        Some(BoundingBox {
            left: self.left?,
            top: self.top?,
            width: self.width?,
            height: self.height?,
        })
    }
}

/// Raw per-label detection record, prior to filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLabel {
    pub name: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub instances: Vec<DetectedInstance>,
}

/// A label reduced to its single highest-confidence spatial instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub label: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

/// Reduces raw detection records into one [`Region`] per surviving label.
///
/// Labels are dropped when they carry no spatial instance, when their
/// confidence score is present but below `min_confidence`, or when the
/// record is missing a required name, confidence, or geometry field.
/// Multi-instance labels keep the single strictly-highest-confidence
/// instance; ties keep the first encountered. Input order is preserved
/// and an empty or fully-filtered input yields an empty list.
pub fn filter_labels(labels: &[DetectedLabel], min_confidence: f64) -> Vec<Region> {
    labels
        .iter()
        .filter(|label| !label.instances.is_empty())
        .filter(|label| {
            label
                .confidence
                .map(|score| score >= min_confidence)
                .unwrap_or(true)
        })
        .filter_map(|label| {
            let name = label.name.as_deref()?;
            let confidence = label.confidence?;
            let instance = best_instance(&label.instances)?;
            Some(Region {
                label: name.to_string(),
                confidence,
                bounding_box: instance,
            })
        })
        .collect()
}

/// Picks the geometry of the strictly highest-confidence complete instance.
/// Instances missing confidence or geometry never win.
fn best_instance(instances: &[DetectedInstance]) -> Option<BoundingBox> {
    let mut best: Option<(f64, BoundingBox)> = None;
    for instance in instances {
        let Some(score) = instance.confidence else {
            continue;
        };
        let Some(geometry) = instance.bounding_box.as_ref().and_then(RawBoundingBox::complete)
        else {
            continue;
        };
        match &best {
            Some((existing, _)) if score <= *existing => {}
            _ => best = Some((score, geometry)),
        }
    }
    best.map(|(_, geometry)| geometry)
}
