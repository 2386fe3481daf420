use image::{GenericImageView, Rgba, RgbaImage};
use retint_contracts::detect::Region;

use crate::error::TintError;

/// Pixels outside every region: no-edit.
pub const NO_EDIT: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Pixels inside a region rectangle: edit.
pub const EDIT: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Binary edit-mask raster matching the source image's pixel dimensions.
///
/// The polarity here (white background = no-edit, black rectangles = edit)
/// is this synthesizer's own convention. Inpainting services document their
/// own mask conventions; verify the target service's before wiring the PNG
/// through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    raster: RgbaImage,
}

impl Mask {
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    /// True when the pixel at `(x, y)` is marked for editing.
    pub fn is_edit(&self, x: u32, y: u32) -> bool {
        *self.raster.get_pixel(x, y) == EDIT
    }

    pub fn edit_pixel_count(&self) -> u64 {
        self.raster.pixels().filter(|pixel| **pixel == EDIT).count() as u64
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, TintError> {
        let mut bytes = Vec::new();
        self.raster
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .map_err(|err| TintError::Raster(err.to_string()))?;
        Ok(bytes)
    }
}

/// Rasterizes normalized region boxes into a binary edit-mask against the
/// given source image.
///
/// With `select_only = Some(i)` only `regions[i]` is painted; otherwise
/// every region is. Overlapping regions union. Box fractions are clamped to
/// the image bounds, so upstream boxes extending past an edge paint up to
/// that edge rather than failing.
pub fn synthesize_mask(
    image_bytes: &[u8],
    regions: &[Region],
    select_only: Option<usize>,
) -> Result<Mask, TintError> {
    let source = image::load_from_memory(image_bytes).map_err(TintError::Decode)?;
    let (width, height) = (source.width(), source.height());
    let mut raster = RgbaImage::from_pixel(width, height, NO_EDIT);

    match select_only {
        Some(index) => {
            let region = regions.get(index).ok_or_else(|| {
                TintError::Raster(format!(
                    "region index {index} out of range ({} regions)",
                    regions.len()
                ))
            })?;
            paint_region(&mut raster, region);
        }
        None => {
            for region in regions {
                paint_region(&mut raster, region);
            }
        }
    }

    Ok(Mask { raster })
}

/// Paints the half-open pixel rectangle `[floor(l*W), ceil((l+w)*W))` x
/// `[floor(t*H), ceil((t+h)*H))`, clamped to the raster.
fn paint_region(raster: &mut RgbaImage, region: &Region) {
    let bounds = &region.bounding_box;
    let width = f64::from(raster.width());
    let height = f64::from(raster.height());

    let x0 = clamp_pixel((bounds.left * width).floor(), raster.width());
    let x1 = clamp_pixel(((bounds.left + bounds.width) * width).ceil(), raster.width());
    let y0 = clamp_pixel((bounds.top * height).floor(), raster.height());
    let y1 = clamp_pixel(((bounds.top + bounds.height) * height).ceil(), raster.height());

    for y in y0..y1 {
        for x in x0..x1 {
            raster.put_pixel(x, y, EDIT);
        }
    }
}

fn clamp_pixel(value: f64, limit: u32) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value as u64).min(u64::from(limit)) as u32
}

#[cfg(test)]
mod tests {
    use retint_contracts::detect::BoundingBox;

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let raster = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        raster
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    fn region(label: &str, left: f64, top: f64, width: f64, height: f64) -> Region {
        Region {
            label: label.to_string(),
            confidence: 99.0,
            bounding_box: BoundingBox {
                left,
                top,
                width,
                height,
            },
        }
    }

    #[test]
    fn mask_dimensions_match_the_source_image() {
        let source = png_bytes(64, 48);
        let mask = synthesize_mask(&source, &[region("Couch", 0.1, 0.1, 0.5, 0.5)], None).unwrap();
        assert_eq!((mask.width(), mask.height()), (64, 48));
    }

    #[test]
    fn rectangle_bounds_use_floor_origin_and_ceil_extent() {
        let source = png_bytes(1000, 1000);
        let mask =
            synthesize_mask(&source, &[region("Couch", 0.36, 0.51, 0.49, 0.29)], None).unwrap();

        assert!(mask.is_edit(360, 510));
        assert!(mask.is_edit(849, 799));
        assert!(!mask.is_edit(359, 510));
        assert!(!mask.is_edit(850, 510));
        assert!(!mask.is_edit(360, 509));
        assert!(!mask.is_edit(360, 800));
        assert_eq!(mask.edit_pixel_count(), 490 * 290);
    }

    #[test]
    fn empty_region_list_paints_nothing() {
        let source = png_bytes(16, 16);
        let mask = synthesize_mask(&source, &[], None).unwrap();
        assert_eq!(mask.edit_pixel_count(), 0);
    }

    #[test]
    fn overlapping_regions_union() {
        let source = png_bytes(100, 100);
        let regions = [
            region("Couch", 0.0, 0.0, 0.5, 0.5),
            region("Rug", 0.25, 0.25, 0.5, 0.5),
        ];
        let mask = synthesize_mask(&source, &regions, None).unwrap();
        // 50x50 + 50x50 - 25x25 overlap
        assert_eq!(mask.edit_pixel_count(), 2500 + 2500 - 625);
    }

    #[test]
    fn single_region_mask_is_a_subset_of_the_full_mask() {
        let source = png_bytes(80, 80);
        let regions = [
            region("Couch", 0.1, 0.1, 0.3, 0.3),
            region("Chair", 0.5, 0.5, 0.4, 0.4),
        ];
        let full = synthesize_mask(&source, &regions, None).unwrap();
        for index in 0..regions.len() {
            let single = synthesize_mask(&source, &regions, Some(index)).unwrap();
            for y in 0..single.height() {
                for x in 0..single.width() {
                    if single.is_edit(x, y) {
                        assert!(full.is_edit(x, y));
                    }
                }
            }
            assert!(single.edit_pixel_count() < full.edit_pixel_count());
        }
    }

    #[test]
    fn synthesis_is_deterministic() {
        let source = png_bytes(40, 30);
        let regions = [region("Couch", 0.2, 0.3, 0.4, 0.4)];
        let first = synthesize_mask(&source, &regions, None).unwrap();
        let second = synthesize_mask(&source, &regions, None).unwrap();
        assert_eq!(first.raster(), second.raster());
        assert_eq!(
            first.to_png_bytes().unwrap(),
            second.to_png_bytes().unwrap()
        );
    }

    #[test]
    fn out_of_range_boxes_clamp_to_the_image_edge() {
        let source = png_bytes(10, 10);
        let mask = synthesize_mask(&source, &[region("Couch", 0.8, 0.8, 0.5, 0.5)], None).unwrap();
        assert_eq!(mask.edit_pixel_count(), 2 * 2);
        assert!(mask.is_edit(9, 9));
    }

    #[test]
    fn undecodable_bytes_fail_with_a_decode_error() {
        let err = synthesize_mask(b"not an image", &[], None).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn selecting_a_missing_region_fails_with_a_raster_error() {
        let source = png_bytes(8, 8);
        let err = synthesize_mask(&source, &[], Some(0)).unwrap_err();
        assert_eq!(err.kind(), "raster");
    }

    #[test]
    fn png_round_trip_preserves_polarity() {
        let source = png_bytes(20, 20);
        let mask = synthesize_mask(&source, &[region("Couch", 0.0, 0.0, 0.5, 1.0)], None).unwrap();
        let decoded = image::load_from_memory(&mask.to_png_bytes().unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(*decoded.get_pixel(0, 0), EDIT);
        assert_eq!(*decoded.get_pixel(19, 0), NO_EDIT);
    }
}
