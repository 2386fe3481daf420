use indexmap::IndexMap;
use serde::Serialize;

/// One supported output size of the inpainting model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSize {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// The model's supported output sizes, keyed by aspect name and enumerated
/// in catalog order. The catalog is never empty.
pub fn supported_sizes() -> IndexMap<&'static str, OutputSize> {
    let mut map = IndexMap::new();

    let mut insert = |name: &'static str, width: u32, height: u32| {
        map.insert(
            name,
            OutputSize {
                name,
                width,
                height,
            },
        );
    };

    insert("1:1", 1024, 1024);
    insert("2:3", 384, 576);
    insert("3:2", 576, 384);
    insert("3:5", 384, 640);
    insert("5:3", 640, 384);
    insert("7:9", 448, 576);
    insert("9:7", 576, 448);
    insert("6:11", 384, 704);
    insert("11:6", 704, 384);
    insert("5:11", 320, 704);
    insert("11:5", 704, 320);
    insert("9:5", 1152, 640);
    insert("16:9", 1173, 640);

    map
}

/// Maps a source image size to the catalog entry whose aspect ratio is
/// closest to the source's. Ties resolve to the entry enumerated first;
/// every input maps to some entry.
pub fn select_dimensions(source_width: u32, source_height: u32) -> OutputSize {
    let ratio = f64::from(source_width.max(1)) / f64::from(source_height.max(1));
    let mut best: Option<(f64, OutputSize)> = None;
    for size in supported_sizes().values() {
        let distance = (size.ratio() - ratio).abs();
        match best {
            Some((best_distance, _)) if distance >= best_distance => {}
            _ => best = Some((distance, *size)),
        }
    }
    let fallback = OutputSize {
        name: "1:1",
        width: 1024,
        height: 1024,
    };
    best.map(|(_, size)| size).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_ratios_match_their_catalog_entry() {
        assert_eq!(select_dimensions(2048, 2048).name, "1:1");
        assert_eq!(select_dimensions(400, 600).name, "2:3");
        assert_eq!(select_dimensions(704, 320).name, "11:5");
    }

    #[test]
    fn wide_sources_pick_the_nearest_wide_entry() {
        // The "16:9" entry is 1173x640, true ratio ~1.833, so a 1.778
        // source lands on 9:5 (1.8) instead.
        assert_eq!(select_dimensions(1920, 1080).name, "9:5");
        assert_eq!(select_dimensions(1173, 640).name, "16:9");
        assert_eq!(select_dimensions(3840, 1080).name, "11:5");
    }

    #[test]
    fn selection_is_idempotent_on_its_own_output() {
        let first = select_dimensions(1173, 640);
        let second = select_dimensions(first.width, first.height);
        assert_eq!(first, second);
    }

    #[test]
    fn sources_between_entries_pick_the_nearer_ratio() {
        // 0.7 sits between 2:3 and 7:9, nearer to 2:3.
        assert_eq!(select_dimensions(700, 1000).name, "2:3");
        assert_eq!(select_dimensions(750, 1000).name, "7:9");
    }

    #[test]
    fn degenerate_sizes_still_select_an_entry() {
        assert_eq!(select_dimensions(0, 0).name, "1:1");
        assert_eq!(select_dimensions(1, 10_000).name, "5:11");
    }

    #[test]
    fn catalog_is_nonempty_and_ordered() {
        let sizes = supported_sizes();
        assert_eq!(sizes.len(), 13);
        assert_eq!(sizes.values().next().unwrap().name, "1:1");
    }
}
