use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use dor_types::SlotId;
use serde::{Deserialize, Serialize};

use crate::error::{SlotError, SlotResult};

/// Deterministic mapping from a numeric [`SlotId`] to a relative path.
///
/// The identifier is zero-padded to `width` digits. The leading digits are
/// split into one directory per entry of `groups`; the remaining digits form
/// the implicit last group and the full padded identifier is the leaf name.
///
/// Written and parsed in the compact notation `"2-2-4"`: every group width,
/// the last one included, joined by `-`. The total is the padded width.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SlotLayout {
    width: usize,
    groups: Vec<usize>,
}

impl SlotLayout {
    /// Build a layout from the padded width and the directory group widths.
    ///
    /// The directory groups must be non-zero and sum to strictly less than
    /// `width`, leaving a non-empty implicit last group.
    pub fn new(width: usize, groups: Vec<usize>) -> SlotResult<Self> {
        if width == 0 || width > 20 {
            return Err(SlotError::InvalidLayout(format!(
                "width must be between 1 and 20 digits, got {width}"
            )));
        }
        if groups.iter().any(|g| *g == 0) {
            return Err(SlotError::InvalidLayout(
                "digit groups must be non-empty".into(),
            ));
        }
        let used: usize = groups.iter().sum();
        if used >= width {
            return Err(SlotError::InvalidLayout(format!(
                "directory groups use {used} of {width} digits; the last group must be non-empty"
            )));
        }
        Ok(Self { width, groups })
    }

    /// Padded width of every identifier.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Directory group widths (the implicit last group excluded).
    pub fn groups(&self) -> &[usize] {
        &self.groups
    }

    /// Largest identifier that fits in the configured width.
    pub fn max_id(&self) -> SlotId {
        if self.width >= 20 {
            return SlotId::new(u64::MAX);
        }
        SlotId::new(10u64.pow(self.width as u32) - 1)
    }

    /// Relative slot path segments for `id`, leaf last.
    pub fn segments(&self, id: SlotId) -> SlotResult<Vec<String>> {
        let padded = id.padded(self.width);
        if padded.len() > self.width {
            return Err(SlotError::IdOutOfRange {
                id,
                width: self.width,
            });
        }
        let mut segments = Vec::with_capacity(self.groups.len() + 1);
        let mut offset = 0;
        for group in &self.groups {
            segments.push(padded[offset..offset + group].to_string());
            offset += group;
        }
        segments.push(padded);
        Ok(segments)
    }

    /// Relative path of the slot for `id`.
    pub fn path_for(&self, id: SlotId) -> SlotResult<PathBuf> {
        Ok(self.segments(id)?.iter().collect())
    }

    /// Relative slot path for `id` joined with `/`, independent of platform.
    ///
    /// This is the form used as a revision-log path.
    pub fn key_for(&self, id: SlotId) -> SlotResult<String> {
        Ok(self.segments(id)?.join("/"))
    }

    /// Decode a `/`-separated relative path back into an identifier.
    ///
    /// Returns `None` for paths that are not slot leaves under this layout,
    /// including paths whose directory segments disagree with the leaf.
    pub fn id_for_key(&self, key: &str) -> Option<SlotId> {
        let parts: Vec<&str> = key.trim_matches('/').split('/').collect();
        if parts.len() != self.groups.len() + 1 {
            return None;
        }
        let leaf = *parts.last()?;
        if leaf.len() != self.width || !leaf.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut offset = 0;
        for (segment, group) in parts.iter().zip(&self.groups) {
            if *segment != &leaf[offset..offset + group] {
                return None;
            }
            offset += group;
        }
        leaf.parse().ok()
    }

    /// Decode a relative filesystem path back into an identifier.
    pub fn id_for_path(&self, path: &std::path::Path) -> Option<SlotId> {
        let parts: Option<Vec<&str>> = path.iter().map(|c| c.to_str()).collect();
        self.id_for_key(&parts?.join("/"))
    }
}

impl Default for SlotLayout {
    /// Eight digits split `2-2-4`.
    fn default() -> Self {
        Self {
            width: 8,
            groups: vec![2, 2],
        }
    }
}

impl fmt::Display for SlotLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used: usize = self.groups.iter().sum();
        for group in &self.groups {
            write!(f, "{group}-")?;
        }
        write!(f, "{}", self.width - used)
    }
}

impl FromStr for SlotLayout {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut widths = Vec::new();
        for part in s.trim().split('-') {
            let width = part.trim().parse::<usize>().map_err(|_| {
                SlotError::InvalidLayout(format!("invalid digit group {part:?} in {s:?}"))
            })?;
            widths.push(width);
        }
        let total: usize = widths.iter().sum();
        // The last group is implicit in the path; only its width counts.
        widths.pop();
        Self::new(total, widths)
    }
}

impl From<SlotLayout> for String {
    fn from(layout: SlotLayout) -> Self {
        layout.to_string()
    }
}

impl TryFrom<String> for SlotLayout {
    type Error = SlotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layout(s: &str) -> SlotLayout {
        s.parse().unwrap()
    }

    #[test]
    fn paths_for_two_two_four() {
        let l = layout("2-2-4");
        assert_eq!(l.key_for(SlotId::new(137)).unwrap(), "00/00/00000137");
        assert_eq!(l.key_for(SlotId::new(99_999_999)).unwrap(), "99/99/99999999");
        assert_eq!(
            l.path_for(SlotId::new(137)).unwrap(),
            PathBuf::from("00").join("00").join("00000137")
        );
    }

    #[test]
    fn flat_layout_has_only_leaf() {
        let l = SlotLayout::new(4, vec![]).unwrap();
        assert_eq!(l.key_for(SlotId::new(7)).unwrap(), "0007");
        assert_eq!(l.to_string(), "4");
    }

    #[test]
    fn id_wider_than_layout_is_rejected() {
        let l = layout("2-2-4");
        let err = l.key_for(SlotId::new(100_000_000)).unwrap_err();
        assert!(matches!(err, SlotError::IdOutOfRange { width: 8, .. }));
        assert_eq!(l.max_id(), SlotId::new(99_999_999));
    }

    #[test]
    fn invalid_layouts() {
        assert!(SlotLayout::new(0, vec![]).is_err());
        assert!(SlotLayout::new(4, vec![2, 2]).is_err());
        assert!(SlotLayout::new(4, vec![0, 2]).is_err());
        assert!("2-x-4".parse::<SlotLayout>().is_err());
        assert!("2-2-0".parse::<SlotLayout>().is_err());
    }

    #[test]
    fn notation_roundtrip() {
        let l = layout("3-1-5");
        assert_eq!(l.width(), 9);
        assert_eq!(l.groups(), &[3, 1]);
        assert_eq!(l.to_string(), "3-1-5");
    }

    #[test]
    fn decode_rejects_foreign_paths() {
        let l = layout("2-2-4");
        assert_eq!(l.id_for_key("00/00/00000137"), Some(SlotId::new(137)));
        assert_eq!(l.id_for_key("/00/00/00000137"), Some(SlotId::new(137)));
        assert_eq!(l.id_for_key("00/01/00000137"), None);
        assert_eq!(l.id_for_key("00/00000137"), None);
        assert_eq!(l.id_for_key("00/00/0000013x"), None);
        assert_eq!(l.id_for_key("00/00/137"), None);
        assert_eq!(l.id_for_key("00/00/.collection.json"), None);
    }

    #[test]
    fn serde_uses_compact_notation() {
        let json = serde_json::to_string(&layout("2-2-4")).unwrap();
        assert_eq!(json, "\"2-2-4\"");
        let back: SlotLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SlotLayout::default());
        assert!(serde_json::from_str::<SlotLayout>("\"4-4\"").is_ok());
        assert!(serde_json::from_str::<SlotLayout>("\"4-0\"").is_err());
    }

    proptest! {
        #[test]
        fn leaf_decodes_to_original_id(
            groups in proptest::collection::vec(1usize..4, 0..4),
            tail in 1usize..6,
            raw in any::<u64>(),
        ) {
            let width = groups.iter().sum::<usize>() + tail;
            let l = SlotLayout::new(width, groups).unwrap();
            let id = SlotId::new(raw % (l.max_id().value() + 1));

            let segments = l.segments(id).unwrap();
            let leaf = segments.last().unwrap();
            prop_assert_eq!(leaf.len(), width);
            prop_assert_eq!(leaf.trim_start_matches('0').parse::<u64>().unwrap_or(0), id.value());

            let key = l.key_for(id).unwrap();
            prop_assert_eq!(l.id_for_key(&key), Some(id));
        }
    }
}
