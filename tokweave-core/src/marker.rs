//! Control markers that switch an agent's visibility mode mid-stream

use crate::error::{config_invalid, Result};
use crate::message::VisibilityMode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BROADCAST_MARKER: &str = "<broadcast>";
pub const DEFAULT_INTERNAL_MARKER: &str = "<internal>";

/// The two reserved marker strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSet {
    pub broadcast: String,
    pub internal: String,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            broadcast: DEFAULT_BROADCAST_MARKER.to_string(),
            internal: DEFAULT_INTERNAL_MARKER.to_string(),
        }
    }
}

impl MarkerSet {
    pub fn new(broadcast: impl Into<String>, internal: impl Into<String>) -> Self {
        Self {
            broadcast: broadcast.into(),
            internal: internal.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, marker) in [("markers.broadcast", &self.broadcast), ("markers.internal", &self.internal)] {
            if marker.is_empty() {
                return Err(config_invalid(field, "marker must not be empty"));
            }
            if marker.chars().any(char::is_whitespace) {
                return Err(config_invalid(field, format!("marker '{}' contains whitespace", marker))
                    .with_context("marker", marker.clone()));
            }
        }
        if self.broadcast.contains(&self.internal) || self.internal.contains(&self.broadcast) {
            return Err(config_invalid(
                "markers",
                format!("markers '{}' and '{}' overlap", self.broadcast, self.internal),
            ));
        }
        Ok(())
    }

    /// Marker that switches into `mode`
    pub fn marker_for(&self, mode: VisibilityMode) -> &str {
        match mode {
            VisibilityMode::Broadcast => &self.broadcast,
            VisibilityMode::Internal => &self.internal,
        }
    }

    /// Strings a token must never equal or contain
    pub fn all(&self) -> [&str; 2] {
        [&self.broadcast, &self.internal]
    }

    pub fn table(&self) -> MarkerTable {
        MarkerTable::new(self)
    }
}

/// Ordered `marker -> mode` lookup
#[derive(Debug, Clone)]
pub struct MarkerTable {
    entries: Vec<(String, VisibilityMode)>,
}

impl MarkerTable {
    pub fn new(markers: &MarkerSet) -> Self {
        let entries = vec![
            (markers.broadcast.clone(), VisibilityMode::Broadcast),
            (markers.internal.clone(), VisibilityMode::Internal),
        ];
        Self { entries }
    }

    /// Leftmost marker in `buf` as `(byte offset, marker length, mode)`.
    /// On equal offsets the earlier table entry wins.
    pub fn find_leftmost(&self, buf: &str) -> Option<(usize, usize, VisibilityMode)> {
        let mut best: Option<(usize, usize, VisibilityMode)> = None;
        for (marker, mode) in &self.entries {
            if marker.is_empty() {
                continue;
            }
            if let Some(pos) = buf.find(marker.as_str()) {
                if best.map_or(true, |(best_pos, _, _)| pos < best_pos) {
                    best = Some((pos, marker.len(), *mode));
                }
            }
        }
        best
    }

    /// A word ending in a proper prefix of some marker may become that
    /// marker once the next fragment arrives.
    pub fn is_unterminated(&self, word: &str) -> bool {
        word.char_indices().any(|(i, _)| {
            let tail = &word[i..];
            self.entries
                .iter()
                .any(|(marker, _)| tail.len() < marker.len() && marker.starts_with(tail))
        })
    }
}
