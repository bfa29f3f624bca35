//! Side-by-side comparison of original and corrected content

pub mod html;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Two panes of text, whitespace preserved, no token diffing
    Plain,
    /// Structural diff with `<del>`/`<ins>` highlighting
    Html,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub insertions: usize,
    pub deletions: usize,
}

/// The two panes shown for a correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffView {
    pub mode: DiffMode,
    pub original: String,
    pub corrected: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DiffStats>,
}

impl DiffView {
    pub fn plain(original: &str, corrected: &str) -> Self {
        Self {
            mode: DiffMode::Plain,
            original: original.to_string(),
            corrected: corrected.to_string(),
            stats: None,
        }
    }

    pub fn html(original: &str, corrected: &str) -> Self {
        let diff = html::split_diff(original, corrected);
        Self {
            mode: DiffMode::Html,
            original: html::clean(&diff.before),
            corrected: html::clean(&diff.after),
            stats: Some(diff.stats),
        }
    }

    pub fn build(original: &str, corrected: &str, is_html: bool) -> Self {
        if is_html {
            Self::html(original, corrected)
        } else {
            Self::plain(original, corrected)
        }
    }
}
