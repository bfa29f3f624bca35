//! Token-level HTML diff
//!
//! Markup is split into tags, words and whitespace runs. Tags are atomic, so
//! a change inside an attribute replaces the whole tag. Each side keeps its
//! own tag sequence; only text runs are wrapped, removed text in `<del>` on
//! the original side and added text in `<ins>` on the corrected side. Tags
//! never sit inside a marker, so well-formed input gives well-formed panes.

use std::sync::LazyLock;

use ammonia::{Builder, UrlRelative};
use regex::Regex;
use similar::{Algorithm, ChangeTag, TextDiff};

use super::DiffStats;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>|[^<\s]+|\s+").expect("valid token pattern"));

static EMPTY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<ins></ins>|<del></del>").expect("valid marker pattern"));

pub fn tokenize(html: &str) -> Vec<&str> {
    TOKEN.find_iter(html).map(|m| m.as_str()).collect()
}

fn is_tag(token: &str) -> bool {
    token.starts_with('<')
}

/// Both panes of a structural diff, before sanitizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDiff {
    pub before: String,
    pub after: String,
    pub stats: DiffStats,
}

/// One pane under construction with at most one open marker run
struct Pane {
    out: String,
    marker: &'static str,
    open: bool,
}

impl Pane {
    fn new(marker: &'static str, capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            marker,
            open: false,
        }
    }

    fn plain(&mut self, token: &str) {
        self.close();
        self.out.push_str(token);
    }

    fn changed(&mut self, token: &str) {
        if is_tag(token) {
            self.plain(token);
            return;
        }
        if !self.open {
            self.out.push('<');
            self.out.push_str(self.marker);
            self.out.push('>');
            self.open = true;
        }
        self.out.push_str(token);
    }

    fn close(&mut self) {
        if self.open {
            self.out.push_str("</");
            self.out.push_str(self.marker);
            self.out.push('>');
            self.open = false;
        }
    }

    fn finish(mut self) -> String {
        self.close();
        self.out
    }
}

/// Diff two fragments into an annotated "before" and "after" pane
pub fn split_diff(original: &str, corrected: &str) -> SplitDiff {
    let old_tokens = tokenize(original);
    let new_tokens = tokenize(corrected);

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&old_tokens, &new_tokens);

    let mut before = Pane::new("del", original.len());
    let mut after = Pane::new("ins", corrected.len());
    let mut stats = DiffStats::default();

    for change in diff.iter_all_changes() {
        let token = change.value();
        match change.tag() {
            ChangeTag::Equal => {
                before.plain(token);
                after.plain(token);
            }
            ChangeTag::Delete => {
                stats.deletions += 1;
                before.changed(token);
            }
            ChangeTag::Insert => {
                stats.insertions += 1;
                after.changed(token);
            }
        }
    }

    SplitDiff {
        before: before.finish(),
        after: after.finish(),
        stats,
    }
}

fn sanitizer() -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .add_tags(&["ins", "del"])
        .link_rel(None)
        .url_relative(UrlRelative::Deny);
    builder
}

/// Allowlist sanitize so the fragment can be injected into a page.
///
/// Unknown elements and attributes are dropped, script and style content is
/// removed, and only absolute http(s)/mailto-style URLs survive.
pub fn sanitize(html: &str) -> String {
    sanitizer().clean(html).to_string()
}

/// Remove marker pairs left empty after sanitizing
pub fn drop_empty_markers(html: &str) -> String {
    EMPTY_MARKER.replace_all(html, "").into_owned()
}

/// Sanitize a pane and tidy its markers
pub fn clean(html: &str) -> String {
    drop_empty_markers(&sanitize(html))
}
