//! Copy corrected documents to the system clipboard

use anyhow::{Context, Result};
use arboard::Clipboard;

/// Corrected documents larger than this are not copied (10 MB)
const MAX_CLIPBOARD_SIZE: usize = 10 * 1024 * 1024;

/// Destination for copied text, swappable in tests
pub trait ClipboardSink: Send + Sync {
    fn set_text(&self, text: &str) -> Result<()>;
}

/// The desktop clipboard through arboard
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        // A handle per call; arboard handles are not shareable across threads
        let mut clipboard = Clipboard::new().context("Failed to initialize clipboard")?;
        clipboard
            .set_text(text)
            .context("Failed to set clipboard contents")?;
        Ok(())
    }
}

fn validate_clipboard_text(text: &str) -> Result<()> {
    if text.is_empty() {
        anyhow::bail!("Cannot copy empty text to clipboard");
    }

    if text.len() > MAX_CLIPBOARD_SIZE {
        anyhow::bail!(
            "Text too large for clipboard ({} bytes, max {})",
            text.len(),
            MAX_CLIPBOARD_SIZE
        );
    }

    Ok(())
}

/// Validate and copy. Fails on empty or oversized text and in headless sessions.
pub fn copy_text(sink: &dyn ClipboardSink, text: &str) -> Result<()> {
    validate_clipboard_text(text)?;
    sink.set_text(text)
}
