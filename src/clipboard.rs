use anyhow::{Context, Result};
use arboard::Clipboard;
use std::time::Duration;
use tracing::debug;

/// Puts `secret` on the clipboard and clears it after `clear_after`, or
/// earlier on Ctrl-C.
pub async fn copy_for(secret: &str, clear_after: Duration) -> Result<()> {
    let mut clipboard = Clipboard::new().context("clipboard is not available")?;
    clipboard
        .set_text(secret)
        .context("failed to copy to the clipboard")?;
    eprintln!(
        "Password copied, clipboard is cleared in {}s (Ctrl-C clears now).",
        clear_after.as_secs()
    );

    tokio::select! {
        _ = tokio::time::sleep(clear_after) => debug!("clipboard timeout elapsed"),
        _ = tokio::signal::ctrl_c() => debug!("interrupted, clearing clipboard"),
    }

    clipboard.clear().context("failed to clear the clipboard")?;
    eprintln!("Clipboard cleared.");
    Ok(())
}
