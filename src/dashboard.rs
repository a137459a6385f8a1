//! Startup offer to open the broker's monitoring dashboard.

use tracing::{info, warn};

/// Question asked before publishing starts.
pub const PROMPT: &str = "open monitoring dashboard? y/n";

/// Interpret an answer to [`PROMPT`]: only "y" means yes.
pub fn wants_dashboard(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// Ask once on the terminal and open `url` in a browser if the answer is "y".
///
/// Unreadable input counts as "no". Returns whether the dashboard was opened.
pub fn offer(url: &str) -> bool {
    let answer = dialoguer::Input::<String>::new()
        .with_prompt(PROMPT)
        .allow_empty(true)
        .interact_text()
        .unwrap_or_default();

    if !wants_dashboard(&answer) {
        return false;
    }
    match open::that(url) {
        Ok(()) => {
            info!(url, "opened dashboard");
            true
        }
        Err(e) => {
            warn!(url, "Failed to open dashboard: {}", e);
            false
        }
    }
}
