//! Cross-platform OS notifications via notify-rust:
//! - macOS: Native Notification Center
//! - Linux: D-Bus (freedesktop.org standard)
//! - Windows: Toast Notifications

use notify_rust::Notification;

/// Fired when a pull request transitions to fully approved and fresh.
pub fn notify_ready(pr_title: &str, repo: &str) {
    let _ = Notification::new()
        .summary("Ready to merge")
        .body(&format!("{}\n{}", repo, truncate(pr_title, 50)))
        .icon("emblem-default")
        .timeout(5000)
        .show();
}

/// Truncate a string to a maximum length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
