//! Terminal presentation
//!
//! Plain-text rendering for the chat command: messages, task lines, the
//! status area, and session listings. Messages are printed as written; no
//! markdown rendering is attempted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sdk::engine::{Message, Role};
use sdk::task::TaskProgress;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::status::StatusIndicator;

const PROGRESS_WIDTH: usize = 20;

pub fn render_message(message: &Message) -> String {
    let label = match &message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Other(name) => name.as_str(),
    };
    format!("{}> {}", label, message.content)
}

/// Messages worth showing in the chat log
pub fn is_displayed(message: &Message) -> bool {
    matches!(message.role, Role::User | Role::Assistant)
}

pub fn progress_bar(fraction: f32, width: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * width as f32).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        (fraction * 100.0).round() as u32
    )
}

/// One task as a block of lines: name (with link), status, progress bar
pub fn render_task(task: &TaskProgress) -> String {
    let mut out = match task.document_ref() {
        Some(link) => format!("  ... {} <{}>", task.name(), link),
        None => format!("  ... {}", task.name()),
    };
    if let Some(status) = task.status().filter(|s| !s.is_empty()) {
        out.push_str("\n      ");
        out.push_str(&status);
    }
    if let Some(progress) = task.progress() {
        out.push_str("\n      ");
        out.push_str(&progress_bar(progress, PROGRESS_WIDTH));
    }
    out
}

/// Text for the status area, `None` when nothing should be shown
pub fn render_status(indicator: &StatusIndicator) -> Option<String> {
    match indicator {
        StatusIndicator::Tasks(tasks) if tasks.is_empty() => None,
        StatusIndicator::Tasks(tasks) => Some(
            tasks
                .iter()
                .map(|t| render_task(t))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        StatusIndicator::Working => Some("  ...".to_string()),
        StatusIndicator::Idle => None,
    }
}

/// Human-friendly age of an RFC 3339 timestamp
pub fn time_since(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let seconds = (now - then.with_timezone(&Utc)).num_seconds().max(0);
    match seconds {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", seconds / 60),
        3600..=86_399 => format!("{}h ago", seconds / 3600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}

const CLIPBOARD_TOOLS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

/// Copy text to the system clipboard using platform-native tools
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut child = CLIPBOARD_TOOLS
        .iter()
        .find_map(|(program, args)| {
            Command::new(program)
                .args(*args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .ok()
        })
        .context("No clipboard tool found (tried pbcopy, wl-copy, xclip, xsel)")?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(text.as_bytes())
            .context("Failed to write to clipboard")?;
    }
    drop(child.stdin.take());

    let status = child.wait()?;
    if !status.success() {
        anyhow::bail!("Clipboard tool exited with {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn test_render_message() {
        assert_eq!(
            render_message(&Message::new(Role::Assistant, "Done.")),
            "assistant> Done."
        );
        assert!(!is_displayed(&Message::new(Role::System, "secret")));
        assert!(is_displayed(&Message::new(Role::User, "hi")));
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.5, 10), "[#####-----]  50%");
        assert_eq!(progress_bar(2.0, 4), "[####] 100%");
        assert_eq!(progress_bar(0.0, 4), "[----]   0%");
    }

    #[test]
    fn test_render_task() {
        let task = TaskProgress::new("Searching documents")
            .with_document("https://example.com/doc")
            .with_status("3 found")
            .with_progress(0.25);
        let text = render_task(&task);

        assert!(text.starts_with("  ... Searching documents <https://example.com/doc>"));
        assert!(text.contains("3 found"));
        assert!(text.contains(" 25%"));
    }

    #[test]
    fn test_render_status() {
        assert_eq!(render_status(&StatusIndicator::Idle), None);
        assert_eq!(render_status(&StatusIndicator::Tasks(vec![])), None);
        assert_eq!(render_status(&StatusIndicator::Working).as_deref(), Some("  ..."));

        let task = Arc::new(TaskProgress::new("Generating response"));
        assert_eq!(
            render_status(&StatusIndicator::Tasks(vec![task])).as_deref(),
            Some("  ... Generating response")
        );
    }

    #[test]
    fn test_time_since() {
        let now = Utc::now();
        let stamp = |d: Duration| (now - d).to_rfc3339();

        assert_eq!(time_since(&stamp(Duration::seconds(5)), now), "just now");
        assert_eq!(time_since(&stamp(Duration::minutes(12)), now), "12m ago");
        assert_eq!(time_since(&stamp(Duration::hours(3)), now), "3h ago");
        assert_eq!(time_since(&stamp(Duration::days(2)), now), "2d ago");
        assert_eq!(time_since("not a date", now), "not a date");
    }
}
