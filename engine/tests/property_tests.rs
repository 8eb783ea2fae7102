use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use convodesk_engine::handlers::ChatInput;
use convodesk_engine::presenter::{progress_bar, time_since};
use convodesk_engine::status::{status_indicator, StatusIndicator};
use convodesk_engine::visibility::{initial_reveal, Reveal};
use proptest::prelude::*;
use sdk::engine::{Conversation, Role};
use sdk::task::TaskProgress;
use std::sync::Arc;
use std::time::Duration;

// Progress bars always have the requested width and a bounded percentage
proptest! {
    #[test]
    fn test_progress_bar_shape(fraction in -1.0f32..2.0, width in 1usize..60) {
        let bar = progress_bar(fraction, width);
        let inner = &bar[1..=width];

        prop_assert!(bar.starts_with('['));
        prop_assert_eq!(bar.as_bytes()[width + 1], b']');
        prop_assert!(inner.chars().all(|c| c == '#' || c == '-'));
        prop_assert!(bar.ends_with('%'));

        let percent: u32 = bar[width + 2..bar.len() - 1].trim().parse().unwrap();
        prop_assert!(percent <= 100);
    }
}

// Ages are bucketed by the largest unit that fits
proptest! {
    #[test]
    fn test_time_since_buckets(seconds in 0i64..10_000_000) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let then = (now - ChronoDuration::seconds(seconds)).to_rfc3339();
        let age = time_since(&then, now);

        if seconds < 60 {
            prop_assert_eq!(age, "just now");
        } else if seconds < 3600 {
            prop_assert_eq!(age, format!("{}m ago", seconds / 60));
        } else if seconds < 86_400 {
            prop_assert_eq!(age, format!("{}h ago", seconds / 3600));
        } else {
            prop_assert_eq!(age, format!("{}d ago", seconds / 86_400));
        }
    }
}

// Any line not starting with '/' is sent as a message, trimmed
proptest! {
    #[test]
    fn test_chat_input_plain_text(text in "[a-zA-Z0-9][a-zA-Z0-9 ,.?!]{0,40}") {
        prop_assert_eq!(
            ChatInput::parse(&format!("  {}  ", text)),
            ChatInput::Message(text.trim().to_string())
        );
    }

    #[test]
    fn test_chat_input_unknown_command(name in "[a-z]{3,10}") {
        let known = ["reset", "save", "source", "export", "copy", "quit", "exit", "help"];
        prop_assume!(!known.contains(&name.as_str()));
        prop_assert_eq!(ChatInput::parse(&format!("/{}", name)), ChatInput::Unknown(name));
    }
}

// Appending a block adds exactly one message with the trimmed content
proptest! {
    #[test]
    fn test_append_adds_one_message(
        lines in prop::collection::vec("[a-zA-Z][a-zA-Z0-9 ]{0,30}", 1..5),
        assistant in any::<bool>(),
    ) {
        let base = Conversation::parse("> system\nYou manage todos\n\n> nop\n// END\n");
        let role = if assistant { Role::Assistant } else { Role::User };
        let content = lines.join("\n");

        let next = base.append(role.clone(), &content);

        prop_assert_eq!(next.messages.len(), base.messages.len() + 1);
        let last = next.last_message().unwrap();
        prop_assert_eq!(&last.role, &role);
        prop_assert_eq!(last.content.as_str(), content.trim());
        prop_assert_eq!(Conversation::parse(&next.source), next.clone());
    }
}

// Open tasks always win over the working indicator
proptest! {
    #[test]
    fn test_status_indicator_precedence(
        open in 0usize..4,
        visible_count in 0usize..4,
        current in any::<bool>(),
        busy in any::<bool>(),
    ) {
        let visible: Vec<Arc<TaskProgress>> = (0..visible_count.min(open))
            .map(|i| Arc::new(TaskProgress::new(format!("task {}", i))))
            .collect();
        let indicator = status_indicator(open, &visible, current.then_some("responding"), busy);

        match indicator {
            StatusIndicator::Tasks(tasks) => {
                prop_assert!(open > 0);
                prop_assert_eq!(tasks, visible);
            }
            StatusIndicator::Working => prop_assert!(open == 0 && (current || busy)),
            StatusIndicator::Idle => prop_assert!(open == 0 && !current && !busy),
        }
    }

    #[test]
    fn test_only_zero_delay_reveals_immediately(millis in 0u64..5_000) {
        let reveal = initial_reveal(Duration::from_millis(millis));
        if millis == 0 {
            prop_assert_eq!(reveal, Reveal::Visible);
        } else {
            prop_assert_eq!(reveal, Reveal::After(Duration::from_millis(millis)));
        }
    }
}
