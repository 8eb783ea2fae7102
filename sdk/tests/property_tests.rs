use proptest::prelude::*;
use sdk::engine::{Conversation, Message, Role};
use sdk::errors::{ConvoError, ConvoErrorExt};
use sdk::observable::Observable;
use sdk::task::{TaskList, TaskProgress};
use std::sync::{Arc, Mutex};

// Every error variant must carry a non-empty hint that never echoes the raw detail
proptest! {
    #[test]
    fn test_error_user_hint_completeness(detail in "[a-z]{12,40}") {
        let errs = vec![
            ConvoError::Config(detail.clone()),
            ConvoError::Engine(detail.clone()),
            ConvoError::Network(detail.clone()),
            ConvoError::Timeout,
            ConvoError::Store(detail.clone()),
            ConvoError::Validation(detail.clone()),
            ConvoError::NotFound(detail.clone()),
            ConvoError::Disposed,
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&detail));
        }
    }
}

// Subscribers see exactly the sequence of distinct consecutive values, in order
proptest! {
    #[test]
    fn test_observable_delivers_only_changes(values in prop::collection::vec(0u8..4, 0..40)) {
        let cell = Observable::new(0u8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = cell.subscribe(move |v| sink.lock().unwrap().push(*v));

        let mut expected = Vec::new();
        let mut last = 0u8;
        for v in &values {
            cell.set(*v);
            if *v != last {
                expected.push(*v);
                last = *v;
            }
        }

        prop_assert_eq!(seen.lock().unwrap().clone(), expected.clone());
        prop_assert_eq!(cell.version(), expected.len() as u64);
        prop_assert_eq!(cell.get(), last);
    }
}

// Subscribers are notified in registration order for every change
proptest! {
    #[test]
    fn test_observable_registration_order(subscribers in 1usize..8, changes in 1u32..10) {
        let cell = Observable::new(0u32);
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = (0..subscribers)
            .map(|index| {
                let sink = Arc::clone(&log);
                cell.subscribe(move |v| sink.lock().unwrap().push((*v, index)))
            })
            .collect();

        for v in 1..=changes {
            cell.set(v);
        }

        let expected: Vec<(u32, usize)> = (1..=changes)
            .flat_map(|v| (0..subscribers).map(move |index| (v, index)))
            .collect();
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
        drop(subs);
        prop_assert_eq!(cell.subscriber_count(), 0);
    }
}

// Closing any subset of tasks keeps the survivors in insertion order
proptest! {
    #[test]
    fn test_task_list_close_keeps_order(
        count in 1usize..12,
        close_mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let list = TaskList::new();
        let tasks: Vec<_> = (0..count)
            .map(|i| list.open(TaskProgress::new(format!("task-{i}"))))
            .collect();

        let mut survivors = Vec::new();
        for (task, close) in tasks.iter().zip(&close_mask) {
            if *close {
                prop_assert!(list.close(task.id()));
            } else {
                survivors.push(task.id());
            }
        }

        let open: Vec<_> = list.snapshot().iter().map(|t| t.id()).collect();
        prop_assert_eq!(open, survivors);
    }
}

// Appended content reads back unchanged, whatever its lines look like
proptest! {
    #[test]
    fn test_append_is_lossless(lines in prop::collection::vec("[a-z>/\\\\ ]{0,12}", 1..6)) {
        let content = lines.join("\n");
        prop_assume!(!content.trim().is_empty());

        let convo = Conversation::parse("> system\nYou manage todos")
            .append(Role::User, &content);

        prop_assert_eq!(
            convo.messages.last(),
            Some(&Message::new(Role::User, content.trim()))
        );
        prop_assert_eq!(convo.messages.len(), 2);
    }
}
