//! Property-based tests for the message lifecycle
//!
//! These run arbitrary event sequences through the pure transition table and
//! check the lifecycle invariants hold for all of them.

use super::state::*;
use super::transition::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_event() -> impl Strategy<Value = MessageEvent> {
    prop_oneof![
        4 => "[a-zA-Z ]{0,8}".prop_map(MessageEvent::Token),
        1 => Just(MessageEvent::Complete),
        1 => proptest::option::of("[a-z]{1,10}").prop_map(|error| MessageEvent::Fail { error }),
        1 => Just(MessageEvent::Cancel),
    ]
}

fn rank(status: &MessageStatus) -> u8 {
    match status {
        MessageStatus::Pending => 0,
        MessageStatus::Streaming => 1,
        MessageStatus::Complete | MessageStatus::Error { .. } | MessageStatus::Cancelled => 2,
    }
}

/// Fold events into (status, content), skipping rejected ones
fn run(events: &[MessageEvent]) -> (MessageStatus, String, Vec<MessageStatus>) {
    let mut status = MessageStatus::Pending;
    let mut content = String::new();
    let mut history = vec![status.clone()];
    for event in events {
        if let Ok(result) = transition(&status, event.clone()) {
            for effect in result.effects {
                if let Effect::AppendContent(token) = effect {
                    content.push_str(&token);
                }
            }
            status = result.new_status;
            history.push(status.clone());
        }
    }
    (status, content, history)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn tokens_concatenate_in_arrival_order(tokens in proptest::collection::vec("[a-z]{0,5}", 0..20)) {
        let events: Vec<_> = tokens.iter().cloned().map(MessageEvent::Token).collect();
        let (status, content, _) = run(&events);
        prop_assert_eq!(content, tokens.concat());
        let expected = if tokens.is_empty() { MessageStatus::Pending } else { MessageStatus::Streaming };
        prop_assert_eq!(status, expected);
    }

    #[test]
    fn lifecycle_never_moves_backwards(events in proptest::collection::vec(arb_event(), 0..30)) {
        let (_, _, history) = run(&events);
        for pair in history.windows(2) {
            prop_assert!(rank(&pair[0]) <= rank(&pair[1]));
        }
    }

    #[test]
    fn terminal_status_is_final(events in proptest::collection::vec(arb_event(), 0..30)) {
        let (_, _, history) = run(&events);
        if let Some(first_terminal) = history.iter().position(MessageStatus::is_terminal) {
            prop_assert!(history[first_terminal..].iter().all(|s| *s == history[first_terminal]));
            prop_assert_eq!(history.len(), first_terminal + 1);
        }
    }

    #[test]
    fn content_frozen_after_terminal(
        before in proptest::collection::vec(arb_event(), 0..10),
        after in proptest::collection::vec(arb_event(), 0..10),
    ) {
        let mut events = before;
        events.push(MessageEvent::Complete);
        let (_, frozen, _) = run(&events);
        events.extend(after);
        let (status, content, _) = run(&events);
        prop_assert!(status.is_terminal());
        prop_assert_eq!(content, frozen);
    }
}
