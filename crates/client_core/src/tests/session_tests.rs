use super::*;
use shared::error::{DELIVERY_FAILURE_NOTICE, PROCESSING_FAILURE_NOTICE};

fn chunk(message: &str) -> SessionEvent {
    SessionEvent::AgentStreamChunk(AgentStreamPayload {
        message: message.to_string(),
        agent: Some("reflection_agent".to_string()),
        mental_model: Some("stoic".to_string()),
    })
}

fn reply(message: &str, agent: &str) -> SessionEvent {
    SessionEvent::AgentResponse(AgentResponsePayload {
        message: message.to_string(),
        agent: Some(agent.to_string()),
        mental_model: None,
        user_id: None,
    })
}

fn submit(text: &str) -> SessionEvent {
    SessionEvent::UserMessageSubmitted {
        text: text.to_string(),
    }
}

fn assert_stream_target_invariant(state: &SessionState) {
    if let Some(target) = state.stream_target() {
        assert_eq!(target, state.entries().len() - 1);
        assert_eq!(state.entries()[target].role, Role::System);
    }
}

#[test]
fn user_submission_appends_entry_and_requests_send() {
    let mut state = SessionState::new();
    let user = UserId::from("u-1");

    let effects = state.apply(submit("hello"), Some(&user));

    assert_eq!(state.entries(), &[TranscriptEntry::user("hello")]);
    assert!(state.awaiting_response());
    assert_eq!(
        effects,
        vec![SessionEffect::SendUserMessage {
            user_id: Some(user),
            message: "hello".to_string(),
        }]
    );
}

#[test]
fn unregistered_submission_leaves_identity_to_the_shell() {
    let mut state = SessionState::new();

    let effects = state.apply(submit("hi"), None);

    assert_eq!(
        effects,
        vec![SessionEffect::SendUserMessage {
            user_id: None,
            message: "hi".to_string(),
        }]
    );
}

#[test]
fn blank_submission_is_ignored() {
    let mut state = SessionState::new();

    let effects = state.apply(submit("   "), None);

    assert!(effects.is_empty());
    assert!(state.entries().is_empty());
    assert!(!state.awaiting_response());
}

#[test]
fn one_shot_reply_scenario() {
    let mut state = SessionState::new();
    state.apply(submit("hello"), None);
    assert!(state.awaiting_response());

    state.apply(reply("hi there", "reflection_agent"), None);

    assert_eq!(
        state.entries(),
        &[
            TranscriptEntry::user("hello"),
            TranscriptEntry::system("hi there", Some("reflection_agent".to_string()), None),
        ]
    );
    assert!(!state.awaiting_response());
    assert_eq!(state.stream_target(), None);
}

#[test]
fn reply_requests_history_for_event_user_before_injected_user() {
    let mut state = SessionState::new();
    let injected = UserId::from("injected");

    let effects = state.apply(
        SessionEvent::AgentResponse(AgentResponsePayload {
            message: "ok".to_string(),
            agent: None,
            mental_model: None,
            user_id: Some(UserId::from("from-event")),
        }),
        Some(&injected),
    );
    assert_eq!(
        effects,
        vec![SessionEffect::FetchValenceHistory {
            user_id: UserId::from("from-event"),
        }]
    );

    let effects = state.apply(reply("again", "wisdom_capture"), Some(&injected));
    assert_eq!(
        effects,
        vec![SessionEffect::FetchValenceHistory { user_id: injected }]
    );

    let effects = state.apply(reply("anonymous", "wisdom_capture"), None);
    assert!(effects.is_empty());
}

#[test]
fn streamed_chunks_build_a_single_entry() {
    let mut state = SessionState::new();

    state.apply(chunk("Hel"), None);
    assert_eq!(state.stream_target(), Some(0));
    state.apply(chunk("lo "), None);
    state.apply(chunk("world"), None);
    state.apply(SessionEvent::AgentStreamComplete, None);

    assert_eq!(state.entries().len(), 1);
    assert_eq!(state.entries()[0].role, Role::System);
    assert_eq!(state.entries()[0].content, "Hello world");
    assert_eq!(state.stream_target(), None);
    assert!(!state.awaiting_response());
}

#[test]
fn chunk_concatenation_holds_for_any_split() {
    let text = "The quick brown fox jumps over the lazy dog";
    for parts in 1..=text.len() {
        let mut state = SessionState::new();
        state.apply(submit("go"), None);

        let size = text.len().div_ceil(parts);
        for piece in text.as_bytes().chunks(size) {
            let piece = std::str::from_utf8(piece).expect("ascii");
            state.apply(chunk(piece), None);
            assert_stream_target_invariant(&state);
        }
        state.apply(SessionEvent::AgentStreamComplete, None);

        assert_eq!(state.entries().len(), 2, "split into {parts} parts");
        assert_eq!(state.entries()[1].content, text);
    }
}

#[test]
fn first_chunk_fixes_agent_and_mental_model() {
    let mut state = SessionState::new();

    state.apply(chunk("a"), None);
    state.apply(
        SessionEvent::AgentStreamChunk(AgentStreamPayload {
            message: "b".to_string(),
            agent: Some("growth_challenge".to_string()),
            mental_model: Some("other".to_string()),
        }),
        None,
    );

    let entry = &state.entries()[0];
    assert_eq!(entry.content, "ab");
    assert_eq!(entry.agent.as_deref(), Some("reflection_agent"));
    assert_eq!(entry.mental_model.as_deref(), Some("stoic"));
}

#[test]
fn completion_is_idempotent() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);
    state.apply(chunk("answer"), None);

    state.apply(SessionEvent::AgentStreamComplete, None);
    let after_first = state.clone();
    state.apply(SessionEvent::AgentStreamComplete, None);

    assert_eq!(state, after_first);
    assert_eq!(state.stream_target(), None);
    assert!(!state.awaiting_response());
}

#[test]
fn completion_without_stream_normalizes_awaiting_flag() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);

    state.apply(SessionEvent::AgentStreamComplete, None);

    assert_eq!(state.entries().len(), 1);
    assert!(!state.awaiting_response());
}

#[test]
fn stream_error_appends_notice_and_closes_stream() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);
    state.apply(chunk("partial"), None);

    state.apply(
        SessionEvent::AgentStreamError {
            error: Some("upstream reset".to_string()),
        },
        None,
    );

    assert_eq!(state.entries().len(), 3);
    assert_eq!(state.entries()[1].content, "partial");
    assert_eq!(state.entries()[2].content, PROCESSING_FAILURE_NOTICE);
    assert_eq!(state.stream_target(), None);
    assert!(!state.awaiting_response());

    // The next chunk belongs to a new reply.
    state.apply(chunk("fresh"), None);
    assert_eq!(state.entries().len(), 4);
    assert_eq!(state.stream_target(), Some(3));
}

#[test]
fn repeated_stream_error_adds_no_second_notice() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);
    state.apply(chunk("x"), None);
    state.apply(SessionEvent::AgentStreamError { error: None }, None);
    let settled = state.entries().to_vec();

    state.apply(SessionEvent::AgentStreamError { error: None }, None);

    assert_eq!(state.entries(), settled.as_slice());
    assert_eq!(state.entries().len(), 3);
    assert!(!state.awaiting_response());
}

#[test]
fn stream_error_without_stream_only_clears_awaiting_flag() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);
    assert!(state.awaiting_response());

    let effects = state.apply(
        SessionEvent::AgentStreamError {
            error: Some("late".to_string()),
        },
        None,
    );

    assert!(effects.is_empty());
    assert_eq!(state.entries(), &[TranscriptEntry::user("q")]);
    assert!(!state.awaiting_response());
    assert_eq!(state.stream_target(), None);
}

#[test]
fn channel_error_adds_exactly_one_notice() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);

    state.apply(
        SessionEvent::ChannelError {
            reason: "unknown event 'mystery'".to_string(),
        },
        None,
    );

    assert_eq!(state.entries().len(), 2);
    assert_eq!(state.entries()[1].role, Role::System);
    assert_eq!(state.entries()[1].content, PROCESSING_FAILURE_NOTICE);
    assert!(!state.awaiting_response());
}

#[test]
fn outbound_failure_uses_delivery_notice() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);

    state.apply(
        SessionEvent::OutboundFailed(TurnError::registration("signup returned 500")),
        None,
    );

    assert_eq!(state.entries()[1].content, DELIVERY_FAILURE_NOTICE);
    assert!(!state.awaiting_response());
}

#[test]
fn user_turn_during_stream_closes_the_stream_target() {
    let mut state = SessionState::new();
    state.apply(chunk("first "), None);

    state.apply(submit("interrupt"), None);
    assert_eq!(state.stream_target(), None);
    state.apply(chunk("second"), None);

    assert_eq!(state.entries().len(), 3);
    assert_eq!(state.entries()[0].content, "first ");
    assert_eq!(state.entries()[2].content, "second");
    assert_stream_target_invariant(&state);
}

#[test]
fn one_shot_reply_during_stream_ends_the_stream() {
    let mut state = SessionState::new();
    state.apply(chunk("streamed"), None);

    state.apply(reply("complete", "wisdom_capture"), None);
    state.apply(chunk("next"), None);

    assert_eq!(state.entries().len(), 3);
    assert_eq!(state.entries()[0].content, "streamed");
    assert_eq!(state.entries()[2].content, "next");
}

#[test]
fn entries_never_shrink_and_roles_never_change() {
    let events = vec![
        submit("hello"),
        chunk("a"),
        chunk("b"),
        SessionEvent::ChannelError {
            reason: "bad frame".to_string(),
        },
        chunk("c"),
        SessionEvent::AgentStreamComplete,
        SessionEvent::AgentStreamComplete,
        reply("done", "growth_challenge"),
        SessionEvent::AgentStreamError { error: None },
        SessionEvent::ValenceHistoryLoaded {
            history: vec![0.1, 0.2],
        },
        submit("bye"),
        chunk("d"),
    ];

    let mut state = SessionState::new();
    let mut previous: Vec<TranscriptEntry> = Vec::new();
    for event in events {
        state.apply(event, None);
        assert!(state.entries().len() >= previous.len());
        for (before, after) in previous.iter().zip(state.entries()) {
            assert_eq!(before.role, after.role);
        }
        assert_stream_target_invariant(&state);
        previous = state.entries().to_vec();
    }
}

#[test]
fn valence_history_does_not_touch_transcript() {
    let mut state = SessionState::new();
    state.apply(submit("q"), None);

    state.apply(
        SessionEvent::ValenceHistoryLoaded {
            history: vec![-0.2, 0.1, 0.4],
        },
        None,
    );

    assert_eq!(state.valence_history(), &[-0.2, 0.1, 0.4]);
    assert_eq!(state.entries().len(), 1);
    assert!(state.awaiting_response());
}
