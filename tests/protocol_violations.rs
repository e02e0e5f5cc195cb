mod common;

use common::{sid, EngineOp, Harness};
use tutor_call_lib::error::{ProtocolError, SessionError};
use tutor_call_lib::notify::SessionNotification;
use tutor_call_lib::peer::{NegotiationDescriptor, ParticipantRole, PeerInfo};
use tutor_call_lib::session::{SessionInput, SessionState};
use tutor_call_lib::signaling::SignalMessage;

fn offer(session: &str) -> SignalMessage {
    SignalMessage::Offer {
        session_id: sid(session),
        descriptor: NegotiationDescriptor::offer("v=0 remote-offer"),
    }
}

fn errors(h: &Harness) -> Vec<SessionError> {
    h.notes()
        .into_iter()
        .filter_map(|n| match n {
            SessionNotification::Error(e) => Some(e),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn offer_before_match_is_never_applied() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.start().await;

    h.signal(offer("S1")).await;

    assert_eq!(h.machine.state(), SessionState::Failed);
    assert!(h.engine_ops().is_empty());
    assert_eq!(
        errors(&h),
        vec![SessionError::Protocol(ProtocolError::UnexpectedMessage {
            event: "offer",
            state: SessionState::Queued,
        })]
    );
}

#[tokio::test]
async fn second_offer_fails_the_session() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.matched("S1").await;
    h.signal(offer("S1")).await;
    h.signal(offer("S1")).await;

    assert_eq!(h.machine.state(), SessionState::Failed);
    assert_eq!(
        errors(&h),
        vec![SessionError::Protocol(ProtocolError::DuplicateOffer)]
    );
    assert_eq!(h.closes(), 1);
    assert_eq!(
        h.engine_ops()
            .iter()
            .filter(|op| **op == EngineOp::CreateAnswer)
            .count(),
        1
    );
}

#[tokio::test]
async fn initiator_rejects_a_crossing_offer() {
    let mut h = Harness::new(ParticipantRole::Initiator);
    h.matched("S1").await;
    h.signal(offer("S1")).await;

    assert_eq!(
        errors(&h),
        vec![SessionError::Protocol(ProtocolError::DuplicateOffer)]
    );
}

#[tokio::test]
async fn responder_cannot_receive_an_answer() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.matched("S1").await;
    h.signal(SignalMessage::Answer {
        session_id: sid("S1"),
        descriptor: NegotiationDescriptor::answer("v=0"),
    })
    .await;

    assert_eq!(
        errors(&h),
        vec![SessionError::Protocol(ProtocolError::UnexpectedAnswer)]
    );
}

#[tokio::test]
async fn answer_carrying_an_offer_descriptor_is_malformed() {
    let mut h = Harness::new(ParticipantRole::Initiator);
    h.matched("S1").await;
    h.signal(SignalMessage::Answer {
        session_id: sid("S1"),
        descriptor: NegotiationDescriptor::offer("v=0"),
    })
    .await;

    assert_eq!(h.machine.state(), SessionState::Failed);
    assert!(matches!(
        errors(&h).as_slice(),
        [SessionError::Protocol(ProtocolError::Malformed { event, .. })] if event == "answer"
    ));
}

#[tokio::test]
async fn same_role_peer_is_a_conflict() {
    let mut h = Harness::new(ParticipantRole::Initiator);
    h.start().await;
    h.signal(SignalMessage::MatchFound {
        session_id: sid("S1"),
        peer_info: PeerInfo {
            role: Some(ParticipantRole::Initiator),
            ..Default::default()
        },
    })
    .await;

    assert_eq!(h.machine.state(), SessionState::Failed);
    assert_eq!(
        errors(&h),
        vec![SessionError::Protocol(ProtocolError::RoleConflict(
            ParticipantRole::Initiator
        ))]
    );
    assert_eq!(
        h.engines_created.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn service_error_fails_with_its_message() {
    let mut h = Harness::new(ParticipantRole::Initiator);
    h.start().await;
    h.signal(SignalMessage::Error {
        message: "queue closed".into(),
    })
    .await;

    assert_eq!(h.machine.state(), SessionState::Failed);
    assert_eq!(
        errors(&h),
        vec![SessionError::Protocol(ProtocolError::Rejected(
            "queue closed".into()
        ))]
    );
    assert_eq!(h.media.stops(), 2);
}

#[tokio::test]
async fn malformed_frame_mid_session_fails_and_tells_the_peer() {
    let mut h = Harness::new(ParticipantRole::Initiator);
    h.matched("S1").await;
    h.input(SessionInput::Malformed(ProtocolError::Malformed {
        event: "candidate".into(),
        reason: "missing field `candidate`".into(),
    }))
    .await;

    assert_eq!(h.machine.state(), SessionState::Failed);
    assert_eq!(
        h.sent().last(),
        Some(&SignalMessage::EndCall {
            session_id: sid("S1")
        })
    );
}

#[tokio::test]
async fn failure_is_surfaced_once() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.matched("S1").await;
    h.signal(SignalMessage::Answer {
        session_id: sid("S1"),
        descriptor: NegotiationDescriptor::answer("v=0"),
    })
    .await;
    h.signal(offer("S1")).await;
    h.input(SessionInput::End).await;

    assert_eq!(errors(&h).len(), 1);
    assert!(!h
        .notes()
        .iter()
        .any(|n| matches!(n, SessionNotification::Ended { .. })));
}
