mod common;

use common::{candidate, sid, EngineOp, Harness};
use tutor_call_lib::media::TrackKind;
use tutor_call_lib::peer::{DescriptorKind, NegotiationDescriptor, ParticipantRole};
use tutor_call_lib::session::SessionState;
use tutor_call_lib::signaling::SignalMessage;

fn offer(session: &str) -> SignalMessage {
    SignalMessage::Offer {
        session_id: sid(session),
        descriptor: NegotiationDescriptor::offer("v=0 remote-offer"),
    }
}

#[tokio::test]
async fn responder_announces_availability_after_joining() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.start().await;

    assert_eq!(h.machine.state(), SessionState::Queued);
    assert_eq!(h.sent_names(), vec!["join-queue", "presence-available"]);
    assert_eq!(
        h.sent()[1],
        SignalMessage::PresenceAvailable {
            participant_id: "p-1".into()
        }
    );
}

#[tokio::test]
async fn responder_never_offers_unprompted() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.matched("S1").await;

    assert_eq!(h.machine.state(), SessionState::Negotiating);
    assert!(!h.sent_names().contains(&"offer"));
    assert_eq!(
        h.engine_ops(),
        vec![
            EngineOp::AddTrack(TrackKind::Audio),
            EngineOp::AddTrack(TrackKind::Video),
        ]
    );
}

#[tokio::test]
async fn offer_is_answered_then_buffered_candidates_flush_in_order() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.start().await;

    // trickled before the match arrived
    h.candidate("S1", 1).await;
    h.signal(SignalMessage::MatchFound {
        session_id: sid("S1"),
        peer_info: Default::default(),
    })
    .await;
    h.candidate("S1", 2).await;
    assert!(h.applied_candidates().is_empty());

    h.signal(offer("S1")).await;

    assert_eq!(
        h.engine_ops()[2..],
        [
            EngineOp::SetRemote(DescriptorKind::Offer),
            EngineOp::CreateAnswer,
            EngineOp::Candidate(candidate(1).candidate),
            EngineOp::Candidate(candidate(2).candidate),
        ]
    );
    assert_eq!(
        h.sent().last(),
        Some(&SignalMessage::Answer {
            session_id: sid("S1"),
            descriptor: NegotiationDescriptor::answer("v=0 local-answer"),
        })
    );

    h.candidate("S1", 3).await;
    assert_eq!(h.applied_candidates().len(), 3);
}

#[tokio::test]
async fn candidates_for_another_session_are_dropped_at_match() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.start().await;

    h.candidate("S0", 1).await;
    h.candidate("S1", 2).await;
    assert_eq!(h.machine.pending_candidates(), 2);

    h.signal(SignalMessage::MatchFound {
        session_id: sid("S1"),
        peer_info: Default::default(),
    })
    .await;
    assert_eq!(h.machine.pending_candidates(), 1);

    h.signal(offer("S1")).await;
    assert_eq!(h.applied_candidates(), vec![candidate(2).candidate]);
}

#[tokio::test]
async fn stale_session_messages_are_ignored() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.matched("S1").await;

    h.signal(SignalMessage::EndCall {
        session_id: sid("S9"),
    })
    .await;
    h.signal(offer("S9")).await;

    assert_eq!(h.machine.state(), SessionState::Negotiating);
    assert!(!h.engine_ops().contains(&EngineOp::CreateAnswer));
}

#[tokio::test]
async fn duplicate_match_for_same_session_is_harmless() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.matched("S1").await;
    h.signal(SignalMessage::MatchFound {
        session_id: sid("S1"),
        peer_info: Default::default(),
    })
    .await;

    assert_eq!(h.machine.state(), SessionState::Negotiating);
    assert_eq!(
        h.engines_created.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn hangup_mid_flush_keeps_the_rest_buffered() {
    let mut h = Harness::new(ParticipantRole::Responder);
    h.matched("S1").await;
    h.candidate("S1", 1).await;
    h.candidate("S1", 2).await;
    h.candidate("S1", 3).await;
    *h.cancel_hook.lock().unwrap() = Some((candidate(1).candidate, h.machine.cancel_token()));

    h.signal(offer("S1")).await;

    assert_eq!(h.applied_candidates(), vec![candidate(1).candidate]);
    assert_eq!(h.machine.pending_candidates(), 2);

    h.machine.end().await;
    assert_eq!(h.machine.state(), SessionState::Ended);
    assert_eq!(h.machine.pending_candidates(), 0);
}
