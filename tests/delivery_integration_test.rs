//! Integration tests for the delivery engine and the service surface.
//!
//! These tests drive the full stack (service, store, engine, hub, sink)
//! over an in-memory database and verify:
//! - Immediate ("now") and deferred message lifecycles
//! - Trigger resolution and idempotent delivery
//! - Visibility rules for senders and recipients
//! - Cancel/edit interactions with delivery
//! - Single-use invitation redemption
//! - Real-time events and push hand-offs

mod helpers;

use hearth_core::error::CoreError;
use hearth_core::message::MessageStatus;
use hearth_core::presence::{DeliveryTrigger, MemberState};
use hearth_core::realtime::RealtimeEvent;

use helpers::{family_of_two, service_with_sink};

// ============================================================================
// Scenario A: immediate delivery
// ============================================================================

mod immediate_delivery_tests {
    use super::*;

    #[test]
    fn now_message_is_visible_to_both_parties() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let sent = service
            .send_message("alice", "bob", &circle_id, "dinner at 7", DeliveryTrigger::Now)
            .unwrap();

        assert_eq!(sent.status, MessageStatus::Delivered);
        assert_eq!(sent.delivered_at, Some(sent.sent_at));

        let bob_view = service.list_messages("bob").unwrap();
        assert!(bob_view.iter().any(|m| m.id == sent.id));

        let alice_view = service.list_messages("alice").unwrap();
        assert!(alice_view.iter().any(|m| m.id == sent.id));
    }

    #[test]
    fn now_message_pushes_full_payload_to_connected_recipient() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let mut bob_rx = service.hub().connect("bob");

        let sent = service
            .send_message("alice", "bob", &circle_id, "dinner at 7", DeliveryTrigger::Now)
            .unwrap();

        match bob_rx.try_recv().unwrap() {
            RealtimeEvent::Message(message) => assert_eq!(message, sent),
            RealtimeEvent::Reload => panic!("expected the full message payload"),
        }
    }

    #[test]
    fn now_message_hands_off_push_when_token_registered() {
        let (service, sink) = service_with_sink();
        let circle_id = family_of_two(&service);
        service.set_push_token("bob", "ExponentPushToken[bob]").unwrap();

        service
            .send_message("alice", "bob", &circle_id, "dinner at 7", DeliveryTrigger::Now)
            .unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            (
                "ExponentPushToken[bob]".to_string(),
                "Alice".to_string(),
                "dinner at 7".to_string()
            )
        );
    }

    #[test]
    fn now_message_without_token_skips_push() {
        let (service, sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        service
            .send_message("alice", "bob", &circle_id, "dinner at 7", DeliveryTrigger::Now)
            .unwrap();

        assert!(sink.records().is_empty());
    }
}

// ============================================================================
// Scenario B: deferred delivery on arrival
// ============================================================================

mod deferred_delivery_tests {
    use super::*;

    #[test]
    fn pending_message_is_hidden_until_trigger_fires() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let sent = service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "take the trash out",
                DeliveryTrigger::OnArrival,
            )
            .unwrap();
        assert_eq!(sent.status, MessageStatus::Pending);
        assert!(sent.delivered_at.is_none());

        // Recipient's views exclude it
        assert!(service.list_delivered("bob").unwrap().is_empty());
        assert!(service.list_messages("bob").unwrap().is_empty());

        // Sender's view includes it, still pending
        let alice_view = service.list_messages("alice").unwrap();
        assert_eq!(alice_view.len(), 1);
        assert_eq!(alice_view[0].status, MessageStatus::Pending);

        let mut bob_rx = service.hub().connect("bob");

        let change = service
            .change_state("bob", "bob", MemberState::AtHome)
            .unwrap();

        assert_eq!(change.previous_state, MemberState::AtWork);
        assert_eq!(change.delivered.len(), 1);
        assert_eq!(change.delivered[0].id, sent.id);
        assert_eq!(change.delivered[0].status, MessageStatus::Delivered);
        assert!(change.delivered[0].delivered_at.is_some());

        // Recipient now sees it, and got the reload hint
        let bob_view = service.list_messages("bob").unwrap();
        assert_eq!(bob_view.len(), 1);
        assert_eq!(bob_view[0].id, sent.id);
        assert_eq!(bob_rx.try_recv().unwrap(), RealtimeEvent::Reload);
    }

    #[test]
    fn wrong_trigger_keeps_message_pending() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let sent = service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "call me when you leave",
                DeliveryTrigger::OnDepart,
            )
            .unwrap();

        // at_home resolves to on_arrival, not on_depart
        let change = service
            .change_state("bob", "bob", MemberState::AtHome)
            .unwrap();
        assert!(change.delivered.is_empty());
        assert!(service.list_delivered("bob").unwrap().is_empty());

        // en_route resolves to on_depart
        let change = service
            .change_state("bob", "bob", MemberState::EnRoute)
            .unwrap();
        assert_eq!(change.delivered.len(), 1);
        assert_eq!(change.delivered[0].id, sent.id);
    }

    #[test]
    fn another_members_state_change_delivers_nothing() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "take the trash out",
                DeliveryTrigger::OnArrival,
            )
            .unwrap();

        let change = service
            .change_state("alice", "alice", MemberState::AtHome)
            .unwrap();
        assert!(change.delivered.is_empty());
        assert!(service.list_delivered("bob").unwrap().is_empty());
    }

    #[test]
    fn second_resolution_delivers_nothing_more() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "take the trash out",
                DeliveryTrigger::OnArrival,
            )
            .unwrap();

        let first = service
            .change_state("bob", "bob", MemberState::AtHome)
            .unwrap();
        assert_eq!(first.delivered.len(), 1);
        let delivered_at = first.delivered[0].delivered_at;

        let second = service
            .change_state("bob", "bob", MemberState::AtHome)
            .unwrap();
        assert!(second.delivered.is_empty());

        // The single delivery is unchanged
        let bob_view = service.list_delivered("bob").unwrap();
        assert_eq!(bob_view.len(), 1);
        assert_eq!(bob_view[0].delivered_at, delivered_at);
    }

    #[test]
    fn deferred_delivery_hands_off_push_with_sender_name() {
        let (service, sink) = service_with_sink();
        let circle_id = family_of_two(&service);
        service.set_push_token("bob", "ExponentPushToken[bob]").unwrap();

        service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "take the trash out",
                DeliveryTrigger::OnArrival,
            )
            .unwrap();

        // Nothing pushed while pending
        assert!(sink.records().is_empty());

        service
            .change_state("bob", "bob", MemberState::AtHome)
            .unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, "Alice");
        assert_eq!(records[0].2, "take the trash out");
    }
}

// ============================================================================
// Scenario C: cancellation beats the trigger
// ============================================================================

mod cancellation_tests {
    use super::*;

    #[test]
    fn canceled_message_is_never_delivered() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let sent = service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "never mind",
                DeliveryTrigger::OnArrival,
            )
            .unwrap();
        service.cancel_message("alice", &sent.id).unwrap();

        let change = service
            .change_state("bob", "bob", MemberState::AtHome)
            .unwrap();
        assert!(change.delivered.is_empty());
        assert!(service.list_delivered("bob").unwrap().is_empty());

        // Sender still sees the canceled message
        let alice_view = service.list_messages("alice").unwrap();
        assert_eq!(alice_view.len(), 1);
        assert_eq!(alice_view[0].status, MessageStatus::Canceled);
    }

    #[test]
    fn terminal_statuses_reject_edit_and_cancel() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let delivered = service
            .send_message("alice", "bob", &circle_id, "hi", DeliveryTrigger::Now)
            .unwrap();
        let canceled = service
            .send_message("alice", "bob", &circle_id, "bye", DeliveryTrigger::OnArrival)
            .unwrap();
        service.cancel_message("alice", &canceled.id).unwrap();

        for id in [&delivered.id, &canceled.id] {
            assert!(matches!(
                service.edit_message("alice", id, "rewrite").unwrap_err(),
                CoreError::InvalidState(_)
            ));
            assert!(matches!(
                service.cancel_message("alice", id).unwrap_err(),
                CoreError::InvalidState(_)
            ));
        }
    }
}

// ============================================================================
// Scenario D: edits land before delivery
// ============================================================================

mod edit_tests {
    use super::*;

    #[test]
    fn delivered_message_carries_the_edited_text() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let sent = service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "buy milk",
                DeliveryTrigger::OnArrival,
            )
            .unwrap();
        service
            .edit_message("alice", &sent.id, "buy milk and eggs")
            .unwrap();

        let change = service
            .change_state("bob", "bob", MemberState::AtHome)
            .unwrap();
        assert_eq!(change.delivered.len(), 1);
        assert_eq!(change.delivered[0].body, "buy milk and eggs");

        let bob_view = service.list_delivered("bob").unwrap();
        assert_eq!(bob_view[0].body, "buy milk and eggs");
    }

    #[test]
    fn only_the_sender_may_edit() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        let sent = service
            .send_message(
                "alice",
                "bob",
                &circle_id,
                "buy milk",
                DeliveryTrigger::OnArrival,
            )
            .unwrap();

        let err = service.edit_message("bob", &sent.id, "buy beer").unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}

// ============================================================================
// Scenario E: single-use invitations
// ============================================================================

mod invitation_tests {
    use super::*;
    use super::helpers::auth_user;

    #[test]
    fn a_token_admits_exactly_one_member() {
        let (service, _sink) = service_with_sink();
        service.register_member(&auth_user("alice"), "Alice").unwrap();
        service.register_member(&auth_user("bob"), "Bob").unwrap();
        service.register_member(&auth_user("carol"), "Carol").unwrap();

        let circle = service.create_circle("alice", "Family").unwrap();
        let invitation = service.invite("alice", &circle.id).unwrap();

        let before = service.roster("alice", &circle.id).unwrap().len();

        service.redeem_invitation("bob", &invitation.token).unwrap();
        let err = service
            .redeem_invitation("carol", &invitation.token)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidState(_) | CoreError::Conflict(_)
        ));

        let after = service.roster("alice", &circle.id).unwrap().len();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn redeemed_member_appears_on_the_roster_with_state() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        service
            .change_state("bob", "bob", MemberState::EnRoute)
            .unwrap();

        let roster = service.roster("alice", &circle_id).unwrap();
        let bob = roster.iter().find(|m| m.id == "bob").unwrap();
        assert_eq!(bob.state, MemberState::EnRoute);
    }
}

// ============================================================================
// Ordering & visibility
// ============================================================================

mod visibility_tests {
    use super::*;

    #[test]
    fn visible_list_is_ordered_by_send_time() {
        use hearth_core::store::Store;

        let store = Store::in_memory().unwrap();
        store.create_member("alice", "Alice", 1_000).unwrap();
        store.create_member("bob", "Bob", 1_000).unwrap();
        store.create_circle("c-1", "Family", "alice", 1_100).unwrap();

        // Out-of-order inserts with distinct send times
        store
            .create_message("m-2", "bob", "alice", "c-1", "two", DeliveryTrigger::Now, 2_200)
            .unwrap();
        store
            .create_message("m-1", "alice", "bob", "c-1", "one", DeliveryTrigger::Now, 2_100)
            .unwrap();
        store
            .create_message("m-3", "alice", "bob", "c-1", "three", DeliveryTrigger::OnArrival, 2_300)
            .unwrap();

        let alice_view = store.list_visible("alice").unwrap();
        let ids: Vec<&str> = alice_view.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
    }

    #[test]
    fn recipient_never_sees_pending_or_canceled() {
        let (service, _sink) = service_with_sink();
        let circle_id = family_of_two(&service);

        service
            .send_message("alice", "bob", &circle_id, "pending", DeliveryTrigger::OnArrival)
            .unwrap();
        let canceled = service
            .send_message("alice", "bob", &circle_id, "canceled", DeliveryTrigger::OnDepart)
            .unwrap();
        service.cancel_message("alice", &canceled.id).unwrap();

        assert!(service.list_messages("bob").unwrap().is_empty());
        assert!(service.list_delivered("bob").unwrap().is_empty());
    }
}

// ============================================================================
// Failure surfaces
// ============================================================================

mod failure_tests {
    use super::*;
    use super::helpers::auth_user;

    #[test]
    fn unknown_bearer_is_unauthorized() {
        let (service, _sink) = service_with_sink();
        let err = service.authenticate("not-a-token").unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[test]
    fn state_change_for_unknown_member_is_not_found() {
        let (service, _sink) = service_with_sink();
        let err = service
            .change_state("ghost", "ghost", MemberState::AtHome)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn send_to_unknown_recipient_is_not_found() {
        let (service, _sink) = service_with_sink();
        service.register_member(&auth_user("alice"), "Alice").unwrap();
        let circle = service.create_circle("alice", "Family").unwrap();

        let err = service
            .send_message("alice", "ghost", &circle.id, "hi", DeliveryTrigger::Now)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn duplicate_registration_is_conflict() {
        let (service, _sink) = service_with_sink();
        service.register_member(&auth_user("alice"), "Alice").unwrap();
        let err = service
            .register_member(&auth_user("alice"), "Alyce")
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}
