//! Session controller behaviour against the in-memory service
//!
//! Each test drives a `SessionController` through its public surface and
//! checks the resulting local state against what the fake service holds.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use recallai::models::{ConversationStatus, ReactionKind, Sender};
use recallai::service::{FailureKind, Operation};
use recallai::session::{EndDialog, Notice};
use recallai::{
    ConversationListController, ErrorKind, FakeConversationService, RefreshTrigger, SendOutcome,
    SessionPhase,
};

use common::{message_id_at, seed_exchange, session_for};

// ---------------------------------------------------------------------------
// send
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_send_keeps_user_message_and_adds_one_fallback() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&id).await.unwrap();
    let before = session.messages().len();

    fake.fail_next(Operation::SendMessage, FailureKind::Remote);
    assert_eq!(session.send("And the ticket?").await, SendOutcome::Fallback);

    let messages = session.messages();
    assert_eq!(messages.len(), before + 2);
    assert_eq!(messages[before].sender, Sender::User);
    assert_eq!(messages[before].content, "And the ticket?");
    assert!(messages[before].is_optimistic());
    assert_eq!(messages[before + 1].sender, Sender::Ai);
    assert_eq!(
        messages[before + 1].content,
        "Sorry, I encountered an error. Please try again."
    );
    assert!(!session.send_in_flight());
}

#[tokio::test]
async fn test_unauthenticated_send_still_uses_generic_fallback() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&id).await.unwrap();

    fake.fail_next(Operation::SendMessage, FailureKind::Unauthenticated);
    assert_eq!(session.send("hello?").await, SendOutcome::Fallback);
    let last = session.messages().pop().unwrap();
    assert_eq!(last.content, "Sorry, I encountered an error. Please try again.");
}

#[tokio::test]
async fn test_send_without_conversation_creates_exactly_once() {
    let fake = Arc::new(FakeConversationService::new());
    let refresh = RefreshTrigger::new();
    let session = session_for(&fake, &refresh);

    assert_eq!(session.send("Remind me about the dentist").await, SendOutcome::Replied);

    assert_eq!(fake.call_count(Operation::CreateConversation), 1);
    assert_eq!(fake.call_count(Operation::SendMessage), 1);
    let ids = fake.conversation_ids();
    assert_eq!(ids.len(), 1);
    assert_eq!(session.active_conversation_id(), Some(ids[0].clone()));
    assert_eq!(session.phase(), SessionPhase::Active(ids[0].clone()));
    assert_eq!(refresh.value(), 1);

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "You said: Remind me about the dentist");

    // The second send reuses the adopted id
    session.send("Tuesday at 10").await;
    assert_eq!(fake.call_count(Operation::CreateConversation), 1);
    assert_eq!(fake.call_count(Operation::SendMessage), 2);
}

#[tokio::test]
async fn test_send_after_send_failure_on_new_conversation_keeps_id() {
    let fake = Arc::new(FakeConversationService::new());
    let session = session_for(&fake, &RefreshTrigger::new());

    fake.fail_next(Operation::SendMessage, FailureKind::Remote);
    assert_eq!(session.send("first").await, SendOutcome::Fallback);

    // Creation succeeded, so the id is adopted even though the send failed
    let id = session.active_conversation_id().expect("id adopted");
    assert_eq!(fake.conversation_ids(), vec![id]);
    assert_eq!(session.send("second").await, SendOutcome::Replied);
    assert_eq!(fake.call_count(Operation::CreateConversation), 1);
}

#[tokio::test]
async fn test_send_reply_for_switched_session_is_discarded() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let b = seed_exchange(&fake, "B");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&a).await.unwrap();

    let gate = fake.hold(Operation::SendMessage, &a);
    let (outcome, _) = tokio::join!(session.send("for A"), async {
        while fake.call_count(Operation::SendMessage) == 0 {
            tokio::task::yield_now().await;
        }
        session.load(&b).await.unwrap();
        gate.release();
    });

    assert_eq!(outcome, SendOutcome::Stale);
    assert_eq!(session.active_conversation_id(), Some(b.clone()));
    assert_eq!(
        session.messages(),
        fake.snapshot(&b).unwrap().messages,
        "B's transcript must not pick up A's reply"
    );
}

#[tokio::test]
async fn test_overlapping_sends_stay_in_flight_and_paired() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&a).await.unwrap();
    let before = session.messages().len();

    let gate = fake.hold(Operation::SendMessage, &a);
    let (first, (second, in_flight)) = tokio::join!(session.send("first"), async {
        while fake.call_count(Operation::SendMessage) == 0 {
            tokio::task::yield_now().await;
        }
        let second = session.send("second").await;
        let in_flight = session.send_in_flight();
        gate.release();
        (second, in_flight)
    });

    assert!(in_flight, "first send was still outstanding");
    assert_eq!(first, SendOutcome::Replied);
    assert_eq!(second, SendOutcome::Replied);
    assert!(!session.send_in_flight());
    let tail: Vec<String> = session.messages()[before..]
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(
        tail,
        vec!["first", "You said: first", "second", "You said: second"]
    );
}

// ---------------------------------------------------------------------------
// results arriving after a conversation switch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_confirmed_after_switch_leaves_session_on_new_conversation() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let b = seed_exchange(&fake, "B");
    let refresh = RefreshTrigger::new();
    let session = session_for(&fake, &refresh);
    session.load(&a).await.unwrap();

    let gate = fake.hold(Operation::EndConversation, &a);
    let (ended, _) = tokio::join!(session.end(), async {
        while fake.call_count(Operation::EndConversation) == 0 {
            tokio::task::yield_now().await;
        }
        session.load(&b).await.unwrap();
        gate.release();
    });

    ended.unwrap();
    assert_eq!(session.phase(), SessionPhase::Active(b.clone()));
    assert_eq!(session.messages(), fake.snapshot(&b).unwrap().messages);
    assert_eq!(session.end_dialog(), EndDialog::Closed);
    assert_eq!(fake.call_count(Operation::GetConversation), 2);
    assert_eq!(
        fake.snapshot(&a).unwrap().status,
        ConversationStatus::Ended
    );
    assert_eq!(refresh.value(), 1);
}

#[tokio::test]
async fn test_bookmark_failure_after_switch_is_silent() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let b = seed_exchange(&fake, "B");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&a).await.unwrap();
    let target = message_id_at(&session, 1);

    let gate = fake.hold(Operation::BookmarkMessage, &a);
    fake.fail_next(Operation::BookmarkMessage, FailureKind::Remote);
    let (result, _) = tokio::join!(session.toggle_bookmark(target), async {
        while fake.call_count(Operation::BookmarkMessage) == 0 {
            tokio::task::yield_now().await;
        }
        session.load(&b).await.unwrap();
        gate.release();
    });

    assert!(result.is_err());
    assert!(session.take_notices().is_empty());
    assert_eq!(session.messages(), fake.snapshot(&b).unwrap().messages);
}

#[tokio::test]
async fn test_reaction_confirmed_after_switch_leaves_new_transcript() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let b = seed_exchange(&fake, "B");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&a).await.unwrap();
    let target = message_id_at(&session, 1);

    let gate = fake.hold(Operation::ReactToMessage, &a);
    let (result, _) = tokio::join!(session.toggle_reaction(target, ReactionKind::Heart), async {
        while fake.call_count(Operation::ReactToMessage) == 0 {
            tokio::task::yield_now().await;
        }
        session.load(&b).await.unwrap();
        gate.release();
    });

    assert_eq!(result.unwrap(), BTreeSet::from([ReactionKind::Heart]));
    assert_eq!(session.active_conversation_id(), Some(b.clone()));
    assert!(session.messages().iter().all(|m| m.reactions.is_empty()));
    assert_eq!(
        fake.snapshot(&a).unwrap().messages[1].reactions,
        BTreeSet::from([ReactionKind::Heart])
    );
}

#[tokio::test]
async fn test_branch_failure_after_switch_is_silent() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let b = seed_exchange(&fake, "B");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&a).await.unwrap();
    let parent = message_id_at(&session, 0);

    let gate = fake.hold(Operation::BranchMessage, &a);
    fake.fail_next(Operation::BranchMessage, FailureKind::Remote);
    let (result, _) = tokio::join!(session.branch(parent, "other way", None), async {
        while fake.call_count(Operation::BranchMessage) == 0 {
            tokio::task::yield_now().await;
        }
        session.load(&b).await.unwrap();
        gate.release();
    });

    assert!(result.is_err());
    assert!(session.take_notices().is_empty());
    assert_eq!(session.phase(), SessionPhase::Active(b));
}

#[tokio::test]
async fn test_branches_fetched_after_switch_are_not_cached() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let b = seed_exchange(&fake, "B");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&a).await.unwrap();
    let parent = message_id_at(&session, 0);
    session.branch(parent, "side note", None).await.unwrap();

    let gate = fake.hold(Operation::GetBranches, &a);
    let (result, _) = tokio::join!(session.branches(parent), async {
        while fake.call_count(Operation::GetBranches) == 0 {
            tokio::task::yield_now().await;
        }
        session.load(&b).await.unwrap();
        gate.release();
    });

    assert_eq!(result.unwrap().len(), 1);
    assert_eq!(session.active_conversation_id(), Some(b));
    assert!(session.with_store(|s| s.branches(parent).is_none()));
}

// ---------------------------------------------------------------------------
// end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_failure_leaves_status_active() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let refresh = RefreshTrigger::new();
    let session = session_for(&fake, &refresh);
    session.load(&id).await.unwrap();
    let before = session.messages();

    fake.fail_next(Operation::EndConversation, FailureKind::Remote);
    assert!(session.end().await.is_err());

    assert_eq!(session.phase(), SessionPhase::Active(id.clone()));
    assert_eq!(session.phase().status(), Some(ConversationStatus::Active));
    assert_eq!(session.messages(), before);
    assert_eq!(
        session.end_dialog(),
        EndDialog::Failed("Failed to end conversation. Please try again.".to_string())
    );
    assert_eq!(refresh.value(), 0);
}

#[tokio::test]
async fn test_end_success_reloads_ended_conversation_with_summary() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let refresh = RefreshTrigger::new();
    let session = session_for(&fake, &refresh);
    session.load(&id).await.unwrap();
    let before = session.messages().len();

    let response = session.end().await.unwrap();
    assert!(!response.summary.is_empty());

    assert_eq!(session.phase(), SessionPhase::Ended(id.clone()));
    let summary = session.with_store(|s| s.summary().map(str::to_string));
    assert_eq!(summary.as_deref(), Some(response.summary.as_str()));
    let messages = session.messages();
    assert_eq!(messages.len(), before + 1);
    assert!(messages[before].content.starts_with("**Conversation Summary**"));
    assert_eq!(session.end_dialog(), EndDialog::Completed);
    assert_eq!(refresh.value(), 1);

    // A fresh load agrees
    session.load(&id).await.unwrap();
    assert_eq!(session.phase().status(), Some(ConversationStatus::Ended));
}

#[tokio::test(start_paused = true)]
async fn test_end_holds_success_state_for_display_delay() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let refresh = RefreshTrigger::new();
    let mut config = recallai::Config::default();
    config.session.end_display_delay_ms = 2000;
    let session = Arc::new(recallai::SessionController::new(
        fake.clone(),
        refresh.clone(),
        &config,
    ));
    session.load(&id).await.unwrap();

    let task = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.end().await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(matches!(session.end_dialog(), EndDialog::Succeeded(_)));
    assert_eq!(refresh.value(), 0);

    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    task.await.unwrap().unwrap();
    assert_eq!(session.end_dialog(), EndDialog::Completed);
    assert_eq!(refresh.value(), 1);
}

// ---------------------------------------------------------------------------
// bookmark and reactions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bookmark_twice_restores_original_value() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&id).await.unwrap();
    let message_id = message_id_at(&session, 1);

    assert!(session.toggle_bookmark(message_id).await.unwrap());
    assert!(session.messages()[1].is_bookmarked);
    assert!(!session.toggle_bookmark(message_id).await.unwrap());
    assert!(!session.messages()[1].is_bookmarked);
    assert!(!fake.snapshot(&id).unwrap().messages[1].is_bookmarked);
}

#[tokio::test]
async fn test_bookmark_failure_leaves_message_unchanged() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&id).await.unwrap();
    let message_id = message_id_at(&session, 0);

    fake.fail_next(Operation::BookmarkMessage, FailureKind::Remote);
    assert!(session.toggle_bookmark(message_id).await.is_err());
    assert!(!session.messages()[0].is_bookmarked);
    assert_eq!(
        session.take_notices(),
        vec![Notice::error("Failed to bookmark message")]
    );
}

#[tokio::test]
async fn test_reaction_kinds_toggle_independently() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&id).await.unwrap();
    let message_id = message_id_at(&session, 1);

    session
        .toggle_reaction(message_id, ReactionKind::Heart)
        .await
        .unwrap();
    let both = session
        .toggle_reaction(message_id, ReactionKind::Thumbsup)
        .await
        .unwrap();
    assert_eq!(
        both,
        BTreeSet::from([ReactionKind::Heart, ReactionKind::Thumbsup])
    );

    let after = session
        .toggle_reaction(message_id, ReactionKind::Heart)
        .await
        .unwrap();
    assert_eq!(after, BTreeSet::from([ReactionKind::Thumbsup]));
    assert_eq!(session.messages()[1].reactions, after);
}

// ---------------------------------------------------------------------------
// load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_late_load_does_not_overwrite_newer_load() {
    let fake = Arc::new(FakeConversationService::new());
    let a = fake.seed_conversation("A", &[(Sender::User, "about A")]);
    let b = fake.seed_conversation("B", &[(Sender::User, "about B"), (Sender::Ai, "sure")]);
    let session = session_for(&fake, &RefreshTrigger::new());

    let gate = fake.hold(Operation::GetConversation, &a);
    let (first, second) = tokio::join!(session.load(&a), async {
        while fake.call_count(Operation::GetConversation) == 0 {
            tokio::task::yield_now().await;
        }
        let result = session.load(&b).await;
        gate.release();
        result
    });

    first.unwrap();
    second.unwrap();
    assert_eq!(session.active_conversation_id(), Some(b.clone()));
    let contents: Vec<String> = session.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["about B", "sure"]);
    assert_eq!(session.with_store(|s| s.title().map(str::to_string)).as_deref(), Some("B"));
}

#[tokio::test]
async fn test_late_load_failure_does_not_clear_newer_load() {
    let fake = Arc::new(FakeConversationService::new());
    let a = seed_exchange(&fake, "A");
    let b = seed_exchange(&fake, "B");
    let session = session_for(&fake, &RefreshTrigger::new());

    let gate = fake.hold(Operation::GetConversation, &a);
    let (first, _) = tokio::join!(session.load(&a), async {
        while fake.call_count(Operation::GetConversation) == 0 {
            tokio::task::yield_now().await;
        }
        session.load(&b).await.unwrap();
        // Held call applies injected failures only once released
        fake.fail_next(Operation::GetConversation, FailureKind::Remote);
        gate.release();
    });

    assert!(first.is_err());
    assert_eq!(session.phase(), SessionPhase::Active(b));
    assert_eq!(session.messages().len(), 2);
    assert!(session.take_notices().is_empty());
}

// ---------------------------------------------------------------------------
// branches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_branch_leaves_trunk_untouched() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&id).await.unwrap();
    let trunk = session.messages();
    let parent = message_id_at(&session, 1);

    let child = session
        .branch(parent, "What about the other garage?", Some("garage"))
        .await
        .unwrap();
    assert_eq!(child.parent, Some(parent));
    assert_eq!(child.branch_name.as_deref(), Some("garage"));
    assert_eq!(session.messages(), trunk);

    let group = session.branches(parent).await.unwrap();
    assert_eq!(group, vec![child.clone()]);

    session.reload().await.unwrap();
    assert_eq!(session.messages(), trunk);
    assert!(session.messages().iter().all(|m| m.id != child.id));
}

#[tokio::test]
async fn test_branch_joins_cached_group() {
    let fake = Arc::new(FakeConversationService::new());
    let id = seed_exchange(&fake, "Parking");
    let session = session_for(&fake, &RefreshTrigger::new());
    session.load(&id).await.unwrap();
    let parent = message_id_at(&session, 0);

    assert!(session.branches(parent).await.unwrap().is_empty());
    let first = session.branch(parent, "one", None).await.unwrap();
    let second = session.branch(parent, "two", None).await.unwrap();

    let cached = session.with_store(|s| s.branches(parent).map(<[_]>::to_vec));
    assert_eq!(cached, Some(vec![first, second]));
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_archive_filter_partitions_conversations() {
    let fake = Arc::new(FakeConversationService::new());
    let ids: Vec<_> = (0..5)
        .map(|i| seed_exchange(&fake, &format!("chat {}", i)))
        .collect();
    fake.set_archived(&ids[1], true);
    fake.set_archived(&ids[3], true);

    let list = ConversationListController::new(fake.clone(), RefreshTrigger::new());
    list.reload().await.unwrap();
    let active: BTreeSet<_> = list.conversations().into_iter().map(|c| c.id).collect();
    list.set_show_archived(true).await.unwrap();
    let archived: BTreeSet<_> = list.conversations().into_iter().map(|c| c.id).collect();

    assert!(active.is_disjoint(&archived));
    let all: BTreeSet<_> = active.union(&archived).cloned().collect();
    assert_eq!(all, ids.iter().cloned().collect());
    assert_eq!(archived, BTreeSet::from([ids[1].clone(), ids[3].clone()]));
}

#[tokio::test]
async fn test_session_creation_and_end_refresh_the_list() {
    let fake = Arc::new(FakeConversationService::new());
    let refresh = RefreshTrigger::new();
    let list = ConversationListController::new(fake.clone(), refresh.clone());
    let session = session_for(&fake, &refresh);

    list.reload().await.unwrap();
    assert!(list.conversations().is_empty());

    session.send("Buy milk").await;
    assert!(list.refresh_if_triggered().await.unwrap());
    assert_eq!(list.conversations().len(), 1);
    assert!(!list.refresh_if_triggered().await.unwrap());

    session.end().await.unwrap();
    assert!(list.refresh_if_triggered().await.unwrap());
    assert_eq!(list.conversations()[0].status, ConversationStatus::Ended);
}

#[tokio::test]
async fn test_delete_active_conversation_clears_session_first() {
    let fake = Arc::new(FakeConversationService::new());
    let refresh = RefreshTrigger::new();
    let id = seed_exchange(&fake, "Parking");
    let list = ConversationListController::new(fake.clone(), refresh.clone());
    let session = session_for(&fake, &refresh);
    session.load(&id).await.unwrap();

    list.delete(&id, Some(&session)).await.unwrap();

    assert_eq!(session.phase(), SessionPhase::NoConversation);
    assert!(session.messages().is_empty());
    assert_eq!(list.take_notices(), vec![Notice::success("Chat deleted")]);

    let err = session.load(&id).await.unwrap_err();
    assert_eq!(ErrorKind::classify(&err), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_auto_refresh_follows_trigger() {
    let fake = Arc::new(FakeConversationService::new());
    let refresh = RefreshTrigger::new();
    let list = Arc::new(ConversationListController::new(fake.clone(), refresh.clone()));
    list.reload().await.unwrap();
    let handle = list.spawn_auto_refresh();

    seed_exchange(&fake, "made elsewhere");
    refresh.bump();
    for _ in 0..100 {
        if !list.conversations().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(list.conversations().len(), 1);
    handle.abort();
}
