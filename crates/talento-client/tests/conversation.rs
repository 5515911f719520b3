mod common;

use serde_json::json;

use talento_client::{Composer, ConversationChannelManager, OpenOutcome};
use talento_shared::constants::{DEFAULT_MEDIA_BUCKET, RESOURCE_MESSAGES, RESOURCE_NOTIFICATIONS};
use talento_shared::service::RecordService;
use talento_shared::{Participant, Query};

use common::{settle, Harness};

fn anna() -> Participant {
    Participant::new("07aa9e", "Anna")
}

fn bruno() -> Participant {
    Participant::new("b6f1c2", "Bruno")
}

#[tokio::test]
async fn ciao_reaches_both_sides_once_and_is_read() {
    let harness = Harness::new();
    let (services_a, notifier_a) = harness.device();
    let (services_b, notifier_b) = harness.device();
    notifier_b.set_visible(false);

    let a = ConversationChannelManager::new(services_a, anna(), DEFAULT_MEDIA_BUCKET);
    let b = ConversationChannelManager::new(services_b, bruno(), DEFAULT_MEDIA_BUCKET);

    assert_eq!(a.open(bruno()).await.unwrap(), OpenOutcome::Opened);
    assert_eq!(b.open(anna()).await.unwrap(), OpenOutcome::Opened);
    assert_eq!(a.current_channel(), b.current_channel());
    assert_eq!(
        a.current_channel().unwrap().as_str(),
        "chat:07aa9e__b6f1c2"
    );

    let mut composer = Composer::text("Ciao");
    a.send(&mut composer).await.unwrap();
    assert!(composer.text.is_empty());

    settle(&b, |msgs| msgs.len() == 1 && msgs[0].read).await;
    // The receipt flows back to the sender as an update event.
    settle(&a, |msgs| msgs.len() == 1 && msgs[0].read).await;

    let seen_by_a = a.messages();
    let seen_by_b = b.messages();
    assert_eq!(seen_by_a[0].id, seen_by_b[0].id);
    assert_eq!(seen_by_b[0].content.as_deref(), Some("Ciao"));

    let stored = harness
        .backend
        .query(Query::new(RESOURCE_MESSAGES))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["read"], true);

    assert!(notifier_a.toasts().is_empty());
    assert_eq!(notifier_b.toasts()[0].text, "Nuovo messaggio da Anna: Ciao");
    assert_eq!(notifier_b.platform_notices()[0].body, "Ciao");

    let notifications = harness
        .backend
        .query(Query::new(RESOURCE_NOTIFICATIONS))
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["user_id"], "b6f1c2");
    assert_eq!(notifications[0]["link"], "07aa9e");
}

#[tokio::test]
async fn timestamp_collision_orders_by_id_on_both_sides() {
    let harness = Harness::new();
    let (services_a, _) = harness.device();
    let (services_b, _) = harness.device();

    let a = ConversationChannelManager::new(services_a, anna(), DEFAULT_MEDIA_BUCKET);
    let b = ConversationChannelManager::new(services_b, bruno(), DEFAULT_MEDIA_BUCKET);
    a.open(bruno()).await.unwrap();
    b.open(anna()).await.unwrap();

    let at = "2026-03-02T12:00:00.000000Z";
    for (id, from, to) in [("m-2", "b6f1c2", "07aa9e"), ("m-1", "07aa9e", "b6f1c2")] {
        harness
            .backend
            .insert(
                RESOURCE_MESSAGES,
                json!({
                    "id": id,
                    "sender_id": from,
                    "receiver_id": to,
                    "content": id,
                    "kind": "text",
                    "read": false,
                    "created_at": at,
                }),
            )
            .await
            .unwrap();
    }

    settle(&a, |msgs| msgs.len() == 2).await;
    settle(&b, |msgs| msgs.len() == 2).await;

    for manager in [&a, &b] {
        let ids: Vec<_> = manager
            .messages()
            .into_iter()
            .map(|m| m.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
    }
}

#[tokio::test]
async fn reopening_after_close_reloads_history() {
    let harness = Harness::new();
    let (services_a, _) = harness.device();
    let a = ConversationChannelManager::new(services_a, anna(), DEFAULT_MEDIA_BUCKET);

    a.open(bruno()).await.unwrap();
    a.send(&mut Composer::text("Primo")).await.unwrap();
    settle(&a, |msgs| msgs.len() == 1).await;

    a.close();
    assert!(a.messages().is_empty());
    assert_eq!(harness.backend.subscription_count(), 0);

    a.open(bruno()).await.unwrap();
    assert_eq!(a.messages().len(), 1);
    assert_eq!(harness.backend.subscription_count(), 1);
}

#[tokio::test]
async fn messages_of_other_pairs_are_ignored() {
    let harness = Harness::new();
    let (services_a, notifier_a) = harness.device();
    let a = ConversationChannelManager::new(services_a, anna(), DEFAULT_MEDIA_BUCKET);
    a.open(bruno()).await.unwrap();

    harness
        .backend
        .insert(
            RESOURCE_MESSAGES,
            json!({ "sender_id": "c0ffee", "receiver_id": "07aa9e", "content": "Ehi", "read": false }),
        )
        .await
        .unwrap();
    a.send(&mut Composer::text("Ciao")).await.unwrap();

    settle(&a, |msgs| !msgs.is_empty()).await;
    let messages = a.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content.as_deref(), Some("Ciao"));
    assert!(notifier_a.toasts().is_empty());
}
