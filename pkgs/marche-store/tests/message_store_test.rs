// Tests for MessageStore: ordering, read tracking, membership and the media
// upload saga

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use marche_store::entities::messages;
use marche_store::{
    Attachment, Clock, ConversationStore, Error, ManualClock, MediaError, MediaStore,
    MessageStore, MessageType, NewMessage, Party, UserDirectory, UserId, UserStore, UserSummary,
};
use parking_lot::Mutex;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Directory that answers membership checks but cannot load profiles
struct ProfilesUnavailable(UserStore);

#[async_trait]
impl UserDirectory for ProfilesUnavailable {
    async fn exists(&self, id: UserId) -> marche_store::Result<bool> {
        self.0.exists(id).await
    }

    async fn get(&self, _id: UserId) -> marche_store::Result<Option<UserSummary>> {
        Err(Error::Database(DbErr::Custom("profile lookup failed".into())))
    }

    async fn get_many(&self, _ids: &[UserId]) -> marche_store::Result<HashMap<UserId, UserSummary>> {
        Err(Error::Database(DbErr::Custom("profile lookup failed".into())))
    }
}

/// Media store double that records calls and can be told to misbehave
#[derive(Default)]
struct RecordingMediaStore {
    stored: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_uploads: bool,
    upload_delay: Option<std::time::Duration>,
}

#[async_trait]
impl MediaStore for RecordingMediaStore {
    async fn store(
        &self,
        folder: &str,
        file_name: &str,
        _content: &[u8],
    ) -> Result<String, MediaError> {
        if self.fail_uploads {
            return Err(MediaError::Backend("bucket unavailable".into()));
        }
        // Written before a slow finish, like a stalled multipart upload
        let path = format!("{}/{}", folder, file_name);
        self.stored.lock().push(path.clone());
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(path)
    }

    async fn delete(&self, path: &str) -> Result<(), MediaError> {
        self.deleted.lock().push(path.to_string());
        Ok(())
    }
}

struct Fixture {
    db: DatabaseConnection,
    clock: Arc<ManualClock>,
    conversations: ConversationStore,
    store: MessageStore,
    media: Arc<RecordingMediaStore>,
    alice: UserSummary,
    bob: UserSummary,
    carol: UserSummary,
}

async fn setup(path: &NamedTempFile, media: RecordingMediaStore) -> Fixture {
    setup_with_timeout(path, media, std::time::Duration::from_secs(5)).await
}

async fn setup_with_timeout(
    path: &NamedTempFile,
    media: RecordingMediaStore,
    upload_timeout: std::time::Duration,
) -> Fixture {
    let db = marche_store::connect(path.path())
        .await
        .expect("Failed to open database");
    let users = UserStore::new(db.clone());
    let directory: Arc<dyn UserDirectory> = Arc::new(users.clone());
    // Whole milliseconds, as stored
    let start = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let media = Arc::new(media);
    let conversations = ConversationStore::new(db.clone(), directory.clone(), clock.clone());
    let store = MessageStore::new(
        db.clone(),
        conversations.clone(),
        directory,
        media.clone(),
        clock.clone(),
        upload_timeout,
    );

    let alice = users.create("Alice").await.unwrap();
    let bob = users.create("Bob").await.unwrap();
    let carol = users.create("Carol").await.unwrap();

    Fixture {
        db,
        clock,
        conversations,
        store,
        media,
        alice,
        bob,
        carol,
    }
}

async fn open_pair(f: &Fixture) -> i64 {
    let (conv, _) = f
        .conversations
        .start_or_get(Party::Known(f.alice.id), Some(f.bob.id))
        .await
        .unwrap();
    conv.id
}

async fn message_count(db: &DatabaseConnection) -> u64 {
    messages::Entity::find().count(db).await.unwrap()
}

fn png() -> Attachment {
    Attachment::new(&b"\x89PNG\r\n\x1a\n"[..]).with_file_name("Salle de bain.png")
}

#[tokio::test]
async fn test_messages_are_listed_in_creation_order() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let alice = Party::Known(f.alice.id);
    let bob = Party::Known(f.bob.id);

    // Same timestamp: insertion order breaks the tie
    let m1 = f.store.append(conv, alice, NewMessage::text("Bonjour")).await.unwrap();
    let m2 = f.store.append(conv, bob, NewMessage::text("Bonjour !")).await.unwrap();
    f.clock.advance(Duration::seconds(3));
    let m3 = f
        .store
        .append(conv, alice, NewMessage::text("Quand passez-vous ?"))
        .await
        .unwrap();

    let listed = f.store.list_for_conversation(conv, bob).await.unwrap();
    let ids: Vec<i64> = listed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![m1.id, m2.id, m3.id]);

    assert_eq!(listed[0].sender.as_ref().map(|s| s.name.as_str()), Some("Alice"));
    assert_eq!(listed[1].sender.as_ref().map(|s| s.name.as_str()), Some("Bob"));
    assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn test_append_bumps_conversation_activity() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;
    let before = f.conversations.get(conv).await.unwrap().updated_at;

    f.clock.advance(Duration::minutes(10));
    let msg = f
        .store
        .append(conv, Party::Known(f.alice.id), NewMessage::text("Devis envoyé"))
        .await
        .unwrap();

    let after = f.conversations.get(conv).await.unwrap().updated_at;
    assert!(after > before);
    assert_eq!(after, msg.created_at);
    assert_eq!(msg.created_at, f.clock.now());
}

#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let alice = Party::Known(f.alice.id);
    let bob = Party::Known(f.bob.id);

    f.store.append(conv, alice, NewMessage::text("Un")).await.unwrap();
    f.store.append(conv, alice, NewMessage::text("Deux")).await.unwrap();

    // The sender's own messages never count
    assert_eq!(f.store.mark_read(conv, alice).await.unwrap(), 0);

    assert_eq!(f.store.mark_read(conv, bob).await.unwrap(), 2);
    assert_eq!(f.store.mark_read(conv, bob).await.unwrap(), 0);

    let listed = f.store.list_for_conversation(conv, bob).await.unwrap();
    assert!(listed.iter().all(|m| m.is_read()));

    f.store.append(conv, bob, NewMessage::text("Trois")).await.unwrap();
    assert_eq!(f.store.mark_read(conv, alice).await.unwrap(), 1);
}

#[tokio::test]
async fn test_read_at_is_set_once() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    f.store
        .append(conv, Party::Known(f.alice.id), NewMessage::text("Salut"))
        .await
        .unwrap();
    f.store.mark_read(conv, Party::Known(f.bob.id)).await.unwrap();
    let first = f.store.list_for_conversation(conv, Party::Known(f.bob.id)).await.unwrap()[0].read_at;

    f.clock.advance(Duration::hours(1));
    f.store.mark_read(conv, Party::Known(f.bob.id)).await.unwrap();
    let second = f.store.list_for_conversation(conv, Party::Known(f.bob.id)).await.unwrap()[0].read_at;

    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_non_members_are_forbidden() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let carol = Party::Known(f.carol.id);
    let err = f.store.append(conv, carol, NewMessage::text("Hello")).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { conversation_id } if conversation_id == conv));

    let err = f.store.list_for_conversation(conv, carol).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));

    let err = f.store.mark_read(conv, carol).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));

    // The anonymous side does not exist on an authenticated pair
    let err = f
        .store
        .append(conv, Party::Anonymous, NewMessage::text("Hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));

    let err = f
        .store
        .append(conv + 100, Party::Known(f.alice.id), NewMessage::text("Hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    assert_eq!(message_count(&f.db).await, 0);
}

#[tokio::test]
async fn test_media_without_text_gets_placeholder() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let msg = f
        .store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Image, png()),
        )
        .await
        .unwrap();

    assert_eq!(msg.content, "Image");
    assert_eq!(msg.message_type, MessageType::Image);
    let path = msg.file_path.clone().expect("file path");
    assert!(path.starts_with("messages/images/salle-de-bain-"), "{}", path);
    assert!(path.ends_with(".png"), "{}", path);
    assert_eq!(f.media.stored.lock().as_slice(), &[path]);

    let with_caption = f
        .store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Image, png()).with_content("Avant travaux"),
        )
        .await
        .unwrap();
    assert_eq!(with_caption.content, "Avant travaux");
}

#[tokio::test]
async fn test_location_is_stored() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let msg = f
        .store
        .append(
            conv,
            Party::Known(f.bob.id),
            NewMessage::text("Je suis devant").with_location(45.764, 4.8357),
        )
        .await
        .unwrap();

    assert_eq!(msg.latitude, Some(45.764));
    assert_eq!(msg.longitude, Some(4.8357));
}

#[tokio::test]
async fn test_oversized_attachment_is_rejected_before_upload() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let big = Attachment::new(vec![0u8; 10 * 1024 * 1024 + 1]).with_file_name("plan.pdf");
    let err = f
        .store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Document, big),
        )
        .await
        .unwrap_err();

    match err {
        Error::PayloadTooLarge {
            message_type,
            max_bytes,
            ..
        } => {
            assert_eq!(message_type, MessageType::Document);
            assert_eq!(max_bytes, 10 * 1024 * 1024);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(f.media.stored.lock().is_empty());
    assert_eq!(message_count(&f.db).await, 0);
}

#[tokio::test]
async fn test_media_type_requires_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let payload = NewMessage {
        message_type: MessageType::Video,
        content: Some("Regardez".into()),
        attachment: None,
        latitude: None,
        longitude: None,
    };
    let err = f
        .store
        .append(conv, Party::Known(f.alice.id), payload)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref message, .. } if message == "file required for this type"));
}

#[tokio::test]
async fn test_upload_failure_leaves_no_row() {
    let temp_file = NamedTempFile::new().unwrap();
    let media = RecordingMediaStore {
        fail_uploads: true,
        ..Default::default()
    };
    let f = setup(&temp_file, media).await;
    let conv = open_pair(&f).await;

    let err = f
        .store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Image, png()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MediaUpload(MediaError::Backend(_))));
    assert!(err.is_internal());
    assert_eq!(message_count(&f.db).await, 0);
}

#[tokio::test]
async fn test_upload_timeout_leaves_no_row() {
    let temp_file = NamedTempFile::new().unwrap();
    let media = RecordingMediaStore {
        upload_delay: Some(std::time::Duration::from_secs(2)),
        ..Default::default()
    };
    let f = setup_with_timeout(&temp_file, media, std::time::Duration::from_millis(50)).await;
    let conv = open_pair(&f).await;

    let err = f
        .store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Image, png()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MediaUpload(MediaError::Timeout(_))));
    assert_eq!(message_count(&f.db).await, 0);
}

#[tokio::test]
async fn test_timed_out_upload_is_deleted() {
    let temp_file = NamedTempFile::new().unwrap();
    let media = RecordingMediaStore {
        upload_delay: Some(std::time::Duration::from_secs(2)),
        ..Default::default()
    };
    let f = setup_with_timeout(&temp_file, media, std::time::Duration::from_millis(50)).await;
    let conv = open_pair(&f).await;

    let err = f
        .store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Image, png()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MediaUpload(MediaError::Timeout(_))));
    let stored = f.media.stored.lock().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(f.media.deleted.lock().as_slice(), stored.as_slice());
}

#[tokio::test]
async fn test_sender_lookup_failure_leaves_no_row() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    let store = MessageStore::new(
        f.db.clone(),
        f.conversations.clone(),
        Arc::new(ProfilesUnavailable(UserStore::new(f.db.clone()))),
        f.media.clone(),
        f.clock.clone(),
        std::time::Duration::from_secs(5),
    );

    let err = store
        .append(conv, Party::Known(f.alice.id), NewMessage::text("Bonjour"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    let err = store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Image, png()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    assert_eq!(message_count(&f.db).await, 0);
    assert!(f.media.stored.lock().is_empty());
    let updated_at = f.conversations.get(conv).await.unwrap().updated_at;
    assert_eq!(updated_at, f.clock.now());
}

#[tokio::test]
async fn test_failed_insert_deletes_uploaded_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let conv = open_pair(&f).await;

    f.db.execute_unprepared("DROP TABLE messages").await.unwrap();

    let err = f
        .store
        .append(
            conv,
            Party::Known(f.alice.id),
            NewMessage::media(MessageType::Image, png()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Database(_)));
    let stored = f.media.stored.lock().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(f.media.deleted.lock().as_slice(), stored.as_slice());
}

#[tokio::test]
async fn test_unread_counts_per_conversation() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let with_bob = open_pair(&f).await;
    let (with_carol, _) = f
        .conversations
        .start_or_get(Party::Known(f.carol.id), Some(f.alice.id))
        .await
        .unwrap();
    let (quiet, _) = f
        .conversations
        .start_or_get(Party::Anonymous, Some(f.alice.id))
        .await
        .unwrap();

    let alice = Party::Known(f.alice.id);
    f.store.append(with_bob, Party::Known(f.bob.id), NewMessage::text("1")).await.unwrap();
    f.store.append(with_bob, Party::Known(f.bob.id), NewMessage::text("2")).await.unwrap();
    f.store.append(with_bob, alice, NewMessage::text("mine")).await.unwrap();
    f.store
        .append(with_carol.id, Party::Known(f.carol.id), NewMessage::text("3"))
        .await
        .unwrap();

    let counts = f
        .store
        .unread_counts(f.alice.id, &[with_bob, with_carol.id, quiet.id])
        .await
        .unwrap();
    assert_eq!(counts.get(&with_bob), Some(&2));
    assert_eq!(counts.get(&with_carol.id), Some(&1));
    assert_eq!(counts.get(&quiet.id), None);

    f.store.mark_read(with_bob, alice).await.unwrap();
    let counts = f.store.unread_counts(f.alice.id, &[with_bob]).await.unwrap();
    assert!(counts.is_empty());
}

#[tokio::test]
async fn test_anonymous_messages_have_no_sender() {
    let temp_file = NamedTempFile::new().unwrap();
    let f = setup(&temp_file, RecordingMediaStore::default()).await;
    let (conv, _) = f
        .conversations
        .start_or_get(Party::Anonymous, Some(f.bob.id))
        .await
        .unwrap();

    let msg = f
        .store
        .append(conv.id, Party::Anonymous, NewMessage::text("Vous êtes disponible ?"))
        .await
        .unwrap();
    assert_eq!(msg.sender_id, None);
    assert!(msg.sender.is_none());

    // Provider reads it, the anonymous side has nothing to read yet
    assert_eq!(f.store.mark_read(conv.id, Party::Anonymous).await.unwrap(), 0);
    assert_eq!(f.store.mark_read(conv.id, Party::Known(f.bob.id)).await.unwrap(), 1);
}
