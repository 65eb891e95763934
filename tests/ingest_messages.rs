mod common;

use common::{harness, Harness, MockServer};
use mailsink::errors::SyncError;
use mailsink::ingest::MessageIngester;
use mailsink::types::{
    ContactRole, ParsedAttachment, ParsedContact, ParsedEmail, ParsedHeader,
};
use sqlx::Row;

fn sample_email(subject: &str) -> ParsedEmail {
    ParsedEmail {
        external_message_id: format!("<{subject}@example.com>"),
        thread_id: Some(format!("<{subject}@example.com>")),
        subject: subject.to_string(),
        from_email: "alice@example.com".to_string(),
        from_name: "Alice Kim".to_string(),
        snippet: "hello".to_string(),
        body_text: "hello".to_string(),
        sent_at: 1_767_000_000,
        received_at: 1_767_000_100,
        contacts: vec![
            ParsedContact {
                role: ContactRole::From,
                email: "alice@example.com".to_string(),
                name: "Alice Kim".to_string(),
            },
            ParsedContact {
                role: ContactRole::To,
                email: "bob@example.com".to_string(),
                name: String::new(),
            },
        ],
        headers: vec![
            ParsedHeader {
                name: "Subject".to_string(),
                value: subject.to_string(),
            },
            ParsedHeader {
                name: "X-Mailer".to_string(),
                value: "test".to_string(),
            },
        ],
        ..ParsedEmail::default()
    }
}

async fn count(h: &Harness, sql: &str, message_id: i64) -> i64 {
    sqlx::query(sql)
        .bind(message_id)
        .fetch_one(h.db.pool())
        .await
        .expect("count query")
        .get(0)
}

#[tokio::test]
async fn one_commit_persists_message_and_all_dependents() {
    let h = harness(MockServer::default()).await;
    let folder = h.db.get_or_create_folder(h.account.id, "INBOX").await.unwrap();
    let ingester = MessageIngester::new(h.db.clone());

    let mut email = sample_email("hello");
    email.attachments.push(ParsedAttachment {
        filename: "report.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        size: 1234,
        path: Some("/tmp/report.pdf".to_string()),
    });
    email.has_attachments = true;

    let message_id = ingester
        .ingest(&email, h.account.id, folder.id, 42, Some(7))
        .await
        .unwrap();
    assert!(message_id > 0);

    let row = sqlx::query("SELECT subject, uid, uid_validity, has_attachments FROM messages WHERE id = ?1")
        .bind(message_id)
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>(0), "hello");
    assert_eq!(row.get::<i64, _>(1), 42);
    assert_eq!(row.get::<i64, _>(2), 7);
    assert_eq!(row.get::<i64, _>(3), 1);

    assert_eq!(
        count(&h, "SELECT COUNT(*) FROM message_contacts WHERE message_id = ?1", message_id).await,
        2
    );
    assert_eq!(
        count(&h, "SELECT COUNT(*) FROM headers WHERE message_id = ?1", message_id).await,
        2
    );
    assert_eq!(
        count(&h, "SELECT COUNT(*) FROM attachments WHERE message_id = ?1", message_id).await,
        1
    );
}

#[tokio::test]
async fn faulty_dependents_are_dropped_without_losing_the_message() {
    let h = harness(MockServer::default()).await;
    let folder = h.db.get_or_create_folder(h.account.id, "INBOX").await.unwrap();
    let ingester = MessageIngester::new(h.db.clone());

    let mut email = sample_email("partial");
    // An addressless contact and a nameless header are both unstorable.
    email.contacts.push(ParsedContact {
        role: ContactRole::Cc,
        email: "   ".to_string(),
        name: "Ghost".to_string(),
    });
    email.headers.push(ParsedHeader {
        name: String::new(),
        value: "orphan value".to_string(),
    });
    email.headers.push(ParsedHeader {
        name: "X-Last".to_string(),
        value: "kept".to_string(),
    });

    let message_id = ingester
        .ingest(&email, h.account.id, folder.id, 1, Some(7))
        .await
        .unwrap();

    assert_eq!(
        count(&h, "SELECT COUNT(*) FROM message_contacts WHERE message_id = ?1", message_id).await,
        2
    );
    assert_eq!(
        count(&h, "SELECT COUNT(*) FROM headers WHERE message_id = ?1", message_id).await,
        3
    );
}

#[tokio::test]
async fn contacts_are_deduplicated_and_names_backfilled() {
    let h = harness(MockServer::default()).await;
    let folder = h.db.get_or_create_folder(h.account.id, "INBOX").await.unwrap();
    let ingester = MessageIngester::new(h.db.clone());

    // First sighting has no display name.
    let mut first = sample_email("first");
    first.contacts = vec![ParsedContact {
        role: ContactRole::From,
        email: "carol@example.com".to_string(),
        name: String::new(),
    }];
    ingester
        .ingest(&first, h.account.id, folder.id, 1, Some(7))
        .await
        .unwrap();

    let mut second = sample_email("second");
    second.contacts = vec![ParsedContact {
        role: ContactRole::From,
        email: "carol@example.com".to_string(),
        name: "Carol Park".to_string(),
    }];
    ingester
        .ingest(&second, h.account.id, folder.id, 2, Some(7))
        .await
        .unwrap();

    let rows = sqlx::query("SELECT name FROM contacts WHERE email = 'carol@example.com'")
        .fetch_all(h.db.pool())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String, _>(0), "Carol Park");

    // A later sighting without a name must not blank it again.
    let mut third = sample_email("third");
    third.contacts = vec![ParsedContact {
        role: ContactRole::From,
        email: "carol@example.com".to_string(),
        name: String::new(),
    }];
    ingester
        .ingest(&third, h.account.id, folder.id, 3, Some(7))
        .await
        .unwrap();

    let row = sqlx::query("SELECT name FROM contacts WHERE email = 'carol@example.com'")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>(0), "Carol Park");
}

#[tokio::test]
async fn duplicate_uid_in_same_validity_rolls_back() {
    let h = harness(MockServer::default()).await;
    let folder = h.db.get_or_create_folder(h.account.id, "INBOX").await.unwrap();
    let ingester = MessageIngester::new(h.db.clone());

    ingester
        .ingest(&sample_email("original"), h.account.id, folder.id, 9, Some(7))
        .await
        .unwrap();

    let err = ingester
        .ingest(&sample_email("duplicate"), h.account.id, folder.id, 9, Some(7))
        .await;
    assert!(matches!(err, Err(SyncError::Storage(_))));

    let row = sqlx::query("SELECT COUNT(*), MIN(subject) FROM messages WHERE uid = 9")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>(0), 1);
    assert_eq!(row.get::<String, _>(1), "original");
}

#[tokio::test]
async fn same_uid_under_a_new_validity_is_a_new_message() {
    let h = harness(MockServer::default()).await;
    let folder = h.db.get_or_create_folder(h.account.id, "INBOX").await.unwrap();
    let ingester = MessageIngester::new(h.db.clone());

    ingester
        .ingest(&sample_email("old-gen"), h.account.id, folder.id, 9, Some(7))
        .await
        .unwrap();
    ingester
        .ingest(&sample_email("new-gen"), h.account.id, folder.id, 9, Some(8))
        .await
        .unwrap();

    let row = sqlx::query("SELECT COUNT(*) FROM messages WHERE uid = 9")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>(0), 2);
}

#[tokio::test]
async fn missing_validity_is_stored_as_zero() {
    let h = harness(MockServer::default()).await;
    let folder = h.db.get_or_create_folder(h.account.id, "INBOX").await.unwrap();
    let ingester = MessageIngester::new(h.db.clone());

    ingester
        .ingest(&sample_email("no-validity"), h.account.id, folder.id, 5, None)
        .await
        .unwrap();

    // None and an explicit zero land on the same uniqueness tuple.
    let err = ingester
        .ingest(&sample_email("zero-validity"), h.account.id, folder.id, 5, Some(0))
        .await;
    assert!(err.is_err());
}
