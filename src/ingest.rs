//! Transactional persistence of one parsed message and its dependents.
//!
//! The message row goes in first; its rowid becomes the local identifier.
//! Dependent writes (contacts, headers, attachments) tolerate individual
//! failures: partial metadata beats losing the message. Only a failed
//! message insert rolls the unit back.

use sqlx::{Row, Sqlite, SqliteConnection, Transaction};
use tracing::{debug, warn};

use crate::errors::SyncError;
use crate::storage::Database;
use crate::types::{now_ts, ParsedEmail};

pub struct MessageIngester {
    db: Database,
}

impl MessageIngester {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Writes the message and all surviving dependents as one committed
    /// unit and returns the locally assigned message id.
    pub async fn ingest(
        &self,
        parsed: &ParsedEmail,
        account_id: i64,
        folder_id: i64,
        uid: u32,
        uid_validity: Option<u32>,
    ) -> Result<i64, SyncError> {
        let mut tx: Transaction<'_, Sqlite> = self.db.pool().begin().await?;

        // Uniqueness violations surface here and roll back the whole unit.
        let message_id = insert_message(&mut tx, parsed, account_id, folder_id, uid, uid_validity)
            .await?;

        for contact in &parsed.contacts {
            if contact.email.trim().is_empty() {
                warn!(uid, role = contact.role.as_str(), "Contact without address, skipping");
                continue;
            }
            match get_or_create_contact(&mut tx, &contact.email, &contact.name).await {
                Ok(contact_id) => {
                    if let Err(e) = sqlx::query(
                        "INSERT OR IGNORE INTO message_contacts (message_id, contact_id, role) \
                         VALUES (?1, ?2, ?3)",
                    )
                    .bind(message_id)
                    .bind(contact_id)
                    .bind(contact.role.as_str())
                    .execute(tx.as_mut())
                    .await
                    {
                        warn!(uid, email = %contact.email, error = %e, "Contact link failed, skipping");
                    }
                }
                Err(e) => {
                    warn!(uid, email = %contact.email, error = %e, "Contact upsert failed, skipping");
                }
            }
        }

        for header in &parsed.headers {
            if header.name.trim().is_empty() {
                warn!(uid, "Header with empty name, skipping");
                continue;
            }
            if let Err(e) = sqlx::query(
                "INSERT INTO headers (message_id, name, value) VALUES (?1, ?2, ?3)",
            )
            .bind(message_id)
            .bind(&header.name)
            .bind(&header.value)
            .execute(tx.as_mut())
            .await
            {
                warn!(uid, header = %header.name, error = %e, "Header insert failed, skipping");
            }
        }

        for attachment in &parsed.attachments {
            if let Err(e) = sqlx::query(
                "INSERT INTO attachments (message_id, filename, mime_type, size, path, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(message_id)
            .bind(&attachment.filename)
            .bind(&attachment.mime_type)
            .bind(attachment.size as i64)
            .bind(&attachment.path)
            .bind(now_ts())
            .execute(tx.as_mut())
            .await
            {
                warn!(uid, filename = %attachment.filename, error = %e, "Attachment insert failed, skipping");
            }
        }

        tx.commit().await?;
        debug!(uid, message_id, "Message ingested");
        Ok(message_id)
    }
}

async fn insert_message(
    tx: &mut Transaction<'_, Sqlite>,
    parsed: &ParsedEmail,
    account_id: i64,
    folder_id: i64,
    uid: u32,
    uid_validity: Option<u32>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO messages (
            account_id, folder_id, uid, uid_validity, external_message_id, thread_id,
            subject, from_email, from_name, snippet, body_text, body_html,
            reply_to, in_reply_to, reference_ids, sent_at, received_at,
            is_read, is_flagged, has_attachments, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 0, 0, ?18, ?19)
        "#,
    )
    .bind(account_id)
    .bind(folder_id)
    .bind(uid as i64)
    .bind(uid_validity.unwrap_or(0) as i64)
    .bind(&parsed.external_message_id)
    .bind(&parsed.thread_id)
    .bind(&parsed.subject)
    .bind(&parsed.from_email)
    .bind(&parsed.from_name)
    .bind(&parsed.snippet)
    .bind(&parsed.body_text)
    .bind(&parsed.body_html)
    .bind(&parsed.reply_to)
    .bind(&parsed.in_reply_to)
    .bind(&parsed.reference_ids)
    .bind(parsed.sent_at)
    .bind(parsed.received_at)
    .bind(parsed.has_attachments as i64)
    .bind(now_ts())
    .execute(tx.as_mut())
    .await?;

    Ok(result.last_insert_rowid())
}

/// Contacts are deduplicated account-wide by address. Reuse refreshes the
/// last-seen timestamp and backfills a missing display name.
async fn get_or_create_contact(
    tx: &mut Transaction<'_, Sqlite>,
    email: &str,
    name: &str,
) -> Result<i64, sqlx::Error> {
    let conn: &mut SqliteConnection = tx.as_mut();

    let existing = sqlx::query("SELECT id FROM contacts WHERE email = ?1")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(row) = existing {
        let contact_id: i64 = row.get(0);
        sqlx::query(
            "UPDATE contacts SET last_seen_at = ?1, \
             name = CASE WHEN name IS NULL OR name = '' THEN ?2 ELSE name END \
             WHERE id = ?3",
        )
        .bind(now_ts())
        .bind(name)
        .bind(contact_id)
        .execute(&mut *conn)
        .await?;
        return Ok(contact_id);
    }

    let now = now_ts();
    let result = sqlx::query(
        "INSERT INTO contacts (email, name, created_at, last_seen_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(email)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}
