use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::mail::SelectInfo;
use crate::types::{now_ts, Account, FolderDescriptor, FolderState, FolderType};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    pub async fn connect(db_path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&url).await?;

        let db = Database {
            pool,
            path: db_path.to_path_buf(),
        };
        db.migrate().await?;
        debug!(path = %db.path.display(), "SQLite store ready");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                imap_host TEXT NOT NULL,
                imap_port INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                path TEXT,
                folder_type TEXT NOT NULL DEFAULT 'custom',
                flags TEXT,
                delimiter TEXT,
                uid_next INTEGER,
                uid_validity INTEGER,
                messages_total INTEGER,
                messages_recent INTEGER,
                messages_unseen INTEGER,
                last_sync_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(account_id, name),
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_folders_account ON folders(account_id);

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                folder_id INTEGER NOT NULL,
                uid INTEGER NOT NULL,
                uid_validity INTEGER NOT NULL DEFAULT 0,
                external_message_id TEXT,
                thread_id TEXT,
                subject TEXT,
                from_email TEXT,
                from_name TEXT,
                snippet TEXT,
                body_text TEXT,
                body_html TEXT,
                reply_to TEXT,
                in_reply_to TEXT,
                reference_ids TEXT,
                sent_at INTEGER,
                received_at INTEGER,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_flagged INTEGER NOT NULL DEFAULT 0,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                UNIQUE(account_id, folder_id, uid, uid_validity),
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_messages_account_folder
                ON messages(account_id, folder_id);
            CREATE INDEX IF NOT EXISTS idx_messages_sent_at
                ON messages(account_id, sent_at DESC);

            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS message_contacts (
                message_id INTEGER NOT NULL,
                contact_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                UNIQUE(message_id, contact_id, role),
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
                FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS headers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT,
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_headers_message ON headers(message_id);

            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                mime_type TEXT,
                size INTEGER,
                path TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_attachments_message ON attachments(message_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_account(
        &self,
        email: &str,
        password: &str,
        imap_host: &str,
        imap_port: u16,
    ) -> Result<Account, sqlx::Error> {
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO accounts (email, password, imap_host, imap_port, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(email) DO UPDATE SET
                password = excluded.password,
                imap_host = excluded.imap_host,
                imap_port = excluded.imap_port,
                updated_at = excluded.updated_at;
            "#,
        )
        .bind(email)
        .bind(password)
        .bind(imap_host)
        .bind(imap_port as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, email, password, imap_host, imap_port, created_at, updated_at \
             FROM accounts WHERE email = ?1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(account_from_row(&row))
    }

    pub async fn get_account(&self, account_id: i64) -> Result<Option<Account>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, email, password, imap_host, imap_port, created_at, updated_at \
             FROM accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| account_from_row(&r)))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, email, password, imap_host, imap_port, created_at, updated_at \
             FROM accounts ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(account_from_row).collect())
    }

    /// Insert-or-reuse a folder row by (account_id, name). A bare insert here
    /// leaves the descriptive and cached fields for the catalog and the sync
    /// engine to fill in.
    pub async fn get_or_create_folder(
        &self,
        account_id: i64,
        name: &str,
    ) -> Result<FolderState, sqlx::Error> {
        if let Some(folder) = self.get_folder(account_id, name).await? {
            return Ok(folder);
        }

        let now = now_ts();
        sqlx::query(
            "INSERT INTO folders (account_id, name, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(account_id, name) DO NOTHING",
        )
        .bind(account_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        match self.get_folder(account_id, name).await? {
            Some(folder) => Ok(folder),
            None => Err(sqlx::Error::RowNotFound),
        }
    }

    /// Catalog upsert: refreshes the descriptive fields only, never the
    /// cached sync state (uid_next etc.). Rows are keyed by the full
    /// selectable path so nested folders with duplicate leaf names cannot
    /// collide.
    pub async fn upsert_folder_descriptor(
        &self,
        account_id: i64,
        descriptor: &FolderDescriptor,
    ) -> Result<i64, sqlx::Error> {
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO folders (account_id, name, path, folder_type, flags, delimiter, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(account_id, name) DO UPDATE SET
                path = excluded.path,
                folder_type = excluded.folder_type,
                flags = excluded.flags,
                delimiter = excluded.delimiter,
                updated_at = excluded.updated_at;
            "#,
        )
        .bind(account_id)
        .bind(&descriptor.path)
        .bind(&descriptor.path)
        .bind(descriptor.folder_type.as_str())
        .bind(descriptor.flags.join(","))
        .bind(&descriptor.delimiter)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id FROM folders WHERE account_id = ?1 AND name = ?2")
            .bind(account_id)
            .bind(&descriptor.path)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// Engine refresh after a successful SELECT: touches only the cached
    /// remote state plus `last_sync_at`.
    pub async fn update_folder_remote_state(
        &self,
        folder_id: i64,
        info: &SelectInfo,
    ) -> Result<(), sqlx::Error> {
        let now = now_ts();
        sqlx::query(
            r#"
            UPDATE folders SET
                uid_next = ?1,
                uid_validity = ?2,
                messages_total = ?3,
                messages_recent = ?4,
                messages_unseen = ?5,
                last_sync_at = ?6,
                updated_at = ?7
            WHERE id = ?8
            "#,
        )
        .bind(info.uid_next.map(|v| v as i64))
        .bind(info.uid_validity.map(|v| v as i64))
        .bind(info.messages_total as i64)
        .bind(info.messages_recent as i64)
        .bind(info.messages_unseen as i64)
        .bind(now)
        .bind(now)
        .bind(folder_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_folder(
        &self,
        account_id: i64,
        name: &str,
    ) -> Result<Option<FolderState>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, account_id, name, path, folder_type, uid_next, uid_validity, \
                    messages_total, messages_recent, messages_unseen, last_sync_at \
             FROM folders WHERE account_id = ?1 AND name = ?2",
        )
        .bind(account_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| folder_from_row(&r)))
    }

    pub async fn list_folders(&self, account_id: i64) -> Result<Vec<FolderState>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, name, path, folder_type, uid_next, uid_validity,
                   messages_total, messages_recent, messages_unseen, last_sync_at
            FROM folders
            WHERE account_id = ?1
            ORDER BY
                CASE folder_type
                    WHEN 'inbox' THEN 1
                    WHEN 'sent' THEN 2
                    WHEN 'drafts' THEN 3
                    WHEN 'spam' THEN 4
                    WHEN 'trash' THEN 5
                    ELSE 6
                END, name;
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(folder_from_row).collect())
    }

    /// Idempotency index: the full UID set already persisted for a folder,
    /// loaded once per pass and diffed in memory.
    pub async fn existing_uids(
        &self,
        account_id: i64,
        folder_id: i64,
    ) -> Result<HashSet<u32>, sqlx::Error> {
        let rows = sqlx::query("SELECT uid FROM messages WHERE account_id = ?1 AND folder_id = ?2")
            .bind(account_id)
            .bind(folder_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>(0) as u32)
            .collect())
    }

    pub async fn find_message_id_by_uid(
        &self,
        account_id: i64,
        folder_id: i64,
        uid: u32,
    ) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id FROM messages WHERE account_id = ?1 AND folder_id = ?2 AND uid = ?3",
        )
        .bind(account_id)
        .bind(folder_id)
        .bind(uid as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get(0)))
    }

    /// (uid, local id) pairs in local insertion order.
    pub async fn message_ids_in_order(
        &self,
        account_id: i64,
        folder_id: i64,
    ) -> Result<Vec<(u32, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT uid, id FROM messages WHERE account_id = ?1 AND folder_id = ?2 ORDER BY id ASC",
        )
        .bind(account_id)
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<i64, _>(0) as u32, row.get::<i64, _>(1)))
            .collect())
    }
}

fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> Account {
    Account {
        id: row.get(0),
        email: row.get(1),
        password: row.get(2),
        imap_host: row.get(3),
        imap_port: row.get::<i64, _>(4) as u16,
        created_at: row.get(5),
        updated_at: row.get(6),
    }
}

fn folder_from_row(row: &sqlx::sqlite::SqliteRow) -> FolderState {
    FolderState {
        id: row.get(0),
        account_id: row.get(1),
        name: row.get(2),
        path: row.get(3),
        folder_type: FolderType::parse(&row.get::<String, _>(4)),
        uid_next: row.get::<Option<i64>, _>(5).map(|v| v as u32),
        uid_validity: row.get::<Option<i64>, _>(6).map(|v| v as u32),
        messages_total: row.get::<Option<i64>, _>(7).map(|v| v as u32),
        messages_recent: row.get::<Option<i64>, _>(8).map(|v| v as u32),
        messages_unseen: row.get::<Option<i64>, _>(9).map(|v| v as u32),
        last_sync_at: row.get(10),
    }
}
