//! Incremental IMAP mailbox synchronization into a SQLite relational store.
//!
//! One `sync_folder` pass acquires the per-(account, folder) lock, diffs the
//! remote UID set against what is already stored, fetches only the recent
//! undiscovered subset, and ingests each message transactionally. Downstream
//! indexing is notified once per successful batch, off the sync path.

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod lock;
pub mod mail;
pub mod notify;
pub mod parse;
pub mod storage;
pub mod sync;
pub mod types;
