use clap::Parser;

/// Command-line options for mailsink.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Register (or update) the account from MAILSINK_EMAIL / MAILSINK_PASSWORD /
    /// MAILSINK_IMAP_HOST / MAILSINK_IMAP_PORT before syncing.
    #[arg(long)]
    pub add_account: bool,

    /// Sync a single folder by its full mailbox path instead of the catalog.
    #[arg(long)]
    pub folder: Option<String>,

    /// Per-folder message limit (overrides MAILSINK_MESSAGE_LIMIT).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Sync every selectable folder regardless of classified type.
    #[arg(long)]
    pub all_folders: bool,

    /// Print results as JSON instead of the plain-text summary.
    #[arg(long)]
    pub json: bool,
}
