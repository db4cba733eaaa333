use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shadow_types::ConversationId;

#[derive(Parser, Debug)]
#[command(name = "shadow", version, about = "Local driver for the ShadowMessage feed")]
pub struct Cli {
    /// SQLite database file.
    #[arg(long, global = true, env = "SHADOW_DB_PATH", default_value = "shadow.db")]
    pub db: PathBuf,

    /// `group` or `dm:<id>`.
    #[arg(long, short = 'c', global = true, default_value = "group")]
    pub conversation: ConversationId,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Insert generated messages.
    Seed {
        #[arg(long, default_value_t = 50)]
        count: usize,
    },

    /// Find or create the direct conversation between two users.
    Dm { user_a: String, user_b: String },

    /// Send one message.
    Send {
        #[arg(long)]
        author: String,
        content: String,
    },

    /// Add a heart to a message.
    Heart { message_id: String },

    /// Load the feed and print the render window.
    Feed {
        #[arg(long, default_value_t = 600.0)]
        viewport_height: f64,

        /// Offset to render at once loaded; the bottom when omitted.
        #[arg(long)]
        scroll_top: Option<f64>,

        /// Older pages to pull after the initial one.
        #[arg(long, default_value_t = 0)]
        older: usize,

        #[arg(long, default_value_t = false)]
        json: bool,

        /// Mark a direct conversation read for this user once loaded.
        #[arg(long)]
        reader: Option<String>,
    },

    /// List a user's direct conversations with unread messages.
    Unread {
        #[arg(long)]
        user: String,
    },

    /// Mark the direct conversation read for a user up to its newest message.
    MarkRead {
        #[arg(long)]
        user: String,
    },

    /// Follow new messages until Ctrl-C.
    Watch,
}
