mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cli::{Cli, Command};
use shadow_db::{Database, SqliteBackend};
use shadow_feed::{FeedConfig, FeedSession, VisibleRow, run_live_feed};
use shadow_types::{ConversationId, FeedEvent, Message, MessageBackend, MessageDraft};

const AVATAR_COLORS: [&str; 6] = ["#e57373", "#64b5f6", "#81c784", "#ffb74d", "#ba68c8", "#4db6ac"];
const SEED_AUTHORS: [&str; 4] = ["ann", "bo", "cy", "dee"];

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shadow=info,shadow_feed=info,shadow_db=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FeedConfig::from_env()?;

    let db = Database::open(&cli.db).with_context(|| format!("opening {}", cli.db.display()))?;
    let backend = Arc::new(SqliteBackend::new(Arc::new(db)));

    match cli.command {
        Command::Seed { count } => {
            for i in 0..count {
                let author = SEED_AUTHORS[i % SEED_AUTHORS.len()];
                backend
                    .insert(&cli.conversation, draft(author, &format!("seed message {}", i + 1)))
                    .await?;
            }
            info!(count, conversation = %cli.conversation, "seeded");
        }
        Command::Dm { user_a, user_b } => {
            let dm = backend.open_direct_conversation(&user_a, &user_b).await?;
            println!("{}", dm.conversation_id());
        }
        Command::Send { author, content } => {
            let message = backend.insert(&cli.conversation, draft(&author, &content)).await?;
            println!("{}", message.id);
        }
        Command::Heart { message_id } => {
            let session = FeedSession::new(backend, cli.conversation, config);
            session.load_initial_page().await?;
            while !session.messages().iter().any(|m| m.id == message_id) {
                if !session.cursor().has_more_older {
                    anyhow::bail!("message {} not found", message_id);
                }
                session.load_older_page().await?;
            }
            let count = session.apply_heart_increment(&message_id).await?;
            println!("{} hearts", count);
        }
        Command::Feed {
            viewport_height,
            scroll_top,
            older,
            json,
            reader,
        } => {
            let session = FeedSession::new(backend.clone(), cli.conversation, config);
            session.on_scroll(0.0, viewport_height).await?;
            session.load_initial_page().await?;
            for _ in 0..older {
                if session.load_older_page().await? == 0 {
                    break;
                }
            }
            if let Some(scroll_top) = scroll_top {
                session.on_scroll(scroll_top, viewport_height).await?;
            }
            if let (Some(reader), ConversationId::Direct(id)) = (reader, session.scope().0) {
                if let Some(newest) = session.messages().last() {
                    backend.mark_direct_read(&id, &reader, newest.created_at).await?;
                }
            }

            let rows = session.get_visible_rows();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows_json(&rows))?);
            } else {
                println!(
                    "{} messages, {:.0}px tall, offset {:.0}px",
                    session.len(),
                    session.total_height(),
                    session.scroll_top()
                );
                for row in &rows {
                    print_row(row);
                }
            }
        }
        Command::Unread { user } => {
            for dm in backend.unread_direct_conversations(&user).await? {
                let updated = dm.updated_at.with_timezone(&Local);
                println!("{}  updated {}", dm.conversation_id(), updated.format("%b %-d %H:%M"));
            }
        }
        Command::MarkRead { user } => {
            let ConversationId::Direct(id) = &cli.conversation else {
                anyhow::bail!("mark-read needs a direct conversation (-c dm:<id>)");
            };
            let newest = backend.fetch_page(&cli.conversation, None, 1).await?;
            let at = newest.first().map(|m| m.created_at).unwrap_or_else(Utc::now);
            backend.mark_direct_read(id, &user, at).await?;
        }
        Command::Watch => watch(backend, cli.conversation, config).await?,
    }

    Ok(())
}

async fn watch(
    backend: Arc<SqliteBackend>,
    conversation: shadow_types::ConversationId,
    config: FeedConfig,
) -> Result<()> {
    let session = Arc::new(FeedSession::new(backend, conversation.clone(), config));
    let mut events = session.subscribe_events();
    session.load_initial_page().await?;
    for message in session.messages() {
        print_message(&message);
    }
    let mut printed = session.len();

    let shutdown = CancellationToken::new();
    let pump = {
        let session = session.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_live_feed(&session, shutdown).await })
    };
    info!(conversation = %conversation, "watching, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(FeedEvent::FeedChanged { .. }) => {
                    let messages = session.messages();
                    for message in messages.iter().skip(printed) {
                        print_message(message);
                    }
                    printed = messages.len();
                }
                Ok(FeedEvent::LoadFailed { stage, reason, .. }) => {
                    warn!(?stage, "load failed: {}", reason);
                }
                Ok(FeedEvent::ScrollCorrectionNeeded { .. }) => {}
                Err(err) => {
                    warn!("event stream: {}", err);
                    if matches!(err, tokio::sync::broadcast::error::RecvError::Closed) {
                        break;
                    }
                }
            },
        }
    }

    shutdown.cancel();
    pump.await??;
    Ok(())
}

fn draft(author: &str, content: &str) -> MessageDraft {
    MessageDraft {
        content: content.to_string(),
        author_user_id: author.to_lowercase(),
        author_display_name: author.to_string(),
        author_avatar_color: avatar_color(author).to_string(),
        author_avatar_url: None,
    }
}

fn avatar_color(name: &str) -> &'static str {
    let sum: usize = name.bytes().map(usize::from).sum();
    AVATAR_COLORS[sum % AVATAR_COLORS.len()]
}

fn print_message(message: &Message) {
    let local = message.created_at.with_timezone(&Local);
    let hearts = if message.hearts_count > 0 {
        format!("  <3 {}", message.hearts_count)
    } else {
        String::new()
    };
    println!(
        "[{}] {}: {}{}",
        local.format("%H:%M"),
        message.author_display_name,
        message.content,
        hearts
    );
}

fn print_row(row: &VisibleRow) {
    if let Some(label) = &row.content.date_label {
        println!("---- {} ----", label);
    }
    print!("{:>7.0}  ", row.offset_px);
    print_message(&row.content.message);
}

fn rows_json(rows: &[VisibleRow]) -> serde_json::Value {
    serde_json::Value::Array(
        rows.iter()
            .map(|row| {
                serde_json::json!({
                    "index": row.index,
                    "key": row.key,
                    "offset_px": row.offset_px,
                    "height_px": row.height_px,
                    "date_label": row.content.date_label,
                    "message": row.content.message,
                })
            })
            .collect(),
    )
}
