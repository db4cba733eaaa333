//! Realtime pump: keeps a session's feed fed from the backend's insert
//! stream until shut down.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shadow_types::{ConversationId, FeedError, LiveEvent, Subscription};

use crate::session::FeedSession;

/// Run the live feed for `session` until `shutdown` fires.
///
/// Subscribes to the current conversation (with bounded backoff), catches up
/// on anything missed, then merges every insert. A closed stream is
/// re-opened, a lagged one triggers a catch-up, and a conversation switch
/// moves the subscription over. The subscription is released on return.
pub async fn run_live_feed(
    session: &FeedSession,
    shutdown: CancellationToken,
) -> Result<(), FeedError> {
    let mut epochs = session.epoch_changes();
    let mut reopening = false;

    loop {
        if reopening {
            let delay = session.config().reconnect.delay_for(1);
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        epochs.borrow_and_update();
        let (conversation, epoch) = session.scope();

        let Some(mut subscription) = subscribe_with_backoff(session, &conversation, &shutdown).await?
        else {
            return Ok(());
        };
        info!(conversation = %conversation, epoch, "live feed subscribed");
        catch_up_logged(session).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    subscription.unsubscribe();
                    info!(conversation = %conversation, "live feed stopped");
                    return Ok(());
                }
                changed = epochs.changed() => {
                    subscription.unsubscribe();
                    if changed.is_err() {
                        return Ok(());
                    }
                    debug!(conversation = %conversation, "conversation switched, resubscribing");
                    reopening = false;
                    break;
                }
                event = subscription.next() => match event {
                    Some(LiveEvent::Insert(message)) => {
                        session.append_live_at(epoch, message);
                    }
                    Some(LiveEvent::Lagged(missed)) => {
                        warn!(conversation = %conversation, missed, "live feed lagged, catching up");
                        catch_up_logged(session).await;
                    }
                    None => {
                        warn!(conversation = %conversation, "live feed closed, resubscribing");
                        reopening = true;
                        break;
                    }
                },
            }
        }
    }
}

/// Open a subscription, retrying with exponential backoff. `Ok(None)` means
/// shutdown fired while waiting.
async fn subscribe_with_backoff(
    session: &FeedSession,
    conversation: &ConversationId,
    shutdown: &CancellationToken,
) -> Result<Option<Subscription>, FeedError> {
    let policy = &session.config().reconnect;
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        match session.backend().subscribe_inserts(conversation).await {
            Ok(subscription) => return Ok(Some(subscription)),
            Err(err) if !err.is_retryable() || attempt >= max_attempts => {
                warn!(conversation = %conversation, attempt, "giving up on live feed: {}", err);
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    conversation = %conversation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "subscribe failed: {}",
                    err
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

async fn catch_up_logged(session: &FeedSession) {
    if let Err(err) = session.catch_up().await {
        warn!("catch-up failed: {}", err);
    }
}
