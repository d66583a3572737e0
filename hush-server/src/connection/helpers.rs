//! Delivery helpers shared by the command handlers.
//!
//! Handlers compute outcomes under the registry lock, drop it, then
//! deliver through these helpers. Delivery is `try_send`: a recipient
//! whose mailbox is full misses the line and is disconnected by its own
//! read loop, never stalling the sender.

use std::sync::Arc;

use crate::server::SharedState;

/// Queue a line on every current member of a channel, optionally
/// skipping one session (typically the originator, who gets a tailored
/// confirmation instead).
pub(crate) fn broadcast_to_channel(
    state: &Arc<SharedState>,
    channel: &str,
    line: &str,
    skip: Option<&str>,
) {
    let members = state.registry.lock().channel_members(channel, skip);
    let connections = state.connections.lock();
    for member in &members {
        if let Some(tx) = connections.get(member) {
            let _ = tx.try_send(line.to_string());
        }
    }
}

/// Queue a line for a single session.
pub(crate) fn send_to_session(state: &Arc<SharedState>, session_id: &str, line: &str) {
    if let Some(tx) = state.connections.lock().get(session_id) {
        let _ = tx.try_send(line.to_string());
    }
}

/// The caller's nick, or `*` before registration.
pub(crate) fn nick_of(state: &Arc<SharedState>, session_id: &str) -> String {
    state
        .registry
        .lock()
        .session(session_id)
        .map(|s| s.nick.clone())
        .unwrap_or_else(|| "*".to_string())
}
