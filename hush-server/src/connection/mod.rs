//! Per-client connection handling.
//!
//! Each accepted TCP connection runs one read loop plus a writer task
//! draining the connection's outbound mailbox. Inbound frames are
//! decrypted, parsed into `(command, argument)`, and dispatched to a
//! handler; handlers queue plaintext lines on mailboxes, and the writer
//! task encrypts each queued line as an independent frame.

mod channel;
pub(crate) mod helpers;
mod messaging;
mod modes;
mod queries;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::proto;
use crate::replies as rpl;
use crate::server::{SharedState, MAILBOX_CAPACITY};

use channel::{handle_join, handle_kick, handle_list, handle_names, handle_part, handle_topic};
use helpers::nick_of;
use messaging::handle_privmsg;
use modes::handle_mode;
use queries::handle_whois;

/// Identity of a single client connection. Session data (nick, modes,
/// memberships) lives in the registry, keyed by `id`.
pub struct Connection {
    pub id: String,
    pub addr: std::net::SocketAddr,
}

/// Entry point for one accepted stream.
pub async fn handle(stream: TcpStream, state: Arc<SharedState>) -> Result<()> {
    let peer = stream.peer_addr()?;
    let session_id = peer.to_string();
    tracing::info!(%session_id, "New connection");

    let conn = Connection {
        id: session_id.clone(),
        addr: peer,
    };
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (tx, mut rx) = mpsc::channel::<String>(MAILBOX_CAPACITY);
    state.connections.lock().insert(session_id.clone(), tx);

    // Writer task: drain the mailbox, one encrypted frame per line,
    // batching queued lines between flushes.
    let cipher = state.cipher.clone();
    let writer_session = session_id.clone();
    let writer = tokio::spawn(async move {
        'outer: while let Some(line) = rx.recv().await {
            let mut pending = vec![line];
            while pending.len() < 64 {
                match rx.try_recv() {
                    Ok(queued) => pending.push(queued),
                    Err(_) => break,
                }
            }
            for line in &pending {
                let frame = match cipher.encode(line) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(session_id = %writer_session, "Frame encode failed: {e}");
                        continue;
                    }
                };
                if write_half.write_all(frame.as_bytes()).await.is_err()
                    || write_half.write_all(b"\r\n").await.is_err()
                {
                    break 'outer;
                }
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    // Queue a line for a session. A full mailbox means the recipient has
    // stopped draining; mark this connection unhealthy so the read loop
    // disconnects it instead of blocking everyone else.
    let send_healthy = Arc::new(AtomicBool::new(true));
    let healthy = send_healthy.clone();
    let send = move |state: &Arc<SharedState>, session_id: &str, line: String| {
        if let Some(tx) = state.connections.lock().get(session_id) {
            if tx.try_send(line).is_err() {
                tracing::warn!(session_id, "Mailbox full or closed");
                healthy.store(false, Ordering::Relaxed);
            }
        }
    };

    // Welcome burst before the first command is read.
    send(&state, &session_id, rpl::numeric(rpl::RPL_WELCOME, ""));
    send(
        &state,
        &session_id,
        format!("You have joined {}", state.default_channel),
    );

    let mut line_buf = String::new();
    loop {
        if !send_healthy.load(Ordering::Relaxed) {
            tracing::info!(%session_id, "Outbound mailbox overflowed, disconnecting");
            break;
        }
        line_buf.clear();
        match reader.read_line(&mut line_buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%session_id, "Read error: {e}");
                break;
            }
        }
        let frame = line_buf.trim_end();
        if frame.is_empty() {
            continue;
        }
        // A frame that fails to decrypt is dropped, not fatal: the peer
        // may retry, and one corrupt line must not kill the session.
        let line = match state.cipher.decode(frame) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(%session_id, "Discarding bad frame: {e}");
                continue;
            }
        };
        tracing::debug!(%session_id, "<- {line}");

        let (command, argument) = proto::parse(&line);
        let registered = state.registry.lock().session(&session_id).is_some();
        match command {
            "NICK" => handle_nick(&conn, argument, &state, &send),
            "USER" => send(&state, &session_id, "User registered".to_string()),
            "LIST" => handle_list(&state, &session_id, &send),
            "NAMES" => handle_names(argument, &state, &session_id, &send),
            "WHOIS" => handle_whois(argument, &state, &session_id, &send),
            "QUIT" => {
                handle_quit(&state, &session_id, &send);
                break;
            }
            "JOIN" | "PART" | "PRIVMSG" | "NOTICE" | "KICK" | "TOPIC" | "MODE"
                if !registered =>
            {
                send(&state, &session_id, rpl::numeric(rpl::ERR_NOTREGISTERED, ""));
            }
            "JOIN" => handle_join(argument, &state, &session_id, &send),
            "PART" => handle_part(argument, &state, &session_id, &send),
            "PRIVMSG" | "NOTICE" => {
                handle_privmsg(command, argument, &state, &session_id, &send)
            }
            "KICK" => handle_kick(argument, &state, &session_id, &send),
            "TOPIC" => handle_topic(argument, &state, &session_id, &send),
            "MODE" => handle_mode(argument, &state, &session_id, &send),
            _ => {
                let nick = nick_of(&state, &session_id);
                send(
                    &state,
                    &session_id,
                    rpl::numeric(rpl::ERR_UNKNOWNCOMMAND, &format!("{nick} {command}")),
                );
            }
        }
    }

    // Dropping the mailbox sender ends the writer after it flushes
    // whatever is still queued (the QUIT confirmation, typically).
    disconnect(&state, &session_id);
    let _ = writer.await;
    tracing::info!(%session_id, "Connection closed");
    Ok(())
}

/// NICK: register a new session or rename an existing one.
fn handle_nick(
    conn: &Connection,
    argument: &str,
    state: &Arc<SharedState>,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let session_id = conn.id.as_str();
    let Some(new_nick) = argument.split_whitespace().next() else {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "NICK"),
        );
        return;
    };

    // Uniqueness check and table update are one critical section. A nick
    // equal to the caller's current one is already in the index, so it
    // collides like any other taken nick.
    let reply = {
        let mut registry = state.registry.lock();
        if registry.nick_in_use(new_nick) {
            rpl::numeric(rpl::ERR_NICKNAMEINUSE, new_nick)
        } else if let Some(old) = registry.rename(session_id, new_nick) {
            format!(":{old}! NICK {new_nick}")
        } else {
            registry.register(session_id, new_nick, conn.addr, &state.default_channel);
            format!(":{new_nick}! NICK {new_nick}")
        }
    };
    send(state, session_id, reply);
}

/// QUIT: announce departure to every channel the caller was in, then
/// drop the session.
fn handle_quit(
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let removed = state.registry.lock().remove_session(session_id);
    let Some((session, departed)) = removed else {
        return;
    };
    let line = format!(":{}! QUIT :Leaving", session.nick);
    for channel in &departed {
        helpers::broadcast_to_channel(state, channel, &line, None);
    }
    send(state, session_id, line);
}

/// Final cleanup when the read loop ends for any reason. Safe to call
/// after a QUIT already emptied the registry entry.
fn disconnect(state: &Arc<SharedState>, session_id: &str) {
    let removed = state.registry.lock().remove_session(session_id);
    if let Some((session, departed)) = removed {
        let line = format!(":{}! QUIT :Connection closed", session.nick);
        for channel in &departed {
            helpers::broadcast_to_channel(state, channel, &line, None);
        }
    }
    state.connections.lock().remove(session_id);
}
