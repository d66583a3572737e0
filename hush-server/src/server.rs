//! Shared server state and the TCP accept loop.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use hush_sdk::FrameCipher;

use crate::config::ServerConfig;
use crate::connection;

/// Outbound mailbox capacity per connection. A client that lets this many
/// lines pile up is disconnected rather than allowed to stall the server.
pub const MAILBOX_CAPACITY: usize = 4096;

/// One connected client, created by its first successful NICK.
#[derive(Debug, Clone)]
pub struct Session {
    pub nick: String,
    pub addr: SocketAddr,
    /// Cleared by user mode `+i`. Invisible sessions are hidden from
    /// WHOIS by anyone but themselves.
    pub visible: bool,
}

/// State for a single channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub topic: String,
    /// Mode `+t`: only operators may change the topic.
    pub topic_locked: bool,
    /// Mode `+m`: only operators may send to the channel.
    pub moderated: bool,
    /// Session ids of current members.
    pub members: HashSet<String>,
    /// Session ids of channel operators, always a subset of `members`.
    pub operators: HashSet<String>,
}

impl ChannelState {
    pub fn is_member(&self, session_id: &str) -> bool {
        self.members.contains(session_id)
    }

    pub fn is_operator(&self, session_id: &str) -> bool {
        self.operators.contains(session_id)
    }

    /// Remove a member, dropping any operator status with it. Returns
    /// whether the session was a member.
    pub fn remove_member(&mut self, session_id: &str) -> bool {
        self.operators.remove(session_id);
        self.members.remove(session_id)
    }
}

/// The session and channel registries, guarded as one unit.
///
/// Every logical operation (uniqueness check + insert, membership check +
/// mutation, operator check + toggle) runs under a single acquisition of
/// the lock around this struct, so no interleaving can observe a
/// half-applied command.
#[derive(Default)]
pub struct Registry {
    /// session id → session record.
    pub sessions: HashMap<String, Session>,
    /// nick → session id. Nicks are unique, case as given.
    pub nicks: HashMap<String, String>,
    /// channel name → channel state, case as given. Channels are never
    /// deleted, even when their last member leaves.
    pub channels: HashMap<String, ChannelState>,
}

impl Registry {
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn session_id_for_nick(&self, nick: &str) -> Option<&str> {
        self.nicks.get(nick).map(String::as_str)
    }

    pub fn nick_in_use(&self, nick: &str) -> bool {
        self.nicks.contains_key(nick)
    }

    /// Create a session and place it in the default channel.
    pub fn register(
        &mut self,
        session_id: &str,
        nick: &str,
        addr: SocketAddr,
        default_channel: &str,
    ) {
        self.sessions.insert(
            session_id.to_string(),
            Session {
                nick: nick.to_string(),
                addr,
                visible: true,
            },
        );
        self.nicks.insert(nick.to_string(), session_id.to_string());
        self.channels
            .entry(default_channel.to_string())
            .or_default()
            .members
            .insert(session_id.to_string());
    }

    /// Rename a session, returning the old nick. Channels reference
    /// sessions by id, so this is one write to the session record plus
    /// the nick index.
    pub fn rename(&mut self, session_id: &str, new_nick: &str) -> Option<String> {
        let session = self.sessions.get_mut(session_id)?;
        let old = std::mem::replace(&mut session.nick, new_nick.to_string());
        self.nicks.remove(&old);
        self.nicks
            .insert(new_nick.to_string(), session_id.to_string());
        Some(old)
    }

    /// Remove a session from every channel, then from the session and
    /// nick tables. Returns the removed session and the channels it left.
    pub fn remove_session(&mut self, session_id: &str) -> Option<(Session, Vec<String>)> {
        let mut departed = Vec::new();
        for (name, channel) in self.channels.iter_mut() {
            if channel.remove_member(session_id) {
                departed.push(name.clone());
            }
        }
        let session = self.sessions.remove(session_id)?;
        self.nicks.remove(&session.nick);
        Some((session, departed))
    }

    /// Current members of a channel, excluding `skip` if given.
    pub fn channel_members(&self, channel: &str, skip: Option<&str>) -> Vec<String> {
        self.channels
            .get(channel)
            .map(|ch| {
                ch.members
                    .iter()
                    .filter(|m| Some(m.as_str()) != skip)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// State shared by all connection tasks.
pub struct SharedState {
    pub server_name: String,
    pub default_channel: String,
    pub cipher: FrameCipher,
    /// Session and channel registries behind a single lock.
    pub registry: Mutex<Registry>,
    /// session id → mailbox sender. Kept apart from the registry so
    /// delivery never contends with registry mutations. Lock order where
    /// both are held: registry first, then connections.
    pub connections: Mutex<HashMap<String, mpsc::Sender<String>>>,
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    fn build_state(&self) -> Result<Arc<SharedState>> {
        let key = self.config.frame_key()?;
        let mut registry = Registry::default();
        registry
            .channels
            .insert(self.config.default_channel.clone(), ChannelState::default());
        Ok(Arc::new(SharedState {
            server_name: self.config.server_name.clone(),
            default_channel: self.config.default_channel.clone(),
            cipher: FrameCipher::new(&key),
            registry: Mutex::new(registry),
            connections: Mutex::new(HashMap::new()),
        }))
    }

    /// Run the relay until the process is stopped.
    pub async fn run(self) -> Result<()> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.listen_addr))?;
        tracing::info!(
            server_name = %self.config.server_name,
            "Listening on {}",
            listener.local_addr()?
        );
        Self::accept_loop(listener, state).await
    }

    /// Bind, then serve in a background task. Returns the bound address.
    /// Used by integration tests to start a server on an ephemeral port.
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.listen_addr))?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(Self::accept_loop(listener, state));
        Ok((addr, handle))
    }

    async fn accept_loop(listener: TcpListener, state: Arc<SharedState>) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await.context("accept failed")?;
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = connection::handle(stream, state).await {
                    tracing::warn!(%peer, "Connection error: {e:#}");
                }
            });
        }
    }
}
