//! Server state and the readiness-driven event engine.
//!
//! One thread, one poll loop. The server owns every client and channel;
//! channels refer to their members by the stable poll token and clients
//! refer back to channels by name, so teardown can never chase a stale
//! reference.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::channel::Channel;
use crate::client::Client;
use crate::config::ServerConfig;
use crate::handlers;
use crate::replies;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
/// Client tokens start above the reserved ones and are never reused.
const FIRST_CLIENT: usize = 2;

/// Requests a running engine to stop from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// The flag the engine checks between readiness waits. Signal
    /// handlers set this directly.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Set the flag and interrupt the wait.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
        let _ = self.waker.wake();
    }
}

pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    poll: Poll,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
    next_token: usize,
    pub(crate) clients: HashMap<Token, Client>,
    pub(crate) channels: HashMap<String, Channel>,
}

impl Server {
    /// Bind the listening socket and set up the poller.
    ///
    /// The listener is non-blocking with `SO_REUSEADDR`, registered for
    /// read events alongside a waker for cross-thread shutdown.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let addr: SocketAddr = config
            .listen_addr()
            .parse()
            .with_context(|| format!("invalid listen address {}", config.listen_addr()))?;
        let mut listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind {addr}"))?;

        let poll = Poll::new().context("failed to create poller")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("failed to register listener")?;
        let waker =
            Arc::new(Waker::new(poll.registry(), WAKER).context("failed to create waker")?);

        Ok(Self {
            config,
            listener,
            poll,
            waker,
            shutdown: Arc::new(AtomicBool::new(false)),
            next_token: FIRST_CLIENT,
            clients: HashMap::new(),
            channels: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    pub(crate) fn password(&self) -> &str {
        &self.config.password
    }

    /// Run the engine until a shutdown request.
    pub fn run(mut self) -> Result<()> {
        let addr = self.local_addr().context("failed to read local address")?;
        tracing::info!(%addr, "Server listening");

        let mut events = Events::with_capacity(256);
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            self.update_interests()
                .context("failed to update poll interests")?;

            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    // A signal may have set the shutdown flag.
                    continue;
                }
                return Err(e).context("poll wait failed");
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_clients(),
                    WAKER => {}
                    token => {
                        let mut alive = true;
                        if event.is_readable() {
                            alive = self.read_client(token);
                        }
                        if alive && event.is_writable() {
                            self.write_client(token);
                        }
                    }
                }
            }
        }

        self.drain();
        Ok(())
    }

    /// Recompute each client's event mask from its pending output.
    fn update_interests(&mut self) -> io::Result<()> {
        let registry = self.poll.registry();
        for (token, client) in self.clients.iter_mut() {
            let want = if client.has_pending_send() {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            if client.interest != Some(want) {
                registry.reregister(client.stream_mut(), *token, want)?;
                client.interest = Some(want);
            }
        }
        Ok(())
    }

    /* =============================
     *     CONNECTION LIFECYCLE
     * ============================= */

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE,
                    ) {
                        tracing::warn!(%peer, "failed to register client: {e}");
                        continue;
                    }
                    let mut client = Client::new(stream);
                    client.interest = Some(Interest::READABLE);
                    self.clients.insert(token, client);
                    tracing::info!(token = token.0, %peer, "Client connected");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    /// Read everything available and dispatch the complete lines.
    /// Returns false when the client was disconnected.
    fn read_client(&mut self, token: Token) -> bool {
        let Some(client) = self.clients.get_mut(&token) else {
            return false;
        };

        if let Err(e) = client.fill() {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                tracing::debug!(token = token.0, "Peer closed connection");
            } else {
                tracing::warn!(token = token.0, "read failed: {e}");
            }
            self.disconnect(token);
            return false;
        }

        let lines = client.take_lines();
        for line in lines {
            handlers::dispatch(self, token, &line);
            if !self.clients.contains_key(&token) {
                return false;
            }
        }
        true
    }

    fn write_client(&mut self, token: Token) {
        let Some(client) = self.clients.get_mut(&token) else {
            return;
        };
        if let Err(e) = client.flush() {
            tracing::warn!(token = token.0, "send failed: {e}");
            self.disconnect(token);
        }
    }

    /// Tear one client down: unregister, leave every channel (via the
    /// back-references and a defensive whole-table scan), scrub its
    /// pending invitations, and drop the socket.
    pub(crate) fn disconnect(&mut self, token: Token) {
        let Some(mut client) = self.clients.remove(&token) else {
            return;
        };
        // Give already-queued replies one last chance to reach the peer.
        let _ = client.flush();
        let _ = self.poll.registry().deregister(client.stream_mut());

        let nick = client.nickname().to_string();
        let mut affected: Vec<String> = client.joined().to_vec();
        for (name, channel) in &self.channels {
            if channel.has_member(token) && !affected.iter().any(|n| n == name) {
                affected.push(name.clone());
            }
        }
        for name in &affected {
            if let Some(channel) = self.channels.get_mut(name) {
                channel.remove_member(token);
            }
            self.cleanup_channel(name);
        }
        if !nick.is_empty() {
            self.remove_invites_for_nick(&nick);
        }

        tracing::info!(token = token.0, nick = %nick, "Client disconnected");
    }

    /// Close every connection and drop all channel state.
    fn drain(&mut self) {
        let registry = self.poll.registry();
        for (_, mut client) in self.clients.drain() {
            let _ = registry.deregister(client.stream_mut());
        }
        self.channels.clear();
        tracing::info!("Server shut down");
    }

    /* =============================
     *      HANDLER SUPPORT
     * ============================= */

    /// Queue a message on one client's outbound buffer.
    pub(crate) fn queue_to(&mut self, token: Token, msg: &str) {
        if let Some(client) = self.clients.get_mut(&token) {
            client.queue(msg);
        }
    }

    /// Enqueue `msg` on every member of `channel` except `exclude`.
    pub(crate) fn broadcast(&mut self, channel: &str, msg: &str, exclude: Option<Token>) {
        let members: Vec<Token> = match self.channels.get(channel) {
            Some(channel) => channel.members().to_vec(),
            None => return,
        };
        for member in members {
            if Some(member) == exclude {
                continue;
            }
            self.queue_to(member, msg);
        }
    }

    pub(crate) fn get_or_create_channel(&mut self, name: &str) -> &mut Channel {
        self.channels.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(channel = %name, "Channel created");
            Channel::new(name)
        })
    }

    /// Delete `name` if its member list is empty, clearing invitations.
    pub(crate) fn cleanup_channel(&mut self, name: &str) {
        let empty = self
            .channels
            .get(name)
            .is_some_and(|channel| channel.member_count() == 0);
        if empty {
            if let Some(mut channel) = self.channels.remove(name) {
                channel.clear_invites();
            }
            tracing::debug!(channel = %name, "Channel removed");
        }
    }

    pub(crate) fn token_by_nick(&self, nick: &str) -> Option<Token> {
        self.clients
            .iter()
            .find(|(_, client)| !client.nickname().is_empty() && client.nickname() == nick)
            .map(|(token, _)| *token)
    }

    /// True when another connected client already holds `nick`.
    pub(crate) fn nickname_in_use(&self, nick: &str, except: Token) -> bool {
        self.clients
            .iter()
            .any(|(token, client)| *token != except && client.nickname() == nick)
    }

    pub(crate) fn remove_invites_for_nick(&mut self, nick: &str) {
        for channel in self.channels.values_mut() {
            channel.remove_invited(nick);
        }
    }

    /// Complete registration once PASS, NICK and USER have all landed.
    pub(crate) fn try_register(&mut self, token: Token) {
        let Some(client) = self.clients.get_mut(&token) else {
            return;
        };
        if client.is_authenticated()
            || !client.has_valid_pass()
            || client.nickname().is_empty()
            || client.username().is_empty()
            || client.realname().is_empty()
        {
            return;
        }
        client.set_authenticated(true);
        let nick = client.nickname().to_string();
        client.queue(&replies::rpl_welcome(&nick));
        tracing::info!(token = token.0, nick = %nick, "Client registered");
    }
}
