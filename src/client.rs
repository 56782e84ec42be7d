//! Per-connection client state.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use mio::net::TcpStream;
use mio::Interest;

use crate::framer::LineFramer;
use crate::replies;

/// How many bytes one readiness event reads from the socket at a time.
const READ_CHUNK: usize = 1024;

/// Outbound message queue with a partial-write cursor.
///
/// Messages are queued whole; the engine sends whatever the socket
/// accepts and `consume` advances across entry boundaries. `len_bytes`
/// always equals the total of remaining bytes.
#[derive(Debug, Default)]
pub struct SendQueue {
    queue: VecDeque<Vec<u8>>,
    cursor: usize,
    remaining: usize,
}

impl SendQueue {
    /// Queue one message. Empty input is a no-op.
    pub fn push(&mut self, msg: &[u8]) {
        if msg.is_empty() {
            return;
        }
        self.remaining += msg.len();
        self.queue.push_back(msg.to_vec());
    }

    /// The front unsent slice, respecting the partial-write cursor.
    pub fn front_slice(&self) -> Option<&[u8]> {
        self.queue.front().map(|front| &front[self.cursor..])
    }

    /// Mark `n` bytes as sent, popping fully-consumed entries.
    pub fn consume(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.queue.front() else { break };
            let left = front.len() - self.cursor;
            if n >= left {
                n -= left;
                self.remaining -= left;
                self.cursor = 0;
                self.queue.pop_front();
            } else {
                self.cursor += n;
                self.remaining -= n;
                n = 0;
            }
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.cursor = 0;
        self.remaining = 0;
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Total unsent bytes across the queue.
    pub fn len_bytes(&self) -> usize {
        self.remaining
    }
}

/// State for one connected TCP peer.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    nickname: String,
    username: String,
    realname: String,
    has_valid_pass: bool,
    authenticated: bool,
    framer: LineFramer,
    sendq: SendQueue,
    /// Names of joined channels; channel ownership lives in the server.
    joined: Vec<String>,
    /// Event mask currently registered with the poller.
    pub(crate) interest: Option<Interest>,
}

impl Client {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            nickname: String::new(),
            username: String::new(),
            realname: String::new(),
            has_valid_pass: false,
            authenticated: false,
            framer: LineFramer::new(),
            sendq: SendQueue::default(),
            joined: Vec::new(),
            interest: None,
        }
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn set_nickname(&mut self, nick: &str) {
        self.nickname = nick.to_string();
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn set_username(&mut self, user: &str) {
        self.username = user.to_string();
    }

    pub fn realname(&self) -> &str {
        &self.realname
    }

    pub fn set_realname(&mut self, real: &str) {
        self.realname = real.to_string();
    }

    pub fn has_valid_pass(&self) -> bool {
        self.has_valid_pass
    }

    pub fn set_valid_pass(&mut self, ok: bool) {
        self.has_valid_pass = ok;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, ok: bool) {
        self.authenticated = ok;
    }

    /// `nick!user@localhost`, used as the source of broadcast messages.
    pub fn hostmask(&self) -> String {
        replies::client_prefix(&self.nickname, &self.username)
    }

    /* =============================
     *        OUTBOUND QUEUE
     * ============================= */

    /// Queue a message for delivery on the next writable event.
    pub fn queue(&mut self, msg: &str) {
        self.sendq.push(msg.as_bytes());
    }

    pub fn has_pending_send(&self) -> bool {
        self.sendq.has_pending()
    }

    pub fn pending_bytes(&self) -> usize {
        self.sendq.len_bytes()
    }

    /// Write queued bytes until the queue drains or the socket blocks.
    ///
    /// `Ok(())` means "nothing left" or "would block"; `Err` means the
    /// peer is gone and the connection must be torn down.
    pub fn flush(&mut self) -> io::Result<()> {
        loop {
            let Some(slice) = self.sendq.front_slice() else {
                return Ok(());
            };
            match self.stream.write(slice) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    let partial = n < slice.len();
                    self.sendq.consume(n);
                    if partial {
                        // Kernel buffer full; resume on the next writable event.
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /* =============================
     *        INBOUND BUFFER
     * ============================= */

    /// Read everything the socket has into the framer.
    ///
    /// `Err` (including orderly EOF) means the connection must be torn
    /// down; complete lines are picked up with [`Client::take_lines`].
    pub fn fill(&mut self) -> io::Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => self.framer.append(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Complete lines buffered so far, in arrival order.
    pub fn take_lines(&mut self) -> Vec<String> {
        self.framer.drain_lines().collect()
    }

    /* =============================
     *      CHANNEL BACK-REFS
     * ============================= */

    /// Record membership of `name`; idempotent.
    pub fn join_channel(&mut self, name: &str) {
        if !self.joined.iter().any(|c| c == name) {
            self.joined.push(name.to_string());
        }
    }

    pub fn leave_channel(&mut self, name: &str) {
        self.joined.retain(|c| c != name);
    }

    pub fn joined(&self) -> &[String] {
        &self.joined
    }
}

#[cfg(test)]
impl Client {
    /// Drain everything queued for this client, for assertions.
    pub(crate) fn drain_queued(&mut self) -> String {
        let mut out = Vec::new();
        while let Some(slice) = self.sendq.front_slice() {
            out.extend_from_slice(slice);
            let n = slice.len();
            self.sendq.consume(n);
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}
