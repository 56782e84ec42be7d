//! Byte-stream to line conversion for one connection.

/// Accumulates raw socket reads and yields complete lines.
///
/// Lines are delimited by LF; a CR immediately preceding the LF is
/// stripped. Any unfinished tail stays buffered until the next read. No
/// length cap is imposed here.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk read from the socket.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Lazily drain every complete line currently buffered.
    pub fn drain_lines(&mut self) -> DrainLines<'_> {
        DrainLines { buf: &mut self.buf }
    }

    /// Bytes of unfinished line currently held.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// Iterator over the complete lines of a [`LineFramer`].
pub struct DrainLines<'a> {
    buf: &'a mut Vec<u8>,
}

impl Iterator for DrainLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}
