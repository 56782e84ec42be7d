//! IRC command lines — a minimal parser/formatter for the client subset.
//!
//! Client lines have no prefix or tags: `COMMAND param param :trailing`.

use std::fmt;

/// One parsed command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// First whitespace-delimited token, exactly as received.
    pub name: String,
    /// Middle parameters, up to the first token that begins with `:`.
    pub params: Vec<String>,
    /// Everything after the trailing colon; empty when absent.
    pub trailing: String,
}

impl Command {
    /// Parse a stripped line. Whitespace is runs of ASCII space; an empty
    /// line yields an empty command name.
    pub fn parse(line: &str) -> Self {
        let mut cmd = Command::default();
        let mut rest = line.trim_start_matches(' ');

        while !rest.is_empty() {
            if !cmd.name.is_empty() {
                if let Some(trailing) = rest.strip_prefix(':') {
                    cmd.trailing = trailing.to_string();
                    break;
                }
            }
            let (token, tail) = match rest.find(' ') {
                Some(i) => (&rest[..i], rest[i..].trim_start_matches(' ')),
                None => (rest, ""),
            };
            if cmd.name.is_empty() {
                cmd.name = token.to_string();
            } else {
                cmd.params.push(token.to_string());
            }
            rest = tail;
        }
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        if !self.trailing.is_empty() {
            write!(f, " :{}", self.trailing)?;
        }
        Ok(())
    }
}
