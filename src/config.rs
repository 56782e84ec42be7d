use clap::Parser;

/// IRC server speaking the classic RFC 1459 subset over plain TCP.
#[derive(Parser, Debug, Clone)]
#[command(name = "ircserver", version, about)]
pub struct ServerConfig {
    /// TCP port the server listens on.
    pub port: u16,

    /// Connection password shared by all clients.
    pub password: String,
}

impl ServerConfig {
    /// Address the listening socket binds to.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
