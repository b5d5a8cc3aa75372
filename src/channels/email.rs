//! Email channel — raw IMAP over TLS for the mailbox, SMTP via lettre for
//! the escalation summary.
//!
//! The IMAP session is blocking; the async `MailSource` / `MailSink`
//! impls run it on tokio's blocking pool.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message as MailMessage, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::TriageConfig;
use crate::error::ChannelError;
use crate::pipeline::types::{MailSink, MailSource};

/// Socket read timeout for IMAP.
const IMAP_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

/// Connection settings shared by the IMAP source and the SMTP sink.
#[derive(Debug)]
pub struct MailboxConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Login name, also used as the From address.
    pub username: String,
    pub password: SecretString,
}

impl MailboxConfig {
    pub fn from_config(config: &TriageConfig) -> Self {
        Self {
            imap_host: config.imap_host.clone(),
            imap_port: config.imap_port,
            smtp_host: config.smtp_host.clone(),
            smtp_port: config.smtp_port,
            username: config.email.clone(),
            password: SecretString::from(config.password.expose_secret().to_string()),
        }
    }
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Minimal IMAP4rev1 client: LOGIN, SELECT, SEARCH SINCE, FETCH, LOGOUT.
pub struct ImapSession<S: Read + Write> {
    stream: S,
    next_tag: u32,
}

impl ImapSession<TlsStream> {
    /// Open a TLS connection and read the server greeting.
    pub fn connect(host: &str, port: u16) -> Result<Self, ChannelError> {
        let connect_err = |reason: String| ChannelError::ConnectFailed {
            host: host.to_string(),
            reason,
        };

        let tcp = TcpStream::connect((host, port)).map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(IMAP_READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Self::new(rustls::StreamOwned::new(conn, tcp));
        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(connect_err(format!("unexpected greeting: {}", greeting.trim_end())));
        }
        debug!(host = %host, "IMAP connected");
        Ok(session)
    }
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap an already-greeted stream.
    pub fn new(stream: S) -> Self {
        Self { stream, next_tag: 1 }
    }

    pub fn login(&mut self, username: &str, password: &SecretString) -> Result<(), ChannelError> {
        let command = format!(
            "LOGIN {} {}",
            quote_imap(username),
            quote_imap(password.expose_secret())
        );
        self.command(&command).map_err(|e| match e {
            ChannelError::CommandFailed { .. } => ChannelError::AuthFailed {
                user: username.to_string(),
            },
            other => other,
        })?;
        Ok(())
    }

    pub fn select_inbox(&mut self) -> Result<(), ChannelError> {
        self.command("SELECT \"INBOX\"").map(|_| ())
    }

    /// Sequence numbers of messages received on or after `since`, in
    /// mailbox order (oldest first).
    pub fn search_since(&mut self, since: NaiveDate) -> Result<Vec<String>, ChannelError> {
        let lines = self.command(&format!("SEARCH SINCE {}", imap_date(since)))?;
        Ok(parse_search_response(&lines))
    }

    /// Full RFC 822 bytes of one message. `BODY.PEEK` leaves `\Seen` alone.
    pub fn fetch_raw(&mut self, id: &str) -> Result<Vec<u8>, ChannelError> {
        let tag = self.tag();
        self.write_command(&tag, &format!("FETCH {id} BODY.PEEK[]"))?;

        let mut body: Option<Vec<u8>> = None;
        loop {
            let line = self.read_line()?;
            if let Some(size) = parse_literal_size(&line) {
                let mut literal = vec![0u8; size];
                self.stream.read_exact(&mut literal)?;
                body.get_or_insert(literal);
                continue;
            }
            if line.starts_with(&format!("{tag} ")) {
                check_tagged(&tag, &line, "FETCH")?;
                break;
            }
        }

        body.ok_or_else(|| ChannelError::FetchFailed {
            id: id.to_string(),
            reason: "no message literal in response".into(),
        })
    }

    /// Best effort; the server may already have closed the connection.
    pub fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout failed");
        }
    }

    // ── Wire helpers ────────────────────────────────────────────────

    fn tag(&mut self) -> String {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;
        tag
    }

    fn write_command(&mut self, tag: &str, command: &str) -> Result<(), ChannelError> {
        self.stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Send a command and collect its response lines, tagged line last.
    fn command(&mut self, command: &str) -> Result<Vec<String>, ChannelError> {
        let tag = self.tag();
        self.write_command(&tag, command)?;

        let verb = command.split_whitespace().next().unwrap_or(command).to_string();
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&format!("{tag} "));
            lines.push(line);
            if done {
                break;
            }
        }
        if let Some(last) = lines.last() {
            check_tagged(&tag, last, &verb)?;
        }
        Ok(lines)
    }

    fn read_line(&mut self) -> Result<String, ChannelError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 => {
                    return Err(ChannelError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "IMAP connection closed",
                    )));
                }
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }
}

// ── Mail source ─────────────────────────────────────────────────────

/// Mailbox backed by one IMAP session, shared across fetches.
pub struct ImapMailSource {
    session: Arc<Mutex<ImapSession<TlsStream>>>,
}

impl ImapMailSource {
    /// Connect, log in and select INBOX.
    pub async fn connect(config: &MailboxConfig) -> Result<Self, ChannelError> {
        let host = config.imap_host.clone();
        let port = config.imap_port;
        let username = config.username.clone();
        let password = SecretString::from(config.password.expose_secret().to_string());

        let session = tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::connect(&host, port)?;
            session.login(&username, &password)?;
            session.select_inbox()?;
            info!(host = %host, user = %username, "IMAP mailbox selected");
            Ok::<_, ChannelError>(session)
        })
        .await
        .map_err(|e| join_error("CONNECT", e))??;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Run `f` against the session on the blocking pool.
    async fn with_session<T, F>(&self, command: &'static str, f: F) -> Result<T, ChannelError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession<TlsStream>) -> Result<T, ChannelError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session.lock().map_err(|_| ChannelError::CommandFailed {
                command: command.into(),
                reason: "IMAP session lock poisoned".into(),
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| join_error(command, e))?
    }

    pub async fn logout(&self) {
        if let Err(e) = self
            .with_session("LOGOUT", |s| {
                s.logout();
                Ok(())
            })
            .await
        {
            warn!(error = %e, "IMAP logout skipped");
        }
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    async fn search(&self, since: NaiveDate) -> Result<Vec<String>, ChannelError> {
        self.with_session("SEARCH", move |s| s.search_since(since)).await
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>, ChannelError> {
        let id = id.to_string();
        self.with_session("FETCH", move |s| {
            s.fetch_raw(&id).map_err(|e| match e {
                e @ ChannelError::FetchFailed { .. } => e,
                other => ChannelError::FetchFailed {
                    id: id.clone(),
                    reason: other.to_string(),
                },
            })
        })
        .await
    }
}

// ── Mail sink ───────────────────────────────────────────────────────

/// SMTP sender for the escalation summary.
pub struct SmtpMailSink {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailSink {
    /// Port 465 uses implicit TLS; any other port uses STARTTLS.
    pub fn new(config: &MailboxConfig) -> Result<Self, ChannelError> {
        let setup_err = |reason: String| ChannelError::ConnectFailed {
            host: config.smtp_host.clone(),
            reason,
        };

        let from = config
            .username
            .parse()
            .map_err(|e| setup_err(format!("Invalid from address: {e}")))?;

        let relay = match config.smtp_port {
            465 => SmtpTransport::relay(&config.smtp_host),
            _ => SmtpTransport::starttls_relay(&config.smtp_host),
        };
        let builder = relay.map_err(|e| setup_err(format!("SMTP relay error: {e}")))?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = builder.port(config.smtp_port).credentials(creds).build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailSink for SmtpMailSink {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        let send_err = |reason: String| ChannelError::SendFailed {
            recipient: recipient.to_string(),
            reason,
        };

        let to: Mailbox = recipient
            .parse()
            .map_err(|e| send_err(format!("Invalid to address: {e}")))?;
        let email = MailMessage::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| send_err(format!("Failed to build email: {e}")))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| send_err(format!("SMTP task failed: {e}")))?
            .map_err(|e| send_err(format!("SMTP send failed: {e}")))?;

        debug!(recipient = %recipient, "SMTP accepted message");
        Ok(())
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// IMAP quoted string: wrap in quotes, escape `\` and `"`.
pub fn quote_imap(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '\\' || ch == '"' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// IMAP search date, e.g. `05-Mar-2024`.
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// Ids from `* SEARCH` untagged responses.
pub fn parse_search_response(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Byte count of a literal announced at the end of a line (`... {1234}`).
pub fn parse_literal_size(line: &str) -> Option<usize> {
    let line = line.trim_end_matches(['\r', '\n']);
    let open = line.rfind('{')?;
    line.strip_suffix('}')?[open + 1..].parse().ok()
}

/// Map a tagged status line to success or `CommandFailed`.
fn check_tagged(tag: &str, line: &str, command: &str) -> Result<(), ChannelError> {
    let status = line[tag.len()..].trim_start();
    if status.starts_with("OK") {
        Ok(())
    } else {
        Err(ChannelError::CommandFailed {
            command: command.to_string(),
            reason: status.trim_end().to_string(),
        })
    }
}

fn join_error(command: &str, e: tokio::task::JoinError) -> ChannelError {
    ChannelError::CommandFailed {
        command: command.to_string(),
        reason: format!("IMAP task failed: {e}"),
    }
}

#[cfg(test)]
#[path = "email_tests.rs"]
mod tests;
