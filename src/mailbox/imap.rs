//! Blocking IMAP session over TLS.
//!
//! Speaks just enough IMAP4rev1 for the scanner: LOGIN, EXAMINE (read-only
//! select), FETCH of header fields by sequence range, UID FETCH of full
//! bodies with `BODY.PEEK[]` so nothing gets flagged `\Seen`, and LOGOUT.
//! Run it inside `spawn_blocking`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::TransportError;
use crate::mailbox::response::{self, FetchResponse, Status};
use crate::mailbox::types::{FetchedBody, MessageMetadata, SeqWindow, sender_domains};
use crate::mailbox::MailStore;

/// Largest single literal accepted from the server.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Largest single response line accepted from the server.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Header fields requested during the metadata pass.
const METADATA_ITEMS: &str = "(UID INTERNALDATE BODY.PEEK[HEADER.FIELDS (DATE FROM SUBJECT)])";

/// Mailbox connection settings.
#[derive(Debug)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    pub timeout: Duration,
}

/// TLS stream used for real connections.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// An authenticated IMAP session.
pub struct ImapSession<S> {
    stream: S,
    buf: Vec<u8>,
    next_tag: u32,
    mailbox: String,
}

impl ImapSession<TlsStream> {
    /// Connect over TLS and log in.
    pub fn open(config: &ImapConfig) -> Result<Self, TransportError> {
        let stream = connect_tls(config)?;
        let mut session = Self::greet(stream, &config.mailbox)?;
        session.login(&config.username, &config.password)?;
        Ok(session)
    }
}

fn connect_tls(config: &ImapConfig) -> Result<TlsStream, TransportError> {
    let connect_err = |reason: String| TransportError::Connect {
        host: config.host.clone(),
        port: config.port,
        reason,
    };

    let tcp = TcpStream::connect((config.host.as_str(), config.port))
        .map_err(|e| connect_err(e.to_string()))?;
    tcp.set_read_timeout(Some(config.timeout))?;
    tcp.set_write_timeout(Some(config.timeout))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
        .map_err(|e| TransportError::Tls(format!("invalid server name: {e}")))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    Ok(rustls::StreamOwned::new(conn, tcp))
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap an established stream and consume the server greeting.
    pub fn greet(stream: S, mailbox: &str) -> Result<Self, TransportError> {
        let mut session = Self {
            stream,
            buf: Vec::new(),
            next_tag: 1,
            mailbox: mailbox.to_string(),
        };
        let greeting = session.read_response()?;
        if !(greeting.starts_with(b"* OK") || greeting.starts_with(b"* PREAUTH")) {
            return Err(TransportError::Protocol(format!(
                "unexpected greeting: {}",
                String::from_utf8_lossy(&greeting).trim_end()
            )));
        }
        Ok(session)
    }

    /// Authenticate with LOGIN.
    pub fn login(&mut self, username: &str, password: &SecretString) -> Result<(), TransportError> {
        let command = format!(
            "LOGIN {} {}",
            quote(username),
            quote(password.expose_secret())
        );
        match self.command(&command, |_| Ok(())) {
            Err(TransportError::CommandFailed { text, .. }) => Err(TransportError::AuthFailed(text)),
            other => other,
        }
    }

    /// Select the configured mailbox read-only and return its message count.
    pub fn examine(&mut self) -> Result<u32, TransportError> {
        let mut exists = None;
        let command = format!("EXAMINE {}", quote(&self.mailbox));
        self.command(&command, |line| {
            if let Some(count) = response::parse_exists(line) {
                exists = Some(count);
            }
            Ok(())
        })?;
        exists.ok_or_else(|| TransportError::Protocol("EXAMINE returned no EXISTS count".into()))
    }

    /// Send LOGOUT. Errors are ignored; the connection is going away.
    pub fn close(&mut self) {
        let _ = self.command("LOGOUT", |_| Ok(()));
    }

    /// Send a tagged command and read until its completion line.
    ///
    /// Untagged responses are handed to `on_untagged` as they arrive.
    fn command<F>(&mut self, command: &str, mut on_untagged: F) -> Result<(), TransportError>
    where
        F: FnMut(&[u8]) -> Result<(), TransportError>,
    {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;
        self.stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        self.stream.flush()?;

        let verb = command.split(' ').next().unwrap_or(command).to_string();
        loop {
            let response = self.read_response()?;
            if let Some(tagged) = response::parse_tagged(&response)
                && tagged.tag == tag
            {
                return match tagged.status {
                    Status::Ok => Ok(()),
                    status => Err(TransportError::CommandFailed {
                        command: verb,
                        status: format!("{status:?}").to_uppercase(),
                        text: tagged.text,
                    }),
                };
            }
            if response.starts_with(b"* BYE") && verb != "LOGOUT" {
                return Err(TransportError::Closed);
            }
            on_untagged(&response)?;
        }
    }

    /// Read one complete response, including any embedded literals.
    fn read_response(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut response = Vec::new();
        loop {
            let line = self.read_line()?;
            response.extend_from_slice(&line);
            match response::literal_length(&line) {
                Some(len) if len > MAX_LITERAL_SIZE => {
                    return Err(TransportError::Protocol(format!(
                        "literal too large: {len} bytes"
                    )));
                }
                Some(len) => {
                    let literal = self.read_exact(len)?;
                    response.extend_from_slice(&literal);
                }
                None => return Ok(response),
            }
        }
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf[scanned..].windows(2).position(|w| w == b"\r\n") {
                let end = scanned + pos + 2;
                return Ok(self.buf.drain(..end).collect());
            }
            scanned = self.buf.len().saturating_sub(1);
            if self.buf.len() > MAX_LINE_LENGTH {
                return Err(TransportError::Protocol("response line too long".into()));
            }
            self.fill()?;
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        while self.buf.len() < len {
            self.fill()?;
        }
        Ok(self.buf.drain(..len).collect())
    }

    fn fill(&mut self) -> Result<(), TransportError> {
        let mut chunk = [0u8; 8192];
        let n = self.stream.read(&mut chunk)?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

impl<S: Read + Write + Send + 'static> MailStore for ImapSession<S> {
    fn message_count(&mut self) -> Result<u32, TransportError> {
        self.examine()
    }

    fn fetch_metadata(
        &mut self,
        window: SeqWindow,
        sink: &mpsc::Sender<MessageMetadata>,
    ) -> Result<(), TransportError> {
        let command = format!("FETCH {} {METADATA_ITEMS}", window.to_sequence_set());
        self.command(&command, |response| {
            let Some(fetch) = response::parse_fetch(response)? else {
                return Ok(());
            };
            match metadata_from_fetch(&fetch) {
                Some(meta) => emit(sink, meta),
                None => {
                    warn!(sequence = fetch.sequence, "Skipping message without UID or timestamp");
                    Ok(())
                }
            }
        })
    }

    fn fetch_bodies(
        &mut self,
        uids: &[u32],
        sink: &mpsc::Sender<FetchedBody>,
    ) -> Result<(), TransportError> {
        if uids.is_empty() {
            return Ok(());
        }
        let set = uids.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        let command = format!("UID FETCH {set} (UID BODY.PEEK[])");
        self.command(&command, |response| {
            let Some(fetch) = response::parse_fetch(response)? else {
                return Ok(());
            };
            let Some(uid) = fetch.uid else {
                return Ok(());
            };
            emit(
                sink,
                FetchedBody {
                    uid,
                    raw: fetch.section,
                },
            )
        })
    }

    fn logout(&mut self) {
        self.close();
    }
}

fn emit<T>(sink: &mpsc::Sender<T>, item: T) -> Result<(), TransportError> {
    sink.blocking_send(item)
        .map_err(|_| TransportError::Worker("scan consumer stopped".into()))
}

/// Build metadata from a header-fields FETCH response.
///
/// Returns `None` when the response has no UID or no usable timestamp.
fn metadata_from_fetch(fetch: &FetchResponse) -> Option<MessageMetadata> {
    let uid = fetch.uid?;
    let header = fetch.section.as_deref().unwrap_or_default();
    let parsed = MessageParser::default().parse_headers(header);

    let subject = parsed
        .as_ref()
        .and_then(|m| m.subject())
        .unwrap_or_default()
        .to_string();
    let domains = parsed
        .as_ref()
        .map(|m| sender_domains(m.from()))
        .unwrap_or_default();
    let received = parsed
        .as_ref()
        .and_then(|m| m.date())
        .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok())
        .or_else(|| fetch.internal_date.as_deref().and_then(parse_internal_date))?;

    Some(MessageMetadata {
        uid,
        sequence: fetch.sequence,
        subject,
        sender_domains: domains,
        received,
    })
}

/// Parse an IMAP INTERNALDATE (`02-Oct-2026 08:30:00 +0200`).
fn parse_internal_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}

/// Quote a string for an IMAP command.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
