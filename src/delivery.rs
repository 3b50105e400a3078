//! Outbound delivery of rendered invoices over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::DeliveryError;
use crate::pipeline::types::NamedArtifact;

/// Port on which SMTP expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsMode {
    Implicit,
    StartTls,
}

impl TlsMode {
    fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            Self::Implicit
        } else {
            Self::StartTls
        }
    }
}

/// Envelope and text of the outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Sends one message carrying every artifact of a run.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(
        &self,
        mail: &OutgoingMail,
        attachments: &[NamedArtifact],
    ) -> Result<(), DeliveryError>;
}

/// SMTP submission endpoint and credentials.
#[derive(Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Delivers through an authenticated SMTP relay.
pub struct SmtpDeliverer {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl SmtpDeliverer {
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            credentials: Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ),
        }
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let builder = match TlsMode::for_port(self.port) {
            TlsMode::Implicit => SmtpTransport::relay(&self.host),
            TlsMode::StartTls => SmtpTransport::starttls_relay(&self.host),
        }
        .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?;

        Ok(builder
            .port(self.port)
            .credentials(self.credentials.clone())
            .build())
    }
}

#[async_trait]
impl Deliverer for SmtpDeliverer {
    async fn deliver(
        &self,
        mail: &OutgoingMail,
        attachments: &[NamedArtifact],
    ) -> Result<(), DeliveryError> {
        let message = build_message(mail, attachments)?;
        let transport = self.transport()?;
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DeliveryError::Worker(e.to_string()))?
            .map_err(|e| DeliveryError::Transport(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

/// Build a `multipart/mixed` message: the text body, then one PDF per artifact.
pub fn build_message(
    mail: &OutgoingMail,
    attachments: &[NamedArtifact],
) -> Result<Message, DeliveryError> {
    let pdf = ContentType::parse("application/pdf")
        .map_err(|e| DeliveryError::Build(format!("content type: {e}")))?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    for artifact in attachments {
        parts = parts.singlepart(
            Attachment::new(artifact.filename.clone()).body(artifact.payload.clone(), pdf.clone()),
        );
    }

    Message::builder()
        .from(parse_mailbox("from", &mail.from)?)
        .to(parse_mailbox("to", &mail.to)?)
        .subject(mail.subject.clone())
        .multipart(parts)
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

fn parse_mailbox(field: &str, address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            field: field.into(),
            reason: e.to_string(),
        })
}
