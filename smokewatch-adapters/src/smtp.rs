//! SMTP relay for text alerts.
//!
//! Sends each notification as a plain-text email, typically to a carrier's
//! email-to-SMS gateway address, over a STARTTLS connection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use smokewatch_adapters::smtp::SmtpNotifier;
//! use smokewatch_adapters::Notifier;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let notifier = SmtpNotifier::builder()
//!         .relay("smtp.gmail.com", 587)
//!         .credentials("pitmaster@example.com", "app-password")
//!         .from("pitmaster@example.com")
//!         .to("5555550123@vtext.com")
//!         .build()?;
//!
//!     notifier.notify("Food A stall alert!").await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::{Notifier, NotifyError};

const SUBJECT: &str = "smokewatch alert";

/// Notifier that relays text through an SMTP server.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    /// Create a new builder for configuring the notifier.
    pub fn builder() -> SmtpNotifierBuilder {
        SmtpNotifierBuilder::default()
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string())
            .map_err(|e| NotifyError::Message(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        info!(relay = %self.host, to = %self.to, "text alert sent");
        Ok(())
    }
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("host", &self.host)
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SmtpNotifier`].
#[derive(Default)]
pub struct SmtpNotifierBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl SmtpNotifierBuilder {
    /// Set the relay host and port (default port: 587).
    pub fn relay(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Set the login used for the relay.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the sender address.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Set the recipient address (e.g. an email-to-SMS gateway).
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    /// Build the notifier.
    ///
    /// No connection is made until the first notification is sent.
    pub fn build(self) -> Result<SmtpNotifier, NotifyError> {
        let host = self
            .host
            .ok_or_else(|| NotifyError::Config("relay host is required".to_string()))?;
        let to = parse_mailbox("recipient", self.to)?;
        // The sender falls back to the login name, as most relays require.
        let from = parse_mailbox("sender", self.from.or_else(|| self.username.clone()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
            .map_err(|e| NotifyError::Config(format!("relay {}: {}", host, e)))?
            .port(self.port.unwrap_or(587));
        if let (Some(username), Some(password)) = (self.username, self.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(SmtpNotifier {
            transport: builder.build(),
            host,
            from,
            to,
        })
    }
}

fn parse_mailbox(role: &str, address: Option<String>) -> Result<Mailbox, NotifyError> {
    let address =
        address.ok_or_else(|| NotifyError::Config(format!("{} address is required", role)))?;
    address
        .parse()
        .map_err(|e| NotifyError::Config(format!("invalid {} address '{}': {}", role, address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_host() {
        let err = SmtpNotifier::builder().to("a@example.com").build().unwrap_err();
        assert!(matches!(err, NotifyError::Config(msg) if msg.contains("host")));
    }

    #[test]
    fn test_builder_rejects_bad_recipient() {
        let err = SmtpNotifier::builder()
            .relay("smtp.example.com", 587)
            .from("me@example.com")
            .to("not an address")
            .build()
            .unwrap_err();
        assert!(matches!(err, NotifyError::Config(msg) if msg.contains("recipient")));
    }

    #[test]
    fn test_sender_defaults_to_username() {
        let notifier = SmtpNotifier::builder()
            .relay("smtp.example.com", 587)
            .credentials("me@example.com", "secret")
            .to("5555550123@vtext.com")
            .build()
            .unwrap();
        assert_eq!(notifier.from.email.to_string(), "me@example.com");
        assert!(!format!("{:?}", notifier).contains("secret"));
    }
}
