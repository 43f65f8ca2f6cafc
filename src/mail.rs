use std::sync::Arc;

use anyhow::Context;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header},
    transport::smtp::authentication::Credentials,
};
use tokio::sync::Mutex;

use crate::config::SmtpConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email. Without an SMTP relay mail is logged and kept in the outbox.
#[derive(Clone)]
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Outbox(Arc<Mutex<Vec<OutgoingMail>>>),
}

impl Mailer {
    pub fn smtp(config: &SmtpConfig, from: &str) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .context("invalid SMTP_HOST")?
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();
        Ok(Self::Smtp {
            transport,
            from: from.parse().context("invalid EMAIL_FROM")?,
        })
    }

    pub fn outbox() -> Self {
        Self::Outbox(Arc::default())
    }

    pub async fn send(&self, to: &str, subject: &str, body: String) -> anyhow::Result<()> {
        match self {
            Self::Smtp { transport, from } => {
                let email = Message::builder()
                    .from(from.clone())
                    .to(to.parse().with_context(|| format!("invalid recipient {to}"))?)
                    .subject(subject)
                    .header(header::ContentType::TEXT_PLAIN)
                    .body(body)?;
                transport.send(email).await.context("smtp send failed")?;
            }
            Self::Outbox(outbox) => {
                tracing::info!(to, subject, "mail queued in outbox");
                outbox.lock().await.push(OutgoingMail {
                    to: to.to_owned(),
                    subject: subject.to_owned(),
                    body,
                });
            }
        }
        Ok(())
    }

    /// Everything sent through an outbox mailer so far.
    pub async fn sent(&self) -> Vec<OutgoingMail> {
        match self {
            Self::Outbox(outbox) => outbox.lock().await.clone(),
            Self::Smtp { .. } => Vec::new(),
        }
    }
}
