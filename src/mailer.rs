//! Outbound mail service client.
//!
//! The worker renders a notification from the payment slice and hands it to
//! the configured mail service over HTTP. The trait seam keeps the outbox
//! worker testable with a recording fake.

use crate::config::MailerConfig;
use crate::db::MailPayment;
use crate::model::{format_centavos, format_date, MailKind};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Payload posted to the mail service for one notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MailMessage {
    pub event: &'static str,
    pub payment_id: i64,
    pub to: Option<String>,
    pub customer_name: String,
    pub invoice_number: Option<String>,
    pub ournumber: Option<String>,
    pub value: String,
    pub paid_value: String,
    pub due_date: String,
}

impl MailMessage {
    pub fn render(kind: MailKind, payment: &MailPayment) -> Self {
        MailMessage {
            event: kind.as_str(),
            payment_id: payment.payment_id,
            to: payment.customer_email.clone(),
            customer_name: payment.customer_name.clone(),
            invoice_number: payment.invoice_number.clone(),
            ournumber: payment.ournumber.clone(),
            value: format_centavos(payment.value_cents),
            paid_value: format_centavos(payment.paid_value_cents),
            due_date: format_date(Some(payment.due_date)),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Production mailer: posts each notification to the mail service endpoint.
pub struct WebhookMailer {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl WebhookMailer {
    pub fn from_config(cfg: &MailerConfig) -> Self {
        WebhookMailer {
            client: reqwest::Client::new(),
            endpoint: cfg.endpoint.clone(),
            token: cfg.token.clone(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        debug!(payment_id = message.payment_id, event = message.event, "posting mail job");
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "mail service returned {} for payment {}",
                resp.status(),
                message.payment_id
            ));
        }
        Ok(())
    }
}
