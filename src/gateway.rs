use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;

use crate::{error::MessageDispatchError, messages};

/// Delivers a text message to a phone number.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, phone_number: &str, text: &str) -> Result<(), MessageDispatchError>;
}

/// Turns each message into a WhatsApp click-to-chat link and hands it to
/// whoever opens links for the user (the terminal host prints them).
pub struct WhatsAppLinkGateway {
    dialing_code: String,
    opener: mpsc::UnboundedSender<String>,
}

impl WhatsAppLinkGateway {
    pub fn new(dialing_code: impl Into<String>, opener: mpsc::UnboundedSender<String>) -> Self {
        Self {
            dialing_code: dialing_code.into(),
            opener,
        }
    }
}

#[async_trait]
impl MessagingGateway for WhatsAppLinkGateway {
    async fn send(&self, phone_number: &str, text: &str) -> Result<(), MessageDispatchError> {
        let link = messages::whatsapp_link(phone_number, text, &self.dialing_code)
            .ok_or_else(|| MessageDispatchError::InvalidRecipient(phone_number.to_string()))?;

        self.opener
            .send(link)
            .map_err(|_| MessageDispatchError::Transport("link opener is closed".into()))?;

        info!("queued WhatsApp message to {}", phone_number);
        Ok(())
    }
}
