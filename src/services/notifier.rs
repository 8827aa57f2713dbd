use crate::observability::telegram_errors::{log_telegram_error, TelegramErrorKind};
use crate::observability::METRICS;
use crate::utils::message::truncate_message;
use async_trait::async_trait;
use promwatch::models::UserId;
use std::fmt;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub chat_id: i64,
    pub kind: TelegramErrorKind,
    pub message: String,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Delivery to chat {} failed ({}): {}",
            self.chat_id,
            self.kind.label(),
            self.message
        )
    }
}

impl std::error::Error for DeliveryError {}

/// Outbound message sink. Failures are returned, never panicked.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let message = truncate_message(text.to_string());
        tracing::debug!(chat_id, "Sending message: {}", message);

        match self
            .bot
            .send_message(ChatId(chat_id), message)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => {
                METRICS.increment_messages_sent();
                Ok(())
            }
            Err(e) => {
                let kind = log_telegram_error(&e, chat_id, "sending notification");
                Err(DeliveryError {
                    chat_id,
                    kind,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOutReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: Vec<i64>,
}

/// Sends `text` to every recipient in turn. One failed recipient does not stop
/// the others.
pub async fn fan_out(
    notifier: &dyn Notifier,
    recipients: impl IntoIterator<Item = UserId>,
    text: &str,
) -> FanOutReport {
    let mut report = FanOutReport::default();

    for chat_id in recipients {
        report.attempted += 1;
        match notifier.send(chat_id, text).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::error!("Failed to deliver to {}: {}", chat_id, e);
                report.failed.push(chat_id);
            }
        }
    }

    report
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every send; fails for the chats listed in `failing`.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(i64, String)>>,
        pub failing: HashSet<i64>,
    }

    impl RecordingNotifier {
        pub fn failing_for(chats: &[i64]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: chats.iter().copied().collect(),
            }
        }

        pub fn calls(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            if self.failing.contains(&chat_id) {
                return Err(DeliveryError {
                    chat_id,
                    kind: TelegramErrorKind::BotBlocked,
                    message: "Forbidden: bot was blocked by the user".into(),
                });
            }
            Ok(())
        }
    }
}
