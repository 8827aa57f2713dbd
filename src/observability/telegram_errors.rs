use super::METRICS;
use teloxide::{ApiError, RequestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramErrorKind {
    RateLimited,
    BotBlocked,
    ChatNotFound,
    NetworkError,
    Other,
}

impl TelegramErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            TelegramErrorKind::RateLimited => "rate limited",
            TelegramErrorKind::BotBlocked => "bot blocked",
            TelegramErrorKind::ChatNotFound => "chat not found",
            TelegramErrorKind::NetworkError => "network error",
            TelegramErrorKind::Other => "telegram error",
        }
    }
}

pub fn classify_telegram_error(error: &RequestError) -> TelegramErrorKind {
    match error {
        RequestError::RetryAfter(_) => TelegramErrorKind::RateLimited,
        RequestError::Api(ApiError::BotBlocked)
        | RequestError::Api(ApiError::BotKicked)
        | RequestError::Api(ApiError::UserDeactivated) => TelegramErrorKind::BotBlocked,
        RequestError::Api(ApiError::ChatNotFound) | RequestError::Api(ApiError::UserNotFound) => {
            TelegramErrorKind::ChatNotFound
        }
        RequestError::Api(api_error) => {
            let error_str = api_error.to_string().to_lowercase();
            if error_str.contains("blocked") {
                TelegramErrorKind::BotBlocked
            } else if error_str.contains("chat not found") || error_str.contains("user not found") {
                TelegramErrorKind::ChatNotFound
            } else {
                TelegramErrorKind::Other
            }
        }
        RequestError::Network(_) => TelegramErrorKind::NetworkError,
        _ => TelegramErrorKind::Other,
    }
}

/// Logs a failed send with a level matching how actionable it is.
pub fn log_telegram_error(error: &RequestError, chat_id: i64, context: &str) -> TelegramErrorKind {
    let kind = classify_telegram_error(error);
    METRICS.increment_delivery_failures();

    match kind {
        TelegramErrorKind::RateLimited => {
            tracing::warn!(chat_id, "Telegram rate limit hit while {}: {}", context, error);
        }
        TelegramErrorKind::BotBlocked => {
            tracing::info!(chat_id, "Bot blocked by user while {}", context);
        }
        TelegramErrorKind::ChatNotFound => {
            tracing::warn!(chat_id, "Chat not found on Telegram while {}", context);
        }
        TelegramErrorKind::NetworkError => {
            tracing::error!(chat_id, "Network error while {}: {}", context, error);
        }
        TelegramErrorKind::Other => {
            tracing::error!(chat_id, "Telegram error while {}: {}", context, error);
        }
    }

    kind
}
