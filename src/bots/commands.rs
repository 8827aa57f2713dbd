use crate::observability::METRICS;
use crate::services::prometheus::PrometheusClient;
use crate::services::status::server_status;
use html_escape::encode_text;
use promwatch::models::UserId;
use promwatch::{RemoveOutcome, UserRegistry};
use std::sync::Arc;
use teloxide::macros::BotCommands;
use url::Url;

const DENIED: &str = "You are not authorized to use this bot.";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "Start the bot.")]
    Start,
    #[command(description = "Show this help message.")]
    Help,
    #[command(description = "Get current server status.")]
    Status,
    #[command(description = "Get detailed metrics.")]
    Metrics,
    #[command(description = "Check Prometheus health.")]
    Health,
    #[command(description = "Authorize a user by ID (admins only).")]
    Adduser(String),
    #[command(description = "Revoke a user by ID (admins only).")]
    Removeuser(String),
}

impl Command {
    /// Placeholder shown while a slow command runs; edited with the result.
    pub fn progress_text(&self) -> Option<&'static str> {
        match self {
            Command::Status => Some("Fetching server status..."),
            Command::Health => Some("Checking Prometheus health..."),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
    pub first_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Silent,
}

/// Authorizes and answers bot commands. Holds no per-chat state.
pub struct CommandDispatcher {
    registry: Arc<UserRegistry>,
    prometheus: PrometheusClient,
    grafana_url: Url,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<UserRegistry>, prometheus: PrometheusClient, grafana_url: Url) -> Self {
        Self {
            registry,
            prometheus,
            grafana_url,
        }
    }

    pub fn is_authorized(&self, user_id: UserId) -> bool {
        self.registry.is_authorized(user_id)
    }

    /// Authorization runs before anything else; a denied caller causes no
    /// Prometheus traffic and no registry change.
    pub async fn execute(&self, caller: &Caller, command: Command) -> Reply {
        if !self.is_authorized(caller.user_id) {
            METRICS.increment_commands_denied();
            tracing::warn!(
                user_id = caller.user_id,
                command = ?command,
                "Unauthorized access attempt from {}",
                caller.first_name
            );
            return Reply::Text(self.denial(caller, &command));
        }

        METRICS.increment_commands_handled();
        tracing::info!(user_id = caller.user_id, command = ?command, "Handling command");

        let text = match command {
            Command::Start => self.start(caller),
            Command::Help => self.help(caller),
            Command::Status => server_status(&self.prometheus).await,
            Command::Metrics => self.metrics(),
            Command::Health => self.health().await,
            Command::Adduser(arg) => self.add_user(caller, &arg),
            Command::Removeuser(arg) => self.remove_user(caller, &arg),
        };

        Reply::Text(text)
    }

    /// Slash-messages that are not known commands. Strangers get no answer.
    pub fn unknown(&self, caller: &Caller) -> Reply {
        if !self.is_authorized(caller.user_id) {
            tracing::debug!(user_id = caller.user_id, "Ignoring unknown command");
            return Reply::Silent;
        }

        Reply::Text("❓ Unknown command. Use /help to see available commands.".to_string())
    }

    fn denial(&self, caller: &Caller, command: &Command) -> String {
        match command {
            Command::Start => format!(
                "Sorry {}, you are not authorized to use this bot.\n\
                Your user ID is: <code>{}</code>\n\n\
                Please contact the administrator to get access.",
                encode_text(&caller.first_name),
                caller.user_id
            ),
            _ => DENIED.to_string(),
        }
    }

    fn start(&self, caller: &Caller) -> String {
        format!(
            "Welcome {}!\n\n\
            🤖 <b>Server Monitoring Bot</b>\n\n\
            I will help you monitor your servers and receive alerts from Prometheus and Grafana.\n\n\
            Use /help to see available commands.",
            encode_text(&caller.first_name)
        )
    }

    fn help(&self, caller: &Caller) -> String {
        let mut text = String::from(
            "<b>Available Commands:</b>\n\n\
            /start - Start the bot\n\
            /help - Show this help message\n\
            /status - Get current server status\n\
            /metrics - Get detailed metrics\n\
            /health - Check Prometheus health",
        );

        if self.registry.is_admin(caller.user_id) {
            text.push_str(
                "\n\n<b>Admin:</b>\n\
                /adduser &lt;id&gt; - Authorize a user\n\
                /removeuser &lt;id&gt; - Revoke a user",
            );
        }

        text
    }

    fn metrics(&self) -> String {
        format!(
            "📈 <b>Detailed Metrics</b>\n\n\
            This feature will show detailed metrics for specific servers.\n\
            Coming soon!\n\n\
            Dashboards: {}",
            encode_text(self.grafana_url.as_str())
        )
    }

    async fn health(&self) -> String {
        if self.prometheus.check_health().await {
            "✅ Prometheus is healthy and reachable!".to_string()
        } else {
            format!(
                "❌ Prometheus is not reachable!\n\nURL: {}",
                encode_text(self.prometheus.base_url().as_str())
            )
        }
    }

    fn add_user(&self, caller: &Caller, arg: &str) -> String {
        let target = match self.admin_target(caller, "adduser", arg) {
            Ok(target) => target,
            Err(reply) => return reply,
        };

        match self.registry.add_user(target) {
            Ok(true) => format!("✅ User <code>{}</code> is now authorized.", target),
            Ok(false) => format!("User <code>{}</code> is already authorized.", target),
            Err(e) => {
                tracing::error!("Failed to add user {}: {}", target, e);
                format!("❌ Could not save the user list: {}", encode_text(&e.to_string()))
            }
        }
    }

    fn remove_user(&self, caller: &Caller, arg: &str) -> String {
        let target = match self.admin_target(caller, "removeuser", arg) {
            Ok(target) => target,
            Err(reply) => return reply,
        };

        match self.registry.remove_user(target) {
            Ok(RemoveOutcome::Removed) => format!("✅ User <code>{}</code> was removed.", target),
            Ok(RemoveOutcome::Pinned) => format!(
                "User <code>{}</code> is listed in the configuration file and cannot be removed here.",
                target
            ),
            Ok(RemoveOutcome::NotFound) => {
                format!("User <code>{}</code> is not in the authorized list.", target)
            }
            Err(e) => {
                tracing::error!("Failed to remove user {}: {}", target, e);
                format!("❌ Could not save the user list: {}", encode_text(&e.to_string()))
            }
        }
    }

    fn admin_target(&self, caller: &Caller, command: &str, arg: &str) -> Result<UserId, String> {
        if !self.registry.is_admin(caller.user_id) {
            tracing::warn!(user_id = caller.user_id, "Non-admin tried /{}", command);
            return Err("Only administrators can manage users.".to_string());
        }

        let arg = arg.trim();
        if arg.is_empty() {
            return Err(format!("Usage: /{} &lt;user_id&gt;", command));
        }

        arg.parse::<UserId>()
            .map_err(|_| format!("Invalid user ID: <code>{}</code>", encode_text(arg)))
    }
}
