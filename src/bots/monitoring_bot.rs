use crate::bots::commands::{Caller, Command, CommandDispatcher, Reply};
use crate::utils::message::truncate_message;
use std::sync::Arc;
use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::dptree;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{Me, ParseMode};

fn caller_of(msg: &Message) -> Option<Caller> {
    msg.from().map(|user| Caller {
        user_id: user.id.0 as i64,
        first_name: user.first_name.clone(),
    })
}

fn is_slash_command(msg: &Message) -> bool {
    msg.text().map(|text| text.starts_with('/')).unwrap_or(false)
}

async fn command_handler(
    bot: Bot,
    msg: Message,
    command: Command,
    dispatcher: Arc<CommandDispatcher>,
) -> ResponseResult<()> {
    let Some(caller) = caller_of(&msg) else {
        return Ok(());
    };

    let progress = match command.progress_text() {
        Some(text) if dispatcher.is_authorized(caller.user_id) => {
            Some(bot.send_message(msg.chat.id, text).await?)
        }
        _ => None,
    };

    let Reply::Text(text) = dispatcher.execute(&caller, command).await else {
        return Ok(());
    };
    let text = truncate_message(text);

    match progress {
        Some(progress) => {
            bot.edit_message_text(msg.chat.id, progress.id, text)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, text)
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }

    Ok(())
}

async fn unknown_command_handler(
    bot: Bot,
    msg: Message,
    dispatcher: Arc<CommandDispatcher>,
) -> ResponseResult<()> {
    let Some(caller) = caller_of(&msg) else {
        return Ok(());
    };

    if let Reply::Text(text) = dispatcher.unknown(&caller) {
        bot.send_message(msg.chat.id, text).await?;
    }

    Ok(())
}

/// Long-polls Telegram until Ctrl-C.
pub async fn run_bot(bot: Bot, dispatcher: Arc<CommandDispatcher>) {
    match bot.get_me().await {
        Ok(Me { user, .. }) => {
            tracing::info!("Starting bot @{}", user.username.unwrap_or_default())
        }
        Err(e) => tracing::error!("Could not fetch bot info: {}", e),
    }

    let handler = Update::filter_message()
        .branch(dptree::entry().filter_command::<Command>().endpoint(command_handler))
        .branch(dptree::filter(|msg: Message| is_slash_command(&msg)).endpoint(unknown_command_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .default_handler(|_| async {})
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("Bot stopped");
}
