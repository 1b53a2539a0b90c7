use teloxide::prelude::*;

/// Best-effort plain-text notice to the admin group; failures are only
/// logged.
pub async fn notify_admin_group(bot: &Bot, admin_group_id: Option<i64>, text: &str) {
    let Some(chat_id) = admin_group_id.filter(|id| *id != 0) else {
        return;
    };
    if let Err(err) = bot.send_message(ChatId(chat_id), text).await {
        tracing::warn!(
            target: "telegram",
            error = %err,
            admin_group_id = chat_id,
            "failed to send admin notification"
        );
    }
}
