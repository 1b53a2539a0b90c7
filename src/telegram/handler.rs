use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use teloxide::{
    dispatching::Dispatcher,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{BotCommandScope, ChatId, Message, Recipient},
    update_listeners,
    utils::command::BotCommands,
};
use tokio::time::Instant;

use crate::{
    commands::{Command, CommandResponse, CommandService, RuleSummary},
    config::{AppConfig, FeedTarget},
    infrastructure::shutdown::ShutdownListener,
    source::FeedPoller,
};

use super::{
    types::{AppState, BotResult, FeedCommand},
    utils::{
        describe_failure, format_feed, format_rules, format_stats, parse_minutes, parse_toggle,
        split_entry_args, user_to_i64,
    },
};

const FEED_PREVIEW_LIMIT: usize = 10;

pub struct TelegramService {
    bot: Bot,
    state: Arc<AppState>,
}

impl TelegramService {
    pub fn new(
        bot: Bot,
        config: Arc<AppConfig>,
        commands: CommandService,
        poller: Arc<FeedPoller>,
    ) -> Self {
        let timezone = config.timezone.parse().unwrap_or(chrono_tz::Asia::Seoul);
        let state = Arc::new(AppState {
            config,
            commands,
            poller,
            timezone,
        });
        Self { bot, state }
    }

    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        self.sync_commands().await?;
        let me = self.bot.get_me().await?;
        tracing::info!(
            target: "telegram",
            bot_id = me.id.0,
            username = ?me.username,
            "Telegram 봇 연결 완료"
        );

        let handler = Update::filter_message().branch(
            dptree::entry()
                .filter_command::<FeedCommand>()
                .endpoint(Self::on_command),
        );

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.state.clone()])
            .default_handler(|update| async move {
                tracing::debug!(target: "telegram", ?update, "unhandled update");
            })
            .build();

        let listener = update_listeners::polling_default(self.bot.clone()).await;
        let shutdown_token = dispatcher.shutdown_token();
        let mut dispatcher_future = Box::pin(dispatcher.dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("update listener error"),
        ));
        let mut dispatcher_finished = false;

        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!(target: "telegram", "텔레그램 디스패처 종료 요청 수신");
                if let Ok(wait) = shutdown_token.shutdown() {
                    wait.await;
                }
            }
            _ = &mut dispatcher_future => {
                dispatcher_finished = true;
                tracing::info!(target: "telegram", "텔레그램 디스패처 종료 완료");
            }
        }

        if !dispatcher_finished {
            dispatcher_future.await;
        }

        Ok(())
    }

    async fn on_command(
        bot: Bot,
        msg: Message,
        cmd: FeedCommand,
        state: Arc<AppState>,
    ) -> BotResult<()> {
        let user_id = msg.from.as_ref().map(user_to_i64);
        if cmd.requires_admin() && !state.may_mutate(msg.chat.id.0, user_id) {
            bot.send_message(msg.chat.id, "이 명령어는 관리자만 사용할 수 있습니다.")
                .await?;
            return Ok(());
        }

        let reply = match cmd {
            FeedCommand::Start => {
                "안녕하세요! 피드 필터 봇입니다.\n/help 로 명령어를 확인하세요.".to_string()
            }
            FeedCommand::Help => FeedCommand::descriptions().to_string(),
            FeedCommand::Status => {
                let response = state.commands.handle(Command::GetRules).await;
                match &response.rules {
                    Some(rules) => RuleSummary::of(rules, Utc::now()).render(state.timezone),
                    None => describe_failure(&response),
                }
            }
            FeedCommand::Rules => {
                let response = state.commands.handle(Command::GetRules).await;
                match &response.rules {
                    Some(rules) => format_rules(rules, state.timezone),
                    None => describe_failure(&response),
                }
            }
            FeedCommand::Enable => {
                Self::apply(&state, Command::SetEnabled { enabled: true }, "필터링을 켰습니다.").await
            }
            FeedCommand::Disable => {
                Self::apply(&state, Command::SetEnabled { enabled: false }, "필터링을 껐습니다.")
                    .await
            }
            FeedCommand::Pause(arg) => match parse_minutes(&arg) {
                Ok(minutes) => {
                    Self::apply(&state, Command::PauseFor { minutes }, "필터링을 일시 중지했습니다.")
                        .await
                }
                Err(bad) => format!("올바른 분 단위 숫자를 입력하세요: {bad}"),
            },
            FeedCommand::Focus(arg) => match parse_toggle(&arg) {
                Some(enabled) => {
                    let done = if enabled {
                        "집중 모드를 켰습니다."
                    } else {
                        "집중 모드를 껐습니다."
                    };
                    Self::apply(&state, Command::SetFocusMode { enabled }, done).await
                }
                None => "사용법: /focus on 또는 /focus off".to_string(),
            },
            FeedCommand::Add(args) => match split_entry_args(&args) {
                Some((rule_type, value)) => {
                    Self::apply(&state, Command::AddRuleEntry { rule_type, value }, "규칙을 추가했습니다.")
                        .await
                }
                None => "사용법: /add <종류> <값> (예: /add keyword 정치)".to_string(),
            },
            FeedCommand::Remove(args) => match split_entry_args(&args) {
                Some((rule_type, value)) => {
                    Self::apply(
                        &state,
                        Command::RemoveRuleEntry { rule_type, value },
                        "규칙을 제거했습니다.",
                    )
                    .await
                }
                None => "사용법: /remove <종류> <값>".to_string(),
            },
            FeedCommand::ResetRules => {
                Self::apply(&state, Command::ResetRules, "규칙을 기본값으로 초기화했습니다.").await
            }
            FeedCommand::Stats => {
                let response = state.commands.handle(Command::GetStats).await;
                match &response.stats {
                    Some(stats) => format_stats(stats),
                    None => describe_failure(&response),
                }
            }
            FeedCommand::ResetStats => {
                let response = state.commands.handle(Command::ResetStats).await;
                if response.success {
                    "통계를 초기화했습니다.".to_string()
                } else {
                    describe_failure(&response)
                }
            }
            FeedCommand::Feed(arg) => Self::feed_preview(&state, &arg),
            FeedCommand::Ping => {
                let start = Instant::now();
                let response = state.commands.handle(Command::Ping).await;
                format!(
                    "{} ({:.3}초)",
                    response.message.as_deref().unwrap_or("PONG"),
                    start.elapsed().as_secs_f64()
                )
            }
        };

        bot.send_message(msg.chat.id, reply).await?;
        Ok(())
    }

    async fn apply(state: &AppState, command: Command, done: &str) -> String {
        let response: CommandResponse = state.commands.handle(command).await;
        if !response.success {
            return describe_failure(&response);
        }
        let mut reply = done.to_string();
        match response.message.as_deref() {
            Some("already present") => reply = "이미 등록된 규칙입니다.".to_string(),
            Some("not found") => reply = "등록되지 않은 규칙입니다.".to_string(),
            _ => {}
        }
        if let Some(rules) = &response.rules {
            let summary = RuleSummary::of(rules, Utc::now());
            reply.push_str("\n\n");
            reply.push_str(&summary.render(state.timezone));
        }
        reply
    }

    fn feed_preview(state: &AppState, arg: &str) -> String {
        let feed = if arg.trim().is_empty() {
            state.poller.feeds().first().cloned()
        } else {
            match FeedTarget::parse(arg) {
                Ok(target) => state.poller.find(&target),
                Err(_) => return format!("알 수 없는 피드 형식입니다: {}", arg.trim()),
            }
        };
        let Some(feed) = feed else {
            return "설정되지 않은 피드입니다.".to_string();
        };
        let feed = feed.lock();
        format_feed(&feed.target().to_string(), &feed.visible_items(FEED_PREVIEW_LIMIT))
    }

    async fn sync_commands(&self) -> BotResult<()> {
        let commands = FeedCommand::bot_commands();
        self.bot.set_my_commands(commands.clone()).await?;
        if let Some(admin_group_id) = self.state.config.admin_group_id {
            self.bot
                .set_my_commands(commands)
                .scope(BotCommandScope::Chat {
                    chat_id: Recipient::Id(ChatId(admin_group_id)),
                })
                .await?;
        }
        tracing::info!(target: "telegram", "명령어 동기화 완료");
        Ok(())
    }
}
