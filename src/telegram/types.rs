use std::sync::Arc;

use chrono_tz::Tz;
use teloxide::utils::command::BotCommands;

use crate::{commands::CommandService, config::AppConfig, source::FeedPoller};

pub type BotResult<T> = Result<T, teloxide::RequestError>;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub commands: CommandService,
    pub poller: Arc<FeedPoller>,
    pub timezone: Tz,
}

impl AppState {
    pub fn is_admin_user(&self, user_id: i64) -> bool {
        self.config.admin_user_id == Some(user_id)
    }

    /// Rule and stats changes are accepted from the admin user in a private
    /// chat or in the admin group.
    pub fn may_mutate(&self, chat_id: i64, user_id: Option<i64>) -> bool {
        let Some(user_id) = user_id else {
            return false;
        };
        if !self.is_admin_user(user_id) {
            return false;
        }
        chat_id == user_id || self.config.admin_group_id == Some(chat_id)
    }
}

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "사용 가능한 명령어:")]
pub enum FeedCommand {
    #[command(description = "봇 소개")]
    Start,
    #[command(description = "도움말")]
    Help,
    #[command(description = "필터 상태 요약")]
    Status,
    #[command(description = "현재 규칙 전체 보기")]
    Rules,
    #[command(description = "필터링 켜기")]
    Enable,
    #[command(description = "필터링 끄기")]
    Disable,
    #[command(description = "필터링 일시 중지 (분, 생략 시 기본값)")]
    Pause(String),
    #[command(description = "집중 모드 on/off")]
    Focus(String),
    #[command(description = "규칙 추가: /add <종류> <값>")]
    Add(String),
    #[command(description = "규칙 제거: /remove <종류> <값>")]
    Remove(String),
    #[command(description = "규칙 초기화")]
    ResetRules,
    #[command(description = "필터 통계")]
    Stats,
    #[command(description = "통계 초기화")]
    ResetStats,
    #[command(description = "피드 미리보기 (/feed [r/이름 | search:검색어])")]
    Feed(String),
    #[command(description = "응답 확인")]
    Ping,
}

impl FeedCommand {
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            FeedCommand::Enable
                | FeedCommand::Disable
                | FeedCommand::Pause(_)
                | FeedCommand::Focus(_)
                | FeedCommand::Add(_)
                | FeedCommand::Remove(_)
                | FeedCommand::ResetRules
                | FeedCommand::ResetStats
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_free_form_arguments() {
        assert_eq!(
            FeedCommand::parse("/add keyword breaking news", "feedbot").unwrap(),
            FeedCommand::Add("keyword breaking news".into())
        );
        assert_eq!(
            FeedCommand::parse("/pause", "feedbot").unwrap(),
            FeedCommand::Pause(String::new())
        );
        assert_eq!(
            FeedCommand::parse("/reset_stats", "feedbot").unwrap(),
            FeedCommand::ResetStats
        );
        assert!(FeedCommand::ResetStats.requires_admin());
        assert!(!FeedCommand::Feed(String::new()).requires_admin());
    }
}
