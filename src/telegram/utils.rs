use std::convert::TryFrom;

use chrono::Utc;
use chrono_tz::Tz;
use teloxide::types::User;

use crate::{
    commands::{CommandResponse, RuleSummary},
    domain::{RuleList, RuleSet, Stats},
    source::VisibleItem,
};

const PREVIEW_TITLE_MAX: usize = 80;

pub fn user_to_i64(user: &User) -> i64 {
    i64::try_from(user.id.0).unwrap_or(i64::MAX)
}

/// `<type> <value...>`; the value may contain spaces.
pub fn split_entry_args(args: &str) -> Option<(String, String)> {
    let args = args.trim();
    let (kind, value) = args.split_once(char::is_whitespace)?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some((kind.to_string(), value.to_string()))
}

pub fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "true" | "1" | "켜기" => Some(true),
        "off" | "false" | "0" | "끄기" => Some(false),
        _ => None,
    }
}

/// Empty means the configured default; anything else must be a positive
/// number of minutes.
pub fn parse_minutes(arg: &str) -> Result<Option<u32>, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(None);
    }
    match arg.parse::<u32>() {
        Ok(minutes) if minutes > 0 => Ok(Some(minutes)),
        _ => Err(arg.to_string()),
    }
}

pub fn format_rules(rules: &RuleSet, tz: Tz) -> String {
    let mut message = RuleSummary::of(rules, Utc::now()).render(tz);
    for list in RuleList::ALL {
        let entries = rules.list(list);
        if entries.is_empty() {
            continue;
        }
        message.push_str(&format!("\n\n{}:\n{}", list.name(), entries.join(", ")));
    }
    message
}

pub fn format_stats(stats: &Stats) -> String {
    format!(
        "필터 통계\n- 처리: {}\n- 표시: {}\n- 숨김: {}\n  · 키워드: {}\n  · 집중 모드: {}\n  · 서브레딧: {}\n  · 사용자: {}",
        stats.total_processed,
        stats.shown,
        stats.total_hidden,
        stats.hidden_by_blocked_keyword,
        stats.hidden_by_focus_mode,
        stats.hidden_by_subreddit,
        stats.hidden_by_user,
    )
}

pub fn format_feed(view: &str, items: &[VisibleItem]) -> String {
    if items.is_empty() {
        return format!("{view}: 표시할 게시물이 없습니다.");
    }
    let mut message = format!("{view} 최신 게시물:\n");
    for (idx, visible) in items.iter().enumerate() {
        let title = visible.item.title.as_deref().unwrap_or("(제목 없음)");
        let title: String = if title.chars().count() > PREVIEW_TITLE_MAX {
            let cut: String = title.chars().take(PREVIEW_TITLE_MAX).collect();
            format!("{cut}…")
        } else {
            title.to_string()
        };
        message.push_str(&format!(
            "\n{}. {} (r/{})",
            idx + 1,
            title,
            visible.item.subreddit.as_deref().unwrap_or("?")
        ));
    }
    message
}

/// Reply text for a failed command.
pub fn describe_failure(response: &CommandResponse) -> String {
    let reason = match response.error.as_deref() {
        Some("Invalid rule type") => {
            "알 수 없는 규칙 종류입니다. (keyword, domain, user, sub, flair, focus)".to_string()
        }
        Some("Invalid value") => "값이 비어 있습니다.".to_string(),
        Some(other) => other.to_string(),
        None => "알 수 없는 오류".to_string(),
    };
    format!("요청을 처리하지 못했습니다: {reason}")
}
