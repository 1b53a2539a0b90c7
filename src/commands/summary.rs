use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::{RuleList, RuleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    Active,
    Paused { until: DateTime<Utc> },
    Disabled,
}

/// Compact description of a rule set: status banner plus one chip per
/// non-empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSummary {
    pub status: FilterStatus,
    pub chips: Vec<(RuleList, usize)>,
    pub focus_mode: bool,
}

impl RuleSummary {
    pub fn of(rules: &RuleSet, now: DateTime<Utc>) -> Self {
        let status = if !rules.enabled {
            FilterStatus::Disabled
        } else {
            match rules
                .paused_until
                .filter(|until| *until > now.timestamp_millis())
                .and_then(|until| Utc.timestamp_millis_opt(until).single())
            {
                Some(until) => FilterStatus::Paused { until },
                None => FilterStatus::Active,
            }
        };
        let chips = RuleList::ALL
            .iter()
            .map(|list| (*list, rules.list(*list).len()))
            .filter(|(_, count)| *count > 0)
            .collect();
        Self {
            status,
            chips,
            focus_mode: rules.focus_mode_enabled,
        }
    }

    pub fn banner(&self, tz: Tz) -> String {
        match self.status {
            FilterStatus::Active => "🟢 필터링 활성화".to_string(),
            FilterStatus::Disabled => "⚪ 필터링 꺼짐".to_string(),
            FilterStatus::Paused { until } => format!(
                "⏸️ {}까지 일시 중지",
                until.with_timezone(&tz).format("%Y-%m-%d %H:%M")
            ),
        }
    }

    pub fn render(&self, tz: Tz) -> String {
        let mut lines = vec![self.banner(tz)];
        if self.focus_mode {
            lines.push("🎯 집중 모드 켜짐".to_string());
        }
        if self.chips.is_empty() {
            lines.push("등록된 규칙 없음".to_string());
        } else {
            let chips: Vec<String> = self
                .chips
                .iter()
                .map(|(list, count)| format!("{} {count}", list.name()))
                .collect();
            lines.push(chips.join(" · "));
        }
        lines.join("\n")
    }
}
