use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::ledger::{self, Badge, DayProgress};

pub const WEEK_DAYS: i64 = 7;
pub const MONTH_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HeatLevel {
    Empty,
    Low,
    Medium,
    High,
    Full,
}

impl HeatLevel {
    pub fn for_percent(percent: u32) -> Self {
        match percent {
            0 => HeatLevel::Empty,
            1..=29 => HeatLevel::Low,
            30..=59 => HeatLevel::Medium,
            60..=99 => HeatLevel::High,
            _ => HeatLevel::Full,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyBar {
    pub date: NaiveDate,
    pub percent: u32,
    pub weekday: Weekday,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeatCell {
    pub date: NaiveDate,
    pub percent: u32,
    pub day: u32,
    pub level: HeatLevel,
}

/// Dashboard statistics derived from a month progress map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressReport {
    pub today_percent: u32,
    pub streak: u32,
    pub completed_days: u32,
    pub active_days: u32,
    pub badges: Vec<Badge>,
    /// Oldest first, ending today.
    pub weekly: Vec<WeeklyBar>,
    /// Oldest first, ending today.
    pub monthly: Vec<HeatCell>,
}

impl ProgressReport {
    pub fn build(progress: &BTreeMap<NaiveDate, DayProgress>, today: NaiveDate) -> Self {
        let percent_on = |date: NaiveDate| {
            progress
                .get(&date)
                .map(DayProgress::rounded_percent)
                .unwrap_or(0)
        };
        let streak = ledger::streak_from(progress, today);
        let completed_days = ledger::completed_days(progress);

        let weekly = trailing_days(today, WEEK_DAYS)
            .map(|date| WeeklyBar {
                date,
                percent: percent_on(date),
                weekday: date.weekday(),
            })
            .collect();
        let monthly = trailing_days(today, MONTH_DAYS)
            .map(|date| {
                let percent = percent_on(date);
                HeatCell {
                    date,
                    percent,
                    day: date.day(),
                    level: HeatLevel::for_percent(percent),
                }
            })
            .collect();

        Self {
            today_percent: percent_on(today),
            streak,
            completed_days,
            active_days: active_days(progress),
            badges: ledger::badges(streak, completed_days),
            weekly,
            monthly,
        }
    }
}

/// Days with at least one completed task; rows toggled back off do not count.
fn active_days(progress: &BTreeMap<NaiveDate, DayProgress>) -> u32 {
    let active = progress.values().filter(|day| day.completed > 0).count();
    u32::try_from(active).unwrap_or(u32::MAX)
}

fn trailing_days(today: NaiveDate, count: i64) -> impl Iterator<Item = NaiveDate> {
    (0..count).rev().map(move |back| today - Duration::days(back))
}
