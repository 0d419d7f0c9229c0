//! Completion and tally bookkeeping plus the aggregates built on it.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::store::{CompletionLog, ProgressStore, TasbeehLog};

/// Longest walk back from today when counting a streak.
pub const STREAK_WINDOW_DAYS: u32 = 30;

/// How the denominator of a day's progress is chosen.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TotalPolicy {
    /// The owner's task count at query time, for every date.
    #[default]
    CurrentTaskCount,
    /// The task count stored on the day's logs when they were written.
    SnapshotAtWrite,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayProgress {
    pub completed: u32,
    pub total: u32,
}

impl DayProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (f64::from(self.completed) / f64::from(self.total) * 100.0).min(100.0)
    }

    pub fn rounded_percent(&self) -> u32 {
        self.percent().round() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressLedger {
    policy: TotalPolicy,
}

impl ProgressLedger {
    pub fn new(policy: TotalPolicy) -> Self {
        Self { policy }
    }

    /// Upsert the (task, date) row.
    #[instrument(skip(self, store), fields(owner = %store.owner()))]
    pub fn toggle_completion(
        &self,
        store: &dyn ProgressStore,
        task_id: &str,
        date: NaiveDate,
        completed: bool,
    ) -> Result<()> {
        let task = store.task(task_id)?;
        let task_total = match self.policy {
            TotalPolicy::CurrentTaskCount => None,
            TotalPolicy::SnapshotAtWrite => Some(count_u32(store.task_count()?)),
        };
        store.upsert_completion(CompletionLog {
            owner: store.owner().clone(),
            task_id: task.id,
            date,
            completed,
            task_total,
        })
    }

    /// Overwrite the day's running total for a counter with `count`.
    #[instrument(skip(self, store), fields(owner = %store.owner()))]
    pub fn record_tally(
        &self,
        store: &dyn ProgressStore,
        tasbeeh_id: &str,
        date: NaiveDate,
        count: u32,
    ) -> Result<()> {
        let tasbeeh = store.tasbeeh(tasbeeh_id)?;
        store.upsert_tally(TasbeehLog {
            tasbeeh_id: tasbeeh.id,
            date,
            count,
        })
    }

    /// Read-modify-write on top of [`record_tally`](Self::record_tally).
    pub fn increment_tally(
        &self,
        store: &dyn ProgressStore,
        tasbeeh_id: &str,
        date: NaiveDate,
    ) -> Result<u32> {
        let count = store.tally_on(tasbeeh_id, date)?.saturating_add(1);
        self.record_tally(store, tasbeeh_id, date, count)?;
        Ok(count)
    }

    pub fn day_progress(&self, store: &dyn ProgressStore, date: NaiveDate) -> Result<DayProgress> {
        let current = count_u32(store.task_count()?);
        let logs = store.completions_on(date)?;
        Ok(self.summarize(&logs, current))
    }

    /// Progress for every date that has at least one completion row.
    pub fn month_progress(
        &self,
        store: &dyn ProgressStore,
    ) -> Result<BTreeMap<NaiveDate, DayProgress>> {
        let current = count_u32(store.task_count()?);
        let mut by_date: BTreeMap<NaiveDate, Vec<CompletionLog>> = BTreeMap::new();
        for log in store.completions()? {
            by_date.entry(log.date).or_default().push(log);
        }
        Ok(by_date
            .into_iter()
            .map(|(date, logs)| (date, self.summarize(&logs, current)))
            .collect())
    }

    pub fn compute_streak(&self, store: &dyn ProgressStore, today: NaiveDate) -> Result<u32> {
        Ok(streak_from(&self.month_progress(store)?, today))
    }

    fn summarize(&self, logs: &[CompletionLog], current: u32) -> DayProgress {
        let completed = count_u32(logs.iter().filter(|log| log.completed).count());
        let total = match self.policy {
            TotalPolicy::CurrentTaskCount => current,
            TotalPolicy::SnapshotAtWrite => logs
                .iter()
                .filter_map(|log| log.task_total)
                .max()
                .unwrap_or(current),
        };
        DayProgress { completed, total }
    }
}

fn count_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Consecutive complete days ending today. An unfinished today does not
/// break the run; any earlier gap does.
pub fn streak_from(progress: &BTreeMap<NaiveDate, DayProgress>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    for offset in 0..STREAK_WINDOW_DAYS {
        let date = today - Duration::days(i64::from(offset));
        let complete = progress.get(&date).is_some_and(DayProgress::is_complete);
        if complete {
            streak += 1;
        } else if offset > 0 {
            break;
        }
    }
    streak
}

pub fn completed_days(progress: &BTreeMap<NaiveDate, DayProgress>) -> u32 {
    count_u32(progress.values().filter(|day| day.is_complete()).count())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    StreakMaster,
    Superstar,
    Champion,
    Diamond,
}

impl Badge {
    pub const ALL: [Badge; 4] = [
        Badge::StreakMaster,
        Badge::Superstar,
        Badge::Champion,
        Badge::Diamond,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Badge::StreakMaster => "Streak Master",
            Badge::Superstar => "Superstar",
            Badge::Champion => "Champion",
            Badge::Diamond => "Diamond",
        }
    }

    pub fn is_earned(self, streak: u32, completed_days: u32) -> bool {
        match self {
            Badge::StreakMaster => streak >= 3,
            Badge::Superstar => completed_days >= 10,
            Badge::Champion => completed_days >= 20,
            Badge::Diamond => completed_days >= 29,
        }
    }
}

/// Every badge earned; tiers are evaluated independently.
pub fn badges(streak: u32, completed_days: u32) -> Vec<Badge> {
    Badge::ALL
        .into_iter()
        .filter(|badge| badge.is_earned(streak, completed_days))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TasbeehBadge {
    Seedling,
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl TasbeehBadge {
    pub fn threshold(self) -> u32 {
        match self {
            TasbeehBadge::Seedling => 0,
            TasbeehBadge::Bronze => 100,
            TasbeehBadge::Silver => 500,
            TasbeehBadge::Gold => 1000,
            TasbeehBadge::Diamond => 5000,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TasbeehBadge::Seedling => "Seedling",
            TasbeehBadge::Bronze => "Bronze",
            TasbeehBadge::Silver => "Silver",
            TasbeehBadge::Gold => "Gold",
            TasbeehBadge::Diamond => "Diamond",
        }
    }
}

/// Highest tier whose threshold `count` reaches.
pub fn tasbeeh_badge(count: u32) -> TasbeehBadge {
    [
        TasbeehBadge::Diamond,
        TasbeehBadge::Gold,
        TasbeehBadge::Silver,
        TasbeehBadge::Bronze,
    ]
    .into_iter()
    .find(|badge| count >= badge.threshold())
    .unwrap_or(TasbeehBadge::Seedling)
}

/// Share of the target reached, capped at 100.
pub fn tally_progress(count: u32, target: u32) -> f64 {
    if target == 0 {
        return 100.0;
    }
    (f64::from(count) / f64::from(target)).min(1.0) * 100.0
}

pub fn is_milestone(count: u32) -> bool {
    count > 0 && count % 100 == 0
}
