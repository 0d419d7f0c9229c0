use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Devotional regimen. Regimens are mutually exclusive: switching replaces the
/// whole task list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    Beginner,
    Advanced,
    #[default]
    Independent,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Beginner, Plan::Advanced, Plan::Independent];

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Beginner => "BEGINNER",
            Plan::Advanced => "ADVANCED",
            Plan::Independent => "INDEPENDENT",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan `{0}`")]
pub struct UnknownPlan(pub String);

impl FromStr for Plan {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BEGINNER" => Ok(Plan::Beginner),
            "ADVANCED" => Ok(Plan::Advanced),
            "INDEPENDENT" => Ok(Plan::Independent),
            _ => Err(UnknownPlan(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    Obligatory,
    Spiritual,
    GoodDeeds,
}

impl TaskCategory {
    /// Whether end users may add their own tasks to this category.
    pub fn allows_custom_tasks(self) -> bool {
        !matches!(self, TaskCategory::Obligatory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTemplate {
    pub name: &'static str,
    pub category: TaskCategory,
    pub is_system: bool,
}

const fn template(name: &'static str, category: TaskCategory, is_system: bool) -> TaskTemplate {
    TaskTemplate {
        name,
        category,
        is_system,
    }
}

pub const QURAN_TARGET_TASK: &str = "Daily Quran Target";

const DAILY_PRAYERS: [TaskTemplate; 5] = [
    template("Pray Fajr", TaskCategory::Obligatory, true),
    template("Pray Dhuhr", TaskCategory::Obligatory, true),
    template("Pray Asr", TaskCategory::Obligatory, true),
    template("Pray Maghrib", TaskCategory::Obligatory, true),
    template("Pray Isha", TaskCategory::Obligatory, true),
];

const BEGINNER_EXTRAS: [TaskTemplate; 2] = [
    template(QURAN_TARGET_TASK, TaskCategory::Spiritual, true),
    template("Give Sadaqah", TaskCategory::GoodDeeds, false),
];

const ADVANCED_EXTRAS: [TaskTemplate; 6] = [
    template(QURAN_TARGET_TASK, TaskCategory::Spiritual, true),
    template("Tahajjud Prayer", TaskCategory::Spiritual, true),
    template("Morning Adhkar", TaskCategory::Spiritual, false),
    template("Evening Adhkar", TaskCategory::Spiritual, false),
    template("Give Sadaqah", TaskCategory::GoodDeeds, false),
    template("No Backbiting", TaskCategory::GoodDeeds, false),
];

const INDEPENDENT_EXTRAS: [TaskTemplate; 2] = [
    template("Read Quran", TaskCategory::Spiritual, false),
    template("Taraweeh", TaskCategory::Spiritual, false),
];

/// Canonical task list a regimen requires, in display order.
pub fn required_tasks(plan: Plan) -> Vec<TaskTemplate> {
    let mut tasks: Vec<TaskTemplate> = DAILY_PRAYERS.to_vec();
    match plan {
        Plan::Beginner => {
            tasks.push(template("Taraweeh", TaskCategory::Spiritual, true));
            tasks.extend_from_slice(&BEGINNER_EXTRAS);
        }
        Plan::Advanced => {
            tasks.push(template("Taraweeh", TaskCategory::Spiritual, true));
            tasks.extend_from_slice(&ADVANCED_EXTRAS);
        }
        Plan::Independent => tasks.extend_from_slice(&INDEPENDENT_EXTRAS),
    }
    tasks
}

/// Reading target for a season day (1-based) under a regimen.
///
/// Beginners read one para a day to finish once; the advanced regimen reads
/// two a day to finish twice.
pub fn quran_target(plan: Plan, ramadan_day: u32) -> Option<String> {
    let day = ramadan_day.clamp(1, 30);
    match plan {
        Plan::Beginner => Some(format!("Para {day}")),
        Plan::Advanced => {
            let first = (2 * day - 2) % 30 + 1;
            Some(format!("Para {first}-{}", first + 1))
        }
        Plan::Independent => None,
    }
}

/// Name shown in the planner for a task on a given season day.
pub fn task_display_name(name: &str, plan: Plan, ramadan_day: u32) -> String {
    if name == QURAN_TARGET_TASK {
        if let Some(target) = quran_target(plan, ramadan_day) {
            return format!("Quran: {target}");
        }
    }
    name.to_string()
}

/// Counters seeded once per owner on first use.
pub const DEFAULT_TASBEEHS: [(&str, u32); 6] = [
    ("সুবহানাল্লাহ", 1000),
    ("আলহামদুলিল্লাহ", 1000),
    ("আল্লাহু আকবার", 1000),
    ("আস্তাগফিরুল্লাহ", 100),
    ("লা ইলাহা ইল্লাল্লাহ", 100),
    ("দরূদ শরীফ", 100),
];

/// Guests start with the first three counters only.
pub const GUEST_TASBEEH_COUNT: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_tables_have_expected_sizes() {
        assert_eq!(required_tasks(Plan::Beginner).len(), 8);
        assert_eq!(required_tasks(Plan::Advanced).len(), 12);
        assert_eq!(required_tasks(Plan::Independent).len(), 7);
    }

    #[test]
    fn independent_marks_only_prayers_as_system() {
        let tasks = required_tasks(Plan::Independent);
        let system: Vec<&str> = tasks
            .iter()
            .filter(|task| task.is_system)
            .map(|task| task.name)
            .collect();
        assert_eq!(system.len(), 5);
        assert!(system.iter().all(|name| name.starts_with("Pray ")));
    }

    #[test]
    fn task_names_are_unique_per_plan() {
        for plan in Plan::ALL {
            let tasks = required_tasks(plan);
            let mut names: Vec<&str> = tasks.iter().map(|task| task.name).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), tasks.len(), "{plan}");
        }
    }

    #[test]
    fn plan_parses_case_insensitively() {
        assert_eq!("beginner".parse::<Plan>().unwrap(), Plan::Beginner);
        assert_eq!(" ADVANCED ".parse::<Plan>().unwrap(), Plan::Advanced);
        assert!("casual".parse::<Plan>().is_err());
        assert_eq!(Plan::default(), Plan::Independent);
        assert_eq!(
            serde_json::to_string(&Plan::Independent).unwrap(),
            "\"INDEPENDENT\""
        );
    }

    #[test]
    fn quran_target_follows_regimen() {
        assert_eq!(quran_target(Plan::Beginner, 7).as_deref(), Some("Para 7"));
        assert_eq!(quran_target(Plan::Advanced, 1).as_deref(), Some("Para 1-2"));
        assert_eq!(quran_target(Plan::Advanced, 16).as_deref(), Some("Para 1-2"));
        assert_eq!(quran_target(Plan::Advanced, 15).as_deref(), Some("Para 29-30"));
        assert_eq!(quran_target(Plan::Independent, 3), None);
        assert_eq!(
            task_display_name(QURAN_TARGET_TASK, Plan::Beginner, 3),
            "Quran: Para 3"
        );
        assert_eq!(
            task_display_name(QURAN_TARGET_TASK, Plan::Independent, 3),
            QURAN_TARGET_TASK
        );
        assert_eq!(task_display_name("Pray Asr", Plan::Beginner, 3), "Pray Asr");
    }
}
