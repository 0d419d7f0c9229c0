//! Storage collaborators behind one read/write contract.
//!
//! [`PersistedStore`] serves an authenticated owner from the shared
//! [`Database`]; [`LocalStore`] serves a guest from a device key-value
//! surface. The engine only ever talks to [`ProgressStore`].

pub mod local;
pub mod persisted;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::plan::{Plan, TaskCategory};

pub use local::{DeviceStorage, FileDeviceStorage, LocalStore, MemoryDeviceStorage};
pub use persisted::{Database, PersistedStore};

/// Opaque identity supplied by the auth collaborator, or the device key in
/// guest mode.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    Persisted,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub category: TaskCategory,
    pub is_system: bool,
    pub owner: OwnerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub category: TaskCategory,
    pub is_system: bool,
}

/// At most one row per (task, date); re-toggling overwrites in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionLog {
    pub owner: OwnerId,
    pub task_id: String,
    pub date: NaiveDate,
    pub completed: bool,
    /// Owner's task count when the row was written, if snapshotting is on.
    #[serde(default)]
    pub task_total: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tasbeeh {
    pub id: String,
    pub name: String,
    pub target: u32,
    pub owner: OwnerId,
}

/// Running total for one counter on one day, overwritten on every update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TasbeehLog {
    pub tasbeeh_id: String,
    pub date: NaiveDate,
    pub count: u32,
}

/// Owner-scoped CRUD surface shared by the persisted and local stores.
pub trait ProgressStore: Send + Sync {
    fn mode(&self) -> StoreMode;

    fn owner(&self) -> &OwnerId;

    fn selected_plan(&self) -> Result<Option<Plan>>;

    fn set_selected_plan(&self, plan: Plan) -> Result<()>;

    /// Tasks in creation order.
    fn tasks(&self) -> Result<Vec<Task>>;

    fn create_task(&self, task: NewTask) -> Result<Task>;

    fn delete_task(&self, id: &str) -> Result<()>;

    fn delete_all_tasks(&self) -> Result<usize>;

    fn upsert_completion(&self, log: CompletionLog) -> Result<()>;

    fn completions(&self) -> Result<Vec<CompletionLog>>;

    /// Counters in creation order.
    fn tasbeehs(&self) -> Result<Vec<Tasbeeh>>;

    fn create_tasbeeh(&self, name: &str, target: u32) -> Result<Tasbeeh>;

    fn update_tasbeeh(&self, id: &str, name: &str, target: u32) -> Result<()>;

    fn delete_tasbeeh(&self, id: &str) -> Result<()>;

    fn delete_all_tasbeehs(&self) -> Result<usize>;

    fn upsert_tally(&self, log: TasbeehLog) -> Result<()>;

    /// Count recorded for `date`, zero when nothing was logged.
    fn tally_on(&self, tasbeeh_id: &str, date: NaiveDate) -> Result<u32>;

    fn task(&self, id: &str) -> Result<Task> {
        self.tasks()?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| EngineError::not_found("task", id))
    }

    fn find_task_by_name(&self, name: &str) -> Result<Option<Task>> {
        Ok(self.tasks()?.into_iter().find(|task| task.name == name))
    }

    fn task_count(&self) -> Result<usize> {
        Ok(self.tasks()?.len())
    }

    fn completions_on(&self, date: NaiveDate) -> Result<Vec<CompletionLog>> {
        Ok(self
            .completions()?
            .into_iter()
            .filter(|log| log.date == date)
            .collect())
    }

    fn tasbeeh(&self, id: &str) -> Result<Tasbeeh> {
        self.tasbeehs()?
            .into_iter()
            .find(|tasbeeh| tasbeeh.id == id)
            .ok_or_else(|| EngineError::not_found("tasbeeh", id))
    }
}

/// Next id for a prefix given the ids already handed out (`t3` -> `t4`).
pub(crate) fn next_id<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let highest = existing
        .filter_map(|id| id.strip_prefix(prefix))
        .filter_map(|rest| rest.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{}", highest + 1)
}
