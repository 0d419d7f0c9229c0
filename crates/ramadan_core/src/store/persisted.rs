use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{CompletionLog, NewTask, OwnerId, ProgressStore, StoreMode, Tasbeeh, TasbeehLog, Task};
use crate::error::{EngineError, Result};
use crate::plan::Plan;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerRecord {
    #[serde(default)]
    pub selected_plan: Option<Plan>,
    #[serde(default)]
    pub district_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    owners: BTreeMap<OwnerId, OwnerRecord>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    completions: Vec<CompletionLog>,
    #[serde(default)]
    tasbeehs: Vec<Tasbeeh>,
    #[serde(default)]
    tallies: Vec<TasbeehLog>,
}

impl Tables {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

/// Multi-owner persistence with optional JSON snapshot on disk.
///
/// Ids are never reused, so rows orphaned by a task deletion can never attach
/// to a later task.
pub struct Database {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl Database {
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
        }
    }

    /// Open a file-backed database, starting empty if the file is absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Tables::default()
        };
        tracing::debug!(path = %path.display(), "opened persisted store");
        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    pub fn register_owner(&self, owner: &OwnerId) -> Result<bool> {
        self.mutate(|tables| {
            if tables.owners.contains_key(owner) {
                return Ok(false);
            }
            tables.owners.insert(owner.clone(), OwnerRecord::default());
            Ok(true)
        })
    }

    pub fn has_owner(&self, owner: &OwnerId) -> bool {
        self.tables.read().owners.contains_key(owner)
    }

    pub fn owner_record(&self, owner: &OwnerId) -> Option<OwnerRecord> {
        self.tables.read().owners.get(owner).cloned()
    }

    pub fn set_owner_district(&self, owner: &OwnerId, district_id: &str) -> Result<()> {
        self.mutate(|tables| {
            let record = tables
                .owners
                .get_mut(owner)
                .ok_or_else(|| EngineError::not_found("owner", owner.as_str()))?;
            record.district_id = Some(district_id.to_string());
            Ok(())
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&*self.tables.read())
    }

    /// Changes are staged on a copy and only become visible once the
    /// snapshot is on disk.
    fn mutate<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        let value = f(&mut staged)?;
        if let Some(path) = &self.path {
            write_atomic(path, &serde_json::to_string_pretty(&staged)?)?;
        }
        *tables = staged;
        Ok(value)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// View of the [`Database`] scoped to one authenticated owner.
#[derive(Clone)]
pub struct PersistedStore {
    db: Arc<Database>,
    owner: OwnerId,
}

impl PersistedStore {
    /// Requires an owner that the database knows about.
    pub fn open(db: Arc<Database>, owner: Option<&OwnerId>) -> Result<Self> {
        let owner = owner.ok_or(EngineError::Unauthorized)?;
        if !db.has_owner(owner) {
            return Err(EngineError::not_found("owner", owner.as_str()));
        }
        Ok(Self {
            db,
            owner: owner.clone(),
        })
    }

    fn owns_task(&self, tables: &Tables, id: &str) -> bool {
        tables
            .tasks
            .iter()
            .any(|task| task.id == id && task.owner == self.owner)
    }

    fn owns_tasbeeh(&self, tables: &Tables, id: &str) -> bool {
        tables
            .tasbeehs
            .iter()
            .any(|tasbeeh| tasbeeh.id == id && tasbeeh.owner == self.owner)
    }
}

impl ProgressStore for PersistedStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Persisted
    }

    fn owner(&self) -> &OwnerId {
        &self.owner
    }

    fn selected_plan(&self) -> Result<Option<Plan>> {
        Ok(self
            .db
            .read(|tables| tables.owners.get(&self.owner).and_then(|r| r.selected_plan)))
    }

    fn set_selected_plan(&self, plan: Plan) -> Result<()> {
        self.db.mutate(|tables| {
            tables
                .owners
                .entry(self.owner.clone())
                .or_default()
                .selected_plan = Some(plan);
            Ok(())
        })
    }

    fn tasks(&self) -> Result<Vec<Task>> {
        Ok(self.db.read(|tables| {
            tables
                .tasks
                .iter()
                .filter(|task| task.owner == self.owner)
                .cloned()
                .collect()
        }))
    }

    fn create_task(&self, task: NewTask) -> Result<Task> {
        self.db.mutate(|tables| {
            let created = Task {
                id: tables.allocate_id("t"),
                name: task.name,
                category: task.category,
                is_system: task.is_system,
                owner: self.owner.clone(),
            };
            tables.tasks.push(created.clone());
            Ok(created)
        })
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    fn delete_task(&self, id: &str) -> Result<()> {
        self.db.mutate(|tables| {
            let idx = tables
                .tasks
                .iter()
                .position(|task| task.id == id && task.owner == self.owner)
                .ok_or_else(|| EngineError::not_found("task", id))?;
            tables.tasks.remove(idx);
            Ok(())
        })
    }

    fn delete_all_tasks(&self) -> Result<usize> {
        self.db.mutate(|tables| {
            let before = tables.tasks.len();
            tables.tasks.retain(|task| task.owner != self.owner);
            Ok(before - tables.tasks.len())
        })
    }

    fn upsert_completion(&self, log: CompletionLog) -> Result<()> {
        self.db.mutate(|tables| {
            if !self.owns_task(tables, &log.task_id) {
                return Err(EngineError::not_found("task", log.task_id.as_str()));
            }
            let log = CompletionLog {
                owner: self.owner.clone(),
                ..log
            };
            match tables
                .completions
                .iter_mut()
                .find(|row| row.task_id == log.task_id && row.date == log.date)
            {
                Some(row) => *row = log,
                None => tables.completions.push(log),
            }
            Ok(())
        })
    }

    fn completions(&self) -> Result<Vec<CompletionLog>> {
        Ok(self.db.read(|tables| {
            tables
                .completions
                .iter()
                .filter(|log| log.owner == self.owner)
                .cloned()
                .collect()
        }))
    }

    fn tasbeehs(&self) -> Result<Vec<Tasbeeh>> {
        Ok(self.db.read(|tables| {
            tables
                .tasbeehs
                .iter()
                .filter(|tasbeeh| tasbeeh.owner == self.owner)
                .cloned()
                .collect()
        }))
    }

    fn create_tasbeeh(&self, name: &str, target: u32) -> Result<Tasbeeh> {
        self.db.mutate(|tables| {
            let created = Tasbeeh {
                id: tables.allocate_id("s"),
                name: name.to_string(),
                target,
                owner: self.owner.clone(),
            };
            tables.tasbeehs.push(created.clone());
            Ok(created)
        })
    }

    fn update_tasbeeh(&self, id: &str, name: &str, target: u32) -> Result<()> {
        self.db.mutate(|tables| {
            let tasbeeh = tables
                .tasbeehs
                .iter_mut()
                .find(|tasbeeh| tasbeeh.id == id && tasbeeh.owner == self.owner)
                .ok_or_else(|| EngineError::not_found("tasbeeh", id))?;
            tasbeeh.name = name.to_string();
            tasbeeh.target = target;
            Ok(())
        })
    }

    fn delete_tasbeeh(&self, id: &str) -> Result<()> {
        self.db.mutate(|tables| {
            let idx = tables
                .tasbeehs
                .iter()
                .position(|tasbeeh| tasbeeh.id == id && tasbeeh.owner == self.owner)
                .ok_or_else(|| EngineError::not_found("tasbeeh", id))?;
            tables.tasbeehs.remove(idx);
            Ok(())
        })
    }

    fn delete_all_tasbeehs(&self) -> Result<usize> {
        self.db.mutate(|tables| {
            let before = tables.tasbeehs.len();
            tables.tasbeehs.retain(|tasbeeh| tasbeeh.owner != self.owner);
            Ok(before - tables.tasbeehs.len())
        })
    }

    fn upsert_tally(&self, log: TasbeehLog) -> Result<()> {
        self.db.mutate(|tables| {
            if !self.owns_tasbeeh(tables, &log.tasbeeh_id) {
                return Err(EngineError::not_found("tasbeeh", log.tasbeeh_id.as_str()));
            }
            match tables
                .tallies
                .iter_mut()
                .find(|row| row.tasbeeh_id == log.tasbeeh_id && row.date == log.date)
            {
                Some(row) => row.count = log.count,
                None => tables.tallies.push(log),
            }
            Ok(())
        })
    }

    fn tally_on(&self, tasbeeh_id: &str, date: NaiveDate) -> Result<u32> {
        self.db.read(|tables| {
            if !self.owns_tasbeeh(tables, tasbeeh_id) {
                return Err(EngineError::not_found("tasbeeh", tasbeeh_id));
            }
            Ok(tables
                .tallies
                .iter()
                .find(|row| row.tasbeeh_id == tasbeeh_id && row.date == date)
                .map(|row| row.count)
                .unwrap_or(0))
        })
    }
}
