use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{
    next_id, CompletionLog, NewTask, OwnerId, ProgressStore, StoreMode, Tasbeeh, TasbeehLog, Task,
};
use crate::error::{EngineError, Result};
use crate::plan::{Plan, TaskCategory, DEFAULT_TASBEEHS, GUEST_TASBEEH_COUNT};

pub const GUEST_TASBEEHS_KEY: &str = "guest_tasbeehs";
pub const GUEST_PLANNER_PREFIX: &str = "guest_planner_";
pub const GUEST_SELECTED_PLAN_KEY: &str = "guest_selected_plan";
pub const GUEST_TASKS_KEY: &str = "guest_tasks";
pub const GUEST_TOTALS_PREFIX: &str = "guest_totals_";
pub const GUEST_TALLIES_PREFIX: &str = "guest_tallies_";

/// Device-scoped string key-value surface.
pub trait DeviceStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Default)]
pub struct MemoryDeviceStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryDeviceStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStorage for MemoryDeviceStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileDeviceStorage {
    root: PathBuf,
}

impl FileDeviceStorage {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(EngineError::Storage(format!("invalid device key `{key}`")));
        }
        Ok(self.root.join(key))
    }
}

impl DeviceStorage for FileDeviceStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key)?, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Guest counter; counts live under `guest_tallies_<date>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct GuestTasbeeh {
    id: String,
    name: String,
    target: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct GuestTask {
    id: String,
    name: String,
    category: TaskCategory,
    #[serde(rename = "isSystem")]
    is_system: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GuestTasks {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    tasks: Vec<GuestTask>,
}

fn default_guest_tasbeehs() -> Vec<GuestTasbeeh> {
    DEFAULT_TASBEEHS
        .iter()
        .take(GUEST_TASBEEH_COUNT)
        .enumerate()
        .map(|(idx, (name, target))| GuestTasbeeh {
            id: format!("g{}", idx + 1),
            name: name.to_string(),
            target: *target,
        })
        .collect()
}

/// Guest-mode store over a [`DeviceStorage`].
#[derive(Clone)]
pub struct LocalStore {
    device: Arc<dyn DeviceStorage>,
    owner: OwnerId,
}

impl LocalStore {
    pub fn new(device: Arc<dyn DeviceStorage>) -> Self {
        Self {
            device,
            owner: OwnerId::new("guest"),
        }
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.device.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.device.set(key, &serde_json::to_string(value)?)
    }

    /// Counters, seeding the guest defaults on first read.
    fn guest_tasbeehs(&self) -> Result<Vec<GuestTasbeeh>> {
        if let Some(saved) = self.load(GUEST_TASBEEHS_KEY)? {
            return Ok(saved);
        }
        let defaults = default_guest_tasbeehs();
        self.store(GUEST_TASBEEHS_KEY, &defaults)?;
        tracing::debug!("seeded guest tasbeehs");
        Ok(defaults)
    }

    fn guest_tasks(&self) -> Result<GuestTasks> {
        Ok(self.load(GUEST_TASKS_KEY)?.unwrap_or_default())
    }

    fn planner_key(date: NaiveDate) -> String {
        format!("{GUEST_PLANNER_PREFIX}{}", date.format("%Y-%m-%d"))
    }

    fn totals_key(date: NaiveDate) -> String {
        format!("{GUEST_TOTALS_PREFIX}{}", date.format("%Y-%m-%d"))
    }

    fn tallies_key(date: NaiveDate) -> String {
        format!("{GUEST_TALLIES_PREFIX}{}", date.format("%Y-%m-%d"))
    }

    /// Drops every dated count for the given counters so reseeded ids start at zero.
    fn purge_tallies(&self, ids: &[String]) -> Result<()> {
        for key in self.device.keys()? {
            if !key.starts_with(GUEST_TALLIES_PREFIX) {
                continue;
            }
            let mut day: BTreeMap<String, u32> = self.load(&key)?.unwrap_or_default();
            let before = day.len();
            day.retain(|id, _| !ids.contains(id));
            if day.is_empty() {
                self.device.remove(&key)?;
            } else if day.len() != before {
                self.store(&key, &day)?;
            }
        }
        Ok(())
    }

    /// Rows of one planner day, each carrying the day's largest snapshot.
    fn day_logs(&self, date: NaiveDate) -> Result<Vec<CompletionLog>> {
        let day: BTreeMap<String, bool> = self.load(&Self::planner_key(date))?.unwrap_or_default();
        let task_total: Option<u32> = self.load(&Self::totals_key(date))?;
        Ok(day
            .into_iter()
            .map(|(task_id, completed)| CompletionLog {
                owner: self.owner.clone(),
                task_id,
                date,
                completed,
                task_total,
            })
            .collect())
    }

    fn to_task(&self, task: GuestTask) -> Task {
        Task {
            id: task.id,
            name: task.name,
            category: task.category,
            is_system: task.is_system,
            owner: self.owner.clone(),
        }
    }
}

impl ProgressStore for LocalStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Local
    }

    fn owner(&self) -> &OwnerId {
        &self.owner
    }

    fn selected_plan(&self) -> Result<Option<Plan>> {
        let Some(raw) = self.device.get(GUEST_SELECTED_PLAN_KEY)? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(plan) => Ok(Some(plan)),
            Err(err) => {
                tracing::warn!(%err, "ignoring unreadable guest plan");
                Ok(None)
            }
        }
    }

    fn set_selected_plan(&self, plan: Plan) -> Result<()> {
        self.device.set(GUEST_SELECTED_PLAN_KEY, plan.as_str())
    }

    fn tasks(&self) -> Result<Vec<Task>> {
        Ok(self
            .guest_tasks()?
            .tasks
            .into_iter()
            .map(|task| self.to_task(task))
            .collect())
    }

    fn create_task(&self, task: NewTask) -> Result<Task> {
        let mut state = self.guest_tasks()?;
        state.next_id += 1;
        let created = GuestTask {
            id: format!("gt{}", state.next_id),
            name: task.name,
            category: task.category,
            is_system: task.is_system,
        };
        state.tasks.push(created.clone());
        self.store(GUEST_TASKS_KEY, &state)?;
        Ok(self.to_task(created))
    }

    fn delete_task(&self, id: &str) -> Result<()> {
        let mut state = self.guest_tasks()?;
        let idx = state
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| EngineError::not_found("task", id))?;
        state.tasks.remove(idx);
        self.store(GUEST_TASKS_KEY, &state)
    }

    fn delete_all_tasks(&self) -> Result<usize> {
        let mut state = self.guest_tasks()?;
        let removed = state.tasks.len();
        state.tasks.clear();
        self.store(GUEST_TASKS_KEY, &state)?;
        Ok(removed)
    }

    fn upsert_completion(&self, log: CompletionLog) -> Result<()> {
        if !self.tasks()?.iter().any(|task| task.id == log.task_id) {
            return Err(EngineError::not_found("task", log.task_id.as_str()));
        }
        if let Some(total) = log.task_total {
            let key = Self::totals_key(log.date);
            let previous: Option<u32> = self.load(&key)?;
            self.store(&key, &previous.map_or(total, |seen| seen.max(total)))?;
        }
        let key = Self::planner_key(log.date);
        let mut day: BTreeMap<String, bool> = self.load(&key)?.unwrap_or_default();
        day.insert(log.task_id, log.completed);
        self.store(&key, &day)
    }

    fn completions(&self) -> Result<Vec<CompletionLog>> {
        let mut logs = Vec::new();
        for key in self.device.keys()? {
            let Some(raw_date) = key.strip_prefix(GUEST_PLANNER_PREFIX) else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d") else {
                tracing::debug!(%key, "skipping malformed planner key");
                continue;
            };
            logs.extend(self.day_logs(date)?);
        }
        Ok(logs)
    }

    fn completions_on(&self, date: NaiveDate) -> Result<Vec<CompletionLog>> {
        self.day_logs(date)
    }

    fn tasbeehs(&self) -> Result<Vec<Tasbeeh>> {
        Ok(self
            .guest_tasbeehs()?
            .into_iter()
            .map(|item| Tasbeeh {
                id: item.id,
                name: item.name,
                target: item.target,
                owner: self.owner.clone(),
            })
            .collect())
    }

    fn create_tasbeeh(&self, name: &str, target: u32) -> Result<Tasbeeh> {
        let mut items = self.guest_tasbeehs()?;
        let id = next_id("g", items.iter().map(|item| item.id.as_str()));
        items.push(GuestTasbeeh {
            id: id.clone(),
            name: name.to_string(),
            target,
        });
        self.store(GUEST_TASBEEHS_KEY, &items)?;
        Ok(Tasbeeh {
            id,
            name: name.to_string(),
            target,
            owner: self.owner.clone(),
        })
    }

    fn update_tasbeeh(&self, id: &str, name: &str, target: u32) -> Result<()> {
        let mut items = self.guest_tasbeehs()?;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| EngineError::not_found("tasbeeh", id))?;
        item.name = name.to_string();
        item.target = target;
        self.store(GUEST_TASBEEHS_KEY, &items)
    }

    fn delete_tasbeeh(&self, id: &str) -> Result<()> {
        let mut items = self.guest_tasbeehs()?;
        let idx = items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| EngineError::not_found("tasbeeh", id))?;
        let removed = items.remove(idx);
        self.store(GUEST_TASBEEHS_KEY, &items)?;
        self.purge_tallies(&[removed.id])
    }

    /// Dropping the key means the next read reseeds the guest defaults.
    fn delete_all_tasbeehs(&self) -> Result<usize> {
        let ids: Vec<String> = self
            .load::<Vec<GuestTasbeeh>>(GUEST_TASBEEHS_KEY)?
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.id)
            .collect();
        self.device.remove(GUEST_TASBEEHS_KEY)?;
        self.purge_tallies(&ids)?;
        Ok(ids.len())
    }

    fn upsert_tally(&self, log: TasbeehLog) -> Result<()> {
        if !self.guest_tasbeehs()?.iter().any(|item| item.id == log.tasbeeh_id) {
            return Err(EngineError::not_found("tasbeeh", log.tasbeeh_id.as_str()));
        }
        let key = Self::tallies_key(log.date);
        let mut day: BTreeMap<String, u32> = self.load(&key)?.unwrap_or_default();
        day.insert(log.tasbeeh_id, log.count);
        self.store(&key, &day)
    }

    fn tally_on(&self, tasbeeh_id: &str, date: NaiveDate) -> Result<u32> {
        if !self.guest_tasbeehs()?.iter().any(|item| item.id == tasbeeh_id) {
            return Err(EngineError::not_found("tasbeeh", tasbeeh_id));
        }
        let day: BTreeMap<String, u32> = self
            .load(&Self::tallies_key(date))?
            .unwrap_or_default();
        Ok(day.get(tasbeeh_id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn memory_store() -> (Arc<MemoryDeviceStorage>, LocalStore) {
        let device = Arc::new(MemoryDeviceStorage::new());
        let store = LocalStore::new(device.clone());
        (device, store)
    }

    #[test]
    fn first_read_seeds_guest_tasbeehs() {
        let (device, store) = memory_store();
        assert!(device.get(GUEST_TASBEEHS_KEY).unwrap().is_none());
        let tasbeehs = store.tasbeehs().unwrap();
        assert_eq!(tasbeehs.len(), GUEST_TASBEEH_COUNT);
        assert_eq!(tasbeehs[0].id, "g1");
        assert!(device.get(GUEST_TASBEEHS_KEY).unwrap().is_some());

        assert_eq!(store.delete_all_tasbeehs().unwrap(), GUEST_TASBEEH_COUNT);
        assert_eq!(store.tasbeehs().unwrap().len(), GUEST_TASBEEH_COUNT);
    }

    #[test]
    fn tally_resets_on_a_new_day() {
        let (_, store) = memory_store();
        store
            .upsert_tally(TasbeehLog {
                tasbeeh_id: "g2".into(),
                date: date(4),
                count: 12,
            })
            .unwrap();
        assert_eq!(store.tally_on("g2", date(4)).unwrap(), 12);
        assert_eq!(store.tally_on("g2", date(5)).unwrap(), 0);
        assert!(store.tally_on("g9", date(4)).is_err());
    }

    #[test]
    fn tallies_for_earlier_days_survive_later_writes() {
        let (device, store) = memory_store();
        for (day, count) in [(4, 12), (3, 5)] {
            store
                .upsert_tally(TasbeehLog {
                    tasbeeh_id: "g1".into(),
                    date: date(day),
                    count,
                })
                .unwrap();
        }
        assert_eq!(store.tally_on("g1", date(4)).unwrap(), 12);
        assert_eq!(store.tally_on("g1", date(3)).unwrap(), 5);
        assert_eq!(
            device.get("guest_tallies_2025-03-04").unwrap().as_deref(),
            Some("{\"g1\":12}")
        );
    }

    #[test]
    fn reseeded_counters_start_from_zero() {
        let (device, store) = memory_store();
        for id in ["g1", "g2"] {
            store
                .upsert_tally(TasbeehLog {
                    tasbeeh_id: id.into(),
                    date: date(8),
                    count: 40,
                })
                .unwrap();
        }
        store.delete_tasbeeh("g2").unwrap();
        assert_eq!(
            device.get("guest_tallies_2025-03-08").unwrap().as_deref(),
            Some("{\"g1\":40}")
        );

        assert_eq!(store.delete_all_tasbeehs().unwrap(), 2);
        assert_eq!(store.tasbeehs().unwrap().len(), GUEST_TASBEEH_COUNT);
        assert_eq!(store.tally_on("g1", date(8)).unwrap(), 0);
        assert!(device.get("guest_tallies_2025-03-08").unwrap().is_none());
    }

    #[test]
    fn planner_days_are_stored_under_dated_keys() {
        let (device, store) = memory_store();
        let task = store
            .create_task(NewTask {
                name: "Pray Fajr".into(),
                category: TaskCategory::Obligatory,
                is_system: true,
            })
            .unwrap();
        store
            .upsert_completion(CompletionLog {
                owner: store.owner().clone(),
                task_id: task.id.clone(),
                date: date(6),
                completed: true,
                task_total: None,
            })
            .unwrap();
        let raw = device.get("guest_planner_2025-03-06").unwrap().unwrap();
        assert_eq!(raw, format!("{{\"{}\":true}}", task.id));
        assert!(device.get("guest_totals_2025-03-06").unwrap().is_none());

        let logs = store.completions().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].date, date(6));
        assert_eq!(store.completions_on(date(7)).unwrap().len(), 0);
    }

    #[test]
    fn snapshot_totals_keep_the_days_largest() {
        let (_, store) = memory_store();
        let mut ids = Vec::new();
        for name in ["Pray Asr", "Pray Isha"] {
            let task = store
                .create_task(NewTask {
                    name: name.into(),
                    category: TaskCategory::Obligatory,
                    is_system: true,
                })
                .unwrap();
            ids.push(task.id);
        }
        for (id, total) in ids.iter().zip([8, 5]) {
            store
                .upsert_completion(CompletionLog {
                    owner: store.owner().clone(),
                    task_id: id.clone(),
                    date: date(9),
                    completed: true,
                    task_total: Some(total),
                })
                .unwrap();
        }
        let logs = store.completions_on(date(9)).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.task_total == Some(8)));
    }

    #[test]
    fn selected_plan_is_a_bare_string() {
        let (device, store) = memory_store();
        assert_eq!(store.selected_plan().unwrap(), None);
        store.set_selected_plan(Plan::Beginner).unwrap();
        assert_eq!(
            device.get(GUEST_SELECTED_PLAN_KEY).unwrap().as_deref(),
            Some("BEGINNER")
        );
        device.set(GUEST_SELECTED_PLAN_KEY, "bogus").unwrap();
        assert_eq!(store.selected_plan().unwrap(), None);
    }

    #[test]
    fn file_storage_round_trips_keys() {
        let dir = tempfile::tempdir().unwrap();
        let device = FileDeviceStorage::open(dir.path()).unwrap();
        device.set("guest_selected_plan", "ADVANCED").unwrap();
        device.set("guest_planner_2025-03-02", "{}").unwrap();
        assert_eq!(
            device.keys().unwrap(),
            vec!["guest_planner_2025-03-02", "guest_selected_plan"]
        );
        device.remove("guest_selected_plan").unwrap();
        assert_eq!(device.get("guest_selected_plan").unwrap(), None);
        assert!(device.set("../escape", "x").is_err());
    }
}
