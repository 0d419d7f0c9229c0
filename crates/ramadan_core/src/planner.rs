//! Regimen provisioning and planner task management.
//!
//! Provisioning is additive within a regimen: required tasks are looked up
//! by name and only created when missing, so re-running it never disturbs a
//! task's accumulated logs. Switching regimens wipes the task list first.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{EngineError, Result};
use crate::plan::{required_tasks, Plan, TaskCategory, DEFAULT_TASBEEHS};
use crate::store::{NewTask, ProgressStore, Task};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannerEntry {
    pub task: Task,
    pub completed: bool,
}

/// Planner grid for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannerSetup {
    pub plan: Plan,
    pub entries: Vec<PlannerEntry>,
}

impl Default for PlannerSetup {
    fn default() -> Self {
        Self {
            plan: Plan::default(),
            entries: Vec::new(),
        }
    }
}

pub fn current_plan(store: &dyn ProgressStore) -> Result<Plan> {
    Ok(store.selected_plan()?.unwrap_or_default())
}

/// Create the regimen's required tasks that the owner does not have yet.
/// Returns how many were created.
pub fn provision(store: &dyn ProgressStore, plan: Plan) -> Result<usize> {
    let existing = store.tasks()?;
    let mut created = 0;
    for template in required_tasks(plan) {
        if existing.iter().any(|task| task.name == template.name) {
            continue;
        }
        store.create_task(NewTask {
            name: template.name.to_string(),
            category: template.category,
            is_system: template.is_system,
        })?;
        created += 1;
    }
    if created > 0 {
        tracing::debug!(owner = %store.owner(), %plan, created, "provisioned tasks");
    }
    Ok(created)
}

/// Seed the default counters unless the owner already has any.
pub fn seed_tasbeehs(store: &dyn ProgressStore) -> Result<usize> {
    if !store.tasbeehs()?.is_empty() {
        return Ok(0);
    }
    for (name, target) in DEFAULT_TASBEEHS {
        store.create_tasbeeh(name, target)?;
    }
    tracing::debug!(owner = %store.owner(), "seeded default tasbeehs");
    Ok(DEFAULT_TASBEEHS.len())
}

/// Provision the selected regimen and the default counters.
pub fn ensure_default_data(store: &dyn ProgressStore) -> Result<Plan> {
    let plan = current_plan(store)?;
    provision(store, plan)?;
    seed_tasbeehs(store)?;
    Ok(plan)
}

/// Replace the owner's task list with the new regimen's.
///
/// Custom tasks are discarded along with the old ones. Their completion logs
/// stay behind, detached from any task.
#[instrument(skip(store), fields(owner = %store.owner()))]
pub fn select_plan(store: &dyn ProgressStore, plan: Plan) -> Result<usize> {
    let removed = store.delete_all_tasks()?;
    let created = provision(store, plan)?;
    store.set_selected_plan(plan)?;
    tracing::info!(removed, created, "switched plan");
    Ok(created)
}

/// Drop every task and re-provision the current regimen.
#[instrument(skip(store), fields(owner = %store.owner()))]
pub fn reset_planner(store: &dyn ProgressStore) -> Result<usize> {
    let plan = current_plan(store)?;
    store.delete_all_tasks()?;
    provision(store, plan)
}

pub fn planner_setup(store: &dyn ProgressStore, date: NaiveDate) -> Result<PlannerSetup> {
    let plan = ensure_default_data(store)?;
    let logs = store.completions_on(date)?;
    let entries = store
        .tasks()?
        .into_iter()
        .map(|task| {
            let completed = logs
                .iter()
                .any(|log| log.task_id == task.id && log.completed);
            PlannerEntry { task, completed }
        })
        .collect();
    Ok(PlannerSetup { plan, entries })
}

pub fn add_task(store: &dyn ProgressStore, name: &str, category: TaskCategory) -> Result<Task> {
    if !category.allows_custom_tasks() {
        return Err(EngineError::ClosedCategory(category));
    }
    store.create_task(NewTask {
        name: name.trim().to_string(),
        category,
        is_system: false,
    })
}

pub fn delete_task(store: &dyn ProgressStore, id: &str) -> Result<()> {
    let task = store.task(id)?;
    if task.is_system {
        return Err(EngineError::SystemTask { id: task.id });
    }
    store.delete_task(id)
}
