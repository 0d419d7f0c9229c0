use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::clock::{Clock, Countdown, EventClock, FixedClock, SystemClock};
use crate::error::EngineError;
use crate::ledger::{self, DayProgress, ProgressLedger, TasbeehBadge, TotalPolicy};
use crate::plan::{self, Plan, TaskCategory};
use crate::planner::{self, PlannerSetup};
use crate::report::ProgressReport;
use crate::schedule::{self, DaySchedule, District, ReferenceData, ScheduleCatalog};
use crate::session::Session;
use crate::store::{
    Database, DeviceStorage, MemoryDeviceStorage, OwnerId, ProgressStore, StoreMode, Tasbeeh,
    Task,
};

/// A counter together with the count logged for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TasbeehTally {
    pub tasbeeh: Tasbeeh,
    pub count: u32,
}

impl TasbeehTally {
    pub fn progress_percent(&self) -> f64 {
        ledger::tally_progress(self.count, self.tasbeeh.target)
    }

    pub fn badge(&self) -> TasbeehBadge {
        ledger::tasbeeh_badge(self.count)
    }

    pub fn is_milestone(&self) -> bool {
        ledger::is_milestone(self.count)
    }
}

/// Engine facade. Every operation is a soft failure: errors are logged and
/// turned into an empty, false or default result.
pub struct CompanionService {
    catalog: ScheduleCatalog,
    district: District,
    schedule: Arc<Vec<DaySchedule>>,
    ledger: ProgressLedger,
    session: Session,
}

pub struct CompanionServiceBuilder {
    data: Option<ReferenceData>,
    district: Option<String>,
    season_start: Option<NaiveDate>,
    policy: TotalPolicy,
    database: Option<Arc<Database>>,
    device: Option<Arc<dyn DeviceStorage>>,
    owner: Option<OwnerId>,
}

impl CompanionServiceBuilder {
    pub fn new() -> Self {
        Self {
            data: None,
            district: None,
            season_start: None,
            policy: TotalPolicy::default(),
            database: None,
            device: None,
            owner: None,
        }
    }

    pub fn with_reference_data(mut self, data: ReferenceData) -> Self {
        self.data = Some(data);
        self
    }

    /// District id or display name.
    pub fn with_district(mut self, key: impl Into<String>) -> Self {
        self.district = Some(key.into());
        self
    }

    pub fn with_season_start(mut self, start: NaiveDate) -> Self {
        self.season_start = Some(start);
        self
    }

    pub fn with_total_policy(mut self, policy: TotalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_database(mut self, database: Arc<Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_device_storage(mut self, device: Arc<dyn DeviceStorage>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn build(self) -> Result<CompanionService> {
        let mut data = match self.data {
            Some(data) => data,
            None => ReferenceData::embedded()?,
        };
        if self.season_start.is_some() {
            data.season_start = self.season_start;
        }

        let district = Self::pick_district(&data, self.district.as_deref())?;
        let catalog = ScheduleCatalog::new(data);
        let schedule = catalog
            .schedule_for(&district)
            .with_context(|| format!("unable to derive schedule for {}", district.id))?;

        let database = self
            .database
            .unwrap_or_else(|| Arc::new(Database::in_memory()));
        let device = self
            .device
            .unwrap_or_else(|| Arc::new(MemoryDeviceStorage::new()));
        let session = Session::bootstrap(self.owner.as_ref(), Arc::clone(&database), device);
        if session.mode() == StoreMode::Persisted {
            if let Err(err) = database.set_owner_district(session.owner(), &district.id) {
                tracing::warn!(%err, "unable to remember owner district");
            }
        }

        tracing::info!(district = %district.id, mode = ?session.mode(), "companion ready");
        Ok(CompanionService {
            catalog,
            district,
            schedule,
            ledger: ProgressLedger::new(self.policy),
            session,
        })
    }

    fn pick_district(data: &ReferenceData, key: Option<&str>) -> Result<District> {
        if let Some(key) = key {
            if let Some(district) = data.resolve_district(key) {
                return Ok(district.clone());
            }
            tracing::warn!(district = key, "unknown district, using default");
        }
        data.default_district()
            .cloned()
            .ok_or_else(|| anyhow!("reference data lists no districts"))
    }
}

impl Default for CompanionServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompanionService {
    pub fn builder() -> CompanionServiceBuilder {
        CompanionServiceBuilder::new()
    }

    pub fn district(&self) -> &District {
        &self.district
    }

    pub fn districts(&self) -> &[District] {
        &self.catalog.data().districts
    }

    pub fn schedule(&self) -> &[DaySchedule] {
        &self.schedule
    }

    /// Derived schedule for any district, by id or name.
    pub fn schedule_for(&self, district: &str) -> Option<Arc<Vec<DaySchedule>>> {
        let Some(found) = self.catalog.data().resolve_district(district) else {
            tracing::warn!(district, "district not found");
            return None;
        };
        match self.catalog.schedule_for(found) {
            Ok(schedule) => Some(schedule),
            Err(err) => {
                tracing::error!(district = %found.id, %err, "unable to derive schedule");
                None
            }
        }
    }

    pub fn event_clock(&self) -> EventClock<SystemClock> {
        self.event_clock_with(SystemClock)
    }

    pub fn event_clock_with<C: Clock>(&self, clock: C) -> EventClock<C> {
        EventClock::new(
            Arc::clone(&self.schedule),
            self.catalog.season_start(),
            clock,
        )
    }

    pub fn countdown_at(&self, now: NaiveDateTime) -> Option<Countdown> {
        self.event_clock_with(FixedClock(now)).tick()
    }

    /// Entry of the district schedule that applies on `date`.
    pub fn day_schedule(&self, date: NaiveDate) -> Option<&DaySchedule> {
        schedule::today_index(&self.schedule, date, self.catalog.season_start())
            .map(|idx| &self.schedule[idx])
    }

    /// Season day (1-based) used for reading targets.
    pub fn season_day(&self, date: NaiveDate) -> u32 {
        schedule::season_day(&self.schedule, date, self.catalog.season_start()).unwrap_or(1)
    }

    pub fn mode(&self) -> StoreMode {
        self.session.mode()
    }

    pub fn owner(&self) -> &OwnerId {
        self.session.owner()
    }

    fn store(&self) -> &dyn ProgressStore {
        self.session.store()
    }

    fn soften<T>(&self, op: &'static str, result: crate::error::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report_failure(op, &err);
                None
            }
        }
    }

    fn report_failure(&self, op: &'static str, err: &EngineError) {
        if err.is_expected() {
            tracing::warn!(op, owner = %self.owner(), %err, "operation rejected");
        } else {
            tracing::error!(op, owner = %self.owner(), %err, "operation failed");
        }
    }

    pub fn selected_plan(&self) -> Plan {
        self.soften("selected_plan", planner::current_plan(self.store()))
            .unwrap_or_default()
    }

    pub fn planner_setup(&self, date: NaiveDate) -> PlannerSetup {
        self.soften("planner_setup", planner::planner_setup(self.store(), date))
            .unwrap_or_default()
    }

    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn select_plan(&self, plan: Plan) -> bool {
        self.soften("select_plan", planner::select_plan(self.store(), plan))
            .is_some()
    }

    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn reset_planner(&self) -> bool {
        self.soften("reset_planner", planner::reset_planner(self.store()))
            .is_some()
    }

    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn add_task(&self, name: &str, category: TaskCategory) -> Option<Task> {
        self.soften("add_task", planner::add_task(self.store(), name, category))
    }

    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn delete_task(&self, id: &str) -> bool {
        self.soften("delete_task", planner::delete_task(self.store(), id))
            .is_some()
    }

    /// Planner label for a task on `date` under the selected plan.
    pub fn task_display_name(&self, task: &Task, date: NaiveDate) -> String {
        plan::task_display_name(&task.name, self.selected_plan(), self.season_day(date))
    }

    pub fn toggle_completion(&self, task_id: &str, date: NaiveDate, completed: bool) -> bool {
        let result = self
            .ledger
            .toggle_completion(self.store(), task_id, date, completed);
        self.soften("toggle_completion", result).is_some()
    }

    /// Counters with the count logged on `date`, seeding defaults first.
    pub fn tasbeehs(&self, date: NaiveDate) -> Vec<TasbeehTally> {
        let store = self.store();
        let result = planner::seed_tasbeehs(store)
            .and_then(|_| store.tasbeehs())
            .and_then(|tasbeehs| {
                tasbeehs
                    .into_iter()
                    .map(|tasbeeh| -> crate::error::Result<TasbeehTally> {
                        let count = store.tally_on(&tasbeeh.id, date)?;
                        Ok(TasbeehTally { tasbeeh, count })
                    })
                    .collect::<crate::error::Result<Vec<_>>>()
            });
        self.soften("tasbeehs", result).unwrap_or_default()
    }

    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn add_tasbeeh(&self, name: &str, target: u32) -> Option<Tasbeeh> {
        self.soften("add_tasbeeh", self.store().create_tasbeeh(name.trim(), target))
    }

    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn update_tasbeeh(&self, id: &str, name: &str, target: u32) -> bool {
        self.soften(
            "update_tasbeeh",
            self.store().update_tasbeeh(id, name.trim(), target),
        )
        .is_some()
    }

    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn delete_tasbeeh(&self, id: &str) -> bool {
        self.soften("delete_tasbeeh", self.store().delete_tasbeeh(id))
            .is_some()
    }

    /// Drop every counter and restore the defaults.
    #[instrument(skip(self), fields(owner = %self.owner()))]
    pub fn reset_tasbeehs(&self) -> bool {
        let store = self.store();
        let result = store
            .delete_all_tasbeehs()
            .and_then(|_| planner::seed_tasbeehs(store));
        self.soften("reset_tasbeehs", result).is_some()
    }

    pub fn record_tally(&self, tasbeeh_id: &str, date: NaiveDate, count: u32) -> bool {
        let result = self.ledger.record_tally(self.store(), tasbeeh_id, date, count);
        self.soften("record_tally", result).is_some()
    }

    pub fn increment_tally(&self, tasbeeh_id: &str, date: NaiveDate) -> Option<u32> {
        let result = self.ledger.increment_tally(self.store(), tasbeeh_id, date);
        self.soften("increment_tally", result)
    }

    pub fn day_progress(&self, date: NaiveDate) -> DayProgress {
        self.soften("day_progress", self.ledger.day_progress(self.store(), date))
            .unwrap_or_default()
    }

    pub fn month_progress(&self) -> BTreeMap<NaiveDate, DayProgress> {
        self.soften("month_progress", self.ledger.month_progress(self.store()))
            .unwrap_or_default()
    }

    pub fn streak(&self, today: NaiveDate) -> u32 {
        self.soften("streak", self.ledger.compute_streak(self.store(), today))
            .unwrap_or(0)
    }

    pub fn report(&self, today: NaiveDate) -> ProgressReport {
        ProgressReport::build(&self.month_progress(), today)
    }
}
