use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use ramadan_core::{
    clock::{Countdown, TICK_INTERVAL},
    ledger::TotalPolicy,
    schedule::ReferenceData,
    store::{Database, DeviceStorage, FileDeviceStorage, MemoryDeviceStorage, OwnerId},
    CompanionService,
};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) data_path: Option<PathBuf>,
    pub(crate) district: Option<String>,
    pub(crate) season_start: Option<NaiveDate>,
    pub(crate) db_path: Option<PathBuf>,
    pub(crate) device_dir: Option<PathBuf>,
    pub(crate) owner: Option<String>,
    /// Countdown renders before exiting; zero keeps ticking.
    pub(crate) ticks: u64,
    pub(crate) snapshot_totals: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        config.data_path = value("RAMADAN_DATA").map(PathBuf::from);
        config.district = value("RAMADAN_DISTRICT");
        config.db_path = value("RAMADAN_DB").map(PathBuf::from);
        config.device_dir = value("RAMADAN_DEVICE_DIR").map(PathBuf::from);
        config.owner = value("RAMADAN_OWNER");
        if let Some(raw) = value("RAMADAN_SEASON_START") {
            match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => config.season_start = Some(date),
                Err(err) => warn!(%raw, %err, "ignoring RAMADAN_SEASON_START"),
            }
        }
        if let Some(raw) = value("RAMADAN_TICKS") {
            match raw.parse::<u64>() {
                Ok(ticks) => config.ticks = ticks,
                Err(err) => warn!(%raw, %err, "ignoring RAMADAN_TICKS"),
            }
        }
        if let Some(raw) = value("RAMADAN_SNAPSHOT_TOTALS") {
            match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.snapshot_totals = true,
                "0" | "false" | "no" | "off" => config.snapshot_totals = false,
                _ => warn!(%raw, "ignoring RAMADAN_SNAPSHOT_TOTALS"),
            }
        }
        config
    }

    fn total_policy(&self) -> TotalPolicy {
        if self.snapshot_totals {
            TotalPolicy::SnapshotAtWrite
        } else {
            TotalPolicy::CurrentTaskCount
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            district: None,
            season_start: None,
            db_path: None,
            device_dir: None,
            owner: None,
            ticks: 1,
            snapshot_totals: false,
        }
    }
}

pub(crate) fn build_service(config: &AppConfig) -> Result<CompanionService> {
    let data = match &config.data_path {
        Some(path) => ReferenceData::load(path)?,
        None => ReferenceData::embedded()?,
    };

    let database = match &config.db_path {
        Some(path) => Database::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?,
        None => Database::in_memory(),
    };
    let database = Arc::new(database);

    let device: Arc<dyn DeviceStorage> = match &config.device_dir {
        Some(dir) => Arc::new(
            FileDeviceStorage::open(dir)
                .with_context(|| format!("failed to open device store {}", dir.display()))?,
        ),
        None => Arc::new(MemoryDeviceStorage::new()),
    };

    let mut builder = CompanionService::builder()
        .with_reference_data(data)
        .with_total_policy(config.total_policy())
        .with_database(Arc::clone(&database))
        .with_device_storage(device);
    if let Some(district) = &config.district {
        builder = builder.with_district(district.clone());
    }
    if let Some(start) = config.season_start {
        builder = builder.with_season_start(start);
    }
    if let Some(owner) = &config.owner {
        let owner = OwnerId::new(owner.clone());
        if database.register_owner(&owner)? {
            info!(%owner, "registered owner");
        }
        builder = builder.with_owner(owner);
    }
    builder.build()
}

pub fn run(config: AppConfig) -> Result<()> {
    let service = build_service(&config)?;
    let today = Local::now().date_naive();
    info!(district = %service.district().id, mode = ?service.mode(), %today, "starting companion");

    print_schedule(&service, today);
    render_countdown(&service, config.ticks);
    print_planner(&service, today);
    print_tasbeehs(&service, today);
    print_report(&service, today);
    Ok(())
}

fn print_schedule(service: &CompanionService, today: NaiveDate) {
    let district = service.district();
    println!("{} ({})", district.name, district.bn_name);
    if let Some(day) = service.day_schedule(today) {
        println!(
            "Day {} ({}): Sehri {}  Fajr {}  Iftar {}",
            day.day, day.date, day.sehri, day.fajr, day.iftar
        );
    }
}

fn countdown_line(reading: &Countdown) -> String {
    let event = reading.next_event.label();
    if reading.terminal {
        return format!("{event} has passed; the season is complete");
    }
    format!(
        "{event} in {} ({:.1}% of window)",
        reading.remaining_label(),
        reading.progress_percent
    )
}

fn render_countdown(service: &CompanionService, ticks: u64) {
    let clock = service.event_clock();
    let mut rendered = 0u64;
    loop {
        match clock.tick() {
            Some(reading) => println!("{}", countdown_line(&reading)),
            None => {
                warn!("no schedule available for countdown");
                return;
            }
        }
        rendered += 1;
        if ticks != 0 && rendered >= ticks {
            return;
        }
        std::thread::sleep(TICK_INTERVAL);
    }
}

fn print_planner(service: &CompanionService, today: NaiveDate) {
    let setup = service.planner_setup(today);
    println!("Plan: {}", setup.plan);
    for entry in &setup.entries {
        let mark = if entry.completed { "x" } else { " " };
        println!(
            "  [{mark}] {} ({:?})",
            service.task_display_name(&entry.task, today),
            entry.task.category
        );
    }
}

fn print_tasbeehs(service: &CompanionService, today: NaiveDate) {
    for tally in service.tasbeehs(today) {
        println!(
            "  {} {}/{} ({:.0}%, {})",
            tally.tasbeeh.name,
            tally.count,
            tally.tasbeeh.target,
            tally.progress_percent(),
            tally.badge().label()
        );
    }
}

fn print_report(service: &CompanionService, today: NaiveDate) {
    let report = service.report(today);
    println!(
        "Today {}%  streak {}  completed days {}  active days {}",
        report.today_percent, report.streak, report.completed_days, report.active_days
    );
    if !report.badges.is_empty() {
        let names: Vec<&str> = report.badges.iter().map(|badge| badge.label()).collect();
        println!("Badges: {}", names.join(", "));
    }
    let week: Vec<String> = report
        .weekly
        .iter()
        .map(|bar| format!("{} {}%", bar.weekday, bar.percent))
        .collect();
    println!("Week: {}", week.join("  "));
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ramadan_core::{clock::Phase, store::StoreMode};

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.ticks, 1);
        assert_eq!(config.total_policy(), TotalPolicy::CurrentTaskCount);
    }

    #[test]
    fn parses_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("RAMADAN_DISTRICT", " Khulna "),
            ("RAMADAN_SEASON_START", "2025-03-01"),
            ("RAMADAN_TICKS", "0"),
            ("RAMADAN_SNAPSHOT_TOTALS", "TRUE"),
            ("RAMADAN_OWNER", "u-7"),
        ]));
        assert_eq!(config.district.as_deref(), Some("Khulna"));
        assert_eq!(config.season_start, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(config.ticks, 0);
        assert_eq!(config.total_policy(), TotalPolicy::SnapshotAtWrite);
        assert_eq!(config.owner.as_deref(), Some("u-7"));
    }

    #[test]
    fn ignores_unparsable_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("RAMADAN_SEASON_START", "March 1st"),
            ("RAMADAN_TICKS", "-3"),
            ("RAMADAN_SNAPSHOT_TOTALS", "maybe"),
            ("RAMADAN_DB", "   "),
        ]));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn owner_gets_a_persisted_session_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            db_path: Some(dir.path().join("db.json")),
            device_dir: Some(dir.path().join("device")),
            owner: Some("u-1".into()),
            district: Some("rajshahi".into()),
            ..AppConfig::default()
        };
        let service = build_service(&config).unwrap();
        assert_eq!(service.mode(), StoreMode::Persisted);
        assert_eq!(service.district().id, "rajshahi");
        assert!(dir.path().join("db.json").is_file());

        let guest = build_service(&AppConfig {
            owner: None,
            ..config
        })
        .unwrap();
        assert_eq!(guest.mode(), StoreMode::Local);
    }

    #[test]
    fn countdown_line_reports_terminal_state() {
        let service = build_service(&AppConfig::default()).unwrap();
        let last_day = NaiveDate::from_ymd_opt(2025, 3, 31)
            .unwrap()
            .and_hms_opt(22, 0, 0)
            .unwrap();
        let reading = service.countdown_at(last_day).unwrap();
        assert_eq!(reading.phase, Phase::PostIftar);
        assert!(reading.terminal);
        assert_eq!(
            countdown_line(&reading),
            "Iftar has passed; the season is complete"
        );
    }
}
