use std::fs;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use ramadan_core::{
    clock::{NextEvent, Phase},
    ledger::{Badge, TotalPolicy},
    plan::{Plan, TaskCategory},
    report::HeatLevel,
    store::{Database, DeviceStorage, FileDeviceStorage, MemoryDeviceStorage, OwnerId, StoreMode},
    CompanionService,
};
use tempfile::tempdir;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
}

fn complete_all(service: &CompanionService, day: NaiveDate) {
    for entry in service.planner_setup(day).entries {
        assert!(service.toggle_completion(&entry.task.id, day, true));
    }
}

#[test]
fn persisted_season_survives_restart() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("companion.json");
    let owner = OwnerId::new("user-1");

    {
        let database = Arc::new(Database::open(&db_path).expect("open db"));
        database.register_owner(&owner).expect("register");
        let service = CompanionService::builder()
            .with_district("khulna")
            .with_database(database)
            .with_owner(owner.clone())
            .build()
            .expect("build service");
        assert_eq!(service.mode(), StoreMode::Persisted);

        assert!(service.select_plan(Plan::Advanced));
        for day in 2..=10 {
            complete_all(&service, date(day));
        }
        let first = service.tasbeehs(date(10))[0].tasbeeh.id.clone();
        assert!(service.record_tally(&first, date(10), 99));
        assert_eq!(service.increment_tally(&first, date(10)), Some(100));
    }

    let database = Arc::new(Database::open(&db_path).expect("reopen db"));
    assert_eq!(
        database.owner_record(&owner).and_then(|record| record.district_id),
        Some("khulna".to_string())
    );
    let service = CompanionService::builder()
        .with_database(database)
        .with_owner(owner)
        .build()
        .expect("rebuild service");

    assert_eq!(service.selected_plan(), Plan::Advanced);
    let tallies = service.tasbeehs(date(10));
    assert_eq!(tallies.len(), 6);
    assert_eq!(tallies[0].count, 100);
    assert!(tallies[0].is_milestone());

    let report = service.report(date(11));
    assert_eq!(report.streak, 9);
    assert_eq!(report.completed_days, 9);
    assert_eq!(report.today_percent, 0);
    assert_eq!(report.badges, vec![Badge::StreakMaster]);
    assert_eq!(report.monthly[29].level, HeatLevel::Empty);
    assert_eq!(report.monthly[28].level, HeatLevel::Full);
}

#[test]
fn guest_and_persisted_share_one_behaviour() {
    let database = Arc::new(Database::in_memory());
    let owner = OwnerId::new("user-2");
    database.register_owner(&owner).expect("register");

    let persisted = CompanionService::builder()
        .with_database(Arc::clone(&database))
        .with_owner(owner)
        .build()
        .expect("persisted");
    let guest = CompanionService::builder()
        .with_database(database)
        .build()
        .expect("guest");
    assert_eq!(persisted.mode(), StoreMode::Persisted);
    assert_eq!(guest.mode(), StoreMode::Local);

    for service in [&persisted, &guest] {
        assert!(service.select_plan(Plan::Beginner));
        let today = date(12);
        for back in 1..=3 {
            complete_all(service, today - Duration::days(back));
        }
        let setup = service.planner_setup(today);
        assert_eq!(setup.entries.len(), 8);
        assert!(service.toggle_completion(&setup.entries[0].task.id, today, true));

        assert_eq!(service.streak(today), 3);
        let progress = service.day_progress(today);
        assert_eq!((progress.completed, progress.total), (1, 8));

        let sadaqah = setup
            .entries
            .iter()
            .find(|entry| !entry.task.is_system)
            .expect("custom task");
        assert!(!service.delete_task(&setup.entries[0].task.id));
        assert!(service.delete_task(&sadaqah.task.id));
        assert!(service.add_task("Visit the sick", TaskCategory::GoodDeeds).is_some());
    }
}

#[test]
fn guest_state_lives_in_device_files() {
    let temp = tempdir().expect("tempdir");
    let device_dir = temp.path().join("device");
    let device: Arc<dyn DeviceStorage> =
        Arc::new(FileDeviceStorage::open(&device_dir).expect("device store"));

    let service = CompanionService::builder()
        .with_device_storage(Arc::clone(&device))
        .build()
        .expect("guest");
    let today = date(5);
    let setup = service.planner_setup(today);
    assert!(service.toggle_completion(&setup.entries[1].task.id, today, true));
    let tally_id = service.tasbeehs(today)[2].tasbeeh.id.clone();
    assert_eq!(service.increment_tally(&tally_id, today), Some(1));
    assert!(service.select_plan(Plan::Advanced));

    let planner_file = device_dir.join("guest_planner_2025-03-05");
    let raw = fs::read_to_string(planner_file).expect("planner file");
    assert!(raw.contains("true"));
    assert_eq!(
        fs::read_to_string(device_dir.join("guest_selected_plan")).expect("plan file"),
        "ADVANCED"
    );

    let reopened = CompanionService::builder()
        .with_device_storage(Arc::new(
            FileDeviceStorage::open(&device_dir).expect("device store"),
        ))
        .build()
        .expect("guest again");
    assert_eq!(reopened.selected_plan(), Plan::Advanced);
    assert_eq!(reopened.tasbeehs(today)[2].count, 1);
    assert_eq!(reopened.planner_setup(today).entries.len(), 12);
    assert!(reopened.month_progress().contains_key(&today));
}

#[test]
fn plan_switch_orphans_history_under_both_policies() {
    for policy in [TotalPolicy::CurrentTaskCount, TotalPolicy::SnapshotAtWrite] {
        let service = CompanionService::builder()
            .with_device_storage(Arc::new(MemoryDeviceStorage::new()))
            .with_total_policy(policy)
            .build()
            .expect("service");
        assert!(service.select_plan(Plan::Beginner));
        complete_all(&service, date(3));
        assert!(service.select_plan(Plan::Advanced));

        let progress = service.month_progress()[&date(3)];
        assert_eq!(progress.completed, 8);
        match policy {
            TotalPolicy::CurrentTaskCount => assert_eq!(progress.total, 12),
            TotalPolicy::SnapshotAtWrite => assert_eq!(progress.total, 8),
        }
    }
}

#[test]
fn countdown_walks_through_a_season_day() {
    let service = CompanionService::builder()
        .with_district("dhaka")
        .with_season_start(date(2))
        .build()
        .expect("service");
    let day = date(2);

    let before = service
        .countdown_at(day.and_hms_opt(3, 0, 0).expect("time"))
        .expect("reading");
    assert_eq!(before.phase, Phase::PreSehri);
    assert_eq!(before.next_event, NextEvent::Sehri);

    let evening = service
        .countdown_at(day.and_hms_opt(20, 0, 0).expect("time"))
        .expect("reading");
    assert_eq!(evening.phase, Phase::PostIftar);
    assert_eq!(evening.target.date(), date(3));
    assert!(!evening.terminal);

    let schedule = service.schedule_for("Chattogram").expect("schedule");
    assert_eq!(schedule.len(), 30);
    assert_ne!(schedule[0].sehri, service.schedule()[0].sehri);
}

#[test]
fn both_stores_keep_tallies_and_activity_per_day() {
    let database = Arc::new(Database::in_memory());
    let owner = OwnerId::new("user-3");
    database.register_owner(&owner).expect("register");
    let persisted = CompanionService::builder()
        .with_database(Arc::clone(&database))
        .with_owner(owner)
        .build()
        .expect("persisted");
    let guest = CompanionService::builder()
        .with_device_storage(Arc::new(MemoryDeviceStorage::new()))
        .build()
        .expect("guest");

    for service in [&persisted, &guest] {
        let id = service.tasbeehs(date(4))[0].tasbeeh.id.clone();
        assert!(service.record_tally(&id, date(4), 12));
        assert!(service.record_tally(&id, date(3), 5));
        assert_eq!(service.tasbeehs(date(4))[0].count, 12);
        assert_eq!(service.tasbeehs(date(3))[0].count, 5);

        let task = service.planner_setup(date(6)).entries[0].task.id.clone();
        assert!(service.toggle_completion(&task, date(6), true));
        assert!(service.toggle_completion(&task, date(6), false));
        let report = service.report(date(6));
        assert_eq!(report.active_days, 0);
        assert_eq!(report.today_percent, 0);
    }
}
