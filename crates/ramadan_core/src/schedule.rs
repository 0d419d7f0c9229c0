use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::time::{self, TimeParseError};

const EMBEDDED_DATA: &str = include_str!("../data/ramadan.json");

/// Fasting times for one day of the season. Base entries hold bare `H:MM`
/// labels; derived entries hold `H:MM AM/PM` labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySchedule {
    pub day: u32,
    pub date: String,
    pub sehri: String,
    pub fajr: String,
    pub iftar: String,
}

impl DaySchedule {
    /// Leading day-of-month of the date label (`"12 March"` -> 12).
    pub fn day_of_month(&self) -> Option<u32> {
        let digits: String = self
            .date
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct District {
    pub id: String,
    pub name: String,
    pub bn_name: String,
    pub lat: String,
    pub long: String,
    #[serde(rename = "offset")]
    pub offset_minutes: i64,
}

/// Static season data: one canonical schedule and the district offsets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceData {
    #[serde(rename = "baseSchedule")]
    pub base_schedule: Vec<DaySchedule>,
    pub districts: Vec<District>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub season_start: Option<NaiveDate>,
}

impl ReferenceData {
    /// The season table compiled into the crate.
    pub fn embedded() -> Result<Self> {
        serde_json::from_str(EMBEDDED_DATA).context("embedded season data is malformed")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("unable to parse {}", path.display()))
    }

    pub fn district(&self, id: &str) -> Option<&District> {
        self.districts.iter().find(|district| district.id == id)
    }

    pub fn district_by_name(&self, name: &str) -> Option<&District> {
        let name = name.trim();
        self.districts
            .iter()
            .find(|district| district.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a district from either its id or its display name.
    pub fn resolve_district(&self, key: &str) -> Option<&District> {
        self.district(key.trim()).or_else(|| self.district_by_name(key))
    }

    pub fn default_district(&self) -> Option<&District> {
        self.district_by_name("Dhaka")
            .or_else(|| self.districts.first())
    }
}

/// Apply a district offset to every entry of the base schedule.
///
/// Sehri and Fajr are shifted as morning times; Iftar is normalised to the
/// evening before shifting.
pub fn derive_schedule(
    base: &[DaySchedule],
    offset_minutes: i64,
) -> Result<Vec<DaySchedule>, TimeParseError> {
    base.iter()
        .map(|day| {
            Ok(DaySchedule {
                day: day.day,
                date: day.date.clone(),
                sehri: time::add_minutes(&day.sehri, offset_minutes, false)?,
                fajr: time::add_minutes(&day.fajr, offset_minutes, false)?,
                iftar: time::add_minutes(&day.iftar, offset_minutes, true)?,
            })
        })
        .collect()
}

/// Index of the entry that applies on `today`.
///
/// With a known season start the ordinal day decides; otherwise the date
/// label's day-of-month is matched, falling back to the first entry.
pub fn today_index(
    schedule: &[DaySchedule],
    today: NaiveDate,
    season_start: Option<NaiveDate>,
) -> Option<usize> {
    if schedule.is_empty() {
        return None;
    }
    if let Some(start) = season_start {
        let ordinal = (today - start).num_days() + 1;
        if let Some(idx) = schedule.iter().position(|day| i64::from(day.day) == ordinal) {
            return Some(idx);
        }
        return Some(if ordinal < 1 { 0 } else { schedule.len() - 1 });
    }
    let position = schedule
        .iter()
        .position(|day| day.day_of_month() == Some(today.day()));
    Some(position.unwrap_or(0))
}

/// Ordinal season day (1-based) of the entry that applies on `today`.
pub fn season_day(
    schedule: &[DaySchedule],
    today: NaiveDate,
    season_start: Option<NaiveDate>,
) -> Option<u32> {
    today_index(schedule, today, season_start).map(|idx| schedule[idx].day)
}

/// Reference data plus a cache of derived per-district schedules.
pub struct ScheduleCatalog {
    data: ReferenceData,
    derived: RwLock<HashMap<String, Arc<Vec<DaySchedule>>>>,
}

impl ScheduleCatalog {
    pub fn new(data: ReferenceData) -> Self {
        Self {
            data,
            derived: RwLock::new(HashMap::new()),
        }
    }

    pub fn data(&self) -> &ReferenceData {
        &self.data
    }

    pub fn season_start(&self) -> Option<NaiveDate> {
        self.data.season_start
    }

    pub fn schedule_for(&self, district: &District) -> Result<Arc<Vec<DaySchedule>>, TimeParseError> {
        if let Some(hit) = self.derived.read().get(&district.id) {
            return Ok(Arc::clone(hit));
        }
        let schedule = Arc::new(derive_schedule(
            &self.data.base_schedule,
            district.offset_minutes,
        )?);
        tracing::debug!(district = %district.id, offset = district.offset_minutes, "derived district schedule");
        self.derived
            .write()
            .insert(district.id.clone(), Arc::clone(&schedule));
        Ok(schedule)
    }
}
