//! Live Sehri/Iftar countdown.
//!
//! The phase is recomputed from scratch on every tick by comparing `now`
//! against the day's times; nothing about the previous tick is remembered, so
//! a late or skipped tick is corrected by the next one.
//!
//! ```text
//! 00:00 ── PreSehri ──> sehri ── Fasting ──> iftar ── PostIftar ──> next sehri
//! ```

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::schedule::{self, DaySchedule};
use crate::time::{self, TimeParseError};

/// Interval at which presentation layers are expected to call `tick`.
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreSehri,
    Fasting,
    PostIftar,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NextEvent {
    Sehri,
    Iftar,
}

impl NextEvent {
    pub fn label(self) -> &'static str {
        match self {
            NextEvent::Sehri => "Sehri",
            NextEvent::Iftar => "Iftar",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Countdown {
    pub phase: Phase,
    pub next_event: NextEvent,
    pub window_start: NaiveDateTime,
    pub target: NaiveDateTime,
    /// Whole seconds left until `target`, zero once it has passed.
    pub remaining_secs: i64,
    /// Elapsed share of the current window, 0..=100.
    pub progress_percent: f64,
    /// Set after the last Iftar of the season: no further Sehri is known.
    pub terminal: bool,
}

impl Countdown {
    /// `HH:MM:SS` rendering of the remaining time.
    pub fn remaining_label(&self) -> String {
        let secs = self.remaining_secs.max(0);
        format!(
            "{:02}:{:02}:{:02}",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    }
}

/// Compute the countdown for `now` from today's entry and, when the season
/// continues, tomorrow's.
pub fn countdown(
    today: &DaySchedule,
    next: Option<&DaySchedule>,
    now: NaiveDateTime,
) -> Result<Countdown, TimeParseError> {
    let date = now.date();
    let midnight = date.and_time(NaiveTime::default());
    let sehri = at(date, &today.sehri, false)?;
    let iftar = at(date, &today.iftar, true)?;

    let (phase, next_event, window_start, target, terminal) = if now < sehri {
        (Phase::PreSehri, NextEvent::Sehri, midnight, sehri, false)
    } else if now < iftar {
        (Phase::Fasting, NextEvent::Iftar, sehri, iftar, false)
    } else if let Some(next) = next {
        let tomorrow = date.succ_opt().unwrap_or(date);
        let next_sehri = at(tomorrow, &next.sehri, false)?;
        (Phase::PostIftar, NextEvent::Sehri, iftar, next_sehri, false)
    } else {
        (Phase::PostIftar, NextEvent::Iftar, iftar, iftar, true)
    };

    let remaining = target - now;
    let (remaining_secs, progress_percent) = if remaining > Duration::zero() {
        let total = (target - window_start).num_milliseconds() as f64;
        let elapsed = (now - window_start).num_milliseconds() as f64;
        let progress = if total > 0.0 {
            (elapsed / total * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };
        (remaining.num_seconds(), progress)
    } else {
        (0, 100.0)
    };

    Ok(Countdown {
        phase,
        next_event,
        window_start,
        target,
        remaining_secs,
        progress_percent,
        terminal,
    })
}

fn at(date: NaiveDate, label: &str, is_pm: bool) -> Result<NaiveDateTime, TimeParseError> {
    Ok(date.and_time(time::parse_label(label, is_pm)?))
}

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Countdown driver over one district's season schedule.
pub struct EventClock<C: Clock = SystemClock> {
    schedule: Arc<Vec<DaySchedule>>,
    season_start: Option<NaiveDate>,
    clock: C,
}

impl<C: Clock> EventClock<C> {
    pub fn new(schedule: Arc<Vec<DaySchedule>>, season_start: Option<NaiveDate>, clock: C) -> Self {
        Self {
            schedule,
            season_start,
            clock,
        }
    }

    /// Today's entry and the following one, if the season has one.
    pub fn current_days(&self, today: NaiveDate) -> Option<(&DaySchedule, Option<&DaySchedule>)> {
        let idx = schedule::today_index(&self.schedule, today, self.season_start)?;
        Some((&self.schedule[idx], self.schedule.get(idx + 1)))
    }

    /// Recompute the countdown for the clock's current time.
    pub fn tick(&self) -> Option<Countdown> {
        let now = self.clock.now();
        let (today, next) = self.current_days(now.date())?;
        match countdown(today, next, now) {
            Ok(reading) => Some(reading),
            Err(err) => {
                tracing::warn!(day = today.day, %err, "unable to compute countdown");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(day: u32, sehri: &str, iftar: &str) -> DaySchedule {
        DaySchedule {
            day,
            date: format!("{} March", day + 1),
            sehri: sehri.into(),
            fajr: sehri.into(),
            iftar: iftar.into(),
        }
    }

    fn at_hm(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn before_sehri_counts_down_from_midnight() {
        let today = day(1, "4:41 AM", "6:02 PM");
        let reading = countdown(&today, None, at_hm(3, 0)).unwrap();
        assert_eq!(reading.phase, Phase::PreSehri);
        assert_eq!(reading.next_event, NextEvent::Sehri);
        assert_eq!(reading.target, at_hm(4, 41));
        assert_eq!(reading.remaining_label(), "01:41:00");
        let expected = 180.0 / 281.0 * 100.0;
        assert!((reading.progress_percent - expected).abs() < 1e-9);
    }

    #[test]
    fn fasting_progress_interpolates_between_sehri_and_iftar() {
        let today = day(1, "4:41 AM", "6:02 PM");
        let reading = countdown(&today, None, at_hm(12, 0)).unwrap();
        assert_eq!(reading.phase, Phase::Fasting);
        assert_eq!(reading.next_event, NextEvent::Iftar);
        assert_eq!(reading.target, at_hm(18, 2));
        assert!((reading.progress_percent - 54.8).abs() < 0.1);
        assert_eq!(reading.remaining_label(), "06:02:00");
    }

    #[test]
    fn after_iftar_targets_tomorrows_sehri() {
        let today = day(1, "4:41 AM", "6:02 PM");
        let tomorrow = day(2, "4:40 AM", "6:03 PM");
        let reading = countdown(&today, Some(&tomorrow), at_hm(20, 0)).unwrap();
        assert_eq!(reading.phase, Phase::PostIftar);
        assert_eq!(reading.next_event, NextEvent::Sehri);
        let expected_target = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(4, 40, 0)
            .unwrap();
        assert_eq!(reading.target, expected_target);
        assert_eq!(reading.remaining_label(), "08:40:00");
        assert!(!reading.terminal);
    }

    #[test]
    fn season_end_freezes_at_iftar() {
        let today = day(30, "4:35 AM", "6:17 PM");
        let reading = countdown(&today, None, at_hm(21, 15)).unwrap();
        assert_eq!(reading.phase, Phase::PostIftar);
        assert_eq!(reading.next_event, NextEvent::Iftar);
        assert_eq!(reading.target, at_hm(18, 17));
        assert_eq!(reading.remaining_label(), "00:00:00");
        assert_eq!(reading.progress_percent, 100.0);
        assert!(reading.terminal);
    }

    #[test]
    fn exactly_one_phase_for_every_minute() {
        let today = day(1, "4:41 AM", "6:02 PM");
        let tomorrow = day(2, "4:40 AM", "6:03 PM");
        for minute in 0..(24 * 60) {
            let now = at_hm(minute / 60, minute % 60);
            let reading = countdown(&today, Some(&tomorrow), now).unwrap();
            let expected = if now < at_hm(4, 41) {
                Phase::PreSehri
            } else if now < at_hm(18, 2) {
                Phase::Fasting
            } else {
                Phase::PostIftar
            };
            assert_eq!(reading.phase, expected, "minute {minute}");
            assert!((0.0..=100.0).contains(&reading.progress_percent));
        }
    }

    #[test]
    fn boundaries_switch_phase_on_the_minute() {
        let today = day(1, "4:41 AM", "6:02 PM");
        assert_eq!(
            countdown(&today, None, at_hm(4, 41)).unwrap().phase,
            Phase::Fasting
        );
        assert_eq!(
            countdown(&today, None, at_hm(18, 2)).unwrap().phase,
            Phase::PostIftar
        );
    }

    #[test]
    fn event_clock_ticks_with_injected_time() {
        let schedule = Arc::new(vec![
            day(1, "4:41 AM", "6:02 PM"),
            day(2, "4:40 AM", "6:03 PM"),
        ]);
        let start = NaiveDate::from_ymd_opt(2025, 3, 2);
        let clock = EventClock::new(schedule, start, FixedClock(at_hm(12, 0)));
        let reading = clock.tick().expect("reading");
        assert_eq!(reading.phase, Phase::Fasting);

        let first = clock.tick().unwrap();
        assert_eq!(first, reading);
    }
}
