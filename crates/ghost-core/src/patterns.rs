//! Behavior pattern detection.
//!
//! Advisory analytics over the last 30 days of blocks and detected
//! workouts: weekday and time-of-day completion patterns, workout-type
//! adherence, skip clustering, streaks, and rest-gap variability. The
//! detector caches its bundle for six hours; it informs the skip predictor
//! and window finder but never makes decisions itself.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::{BlockStatus, DetectedWorkout, TrainingBlock, WorkoutType};

/// Minimum history for a pattern bundle to be marked confident.
pub const MIN_CONFIDENT_DATA_POINTS: usize = 10;

/// Minimum samples before a weekday is classified best/worst.
const MIN_WEEKDAY_SAMPLES: u32 = 4;

/// Share of all skips concentrated on one day/hour to call it common.
const COMMON_SKIP_SHARE: f64 = 0.3;

/// Coarse band of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPeriod {
    /// 05:00-10:59
    Morning,
    /// 11:00-16:59
    Midday,
    /// 17:00-04:59
    Evening,
}

impl DayPeriod {
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            5..=10 => Self::Morning,
            11..=16 => Self::Midday,
            _ => Self::Evening,
        }
    }
}

/// Classification of a weekday by completion rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayClass {
    Best,
    Worst,
    Typical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayPattern {
    /// ISO day of week, 1 = Monday.
    pub day_of_week: u8,
    pub completed: u32,
    pub missed: u32,
    pub completion_rate: f64,
    pub class: WeekdayClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodPattern {
    pub period: DayPeriod,
    pub completed: u32,
    pub missed: u32,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePattern {
    pub workout_type: WorkoutType,
    pub completed: u32,
    pub missed: u32,
    pub adherence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipPatterns {
    /// Days of week holding more than 30% of all skips.
    pub common_skip_days: Vec<u8>,
    /// Hours of day holding more than 30% of all skips.
    pub common_skip_hours: Vec<u8>,
    /// Mean length of consecutive-miss runs.
    pub average_skip_streak: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreakPatterns {
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
}

/// The cached analytics bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBehaviorPatterns {
    pub weekdays: Vec<WeekdayPattern>,
    pub periods: Vec<PeriodPattern>,
    pub preferred_period: Option<DayPeriod>,
    /// Hours with the strongest completion record, best first.
    pub peak_hours: Vec<u8>,
    pub types: Vec<TypePattern>,
    pub skips: SkipPatterns,
    pub streaks: StreakPatterns,
    /// Standard deviation of gaps (days) between workout days.
    pub recovery_variability: f64,
    pub data_points: usize,
    pub confident: bool,
    pub computed_at: DateTime<Utc>,
}

impl UserBehaviorPatterns {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            weekdays: Vec::new(),
            periods: Vec::new(),
            preferred_period: None,
            peak_hours: Vec::new(),
            types: Vec::new(),
            skips: SkipPatterns::default(),
            streaks: StreakPatterns::default(),
            recovery_variability: 0.0,
            data_points: 0,
            confident: false,
            computed_at: now,
        }
    }

    pub fn weekday_miss_rate(&self, day_of_week: u8) -> Option<f64> {
        self.weekdays
            .iter()
            .find(|w| w.day_of_week == day_of_week)
            .map(|w| 1.0 - w.completion_rate)
    }

    pub fn type_adherence(&self, workout_type: WorkoutType) -> Option<f64> {
        self.types
            .iter()
            .find(|t| t.workout_type == workout_type)
            .map(|t| t.adherence)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl_hours: i64) -> bool {
        now - self.computed_at >= Duration::hours(ttl_hours)
    }
}

/// Detector with a TTL cache.
#[derive(Debug)]
pub struct PatternDetector {
    cache_ttl_hours: i64,
    history_days: i64,
    cached: Option<UserBehaviorPatterns>,
}

impl PatternDetector {
    pub fn new(cache_ttl_hours: i64) -> Self {
        Self {
            cache_ttl_hours,
            history_days: 30,
            cached: None,
        }
    }

    pub fn cached(&self) -> Option<&UserBehaviorPatterns> {
        self.cached.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Return the cached bundle, recomputing it first when stale or absent.
    pub fn patterns(
        &mut self,
        blocks: &[TrainingBlock],
        workouts: &[DetectedWorkout],
        now: DateTime<Utc>,
    ) -> &UserBehaviorPatterns {
        let stale = self
            .cached
            .as_ref()
            .map_or(true, |p| p.is_stale(now, self.cache_ttl_hours));
        if stale {
            self.cached = Some(self.compute(blocks, workouts, now));
        }
        self.cached.as_ref().expect("pattern cache populated above")
    }

    fn compute(
        &self,
        blocks: &[TrainingBlock],
        workouts: &[DetectedWorkout],
        now: DateTime<Utc>,
    ) -> UserBehaviorPatterns {
        let cutoff = now - Duration::days(self.history_days);
        let resolved: Vec<&TrainingBlock> = blocks
            .iter()
            .filter(|b| b.start_time >= cutoff)
            .filter(|b| matches!(b.status, BlockStatus::Completed | BlockStatus::Missed))
            .collect();
        let recent_workouts: Vec<&DetectedWorkout> =
            workouts.iter().filter(|w| w.end_date >= cutoff).collect();

        let data_points = resolved.len() + recent_workouts.len();
        if data_points == 0 {
            return UserBehaviorPatterns::empty(now);
        }

        let weekdays = Self::weekday_patterns(&resolved);
        let (periods, preferred_period) = Self::period_patterns(&resolved, &recent_workouts);
        let peak_hours = Self::peak_hours(&recent_workouts);
        let types = Self::type_patterns(&resolved);
        let skips = Self::skip_patterns(&resolved);
        let streaks = Self::streak_patterns(&recent_workouts, now);
        let recovery_variability = Self::rest_gap_variability(&recent_workouts);

        UserBehaviorPatterns {
            weekdays,
            periods,
            preferred_period,
            peak_hours,
            types,
            skips,
            streaks,
            recovery_variability,
            data_points,
            confident: data_points >= MIN_CONFIDENT_DATA_POINTS,
            computed_at: now,
        }
    }

    fn weekday_patterns(resolved: &[&TrainingBlock]) -> Vec<WeekdayPattern> {
        let mut by_day: BTreeMap<u8, (u32, u32)> = BTreeMap::new();
        for block in resolved {
            let day = block.start_time.weekday().number_from_monday() as u8;
            let entry = by_day.entry(day).or_default();
            match block.status {
                BlockStatus::Completed => entry.0 += 1,
                BlockStatus::Missed => entry.1 += 1,
                _ => {}
            }
        }
        by_day
            .into_iter()
            .map(|(day_of_week, (completed, missed))| {
                let total = completed + missed;
                let completion_rate = completed as f64 / total as f64;
                let class = if total >= MIN_WEEKDAY_SAMPLES && completion_rate >= 0.7 {
                    WeekdayClass::Best
                } else if total >= MIN_WEEKDAY_SAMPLES && completion_rate < 0.4 {
                    WeekdayClass::Worst
                } else {
                    WeekdayClass::Typical
                };
                WeekdayPattern {
                    day_of_week,
                    completed,
                    missed,
                    completion_rate,
                    class,
                }
            })
            .collect()
    }

    fn period_patterns(
        resolved: &[&TrainingBlock],
        workouts: &[&DetectedWorkout],
    ) -> (Vec<PeriodPattern>, Option<DayPeriod>) {
        let mut by_period: BTreeMap<u8, (u32, u32)> = BTreeMap::new();
        for block in resolved {
            let period = DayPeriod::from_hour(block.start_time.hour() as u8);
            let entry = by_period.entry(period as u8).or_default();
            match block.status {
                BlockStatus::Completed => entry.0 += 1,
                BlockStatus::Missed => entry.1 += 1,
                _ => {}
            }
        }
        for workout in workouts {
            let period = DayPeriod::from_hour(workout.start_date.hour() as u8);
            by_period.entry(period as u8).or_default().0 += 1;
        }

        let decode = |idx: u8| match idx {
            0 => DayPeriod::Morning,
            1 => DayPeriod::Midday,
            _ => DayPeriod::Evening,
        };
        let periods: Vec<PeriodPattern> = by_period
            .into_iter()
            .map(|(idx, (completed, missed))| PeriodPattern {
                period: decode(idx),
                completed,
                missed,
                completion_rate: completed as f64 / (completed + missed).max(1) as f64,
            })
            .collect();

        let preferred = periods
            .iter()
            .filter(|p| p.completed + p.missed > 0)
            .max_by(|a, b| {
                (a.completion_rate, a.completed)
                    .partial_cmp(&(b.completion_rate, b.completed))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| p.period);
        (periods, preferred)
    }

    fn peak_hours(workouts: &[&DetectedWorkout]) -> Vec<u8> {
        let mut by_hour: BTreeMap<u8, u32> = BTreeMap::new();
        for workout in workouts {
            *by_hour.entry(workout.start_date.hour() as u8).or_default() += 1;
        }
        let mut hours: Vec<(u8, u32)> = by_hour.into_iter().filter(|(_, n)| *n >= 2).collect();
        hours.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        hours.into_iter().take(3).map(|(h, _)| h).collect()
    }

    fn type_patterns(resolved: &[&TrainingBlock]) -> Vec<TypePattern> {
        let mut by_type: BTreeMap<WorkoutType, (u32, u32)> = BTreeMap::new();
        for block in resolved {
            let entry = by_type.entry(block.workout_type).or_default();
            match block.status {
                BlockStatus::Completed => entry.0 += 1,
                BlockStatus::Missed => entry.1 += 1,
                _ => {}
            }
        }
        by_type
            .into_iter()
            .map(|(workout_type, (completed, missed))| TypePattern {
                workout_type,
                completed,
                missed,
                adherence: completed as f64 / (completed + missed).max(1) as f64,
            })
            .collect()
    }

    fn skip_patterns(resolved: &[&TrainingBlock]) -> SkipPatterns {
        let missed: Vec<&&TrainingBlock> = resolved
            .iter()
            .filter(|b| b.status == BlockStatus::Missed)
            .collect();
        if missed.is_empty() {
            return SkipPatterns::default();
        }
        let total = missed.len() as f64;

        let mut by_day: BTreeMap<u8, u32> = BTreeMap::new();
        let mut by_hour: BTreeMap<u8, u32> = BTreeMap::new();
        for block in &missed {
            *by_day
                .entry(block.start_time.weekday().number_from_monday() as u8)
                .or_default() += 1;
            *by_hour.entry(block.start_time.hour() as u8).or_default() += 1;
        }
        let common_skip_days = by_day
            .into_iter()
            .filter(|(_, n)| *n as f64 / total > COMMON_SKIP_SHARE)
            .map(|(d, _)| d)
            .collect();
        let common_skip_hours = by_hour
            .into_iter()
            .filter(|(_, n)| *n as f64 / total > COMMON_SKIP_SHARE)
            .map(|(h, _)| h)
            .collect();

        // Mean run length of consecutive misses in chronological order.
        let mut ordered: Vec<&TrainingBlock> = resolved.to_vec();
        ordered.sort_by_key(|b| b.start_time);
        let mut runs = Vec::new();
        let mut run = 0u32;
        for block in ordered {
            if block.status == BlockStatus::Missed {
                run += 1;
            } else if run > 0 {
                runs.push(run);
                run = 0;
            }
        }
        if run > 0 {
            runs.push(run);
        }
        let average_skip_streak = if runs.is_empty() {
            0.0
        } else {
            runs.iter().sum::<u32>() as f64 / runs.len() as f64
        };

        SkipPatterns {
            common_skip_days,
            common_skip_hours,
            average_skip_streak,
        }
    }

    fn streak_patterns(workouts: &[&DetectedWorkout], now: DateTime<Utc>) -> StreakPatterns {
        let mut days: Vec<NaiveDate> = workouts.iter().map(|w| w.end_date.date_naive()).collect();
        days.sort();
        days.dedup();
        if days.is_empty() {
            return StreakPatterns::default();
        }

        let mut longest = 1u32;
        let mut current_run = 1u32;
        for pair in days.windows(2) {
            if pair[0].succ_opt() == Some(pair[1]) {
                current_run += 1;
            } else {
                current_run = 1;
            }
            longest = longest.max(current_run);
        }

        // The run is current only if it reaches today or yesterday.
        let last = days[days.len() - 1];
        let today = now.date_naive();
        let current = if last == today || last.succ_opt() == Some(today) {
            current_run
        } else {
            0
        };

        StreakPatterns {
            current_streak_days: current,
            longest_streak_days: longest,
        }
    }

    fn rest_gap_variability(workouts: &[&DetectedWorkout]) -> f64 {
        let mut days: Vec<NaiveDate> = workouts.iter().map(|w| w.end_date.date_naive()).collect();
        days.sort();
        days.dedup();
        if days.len() < 3 {
            return 0.0;
        }
        let gaps: Vec<f64> = days
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_days() as f64)
            .collect();
        let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
        let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
        variance.sqrt()
    }
}
