//! Optimal window finding.
//!
//! Walks the gaps between blocked calendar slots (busy events plus sacred
//! times) within the schedulable day, keeps gaps that fit the workout with
//! buffers on both sides, and scores each on five weighted factors.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{GhostConfig, WindowFactorWeights};
use crate::patterns::{DayPeriod, UserBehaviorPatterns};
use crate::phenome::behavior::{BehavioralMemory, TimeSlotKey};

/// Excess beyond the required fit treated as ideal buffer quality.
const IDEAL_EXCESS_MINUTES: f64 = 30.0;

/// Largest lead-in before the suggested start, in minutes.
const MAX_LEAD_MINUTES: i64 = 15;

/// A half-open interval of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Per-factor breakdown of a window's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowScore {
    pub historical_success: f64,
    pub preference_alignment: f64,
    pub buffer_quality: f64,
    pub energy: f64,
    pub flexibility: f64,
    pub total: f64,
}

/// A candidate window with its score and placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredWindow {
    pub window: TimeWindow,
    pub score: WindowScore,
    /// Where inside the window the workout should begin.
    pub suggested_start: DateTime<Utc>,
}

/// What to search for.
#[derive(Debug, Clone, Copy)]
pub struct WindowRequest {
    pub date: NaiveDate,
    pub workout_duration_minutes: i64,
    /// How many scored windows to return.
    pub count: usize,
}

/// Calendar-gap walker and scorer.
#[derive(Debug, Clone)]
pub struct OptimalWindowFinder {
    weights: WindowFactorWeights,
    day_start_hour: u32,
    day_end_hour: u32,
    min_window_minutes: i64,
    buffer_before_minutes: i64,
    buffer_after_minutes: i64,
}

impl OptimalWindowFinder {
    pub fn new(config: &GhostConfig) -> Self {
        Self {
            weights: config.window_weights,
            day_start_hour: config.day_start_hour,
            day_end_hour: config.day_end_hour,
            min_window_minutes: config.min_window_duration_minutes,
            buffer_before_minutes: config.buffer_before_event_minutes,
            buffer_after_minutes: config.buffer_after_event_minutes,
        }
    }

    /// Find the top-`count` scored windows for the request.
    ///
    /// Sacred slots are folded into the blocked set up front, so no
    /// returned window can overlap one. Ties break toward the earlier
    /// start.
    pub fn find(
        &self,
        request: &WindowRequest,
        busy: &[TimeWindow],
        memory: &BehavioralMemory,
        patterns: Option<&UserBehaviorPatterns>,
    ) -> Vec<ScoredWindow> {
        let day_start = day_hour(request.date, self.day_start_hour);
        let day_end = day_hour(request.date, self.day_end_hour);
        let required =
            request.workout_duration_minutes + self.buffer_before_minutes + self.buffer_after_minutes;

        let blocked = self.blocked_set(request.date, busy, memory, day_start, day_end);
        let gaps = walk_gaps(&blocked, day_start, day_end, self.min_window_minutes);

        let mut scored: Vec<ScoredWindow> = gaps
            .into_iter()
            .filter(|gap| gap.duration_minutes() >= required)
            .map(|window| self.score_window(&window, request, memory, patterns))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total
                .partial_cmp(&a.score.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.window.start.cmp(&b.window.start))
        });
        scored.truncate(request.count);
        scored
    }

    /// Busy slots clipped to the day, plus every sacred slot falling on
    /// this weekday, merged into disjoint sorted intervals.
    fn blocked_set(
        &self,
        date: NaiveDate,
        busy: &[TimeWindow],
        memory: &BehavioralMemory,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Vec<TimeWindow> {
        let weekday = date_weekday(date);
        let mut blocked: Vec<TimeWindow> = busy
            .iter()
            .filter(|w| w.start < day_end && w.end > day_start)
            .map(|w| TimeWindow::new(w.start.max(day_start), w.end.min(day_end)))
            .collect();

        for sacred in &memory.sacred_times {
            if sacred.slot.day_of_week == weekday {
                let start = day_hour(date, sacred.slot.hour_of_day as u32);
                let window = TimeWindow::new(start, start + Duration::hours(1));
                if window.start < day_end && window.end > day_start {
                    blocked.push(window);
                }
            }
        }

        blocked.sort_by_key(|w| w.start);
        merge_intervals(blocked)
    }

    fn score_window(
        &self,
        window: &TimeWindow,
        request: &WindowRequest,
        memory: &BehavioralMemory,
        patterns: Option<&UserBehaviorPatterns>,
    ) -> ScoredWindow {
        let excess = window.duration_minutes() - request.workout_duration_minutes;
        let lead = MAX_LEAD_MINUTES.min(excess / 2).max(0);
        let suggested_start = window.start + Duration::minutes(lead);
        let hour = suggested_start.hour() as u8;
        let slot = TimeSlotKey::from_datetime(&suggested_start);

        let historical_success = memory
            .slot_stats(slot)
            .map(|s| s.completion_rate())
            .unwrap_or(0.5);
        let preference_alignment = preference_alignment(hour, memory, patterns);
        let fit_excess =
            excess - self.buffer_before_minutes - self.buffer_after_minutes;
        let buffer_quality = (fit_excess as f64 / IDEAL_EXCESS_MINUTES).clamp(0.0, 1.0);
        let energy = hour_energy(hour, patterns);
        let flexibility = flexibility_bucket(fit_excess);

        let total = self.weights.historical_success * historical_success
            + self.weights.preference_alignment * preference_alignment
            + self.weights.buffer_quality * buffer_quality
            + self.weights.energy * energy
            + self.weights.flexibility * flexibility;

        ScoredWindow {
            window: *window,
            score: WindowScore {
                historical_success,
                preference_alignment,
                buffer_quality,
                energy,
                flexibility,
                total,
            },
            suggested_start,
        }
    }
}

fn day_hour(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(
        &date
            .and_hms_opt(hour.min(23), 0, 0)
            .unwrap_or_else(|| date.and_hms_opt(0, 0, 0).expect("midnight is valid")),
    ) + Duration::hours(if hour == 24 { 1 } else { 0 })
}

fn date_weekday(date: NaiveDate) -> u8 {
    date.weekday().number_from_monday() as u8
}

/// Merge sorted, possibly overlapping intervals into disjoint ones.
fn merge_intervals(sorted: Vec<TimeWindow>) -> Vec<TimeWindow> {
    let mut merged: Vec<TimeWindow> = Vec::with_capacity(sorted.len());
    for window in sorted {
        match merged.last_mut() {
            Some(last) if window.start <= last.end => {
                last.end = last.end.max(window.end);
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// Walk the gaps between disjoint blocked intervals.
fn walk_gaps(
    blocked: &[TimeWindow],
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
    min_minutes: i64,
) -> Vec<TimeWindow> {
    let mut gaps = Vec::new();
    let mut cursor = day_start;
    for window in blocked {
        if window.start > cursor {
            let gap = TimeWindow::new(cursor, window.start.min(day_end));
            if gap.duration_minutes() >= min_minutes {
                gaps.push(gap);
            }
        }
        cursor = cursor.max(window.end);
        if cursor >= day_end {
            break;
        }
    }
    if cursor < day_end {
        let gap = TimeWindow::new(cursor, day_end);
        if gap.duration_minutes() >= min_minutes {
            gaps.push(gap);
        }
    }
    gaps
}

/// Alignment between the hour and the user's learned preferences.
fn preference_alignment(
    hour: u8,
    memory: &BehavioralMemory,
    patterns: Option<&UserBehaviorPatterns>,
) -> f64 {
    if memory.preferences.preferred_hours.contains(&hour) {
        return 1.0;
    }
    let Some(preferred) = patterns.and_then(|p| p.preferred_period) else {
        return 0.5;
    };
    if DayPeriod::from_hour(hour) == preferred {
        0.9
    } else {
        0.3
    }
}

/// Default per-hour energy curve, lifted by learned peak hours.
fn hour_energy(hour: u8, patterns: Option<&UserBehaviorPatterns>) -> f64 {
    let base = match hour {
        0..=4 => 0.2,
        5 => 0.5,
        6..=8 => 0.9,
        9..=10 => 0.8,
        11..=12 => 0.6,
        13..=14 => 0.5,
        15..=16 => 0.6,
        17..=19 => 0.85,
        20 => 0.6,
        21 => 0.4,
        _ => 0.3,
    };
    let boost = patterns
        .map(|p| p.peak_hours.contains(&hour))
        .unwrap_or(false);
    if boost {
        (base + 0.2_f64).min(1.0)
    } else {
        base
    }
}

/// Excess time beyond the required fit, bucketed.
fn flexibility_bucket(fit_excess_minutes: i64) -> f64 {
    if fit_excess_minutes >= 60 {
        1.0
    } else if fit_excess_minutes >= 30 {
        0.75
    } else if fit_excess_minutes >= 15 {
        0.5
    } else if fit_excess_minutes > 0 {
        0.25
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phenome::behavior::{SacredTimeReason, TimeSlotStats};

    fn date() -> NaiveDate {
        // A Monday.
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date().and_hms_opt(hour, min, 0).unwrap())
    }

    fn finder() -> OptimalWindowFinder {
        OptimalWindowFinder::new(&GhostConfig::default())
    }

    fn request(duration: i64, count: usize) -> WindowRequest {
        WindowRequest {
            date: date(),
            workout_duration_minutes: duration,
            count,
        }
    }

    #[test]
    fn test_empty_day_returns_full_gap() {
        let memory = BehavioralMemory::default();
        let windows = finder().find(&request(45, 3), &[], &memory, None);
        assert!(!windows.is_empty());
        assert_eq!(windows[0].window.start, at(6, 0));
    }

    #[test]
    fn test_packed_day_still_yields_buffered_window() {
        // Busy 09:00-10:00, 11:00-12:30, 14:00-15:00, 17:00-18:00.
        let busy = vec![
            TimeWindow::new(at(9, 0), at(10, 0)),
            TimeWindow::new(at(11, 0), at(12, 30)),
            TimeWindow::new(at(14, 0), at(15, 0)),
            TimeWindow::new(at(17, 0), at(18, 0)),
        ];
        let memory = BehavioralMemory::default();
        let windows = finder().find(&request(45, 5), &busy, &memory, None);
        assert!(!windows.is_empty());

        for scored in &windows {
            // No overlap with any busy slot, 15-minute buffers included.
            let workout = TimeWindow::new(
                scored.suggested_start - Duration::minutes(15),
                scored.suggested_start + Duration::minutes(45 + 15),
            );
            for slot in &busy {
                assert!(
                    !workout.overlaps(slot),
                    "workout at {} overlaps busy slot",
                    scored.suggested_start
                );
            }
            // Suggested start is strictly inside the window.
            assert!(scored.suggested_start > scored.window.start);
            assert!(
                scored.suggested_start + Duration::minutes(45) <= scored.window.end,
                "workout must end inside the window"
            );
        }
    }

    #[test]
    fn test_sacred_time_never_proposed() {
        let mut memory = BehavioralMemory::default();
        // Monday 06:00-07:00 is sacred; the early gap must shift past it.
        memory.sacred_times.push(crate::phenome::behavior::SacredTime {
            slot: TimeSlotKey::new(1, 6).unwrap(),
            reason: SacredTimeReason::UserSpecified,
            designated_at: at(0, 0),
        });
        let windows = finder().find(&request(45, 10), &[], &memory, None);
        assert!(!windows.is_empty());
        let sacred_window = TimeWindow::new(at(6, 0), at(7, 0));
        for scored in &windows {
            assert!(!scored.window.overlaps(&sacred_window));
        }
    }

    #[test]
    fn test_too_small_gaps_filtered() {
        // Only a 50-minute gap exists: too small for 45 min + 30 buffer.
        let busy = vec![
            TimeWindow::new(at(6, 0), at(10, 0)),
            TimeWindow::new(at(10, 50), at(22, 0)),
        ];
        let memory = BehavioralMemory::default();
        let windows = finder().find(&request(45, 3), &busy, &memory, None);
        assert!(windows.is_empty());
    }

    #[test]
    fn test_historical_success_prefers_good_slots() {
        let mut memory = BehavioralMemory::default();
        // Evening slot has a strong record, morning a bad one.
        memory.slot_stats.insert(
            TimeSlotKey::new(1, 6).unwrap(),
            TimeSlotStats {
                completed: 1,
                missed: 9,
                ..Default::default()
            },
        );
        memory.slot_stats.insert(
            TimeSlotKey::new(1, 18).unwrap(),
            TimeSlotStats {
                completed: 9,
                missed: 1,
                ..Default::default()
            },
        );
        // Two equal-size gaps: 06:00-08:00 and 18:00-20:00.
        let busy = vec![TimeWindow::new(at(8, 0), at(18, 0)), TimeWindow::new(at(20, 0), at(22, 0))];
        let windows = finder().find(&request(45, 2), &busy, &memory, None);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].suggested_start.hour(), 18);
    }

    #[test]
    fn test_tie_breaks_toward_earlier_start() {
        let memory = BehavioralMemory::default();
        // Two identical 90-minute morning gaps, same hour band energy.
        let busy = vec![
            TimeWindow::new(at(6, 0), at(7, 0)),
            TimeWindow::new(at(8, 30), at(9, 0)),
            TimeWindow::new(at(10, 30), at(22, 0)),
        ];
        let windows = finder().find(&request(45, 2), &busy, &memory, None);
        assert_eq!(windows.len(), 2);
        if (windows[0].score.total - windows[1].score.total).abs() < 1e-9 {
            assert!(windows[0].window.start < windows[1].window.start);
        }
    }

    #[test]
    fn test_merge_overlapping_busy_slots() {
        let busy = vec![
            TimeWindow::new(at(9, 0), at(11, 0)),
            TimeWindow::new(at(10, 0), at(12, 0)),
        ];
        let memory = BehavioralMemory::default();
        let windows = finder().find(&request(45, 10), &busy, &memory, None);
        // No window may fall inside the merged 09:00-12:00 span.
        let merged = TimeWindow::new(at(9, 0), at(12, 0));
        for scored in &windows {
            assert!(!scored.window.overlaps(&merged));
        }
    }

    #[test]
    fn test_flexibility_buckets() {
        assert_eq!(flexibility_bucket(90), 1.0);
        assert_eq!(flexibility_bucket(45), 0.75);
        assert_eq!(flexibility_bucket(20), 0.5);
        assert_eq!(flexibility_bucket(5), 0.25);
        assert_eq!(flexibility_bucket(0), 0.1);
    }
}
