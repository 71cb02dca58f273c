//! Window finding against behavioral memory.
//!
//! Exercises the full path from learned slot history and sacred times to
//! scored, buffered, non-overlapping proposals.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use ghost_core::{
    BehavioralMemoryStore, GhostConfig, OptimalWindowFinder, SacredTimeReason, TimeSlotKey,
    TimeWindow, WindowRequest,
};

/// Monday.
fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date().and_hms_opt(hour, min, 0).unwrap())
}

fn packed_day() -> Vec<TimeWindow> {
    vec![
        TimeWindow::new(at(9, 0), at(10, 0)),
        TimeWindow::new(at(11, 0), at(12, 30)),
        TimeWindow::new(at(14, 0), at(15, 0)),
        TimeWindow::new(at(17, 0), at(18, 0)),
    ]
}

#[test]
fn packed_day_yields_valid_windows() {
    let finder = OptimalWindowFinder::new(&GhostConfig::default());
    let store = BehavioralMemoryStore::new();
    let request = WindowRequest {
        date: date(),
        workout_duration_minutes: 45,
        count: 5,
    };

    let windows = finder.find(&request, &packed_day(), &store.snapshot(), None);
    assert!(!windows.is_empty());

    for scored in &windows {
        // The workout plus both 15-minute buffers fits the window.
        assert!(scored.window.duration_minutes() >= 45 + 30);
        // Suggested start is strictly inside and leaves room to finish.
        assert!(scored.suggested_start > scored.window.start);
        assert!(scored.suggested_start + Duration::minutes(45) <= scored.window.end);
        // Nothing overlaps a busy slot once buffers are applied.
        let padded = TimeWindow::new(
            scored.suggested_start - Duration::minutes(15),
            scored.suggested_start + Duration::minutes(45 + 15),
        );
        for busy in packed_day() {
            assert!(!padded.overlaps(&busy));
        }
    }
}

#[test]
fn results_are_sorted_and_limited() {
    let finder = OptimalWindowFinder::new(&GhostConfig::default());
    let store = BehavioralMemoryStore::new();
    let request = WindowRequest {
        date: date(),
        workout_duration_minutes: 30,
        count: 2,
    };

    let windows = finder.find(&request, &packed_day(), &store.snapshot(), None);
    assert!(windows.len() <= 2);
    for pair in windows.windows(2) {
        assert!(pair[0].score.total >= pair[1].score.total);
    }
}

#[test]
fn sacred_times_from_repeated_deletions_are_respected() {
    let finder = OptimalWindowFinder::new(&GhostConfig::default());
    let store = BehavioralMemoryStore::new();

    // Three penalties at Monday 06:00 promote the slot to sacred.
    let slot = TimeSlotKey::new(1, 6).unwrap();
    for _ in 0..3 {
        store.record_penalty(slot, at(6, 0));
    }
    let memory = store.snapshot();
    assert!(memory.is_sacred(slot));

    let request = WindowRequest {
        date: date(),
        workout_duration_minutes: 45,
        count: 10,
    };
    let windows = finder.find(&request, &[], &memory, None);
    assert!(!windows.is_empty());

    let sacred_window = TimeWindow::new(at(6, 0), at(7, 0));
    for scored in &windows {
        assert!(!scored.window.overlaps(&sacred_window));
        assert!(scored.suggested_start >= at(7, 0));
    }
}

#[test]
fn user_designated_sacred_times_are_respected_every_weekday() {
    let finder = OptimalWindowFinder::new(&GhostConfig::default());
    let store = BehavioralMemoryStore::new();
    // Lunch hour is sacred on every weekday.
    for day in 1..=7 {
        store.designate_sacred(
            TimeSlotKey::new(day, 12).unwrap(),
            SacredTimeReason::LunchHour,
            at(0, 0),
        );
    }
    let memory = store.snapshot();

    for offset in 0..7 {
        let day = date() + Duration::days(offset);
        let request = WindowRequest {
            date: day,
            workout_duration_minutes: 45,
            count: 10,
        };
        let windows = finder.find(&request, &[], &memory, None);
        for scored in &windows {
            let lunch_start = Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap());
            let lunch = TimeWindow::new(lunch_start, lunch_start + Duration::hours(1));
            assert!(
                !scored.window.overlaps(&lunch),
                "{} window overlaps lunch on weekday {}",
                scored.window.start,
                day.weekday().number_from_monday()
            );
        }
    }
}

#[test]
fn fully_blocked_day_returns_nothing() {
    let finder = OptimalWindowFinder::new(&GhostConfig::default());
    let store = BehavioralMemoryStore::new();
    let busy = vec![TimeWindow::new(at(6, 0), at(22, 0))];
    let request = WindowRequest {
        date: date(),
        workout_duration_minutes: 45,
        count: 3,
    };
    assert!(finder.find(&request, &busy, &store.snapshot(), None).is_empty());
}

#[test]
fn good_history_beats_equal_gap_with_bad_history() {
    let finder = OptimalWindowFinder::new(&GhostConfig::default());
    let store = BehavioralMemoryStore::new();
    // Strong evening record, weak morning record, equal gap sizes.
    for i in 0..9 {
        store.record_slot_completed(TimeSlotKey::new(1, 18).unwrap(), at(18, 0) - Duration::weeks(i));
        store.record_slot_missed(TimeSlotKey::new(1, 6).unwrap(), at(6, 0) - Duration::weeks(i));
    }

    let busy = vec![
        TimeWindow::new(at(8, 0), at(18, 0)),
        TimeWindow::new(at(20, 0), at(22, 0)),
    ];
    let request = WindowRequest {
        date: date(),
        workout_duration_minutes: 45,
        count: 2,
    };
    let windows = finder.find(&request, &busy, &store.snapshot(), None);
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].suggested_start.hour(), 18);
}
