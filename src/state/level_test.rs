use super::*;

// =============================================================
// derive_level
// =============================================================

#[test]
fn level_zero_stars() {
    let info = derive_level(0);
    assert_eq!(info.level, 1);
    assert_eq!(info.base, 0);
    assert_eq!(info.next_threshold, Some(5));
    assert!((info.progress - 0.0).abs() < f64::EPSILON);
}

#[test]
fn level_at_first_threshold() {
    let info = derive_level(5);
    assert_eq!(info.level, 2);
    assert_eq!(info.base, 5);
    assert_eq!(info.next_threshold, Some(10));
    assert!((info.progress - 0.0).abs() < f64::EPSILON);
}

#[test]
fn level_at_max_threshold() {
    let info = derive_level(100);
    assert_eq!(info.level, 10);
    assert_eq!(info.next_threshold, None);
    assert!((info.progress - 1.0).abs() < f64::EPSILON);
}

#[test]
fn level_beyond_max_stays_capped() {
    let info = derive_level(5000);
    assert_eq!(info.level, 10);
    assert_eq!(info.next_threshold, None);
    assert!((info.progress - 1.0).abs() < f64::EPSILON);
}

#[test]
fn level_equals_count_of_reached_thresholds() {
    for stars in 0..=150_u32 {
        let expected = LEVEL_THRESHOLDS
            .iter()
            .filter(|threshold| stars >= **threshold)
            .count()
            .clamp(1, LEVEL_THRESHOLDS.len());
        assert_eq!(derive_level(stars).level, expected, "stars={stars}");
    }
}

#[test]
fn progress_is_fractional_mid_band() {
    // Level 4 spans 20..30.
    let info = derive_level(25);
    assert_eq!(info.level, 4);
    assert!((info.progress - 0.5).abs() < f64::EPSILON);
}

#[test]
fn progress_stays_clamped() {
    for stars in 0..=200_u32 {
        let progress = derive_level(stars).progress;
        assert!((0.0..=1.0).contains(&progress), "stars={stars}");
    }
}

// =============================================================
// is_level_up
// =============================================================

#[test]
fn level_up_is_strictly_increasing() {
    assert!(is_level_up(1, 2));
    assert!(!is_level_up(2, 2));
    assert!(!is_level_up(2, 1));
}

// =============================================================
// LevelTracker
// =============================================================

#[test]
fn crossing_a_threshold_sets_the_flag_once() {
    let mut tracker = LevelTracker::default();
    tracker.baseline(0);

    tracker.observe(4, 1_000);
    assert!(!tracker.just_leveled(), "4 stars is still level 1");

    tracker.observe(5, 2_000);
    assert!(tracker.just_leveled(), "4→5 crosses the first threshold");

    tracker.observe(6, 3_000);
    assert!(tracker.just_leveled(), "same level keeps the pending flag");
    assert_eq!(tracker.level(), 2);
}

#[test]
fn level_decrease_clears_the_flag() {
    let mut tracker = LevelTracker::default();
    tracker.baseline(0);
    tracker.observe(5, 1_000);
    assert!(tracker.just_leveled());

    tracker.observe(4, 2_000);
    assert!(!tracker.just_leveled());
    assert_eq!(tracker.level(), 1);
}

#[test]
fn baseline_never_animates() {
    let mut tracker = LevelTracker::default();
    tracker.baseline(20);
    assert!(!tracker.just_leveled());
    assert_eq!(tracker.level(), 4);
}

#[test]
fn flag_auto_clears_after_delay() {
    let mut tracker = LevelTracker::default();
    tracker.baseline(0);
    tracker.observe(5, 1_000);

    tracker.tick(1_000 + LEVEL_FLAG_MS - 1);
    assert!(tracker.just_leveled());

    tracker.tick(1_000 + LEVEL_FLAG_MS);
    assert!(!tracker.just_leveled());
}

#[test]
fn zero_to_zero_never_fires() {
    let mut tracker = LevelTracker::default();
    tracker.baseline(0);
    tracker.observe(0, 1_000);
    assert!(!tracker.just_leveled());
}
