//! Leveling calculator: pure derivation of level/progress from the raw
//! star counter, plus transition tracking for the level-up celebration.
//!
//! Level is never stored — only stars are committed state — so a threshold
//! table change can never diverge from persisted data.

#[cfg(test)]
#[path = "level_test.rs"]
mod tests;

/// Ascending star thresholds; index `i` is the base of level `i + 1`.
pub const LEVEL_THRESHOLDS: [u32; 10] = [0, 5, 10, 20, 30, 40, 50, 60, 80, 100];

/// How long the level-up flag stays set before auto-clearing.
pub const LEVEL_FLAG_MS: i64 = 2800;

/// Derived level data for a star total.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelInfo {
    /// 1-based level, capped at the table length.
    pub level: usize,
    /// Star base of the current level.
    pub base: u32,
    /// Stars needed for the next level, `None` at max level.
    pub next_threshold: Option<u32>,
    /// Progress toward the next threshold in `[0, 1]`; `1.0` at max level.
    pub progress: f64,
}

/// Derive the level for a star total against the fixed threshold table.
#[must_use]
pub fn derive_level(stars: u32) -> LevelInfo {
    let level = LEVEL_THRESHOLDS
        .iter()
        .filter(|threshold| stars >= **threshold)
        .count()
        .max(1);
    let base = LEVEL_THRESHOLDS[level - 1];
    let next_threshold = LEVEL_THRESHOLDS.get(level).copied();

    let progress = next_threshold.map_or(1.0, |next| {
        f64::from(stars - base) / f64::from(next - base)
    });

    LevelInfo {
        level,
        base,
        next_threshold,
        progress: progress.clamp(0.0, 1.0),
    }
}

/// True iff the derived level strictly increased.
#[must_use]
pub fn is_level_up(prev_level: usize, new_level: usize) -> bool {
    new_level > prev_level
}

/// Tracks level transitions across star updates and owns the transient
/// celebration flag.
///
/// The very first observation after mount and the first authoritative point
/// sync are baselines, not transitions: they move the reference level
/// silently so joining mid-session with a high star count never animates.
#[derive(Clone, Debug)]
pub struct LevelTracker {
    prev_level: usize,
    just_leveled: bool,
    leveled_at: Option<i64>,
}

impl Default for LevelTracker {
    fn default() -> Self {
        Self {
            prev_level: 1,
            just_leveled: false,
            leveled_at: None,
        }
    }
}

impl LevelTracker {
    /// Silently move the reference level to match `stars` (no animation).
    pub fn baseline(&mut self, stars: u32) {
        self.prev_level = derive_level(stars).level;
        self.just_leveled = false;
        self.leveled_at = None;
    }

    /// Observe a committed star total; sets the level-up flag on a strict
    /// increase and drops it on any other change.
    pub fn observe(&mut self, stars: u32, now_ms: i64) {
        let level = derive_level(stars).level;
        if is_level_up(self.prev_level, level) {
            self.just_leveled = true;
            self.leveled_at = Some(now_ms);
        } else if level != self.prev_level {
            self.just_leveled = false;
            self.leveled_at = None;
        }
        self.prev_level = level;
    }

    /// Auto-clear the flag once [`LEVEL_FLAG_MS`] has elapsed.
    pub fn tick(&mut self, now_ms: i64) {
        if let Some(at) = self.leveled_at {
            if now_ms.saturating_sub(at) >= LEVEL_FLAG_MS {
                self.just_leveled = false;
                self.leveled_at = None;
            }
        }
    }

    #[must_use]
    pub fn just_leveled(&self) -> bool {
        self.just_leveled
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.prev_level
    }
}
