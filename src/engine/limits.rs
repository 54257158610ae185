//! Day-scoped operation limits for peer-farm actions.
//!
//! The server caps how often each peer-farm operation may be used per day
//! and separately how many of those uses still grant experience. Usage caps
//! arrive in limit snapshots; experience exhaustion is never reported
//! directly and has to be inferred from an unchanged experience counter
//! across a call. Everything here resets at local midnight.

use crate::wire::InteractLimit;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Peer-farm operation kinds, in the order a visit executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    HelpWeed,
    HelpPest,
    HelpWater,
    Steal,
    SowWeed,
    SowInsect,
}

impl OpKind {
    pub const VISIT_ORDER: [OpKind; 6] = [
        OpKind::HelpWeed,
        OpKind::HelpPest,
        OpKind::HelpWater,
        OpKind::Steal,
        OpKind::SowWeed,
        OpKind::SowInsect,
    ];

    /// Wire code used in [`InteractLimit::op`].
    pub fn code(self) -> i32 {
        match self {
            Self::HelpWater => 1,
            Self::HelpWeed => 2,
            Self::HelpPest => 3,
            Self::Steal => 4,
            Self::SowWeed => 5,
            Self::SowInsect => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::HelpWater),
            2 => Some(Self::HelpWeed),
            3 => Some(Self::HelpPest),
            4 => Some(Self::Steal),
            5 => Some(Self::SowWeed),
            6 => Some(Self::SowInsect),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::HelpWater => "help-water",
            Self::HelpWeed => "help-weed",
            Self::HelpPest => "help-pest",
            Self::Steal => "steal",
            Self::SowWeed => "sow-weed",
            Self::SowInsect => "sow-insect",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    used: i64,
    cap: i64,
    exp_used: i64,
}

/// All per-kind counters for one local day. The cache is advisory: the
/// server enforces its own caps, and a remote rejection of an over-cap call
/// is still handled as an ordinary failure by the caller.
#[derive(Debug)]
pub struct DayLimits {
    day: NaiveDate,
    counters: HashMap<OpKind, Counters>,
    exp_exhausted: HashSet<OpKind>,
}

impl DayLimits {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            counters: HashMap::new(),
            exp_exhausted: HashSet::new(),
        }
    }

    /// Discard everything when the local date rolls over. Re-arms the
    /// experience-exhaustion inference.
    pub fn roll(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.counters.clear();
            self.exp_exhausted.clear();
        }
    }

    /// Fold a server snapshot into the counters.
    pub fn record(&mut self, snapshot: &InteractLimit) {
        let Some(kind) = OpKind::from_code(snapshot.op) else {
            return;
        };
        let entry = self.counters.entry(kind).or_default();
        entry.used = snapshot.used;
        entry.cap = snapshot.cap;
        entry.exp_used = snapshot.exp_used;
    }

    /// Record one locally observed use for kinds whose reply carried no
    /// snapshot.
    pub fn bump(&mut self, kind: OpKind) {
        self.counters.entry(kind).or_default().used += 1;
    }

    /// Remaining uses today. `None` means the cap is unknown or unlimited.
    pub fn remaining(&self, kind: OpKind) -> Option<i64> {
        let counters = self.counters.get(&kind)?;
        if counters.cap <= 0 {
            return None;
        }
        Some((counters.cap - counters.used).max(0))
    }

    /// Last known experience counter for the kind.
    pub fn exp_used(&self, kind: OpKind) -> i64 {
        self.counters.get(&kind).map_or(0, |c| c.exp_used)
    }

    /// Both gates for issuing another operation of this kind: uses left
    /// (cap of zero means unlimited) and experience not yet exhausted.
    pub fn may_use(&self, kind: OpKind) -> bool {
        if self.exp_exhausted.contains(&kind) {
            return false;
        }
        self.remaining(kind).is_none_or(|left| left > 0)
    }

    pub fn is_exhausted(&self, kind: OpKind) -> bool {
        self.exp_exhausted.contains(&kind)
    }

    /// Experience-delta inference: compare the counter before and after a
    /// same-kind call. An unchanged counter marks the kind exhausted for
    /// the rest of the day.
    pub fn infer_exhaustion(&mut self, kind: OpKind, exp_before: i64) -> bool {
        if self.exp_used(kind) <= exp_before {
            self.exp_exhausted.insert(kind);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, n).unwrap()
    }

    fn snapshot(kind: OpKind, used: i64, cap: i64, exp_used: i64) -> InteractLimit {
        InteractLimit {
            op: kind.code(),
            used,
            cap,
            exp_used,
            exp_cap: 0,
        }
    }

    #[test]
    fn test_unknown_kind_is_unlimited() {
        let limits = DayLimits::new(day(1));
        assert!(limits.may_use(OpKind::Steal));
        assert_eq!(limits.remaining(OpKind::Steal), None);
    }

    #[test]
    fn test_zero_cap_means_unlimited() {
        let mut limits = DayLimits::new(day(1));
        limits.record(&snapshot(OpKind::HelpWater, 50, 0, 10));
        assert!(limits.may_use(OpKind::HelpWater));
        assert_eq!(limits.remaining(OpKind::HelpWater), None);
    }

    #[test]
    fn test_cap_reached_blocks_use() {
        let mut limits = DayLimits::new(day(1));
        limits.record(&snapshot(OpKind::Steal, 20, 20, 5));
        assert_eq!(limits.remaining(OpKind::Steal), Some(0));
        assert!(!limits.may_use(OpKind::Steal));
    }

    #[test]
    fn test_exhaustion_inferred_from_flat_counter() {
        let mut limits = DayLimits::new(day(1));
        limits.record(&snapshot(OpKind::HelpWeed, 3, 0, 8));

        let before = limits.exp_used(OpKind::HelpWeed);
        // Reply snapshot shows the counter did not move.
        limits.record(&snapshot(OpKind::HelpWeed, 4, 0, 8));
        assert!(limits.infer_exhaustion(OpKind::HelpWeed, before));
        assert!(!limits.may_use(OpKind::HelpWeed));
    }

    #[test]
    fn test_growing_counter_is_not_exhaustion() {
        let mut limits = DayLimits::new(day(1));
        limits.record(&snapshot(OpKind::HelpWeed, 3, 0, 8));

        let before = limits.exp_used(OpKind::HelpWeed);
        limits.record(&snapshot(OpKind::HelpWeed, 4, 0, 9));
        assert!(!limits.infer_exhaustion(OpKind::HelpWeed, before));
        assert!(limits.may_use(OpKind::HelpWeed));
    }

    #[test]
    fn test_day_rollover_rearms_everything() {
        let mut limits = DayLimits::new(day(1));
        limits.record(&snapshot(OpKind::Steal, 20, 20, 5));
        let before = limits.exp_used(OpKind::Steal);
        limits.record(&snapshot(OpKind::Steal, 20, 20, 5));
        limits.infer_exhaustion(OpKind::Steal, before);
        assert!(!limits.may_use(OpKind::Steal));

        limits.roll(day(2));
        assert!(limits.may_use(OpKind::Steal));
        assert!(!limits.is_exhausted(OpKind::Steal));
        assert_eq!(limits.remaining(OpKind::Steal), None);
    }

    #[test]
    fn test_same_day_roll_is_noop() {
        let mut limits = DayLimits::new(day(1));
        limits.record(&snapshot(OpKind::Steal, 5, 20, 5));
        limits.roll(day(1));
        assert_eq!(limits.remaining(OpKind::Steal), Some(15));
    }

    #[test]
    fn test_bump_counts_without_snapshot() {
        let mut limits = DayLimits::new(day(1));
        limits.record(&snapshot(OpKind::HelpPest, 0, 2, 0));
        limits.bump(OpKind::HelpPest);
        limits.bump(OpKind::HelpPest);
        assert_eq!(limits.remaining(OpKind::HelpPest), Some(0));
    }
}
