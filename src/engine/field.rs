//! Land analysis shared by the farm and friend engines.
//!
//! Everything here is a pure function of a server snapshot plus the
//! estimated server time — no local memo survives between poll cycles, so
//! re-running analysis against unchanged state always yields the same plan.

use crate::clock::norm_secs;
use crate::wire::plant::{GrowthPhase, Land, PlantState};

/// Growth phase kinds in growth order. The ordinal matters: later phases
/// win ties during effective-phase resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhaseKind {
    Unknown = 0,
    Seed = 1,
    Germination = 2,
    SmallLeaves = 3,
    LargeLeaves = 4,
    Blooming = 5,
    Mature = 6,
    Dead = 7,
}

impl PhaseKind {
    pub fn from_i32(raw: i32) -> Self {
        match raw {
            1 => Self::Seed,
            2 => Self::Germination,
            3 => Self::SmallLeaves,
            4 => Self::LargeLeaves,
            5 => Self::Blooming,
            6 => Self::Mature,
            7 => Self::Dead,
            _ => Self::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Seed => "seed",
            Self::Germination => "germination",
            Self::SmallLeaves => "small-leaves",
            Self::LargeLeaves => "large-leaves",
            Self::Blooming => "blooming",
            Self::Mature => "mature",
            Self::Dead => "dead",
        }
    }
}

/// Resolve the phase a plant is actually in at `now_secs` (server time).
///
/// Scans from the latest phase backwards and picks the first whose begin
/// time has passed. If every phase starts in the future — clock skew or a
/// server anomaly — the first phase wins.
pub fn effective_phase(phases: &[GrowthPhase], now_secs: i64) -> Option<&GrowthPhase> {
    if phases.is_empty() {
        return None;
    }
    for phase in phases.iter().rev() {
        let begin = norm_secs(phase.begin_time);
        if begin > 0 && begin <= now_secs {
            return Some(phase);
        }
    }
    phases.first()
}

/// What one growing land currently needs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Needs {
    pub water: bool,
    pub weed: bool,
    pub pest: bool,
}

/// Per-cycle classification of the whole farm. Ids are land ids; every
/// unlocked land appears in exactly one of the four state lists.
#[derive(Debug, Default)]
pub struct FieldSurvey {
    pub harvestable: Vec<i64>,
    pub dead: Vec<i64>,
    pub growing: Vec<i64>,
    pub empty: Vec<i64>,
    pub need_water: Vec<i64>,
    pub need_weed: Vec<i64>,
    pub need_pest: Vec<i64>,
}

impl FieldSurvey {
    pub fn is_quiet(&self) -> bool {
        self.harvestable.is_empty()
            && self.dead.is_empty()
            && self.empty.is_empty()
            && self.need_water.is_empty()
            && self.need_weed.is_empty()
            && self.need_pest.is_empty()
    }
}

fn plant_needs(plant: &PlantState, phase: &GrowthPhase, now_secs: i64) -> Needs {
    let dry_due = {
        let at = norm_secs(phase.dry_time);
        at > 0 && at <= now_secs
    };
    let weeds_due = {
        let at = norm_secs(phase.weeds_time);
        at > 0 && at <= now_secs
    };
    let insects_due = {
        let at = norm_secs(phase.insect_time);
        at > 0 && at <= now_secs
    };
    Needs {
        water: plant.dry_num > 0 || dry_due,
        weed: !plant.weed_owners.is_empty() || weeds_due,
        pest: !plant.insect_owners.is_empty() || insects_due,
    }
}

/// Classify every unlocked land on the own farm.
pub fn survey_lands(lands: &[Land], now_secs: i64) -> FieldSurvey {
    let mut survey = FieldSurvey::default();

    for land in lands {
        if !land.unlocked {
            continue;
        }
        let Some(plant) = &land.plant else {
            survey.empty.push(land.id);
            continue;
        };
        let Some(phase) = effective_phase(&plant.phases, now_secs) else {
            survey.empty.push(land.id);
            continue;
        };

        match PhaseKind::from_i32(phase.phase) {
            PhaseKind::Dead => survey.dead.push(land.id),
            PhaseKind::Mature => survey.harvestable.push(land.id),
            _ => {
                let needs = plant_needs(plant, phase, now_secs);
                if needs.water {
                    survey.need_water.push(land.id);
                }
                if needs.weed {
                    survey.need_weed.push(land.id);
                }
                if needs.pest {
                    survey.need_pest.push(land.id);
                }
                survey.growing.push(land.id);
            }
        }
    }

    survey
}

/// One peer land worth acting on during a visit.
#[derive(Debug, Default)]
pub struct PeerSurvey {
    pub stealable: Vec<i64>,
    pub need_water: Vec<i64>,
    pub need_weed: Vec<i64>,
    pub need_pest: Vec<i64>,
    /// Growing lands open to a weed nuisance (owner cap not reached,
    /// self not already an owner).
    pub weedable: Vec<i64>,
    /// Growing lands open to a pest nuisance.
    pub infestable: Vec<i64>,
}

/// Afflicting-owner cap per nuisance kind on one peer land.
pub const NUISANCE_OWNER_CAP: usize = 2;

/// Classify a peer's lands for a visit. `self_gid` is the visiting
/// session's identity, used for the nuisance ownership rule.
pub fn survey_peer_lands(lands: &[Land], now_secs: i64, self_gid: i64) -> PeerSurvey {
    let mut survey = PeerSurvey::default();

    for land in lands {
        let Some(plant) = &land.plant else { continue };
        let Some(phase) = effective_phase(&plant.phases, now_secs) else {
            continue;
        };

        match PhaseKind::from_i32(phase.phase) {
            PhaseKind::Dead => {}
            PhaseKind::Mature => {
                if plant.stealable {
                    survey.stealable.push(land.id);
                }
            }
            _ => {
                if plant.dry_num > 0 {
                    survey.need_water.push(land.id);
                }
                if !plant.weed_owners.is_empty() {
                    survey.need_weed.push(land.id);
                }
                if !plant.insect_owners.is_empty() {
                    survey.need_pest.push(land.id);
                }
                if nuisance_open(&plant.weed_owners, self_gid) {
                    survey.weedable.push(land.id);
                }
                if nuisance_open(&plant.insect_owners, self_gid) {
                    survey.infestable.push(land.id);
                }
            }
        }
    }

    survey
}

fn nuisance_open(owners: &[i64], self_gid: i64) -> bool {
    owners.len() < NUISANCE_OWNER_CAP && !owners.contains(&self_gid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(kind: PhaseKind, begin: i64) -> GrowthPhase {
        GrowthPhase {
            phase: kind as i32,
            begin_time: begin,
            dry_time: 0,
            weeds_time: 0,
            insect_time: 0,
        }
    }

    fn land(id: i64, plant: Option<PlantState>) -> Land {
        Land {
            id,
            unlocked: true,
            plant,
        }
    }

    fn plant_with(phases: Vec<GrowthPhase>) -> PlantState {
        PlantState {
            id: 1,
            name: "test".into(),
            phases,
            dry_num: 0,
            weed_owners: vec![],
            insect_owners: vec![],
            stealable: false,
            left_fruit_num: 0,
        }
    }

    #[test]
    fn test_effective_phase_picks_latest_started() {
        // seed@10, germination@100, mature@200; at now=150 germination has
        // started and mature has not.
        let phases = vec![
            phase(PhaseKind::Seed, 10),
            phase(PhaseKind::Germination, 100),
            phase(PhaseKind::Mature, 200),
        ];
        let current = effective_phase(&phases, 150).unwrap();
        assert_eq!(PhaseKind::from_i32(current.phase), PhaseKind::Germination);
    }

    #[test]
    fn test_effective_phase_all_future_falls_back_to_first() {
        let phases = vec![
            phase(PhaseKind::Seed, 500),
            phase(PhaseKind::Germination, 600),
        ];
        let current = effective_phase(&phases, 100).unwrap();
        assert_eq!(PhaseKind::from_i32(current.phase), PhaseKind::Seed);
    }

    #[test]
    fn test_effective_phase_normalizes_millisecond_begin_times() {
        let phases = vec![
            phase(PhaseKind::Seed, 100_000),          // seconds
            phase(PhaseKind::Mature, 200_000_000_000_000), // millis, far future
        ];
        let current = effective_phase(&phases, 150_000).unwrap();
        assert_eq!(PhaseKind::from_i32(current.phase), PhaseKind::Seed);
    }

    #[test]
    fn test_effective_phase_empty_is_none() {
        assert!(effective_phase(&[], 100).is_none());
    }

    #[test]
    fn test_survey_classifies_each_land_exactly_once() {
        let lands = vec![
            land(1, Some(plant_with(vec![phase(PhaseKind::Mature, 10)]))),
            land(2, Some(plant_with(vec![phase(PhaseKind::Dead, 10)]))),
            land(3, Some(plant_with(vec![phase(PhaseKind::Blooming, 10)]))),
            land(4, None),
        ];
        let survey = survey_lands(&lands, 100);
        assert_eq!(survey.harvestable, vec![1]);
        assert_eq!(survey.dead, vec![2]);
        assert_eq!(survey.growing, vec![3]);
        assert_eq!(survey.empty, vec![4]);

        let total = survey.harvestable.len()
            + survey.dead.len()
            + survey.growing.len()
            + survey.empty.len();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_locked_lands_are_skipped() {
        let mut locked = land(9, None);
        locked.unlocked = false;
        let survey = survey_lands(&[locked], 100);
        assert!(survey.empty.is_empty());
    }

    #[test]
    fn test_growing_land_flags_due_triggers() {
        let mut p = plant_with(vec![GrowthPhase {
            phase: PhaseKind::LargeLeaves as i32,
            begin_time: 10,
            dry_time: 50,    // due
            weeds_time: 900, // not due
            insect_time: 0,  // never
        }]);
        p.insect_owners = vec![777]; // afflicted regardless of trigger time
        let survey = survey_lands(&[land(1, Some(p))], 100);
        assert_eq!(survey.need_water, vec![1]);
        assert!(survey.need_weed.is_empty());
        assert_eq!(survey.need_pest, vec![1]);
        assert_eq!(survey.growing, vec![1]);
    }

    #[test]
    fn test_dry_counter_flags_water_without_trigger() {
        let mut p = plant_with(vec![phase(PhaseKind::Seed, 10)]);
        p.dry_num = 2;
        let survey = survey_lands(&[land(1, Some(p))], 100);
        assert_eq!(survey.need_water, vec![1]);
    }

    #[test]
    fn test_peer_steal_requires_stealable_flag() {
        let mut ready = plant_with(vec![phase(PhaseKind::Mature, 10)]);
        ready.stealable = true;
        let guarded = plant_with(vec![phase(PhaseKind::Mature, 10)]);

        let survey = survey_peer_lands(&[land(1, Some(ready)), land(2, Some(guarded))], 100, 42);
        assert_eq!(survey.stealable, vec![1]);
    }

    #[test]
    fn test_peer_nuisance_cap_of_two_owners() {
        let mut capped = plant_with(vec![phase(PhaseKind::Blooming, 10)]);
        capped.weed_owners = vec![11, 22]; // cap reached, neither is self
        let mut open = plant_with(vec![phase(PhaseKind::Blooming, 10)]);
        open.weed_owners = vec![11];

        let survey = survey_peer_lands(&[land(1, Some(capped)), land(2, Some(open))], 100, 42);
        assert_eq!(survey.weedable, vec![2]);
    }

    #[test]
    fn test_peer_nuisance_excludes_own_affliction() {
        let mut mine = plant_with(vec![phase(PhaseKind::Blooming, 10)]);
        mine.insect_owners = vec![42];
        let survey = survey_peer_lands(&[land(1, Some(mine))], 100, 42);
        assert!(survey.infestable.is_empty());
        // It still qualifies for assistance.
        assert_eq!(survey.need_pest, vec![1]);
    }

    #[test]
    fn test_peer_mature_and_dead_lands_take_no_assists() {
        let mut mature = plant_with(vec![phase(PhaseKind::Mature, 10)]);
        mature.dry_num = 3;
        let mut dead = plant_with(vec![phase(PhaseKind::Dead, 10)]);
        dead.dry_num = 3;
        let survey = survey_peer_lands(&[land(1, Some(mature)), land(2, Some(dead))], 100, 42);
        assert!(survey.need_water.is_empty());
    }
}
