//! Friend visits: help with chores, steal ripe fruit, leave trouble behind.
//!
//! Peer-farm operations are rationed per day; see [`super::limits`]. Each
//! visit executes operation kinds in a fixed order and stops a kind as soon
//! as its budget runs out, on this friend and every later one today.

use super::field::{PeerSurvey, survey_peer_lands};
use super::limits::{DayLimits, OpKind};
use super::{ITEM_DELAY, TickGuard, VISIT_DELAY, run_loop};
use crate::clock::ServerClock;
use crate::config::Config;
use crate::gateway::{Gateway, GatewayError};
use crate::notify::Notifier;
use crate::session::Identity;
use crate::wire::InteractLimit;
use crate::wire::friend::{
    self, EnterReply, EnterRequest, FriendBrief, GetAllReply, GetAllRequest, LeaveReply,
    LeaveRequest,
};
use crate::wire::plant::{
    self, HarvestReply, HarvestRequest, InsecticideReply, InsecticideRequest, SowInsectReply,
    SowInsectRequest, SowWeedReply, SowWeedRequest, WaterLandReply, WaterLandRequest,
    WeedOutReply, WeedOutRequest,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const START_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Default)]
struct VisitTally {
    helped: u32,
    stolen: u32,
    weeds_sown: u32,
    insects_sown: u32,
}

pub struct FriendEngine {
    gateway: Gateway,
    clock: Arc<ServerClock>,
    identity: Arc<Mutex<Identity>>,
    config: Arc<Config>,
    notifier: Arc<dyn Notifier>,
    limits: Mutex<DayLimits>,
    busy: AtomicBool,
}

impl FriendEngine {
    pub fn new(
        gateway: Gateway,
        clock: Arc<ServerClock>,
        identity: Arc<Mutex<Identity>>,
        config: Arc<Config>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            clock,
            identity,
            config,
            notifier,
            limits: Mutex::new(DayLimits::new(chrono::Local::now().date_naive())),
            busy: AtomicBool::new(false),
        })
    }

    pub fn spawn(self: &Arc<Self>, stop: CancellationToken) {
        let engine = self.clone();
        let period = engine.config.friend_interval();
        tokio::spawn(run_loop(START_DELAY, period, stop, move || {
            let engine = engine.clone();
            async move { engine.tick().await }
        }));
    }

    pub async fn tick(&self) {
        let Some(_guard) = TickGuard::acquire(&self.busy) else {
            debug!("friend round still running, skipping");
            return;
        };
        if let Err(err) = self.round().await {
            warn!(%err, "friend round failed");
        }
    }

    async fn round(&self) -> Result<(), GatewayError> {
        self.limits
            .lock()
            .expect("limits lock poisoned")
            .roll(chrono::Local::now().date_naive());

        let roster: GetAllReply = self
            .gateway
            .call_proto(
                friend::FRIEND_SERVICE,
                friend::GET_ALL,
                &GetAllRequest {},
                self.config.call_timeout(),
            )
            .await?;

        let self_gid = self.self_gid();
        let mut seen = std::collections::HashSet::new();
        let worth_visiting: Vec<&FriendBrief> = roster
            .game_friends
            .iter()
            .filter(|f| f.gid != self_gid && f.gid != 0 && seen.insert(f.gid))
            .filter(|f| {
                f.plant.as_ref().is_some_and(|p| {
                    p.steal_plant_num > 0 || p.dry_num > 0 || p.weed_num > 0 || p.insect_num > 0
                })
            })
            .collect();

        if worth_visiting.is_empty() {
            debug!(roster = roster.game_friends.len(), "no friend needs a visit");
            return Ok(());
        }
        info!(
            candidates = worth_visiting.len(),
            roster = roster.game_friends.len(),
            "starting friend round"
        );

        let mut tally = VisitTally::default();
        for friend in worth_visiting {
            match self.visit(friend, self_gid, &mut tally).await {
                Ok(()) => {}
                Err(err) => warn!(gid = friend.gid, name = %friend.name, %err, "visit failed"),
            }
            tokio::time::sleep(VISIT_DELAY).await;
        }

        if tally.stolen > 0 || tally.weeds_sown > 0 || tally.insects_sown > 0 {
            self.notifier
                .notify(&format!(
                    "friend round: helped {} times, stole {} crops, sowed {} weeds and {} pests",
                    tally.helped, tally.stolen, tally.weeds_sown, tally.insects_sown
                ))
                .await;
        }
        Ok(())
    }

    async fn visit(
        &self,
        friend: &FriendBrief,
        self_gid: i64,
        tally: &mut VisitTally,
    ) -> Result<(), GatewayError> {
        let enter: EnterReply = self
            .gateway
            .call_proto(
                friend::VISIT_SERVICE,
                friend::ENTER,
                &EnterRequest {
                    host_gid: friend.gid,
                    reason: friend::ENTER_REASON_FRIEND,
                },
                self.config.call_timeout(),
            )
            .await?;

        {
            let mut limits = self.limits.lock().expect("limits lock poisoned");
            for snapshot in &enter.limits {
                limits.record(snapshot);
            }
        }

        let survey = survey_peer_lands(&enter.lands, self.clock.now_secs(), self_gid);
        debug!(
            gid = friend.gid,
            name = %friend.name,
            stealable = survey.stealable.len(),
            dry = survey.need_water.len(),
            weeds = survey.need_weed.len(),
            insects = survey.need_pest.len(),
            "entered friend farm"
        );

        for kind in OpKind::VISIT_ORDER {
            let lands = targets(&survey, kind);
            if lands.is_empty() {
                continue;
            }
            self.run_kind(kind, friend.gid, lands, tally).await;
        }

        // Leaving is best-effort; the server also times visits out.
        if let Err(err) = self
            .gateway
            .call_proto::<_, LeaveReply>(
                friend::VISIT_SERVICE,
                friend::LEAVE,
                &LeaveRequest {
                    host_gid: friend.gid,
                },
                self.config.call_timeout(),
            )
            .await
        {
            debug!(gid = friend.gid, %err, "leave failed, ignoring");
        }
        Ok(())
    }

    /// Run one operation kind against one friend, one land per call. Stops
    /// the kind when its daily budget runs out or its experience counter
    /// stops moving.
    async fn run_kind(&self, kind: OpKind, host_gid: i64, lands: &[i64], tally: &mut VisitTally) {
        for &land_id in lands {
            let exp_before = {
                let limits = self.limits.lock().expect("limits lock poisoned");
                if !limits.may_use(kind) {
                    debug!(op = kind.name(), "daily budget spent, skipping");
                    return;
                }
                limits.exp_used(kind)
            };

            match self.perform(kind, host_gid, land_id).await {
                Ok(snapshot) => {
                    let exhausted = {
                        let mut limits = self.limits.lock().expect("limits lock poisoned");
                        match &snapshot {
                            Some(limit) => {
                                limits.record(limit);
                                limits.infer_exhaustion(kind, exp_before)
                            }
                            None => {
                                limits.bump(kind);
                                false
                            }
                        }
                    };
                    self.count(kind, tally);
                    if exhausted {
                        info!(op = kind.name(), "experience exhausted for today");
                        return;
                    }
                }
                Err(err) => {
                    warn!(op = kind.name(), gid = host_gid, land = land_id, %err, "op failed");
                    return;
                }
            }
            tokio::time::sleep(ITEM_DELAY).await;
        }
    }

    async fn perform(
        &self,
        kind: OpKind,
        host_gid: i64,
        land_id: i64,
    ) -> Result<Option<InteractLimit>, GatewayError> {
        let timeout = self.config.call_timeout();
        let land_ids = vec![land_id];
        let limit = match kind {
            OpKind::HelpWeed => {
                let reply: WeedOutReply = self
                    .gateway
                    .call_proto(
                        plant::SERVICE,
                        plant::WEED_OUT,
                        &WeedOutRequest { land_ids, host_gid },
                        timeout,
                    )
                    .await?;
                reply.limit
            }
            OpKind::HelpPest => {
                let reply: InsecticideReply = self
                    .gateway
                    .call_proto(
                        plant::SERVICE,
                        plant::INSECTICIDE,
                        &InsecticideRequest { land_ids, host_gid },
                        timeout,
                    )
                    .await?;
                reply.limit
            }
            OpKind::HelpWater => {
                let reply: WaterLandReply = self
                    .gateway
                    .call_proto(
                        plant::SERVICE,
                        plant::WATER_LAND,
                        &WaterLandRequest { land_ids, host_gid },
                        timeout,
                    )
                    .await?;
                reply.limit
            }
            OpKind::Steal => {
                let reply: HarvestReply = self
                    .gateway
                    .call_proto(
                        plant::SERVICE,
                        plant::HARVEST,
                        &HarvestRequest {
                            land_ids,
                            host_gid,
                            is_all: false,
                        },
                        timeout,
                    )
                    .await?;
                reply.limit
            }
            OpKind::SowWeed => {
                let reply: SowWeedReply = self
                    .gateway
                    .call_proto(
                        plant::SERVICE,
                        plant::SOW_WEED,
                        &SowWeedRequest { land_ids, host_gid },
                        timeout,
                    )
                    .await?;
                reply.limit
            }
            OpKind::SowInsect => {
                let reply: SowInsectReply = self
                    .gateway
                    .call_proto(
                        plant::SERVICE,
                        plant::SOW_INSECT,
                        &SowInsectRequest { land_ids, host_gid },
                        timeout,
                    )
                    .await?;
                reply.limit
            }
        };
        Ok(limit)
    }

    fn count(&self, kind: OpKind, tally: &mut VisitTally) {
        match kind {
            OpKind::HelpWeed | OpKind::HelpPest | OpKind::HelpWater => tally.helped += 1,
            OpKind::Steal => tally.stolen += 1,
            OpKind::SowWeed => tally.weeds_sown += 1,
            OpKind::SowInsect => tally.insects_sown += 1,
        }
    }

    fn self_gid(&self) -> i64 {
        self.identity.lock().expect("identity lock poisoned").gid
    }
}

fn targets(survey: &PeerSurvey, kind: OpKind) -> &[i64] {
    match kind {
        OpKind::HelpWeed => &survey.need_weed,
        OpKind::HelpPest => &survey.need_pest,
        OpKind::HelpWater => &survey.need_water,
        OpKind::Steal => &survey.stealable,
        OpKind::SowWeed => &survey.weedable,
        OpKind::SowInsect => &survey.infestable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::friend::FarmSummary;

    fn brief(gid: i64, summary: Option<FarmSummary>) -> FriendBrief {
        FriendBrief {
            gid,
            name: format!("friend-{gid}"),
            remark: String::new(),
            plant: summary,
        }
    }

    fn needy() -> FarmSummary {
        FarmSummary {
            steal_plant_num: 1,
            dry_num: 0,
            weed_num: 0,
            insect_num: 0,
        }
    }

    #[test]
    fn test_roster_filter_keeps_needy_friends_only() {
        let self_gid = 42;
        let roster = vec![
            brief(42, Some(needy())),  // self
            brief(7, Some(needy())),   // needy
            brief(7, Some(needy())),   // duplicate
            brief(8, None),            // no summary
            brief(9, Some(FarmSummary::default())), // quiet
            brief(0, Some(needy())),   // placeholder gid
        ];

        let mut seen = std::collections::HashSet::new();
        let picked: Vec<i64> = roster
            .iter()
            .filter(|f| f.gid != self_gid && f.gid != 0 && seen.insert(f.gid))
            .filter(|f| {
                f.plant.as_ref().is_some_and(|p| {
                    p.steal_plant_num > 0 || p.dry_num > 0 || p.weed_num > 0 || p.insect_num > 0
                })
            })
            .map(|f| f.gid)
            .collect();
        assert_eq!(picked, vec![7]);
    }

    #[test]
    fn test_targets_follow_visit_order_mapping() {
        let survey = PeerSurvey {
            stealable: vec![1],
            need_water: vec![2],
            need_weed: vec![3],
            need_pest: vec![4],
            weedable: vec![5],
            infestable: vec![6],
        };
        assert_eq!(targets(&survey, OpKind::Steal), &[1]);
        assert_eq!(targets(&survey, OpKind::HelpWater), &[2]);
        assert_eq!(targets(&survey, OpKind::HelpWeed), &[3]);
        assert_eq!(targets(&survey, OpKind::HelpPest), &[4]);
        assert_eq!(targets(&survey, OpKind::SowWeed), &[5]);
        assert_eq!(targets(&survey, OpKind::SowInsect), &[6]);
    }
}
