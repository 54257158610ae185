//! Own-farm patrol: harvest, tend, clear, replant, fertilize.

use super::field::{FieldSurvey, survey_lands};
use super::{ITEM_DELAY, STEP_DELAY, TickGuard, run_loop};
use crate::catalog::Catalog;
use crate::clock::ServerClock;
use crate::config::Config;
use crate::gateway::{Gateway, GatewayError};
use crate::session::Identity;
use crate::wire::plant::{
    self, AllLandsReply, AllLandsRequest, FertilizeReply, FertilizeRequest, HarvestReply,
    HarvestRequest, InsecticideReply, InsecticideRequest, PlantReply, PlantRequest,
    RemovePlantReply, RemovePlantRequest, SowItem, WaterLandReply, WaterLandRequest,
    WeedOutReply, WeedOutRequest,
};
use crate::wire::shop::{self, BuyGoodsReply, BuyGoodsRequest, Goods, ShopInfoReply, ShopInfoRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const START_DELAY: Duration = Duration::from_secs(2);

/// Remote error code for an exhausted consumable.
const CODE_ITEM_NOT_ENOUGH: i32 = 1301;

pub struct FarmEngine {
    gateway: Gateway,
    clock: Arc<ServerClock>,
    identity: Arc<Mutex<Identity>>,
    config: Arc<Config>,
    catalog: Arc<Catalog>,
    busy: AtomicBool,
    first_pass: AtomicBool,
}

impl FarmEngine {
    pub fn new(
        gateway: Gateway,
        clock: Arc<ServerClock>,
        identity: Arc<Mutex<Identity>>,
        config: Arc<Config>,
        catalog: Arc<Catalog>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            clock,
            identity,
            config,
            catalog,
            busy: AtomicBool::new(false),
            first_pass: AtomicBool::new(true),
        })
    }

    pub fn spawn(self: &Arc<Self>, stop: CancellationToken) {
        let engine = self.clone();
        let period = engine.config.farm_interval();
        tokio::spawn(run_loop(START_DELAY, period, stop, move || {
            let engine = engine.clone();
            async move { engine.tick().await }
        }));
    }

    /// One patrol pass. A tick that overlaps the previous one is dropped.
    pub async fn tick(&self) {
        let Some(_guard) = TickGuard::acquire(&self.busy) else {
            debug!("farm tick still running, skipping");
            return;
        };
        if let Err(err) = self.patrol().await {
            warn!(%err, "farm patrol failed");
        }
    }

    async fn patrol(&self) -> Result<(), GatewayError> {
        let timeout = self.config.call_timeout();
        let reply: AllLandsReply = self
            .gateway
            .call_proto(plant::SERVICE, plant::ALL_LANDS, &AllLandsRequest {}, timeout)
            .await?;
        if reply.lands.is_empty() {
            warn!("no land data returned, skipping tick");
            return Ok(());
        }

        let now = self.clock.now_secs();
        let survey = survey_lands(&reply.lands, now);

        if self.first_pass.swap(false, Ordering::SeqCst) {
            self.log_first_pass(&reply, &survey, now);
        }
        info!(
            harvestable = survey.harvestable.len(),
            growing = survey.growing.len(),
            dry = survey.need_water.len(),
            weeds = survey.need_weed.len(),
            insects = survey.need_pest.len(),
            empty = survey.empty.len(),
            dead = survey.dead.len(),
            "farm patrol"
        );

        // Fixed pipeline: weed, pest, water, harvest. A failed step is
        // logged and the rest still run.
        if !survey.need_weed.is_empty() {
            match self.weed_out(&survey.need_weed).await {
                Ok(()) => info!(lands = ?survey.need_weed, "weeded"),
                Err(err) => warn!(%err, "weeding failed"),
            }
            tokio::time::sleep(STEP_DELAY).await;
        }
        if !survey.need_pest.is_empty() {
            match self.insecticide(&survey.need_pest).await {
                Ok(()) => info!(lands = ?survey.need_pest, "treated insects"),
                Err(err) => warn!(%err, "insect treatment failed"),
            }
            tokio::time::sleep(STEP_DELAY).await;
        }
        if !survey.need_water.is_empty() {
            match self.water(&survey.need_water).await {
                Ok(()) => info!(lands = ?survey.need_water, "watered"),
                Err(err) => warn!(%err, "watering failed"),
            }
            tokio::time::sleep(STEP_DELAY).await;
        }

        let mut harvested: Vec<i64> = Vec::new();
        if !survey.harvestable.is_empty() {
            match self.harvest(&survey.harvestable).await {
                Ok(()) => {
                    info!(lands = ?survey.harvestable, "harvested");
                    harvested = survey.harvestable.clone();
                }
                Err(err) => warn!(%err, "harvest failed"),
            }
            tokio::time::sleep(STEP_DELAY).await;
        }

        // Freshly harvested lands leave stubble behind and are cleared
        // together with lands that died outright.
        let mut to_clear = survey.dead.clone();
        to_clear.extend(&harvested);
        let mut plantable = survey.empty.clone();
        if !to_clear.is_empty() {
            plantable.extend(self.clear_lands(&to_clear).await);
            tokio::time::sleep(STEP_DELAY).await;
        }

        if !plantable.is_empty()
            && let Err(err) = self.replant(&plantable).await
        {
            warn!(%err, "replanting failed");
        }
        Ok(())
    }

    fn log_first_pass(&self, reply: &AllLandsReply, survey: &FieldSurvey, now: i64) {
        debug!(now, lands = reply.lands.len(), "first patrol, full snapshot");
        for land in &reply.lands {
            let Some(p) = &land.plant else { continue };
            debug!(
                land = land.id,
                plant = %self.catalog.plant_name(p.id),
                grow_secs = self.catalog.grow_secs(p.id),
                phases = p.phases.len(),
                dry = p.dry_num,
                weed_owners = p.weed_owners.len(),
                insect_owners = p.insect_owners.len(),
                "land state"
            );
        }
        debug!(?survey, "first patrol survey");
    }

    async fn weed_out(&self, land_ids: &[i64]) -> Result<(), GatewayError> {
        let request = WeedOutRequest {
            land_ids: land_ids.to_vec(),
            host_gid: self.self_gid(),
        };
        let _: WeedOutReply = self
            .gateway
            .call_proto(plant::SERVICE, plant::WEED_OUT, &request, self.config.call_timeout())
            .await?;
        Ok(())
    }

    async fn insecticide(&self, land_ids: &[i64]) -> Result<(), GatewayError> {
        let request = InsecticideRequest {
            land_ids: land_ids.to_vec(),
            host_gid: self.self_gid(),
        };
        let _: InsecticideReply = self
            .gateway
            .call_proto(plant::SERVICE, plant::INSECTICIDE, &request, self.config.call_timeout())
            .await?;
        Ok(())
    }

    async fn water(&self, land_ids: &[i64]) -> Result<(), GatewayError> {
        let request = WaterLandRequest {
            land_ids: land_ids.to_vec(),
            host_gid: self.self_gid(),
        };
        let _: WaterLandReply = self
            .gateway
            .call_proto(plant::SERVICE, plant::WATER_LAND, &request, self.config.call_timeout())
            .await?;
        Ok(())
    }

    async fn harvest(&self, land_ids: &[i64]) -> Result<(), GatewayError> {
        let request = HarvestRequest {
            land_ids: land_ids.to_vec(),
            host_gid: self.self_gid(),
            is_all: true,
        };
        let _: HarvestReply = self
            .gateway
            .call_proto(plant::SERVICE, plant::HARVEST, &request, self.config.call_timeout())
            .await?;
        Ok(())
    }

    /// Clear plant remains. One batch first; if the batch fails, retry each
    /// land once on its own. Returns the lands considered cleared — a land
    /// whose per-id retry also failed is still returned, the next planting
    /// attempt surfaces the real state.
    async fn clear_lands(&self, land_ids: &[i64]) -> Vec<i64> {
        let batch = RemovePlantRequest {
            land_ids: land_ids.to_vec(),
        };
        match self
            .gateway
            .call_proto::<_, RemovePlantReply>(plant::SERVICE, plant::REMOVE_PLANT, &batch, self.config.call_timeout())
            .await
        {
            Ok(_) => {
                info!(lands = ?land_ids, "cleared remains");
                return land_ids.to_vec();
            }
            Err(err) => warn!(%err, "batch clear failed, retrying per land"),
        }

        let mut cleared = Vec::with_capacity(land_ids.len());
        for &land_id in land_ids {
            let single = RemovePlantRequest {
                land_ids: vec![land_id],
            };
            if let Err(err) = self
                .gateway
                .call_proto::<_, RemovePlantReply>(plant::SERVICE, plant::REMOVE_PLANT, &single, self.config.call_timeout())
                .await
            {
                warn!(land = land_id, %err, "clearing single land failed");
            }
            cleared.push(land_id);
            tokio::time::sleep(ITEM_DELAY).await;
        }
        cleared
    }

    /// Buy the best affordable seed and plant as many of the given lands as
    /// the purse allows; leftover lands wait for the next cycle.
    async fn replant(&self, lands: &[i64]) -> Result<(), GatewayError> {
        let shop: ShopInfoReply = self
            .gateway
            .call_proto(
                shop::SERVICE,
                shop::SHOP_INFO,
                &ShopInfoRequest {
                    shop_id: self.config.seed_shop_id,
                },
                self.config.call_timeout(),
            )
            .await?;

        let (level, gold) = {
            let identity = self.identity.lock().expect("identity lock poisoned");
            (identity.level, identity.gold)
        };
        let Some(choice) = pick_seed(&shop.goods_list, level, self.config.prefer_lowest_tier)
        else {
            debug!("no purchasable seed in shop");
            return Ok(());
        };

        let count = purchasable(gold, choice.price, lands.len());
        if count == 0 {
            warn!(gold, price = choice.price, "cannot afford a single seed");
            return Ok(());
        }
        if count < lands.len() {
            info!(count, wanted = lands.len(), "gold limits planting this cycle");
        }
        let targets = &lands[..count];

        let buy: BuyGoodsReply = self
            .gateway
            .call_proto(
                shop::SERVICE,
                shop::BUY_GOODS,
                &BuyGoodsRequest {
                    goods_id: choice.goods_id,
                    num: count as i64,
                    price: choice.price,
                },
                self.config.call_timeout(),
            )
            .await?;

        // The purchase may resolve to a different concrete item id.
        let mut seed_id = choice.seed_id;
        if let Some(got) = buy.get_items.first()
            && got.id > 0
        {
            seed_id = got.id;
        }
        let spent: i64 = buy.cost_items.iter().map(|item| item.count).sum();
        {
            let mut identity = self.identity.lock().expect("identity lock poisoned");
            identity.gold -= spent;
        }
        info!(
            seed = %self.catalog.seed_name(seed_id),
            count,
            spent,
            "bought seeds"
        );
        tokio::time::sleep(STEP_DELAY).await;

        let planted = self.plant_each(seed_id, targets).await;
        if !planted.is_empty() {
            info!(lands = ?planted, "planted");
            self.fertilize_each(&planted).await;
        }
        Ok(())
    }

    async fn plant_each(&self, seed_id: i64, lands: &[i64]) -> Vec<i64> {
        let mut planted = Vec::with_capacity(lands.len());
        for &land_id in lands {
            let request = PlantRequest {
                item: Some(SowItem {
                    seed_id,
                    land_ids: vec![land_id],
                }),
            };
            match self
                .gateway
                .call_proto::<_, PlantReply>(plant::SERVICE, plant::PLANT, &request, self.config.call_timeout())
                .await
            {
                Ok(_) => planted.push(land_id),
                Err(err) => warn!(land = land_id, %err, "planting failed"),
            }
            tokio::time::sleep(ITEM_DELAY).await;
        }
        planted
    }

    /// Fertilize freshly planted lands one at a time. A depletion failure
    /// means there is no fertilizer left at all, so the rest of this
    /// cycle's attempts are skipped; the flag does not outlive the cycle.
    async fn fertilize_each(&self, lands: &[i64]) {
        let mut depleted = false;
        for &land_id in lands {
            if depleted {
                break;
            }
            let request = FertilizeRequest {
                land_id,
                item_id: self.config.fertilizer_item_id,
            };
            match self
                .gateway
                .call_proto::<_, FertilizeReply>(plant::SERVICE, plant::FERTILIZE, &request, self.config.call_timeout())
                .await
            {
                Ok(_) => debug!(land = land_id, "fertilized"),
                Err(err) if is_depletion(&err) => {
                    info!("fertilizer depleted, skipping the rest of this cycle");
                    depleted = true;
                }
                Err(err) => warn!(land = land_id, %err, "fertilizing failed"),
            }
            tokio::time::sleep(ITEM_DELAY).await;
        }
    }

    fn self_gid(&self) -> i64 {
        self.identity.lock().expect("identity lock poisoned").gid
    }
}

/// A seed worth buying, with everything purchase and planting need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeedChoice {
    pub goods_id: i64,
    pub seed_id: i64,
    pub price: i64,
    pub required_level: i32,
}

/// Pick a seed from the shop: unlocked, level requirement met, purchase
/// quota left. Ranked by required level descending with price descending as
/// the tie-break; lowest-tier mode reverses both keys.
pub(crate) fn pick_seed(goods: &[Goods], level: i32, lowest_tier: bool) -> Option<SeedChoice> {
    let mut viable: Vec<SeedChoice> = goods
        .iter()
        .filter_map(|g| {
            if !g.unlocked {
                return None;
            }
            let mut required_level = 0i32;
            for cond in &g.conds {
                if cond.cond_type == 1 {
                    required_level = required_level.max(cond.param as i32);
                }
            }
            if level < required_level {
                return None;
            }
            if g.limit_count > 0 && g.bought_num >= g.limit_count {
                return None;
            }
            Some(SeedChoice {
                goods_id: g.id,
                seed_id: g.item_id,
                price: g.price,
                required_level,
            })
        })
        .collect();

    viable.sort_by(|a, b| {
        let key_a = (a.required_level, a.price);
        let key_b = (b.required_level, b.price);
        if lowest_tier {
            key_a.cmp(&key_b)
        } else {
            key_b.cmp(&key_a)
        }
    });
    viable.into_iter().next()
}

/// How many seeds the purse covers: floor(gold / price), clamped to the
/// number of lands that want one.
pub(crate) fn purchasable(gold: i64, price: i64, want: usize) -> usize {
    if want == 0 {
        return 0;
    }
    if price <= 0 {
        return want;
    }
    let affordable = (gold / price).max(0) as usize;
    affordable.min(want)
}

fn is_depletion(err: &GatewayError) -> bool {
    let GatewayError::Remote { code, message, .. } = err else {
        return false;
    };
    if *code == CODE_ITEM_NOT_ENOUGH {
        return true;
    }
    let lower = message.to_lowercase();
    lower.contains("not enough") || lower.contains("insufficient")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::shop::GoodsCond;

    fn goods(id: i64, price: i64, required_level: i64, unlocked: bool) -> Goods {
        Goods {
            id,
            item_id: id * 10,
            price,
            unlocked,
            conds: vec![GoodsCond {
                cond_type: 1,
                param: required_level,
            }],
            limit_count: 0,
            bought_num: 0,
        }
    }

    #[test]
    fn test_pick_seed_prefers_highest_tier() {
        let list = vec![goods(1, 50, 5, true), goods(2, 80, 12, true), goods(3, 60, 12, true)];
        let choice = pick_seed(&list, 20, false).unwrap();
        // Level 12 beats level 5; price 80 breaks the tie.
        assert_eq!(choice.goods_id, 2);
    }

    #[test]
    fn test_pick_seed_lowest_tier_reverses_both_keys() {
        let list = vec![goods(1, 50, 5, true), goods(2, 30, 5, true), goods(3, 80, 12, true)];
        let choice = pick_seed(&list, 20, true).unwrap();
        assert_eq!(choice.goods_id, 2);
    }

    #[test]
    fn test_pick_seed_respects_level_and_unlock() {
        let list = vec![goods(1, 50, 30, true), goods(2, 40, 3, false)];
        assert!(pick_seed(&list, 10, false).is_none());
    }

    #[test]
    fn test_pick_seed_skips_exhausted_quota() {
        let mut g = goods(1, 50, 1, true);
        g.limit_count = 5;
        g.bought_num = 5;
        assert!(pick_seed(&[g], 10, false).is_none());
    }

    #[test]
    fn test_purchasable_budget_scenario() {
        // 5 empty lands, 240 gold, seeds at 50: only 4 are affordable.
        assert_eq!(purchasable(240, 50, 5), 4);
    }

    #[test]
    fn test_purchasable_never_negative_or_overshooting() {
        assert_eq!(purchasable(-10, 50, 5), 0);
        assert_eq!(purchasable(10_000, 50, 5), 5);
        assert_eq!(purchasable(0, 50, 5), 0);
        assert_eq!(purchasable(100, 50, 0), 0);
    }

    #[test]
    fn test_purchasable_free_seeds_cover_everything() {
        assert_eq!(purchasable(0, 0, 3), 3);
    }

    #[test]
    fn test_depletion_detection() {
        let by_code = GatewayError::Remote {
            service: "s".into(),
            method: "Fertilize".into(),
            code: CODE_ITEM_NOT_ENOUGH,
            message: String::new(),
        };
        assert!(is_depletion(&by_code));

        let by_message = GatewayError::Remote {
            service: "s".into(),
            method: "Fertilize".into(),
            code: 9,
            message: "item Not Enough".into(),
        };
        assert!(is_depletion(&by_message));

        let unrelated = GatewayError::Timeout {
            method: "s.Fertilize".into(),
        };
        assert!(!is_depletion(&unrelated));
    }

    #[test]
    fn test_quiet_survey_plans_no_mutations() {
        use crate::engine::field::survey_lands;
        use crate::wire::plant::{GrowthPhase, Land, PlantState};

        // A tended, growing farm: re-surveying the same snapshot must keep
        // every action list empty, so a second tick issues no mutations.
        let lands = vec![Land {
            id: 1,
            unlocked: true,
            plant: Some(PlantState {
                id: 7,
                name: "carrot".into(),
                phases: vec![GrowthPhase {
                    phase: crate::engine::field::PhaseKind::Blooming as i32,
                    begin_time: 50,
                    dry_time: 900,
                    weeds_time: 0,
                    insect_time: 0,
                }],
                dry_num: 0,
                weed_owners: vec![],
                insect_owners: vec![],
                stealable: false,
                left_fruit_num: 0,
            }),
        }];
        let first = survey_lands(&lands, 100);
        let second = survey_lands(&lands, 100);
        assert!(first.is_quiet());
        assert!(second.is_quiet());
        assert_eq!(first.growing, second.growing);
    }
}
