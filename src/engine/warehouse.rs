//! Warehouse sweep: sell every fruit sitting in the bag.

use super::{ITEM_DELAY, TickGuard, run_loop};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::gateway::{Gateway, GatewayError};
use crate::notify::Notifier;
use crate::wire::ItemCount;
use crate::wire::item::{self, BagReply, BagRequest, SellReply, SellRequest};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const START_DELAY: Duration = Duration::from_secs(10);

/// Item-id range the game assigns to harvested fruit.
const FRUIT_ID_MIN: i64 = 3001;
const FRUIT_ID_MAX: i64 = 49_999;

/// Sale requests carry at most this many stacks.
const SELL_BATCH: usize = 15;

pub struct WarehouseEngine {
    gateway: Gateway,
    config: Arc<Config>,
    catalog: Arc<Catalog>,
    notifier: Arc<dyn Notifier>,
    busy: AtomicBool,
}

impl WarehouseEngine {
    pub fn new(
        gateway: Gateway,
        config: Arc<Config>,
        catalog: Arc<Catalog>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            config,
            catalog,
            notifier,
            busy: AtomicBool::new(false),
        })
    }

    pub fn spawn(self: &Arc<Self>, stop: CancellationToken) {
        let engine = self.clone();
        let period = engine.config.sell_interval();
        tokio::spawn(run_loop(START_DELAY, period, stop, move || {
            let engine = engine.clone();
            async move { engine.tick().await }
        }));
    }

    pub async fn tick(&self) {
        let Some(_guard) = TickGuard::acquire(&self.busy) else {
            debug!("warehouse sweep still running, skipping");
            return;
        };
        if let Err(err) = self.sweep().await {
            warn!(%err, "warehouse sweep failed");
        }
    }

    async fn sweep(&self) -> Result<(), GatewayError> {
        let bag: BagReply = self
            .gateway
            .call_proto(item::SERVICE, item::BAG, &BagRequest {}, self.config.call_timeout())
            .await?;
        let Some(item_bag) = bag.item_bag else {
            debug!("empty bag reply");
            return Ok(());
        };

        let sellable = sellable_fruit(&item_bag.items);
        if sellable.is_empty() {
            debug!("no fruit to sell");
            return Ok(());
        }
        let total: i64 = sellable.iter().map(|i| i.count).sum();
        info!(stacks = sellable.len(), total, "selling fruit");

        let mut proceeds = 0i64;
        for batch in sellable.chunks(SELL_BATCH) {
            let request = SellRequest {
                items: batch.to_vec(),
            };
            match self
                .gateway
                .call_proto::<_, SellReply>(item::SERVICE, item::SELL, &request, self.config.call_timeout())
                .await
            {
                Ok(reply) => proceeds += reply.gold,
                Err(err) => warn!(stacks = batch.len(), %err, "sale batch failed"),
            }
            tokio::time::sleep(ITEM_DELAY).await;
        }

        if proceeds > 0 {
            let names = sellable
                .iter()
                .take(3)
                .map(|i| self.catalog.fruit_name(i.id))
                .collect::<Vec<_>>()
                .join(", ");
            self.notifier
                .notify(&format!("sold {total} fruit ({names}…) for {proceeds} gold"))
                .await;
        }
        Ok(())
    }
}

/// Fruit stacks worth selling: id in the fruit range, a positive count, and
/// a real bag slot. A zero slot uid would make the sale silently target
/// nothing, so those stacks are skipped and logged.
fn sellable_fruit(items: &[ItemCount]) -> Vec<ItemCount> {
    let mut out = Vec::new();
    for stack in items {
        if !(FRUIT_ID_MIN..=FRUIT_ID_MAX).contains(&stack.id) || stack.count <= 0 {
            continue;
        }
        if stack.uid == 0 {
            warn!(item = stack.id, count = stack.count, "fruit stack without slot uid, skipping");
            continue;
        }
        out.push(stack.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(id: i64, count: i64, uid: i64) -> ItemCount {
        ItemCount { id, count, uid }
    }

    #[test]
    fn test_sellable_filters_range_count_and_uid() {
        let items = vec![
            stack(3001, 4, 11),   // lower bound, sellable
            stack(49_999, 1, 12), // upper bound, sellable
            stack(3000, 9, 13),   // below range (a seed)
            stack(50_000, 9, 14), // above range
            stack(4000, 0, 15),   // empty stack
            stack(4001, 5, 0),    // missing slot uid
        ];
        let picked = sellable_fruit(&items);
        let ids: Vec<i64> = picked.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3001, 49_999]);
    }

    #[test]
    fn test_batches_of_fifteen() {
        let items: Vec<ItemCount> = (0..32).map(|n| stack(3001 + n, 1, 100 + n)).collect();
        let picked = sellable_fruit(&items);
        let batches: Vec<usize> = picked.chunks(SELL_BATCH).map(|c| c.len()).collect();
        assert_eq!(batches, vec![15, 15, 2]);
    }
}
