//! Task rewards: poll task progress and claim everything claimable.
//!
//! Besides the fixed poll, a task-change push from the server triggers an
//! immediate extra pass, so rewards are claimed soon after the progress
//! that earned them.

use super::{ITEM_DELAY, TickGuard, run_loop};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::gateway::Gateway;
use crate::notify::Notifier;
use crate::wire::gate;
use crate::wire::task::{
    self, ClaimTaskRewardReply, ClaimTaskRewardRequest, TaskEntry, TaskInfo, TaskInfoReply,
    TaskInfoRequest,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const START_DELAY: Duration = Duration::from_secs(4);
/// Grace period after a task-change push, so a burst of pushes from one
/// farm action collapses into a single pass.
const PUSH_SETTLE: Duration = Duration::from_secs(2);

pub struct TaskEngine {
    gateway: Gateway,
    config: Arc<Config>,
    catalog: Arc<Catalog>,
    notifier: Arc<dyn Notifier>,
    busy: AtomicBool,
}

impl TaskEngine {
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
        let period = engine.config.task_interval();
        let loop_stop = stop.clone();
        tokio::spawn(run_loop(START_DELAY, period, loop_stop, move || {
            let engine = engine.clone();
            async move { engine.tick().await }
        }));

        let engine = self.clone();
        let mut pushes = engine.gateway.subscribe_push(gate::TASK_CHANGE_EVENT);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    received = pushes.recv() => {
                        if received.is_none() {
                            break;
                        }
                        // Drain whatever arrived in the same burst.
                        while pushes.try_recv().is_ok() {}
                        debug!("task change pushed, scheduling a claim pass");
                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = tokio::time::sleep(PUSH_SETTLE) => {}
                        }
                        engine.tick().await;
                    }
                }
            }
        });
    }

    pub async fn tick(&self) {
        let Some(_guard) = TickGuard::acquire(&self.busy) else {
            debug!("claim pass still running, skipping");
            return;
        };
        if let Err(err) = self.claim_pass().await {
            warn!(%err, "claim pass failed");
        }
    }

    async fn claim_pass(&self) -> Result<(), crate::gateway::GatewayError> {
        let reply: TaskInfoReply = self
            .gateway
            .call_proto(
                task::SERVICE,
                task::TASK_INFO,
                &TaskInfoRequest {},
                self.config.call_timeout(),
            )
            .await?;
        let Some(info) = reply.task_info else {
            debug!("empty task info");
            return Ok(());
        };

        let claimable = claimable_tasks(&info);
        if claimable.is_empty() {
            debug!("nothing to claim");
            return Ok(());
        }
        info!(count = claimable.len(), "claiming task rewards");

        for entry in claimable {
            let do_shared = entry.share_multiple > 1;
            let request = ClaimTaskRewardRequest {
                id: entry.id,
                do_shared,
            };
            match self
                .gateway
                .call_proto::<_, ClaimTaskRewardReply>(
                    task::SERVICE,
                    task::CLAIM_TASK_REWARD,
                    &request,
                    self.config.call_timeout(),
                )
                .await
            {
                Ok(reward) => {
                    let summary = self.describe_rewards(&reward.items);
                    info!(task = entry.id, desc = %entry.desc, shared = do_shared, "claimed");
                    self.notifier
                        .notify(&format!("task done: {} ({summary})", entry.desc))
                        .await;
                }
                Err(err) => warn!(task = entry.id, %err, "claim failed"),
            }
            tokio::time::sleep(ITEM_DELAY).await;
        }
        Ok(())
    }

    fn describe_rewards(&self, items: &[crate::wire::ItemCount]) -> String {
        if items.is_empty() {
            return "no listed reward".to_string();
        }
        items
            .iter()
            .map(|item| format!("{} x{}", self.catalog.fruit_name(item.id), item.count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Every claimable entry across all three task lists: unlocked, not yet
/// claimed, and progress has met a positive goal. Entries with a zero goal
/// never qualify, whatever their progress says.
fn claimable_tasks(info: &TaskInfo) -> Vec<&TaskEntry> {
    info.growth_tasks
        .iter()
        .chain(&info.daily_tasks)
        .chain(&info.tasks)
        .filter(|t| {
            t.is_unlocked && !t.is_claimed && t.total_progress > 0 && t.progress >= t.total_progress
        })
        .collect()
}
