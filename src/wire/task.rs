//! TaskService: task progress and reward claims.

use super::ItemCount;

pub const SERVICE: &str = "gamepb.taskpb.TaskService";
pub const TASK_INFO: &str = "TaskInfo";
pub const CLAIM_TASK_REWARD: &str = "ClaimTaskReward";

#[derive(Clone, PartialEq, prost::Message)]
pub struct TaskEntry {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub desc: String,
    #[prost(int64, tag = "3")]
    pub progress: i64,
    #[prost(int64, tag = "4")]
    pub total_progress: i64,
    #[prost(bool, tag = "5")]
    pub is_unlocked: bool,
    #[prost(bool, tag = "6")]
    pub is_claimed: bool,
    #[prost(int64, tag = "7")]
    pub share_multiple: i64,
    #[prost(message, repeated, tag = "8")]
    pub rewards: Vec<ItemCount>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TaskInfo {
    #[prost(message, repeated, tag = "1")]
    pub growth_tasks: Vec<TaskEntry>,
    #[prost(message, repeated, tag = "2")]
    pub daily_tasks: Vec<TaskEntry>,
    #[prost(message, repeated, tag = "3")]
    pub tasks: Vec<TaskEntry>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TaskInfoRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TaskInfoReply {
    #[prost(message, optional, tag = "1")]
    pub task_info: Option<TaskInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ClaimTaskRewardRequest {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(bool, tag = "2")]
    pub do_shared: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ClaimTaskRewardReply {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<ItemCount>,
}
