//! FriendService and VisitService: the friend roster and peer-farm visits.

use super::{InteractLimit, PlayerBasic};
use crate::wire::plant::Land;

pub const FRIEND_SERVICE: &str = "gamepb.friendpb.FriendService";
pub const GET_ALL: &str = "GetAll";

pub const VISIT_SERVICE: &str = "gamepb.visitpb.VisitService";
pub const ENTER: &str = "Enter";
pub const LEAVE: &str = "Leave";

/// Visit-enter reason code for a friend visit.
pub const ENTER_REASON_FRIEND: i32 = 2;

/// Aggregate trouble counters for one friend's farm, as carried on the
/// roster. Nonzero counters are what make a friend worth visiting.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FarmSummary {
    #[prost(int64, tag = "1")]
    pub steal_plant_num: i64,
    #[prost(int64, tag = "2")]
    pub dry_num: i64,
    #[prost(int64, tag = "3")]
    pub weed_num: i64,
    #[prost(int64, tag = "4")]
    pub insect_num: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FriendBrief {
    #[prost(int64, tag = "1")]
    pub gid: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub remark: String,
    #[prost(message, optional, tag = "4")]
    pub plant: Option<FarmSummary>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetAllRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetAllReply {
    #[prost(message, repeated, tag = "1")]
    pub game_friends: Vec<FriendBrief>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EnterRequest {
    #[prost(int64, tag = "1")]
    pub host_gid: i64,
    #[prost(int32, tag = "2")]
    pub reason: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EnterReply {
    #[prost(message, optional, tag = "1")]
    pub basic: Option<PlayerBasic>,
    #[prost(message, repeated, tag = "2")]
    pub lands: Vec<Land>,
    #[prost(message, repeated, tag = "3")]
    pub limits: Vec<InteractLimit>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LeaveRequest {
    #[prost(int64, tag = "1")]
    pub host_gid: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LeaveReply {}
