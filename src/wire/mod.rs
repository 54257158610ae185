//! Typed protocol messages for the game gateway.
//!
//! Every frame on the wire is a [`gate::Envelope`]: a routing meta block plus
//! an opaque service/method-specific body. The per-service request and reply
//! types live in the submodules and are encoded into / decoded from that body
//! by the gateway's typed call wrapper.

pub mod friend;
pub mod gate;
pub mod item;
pub mod plant;
pub mod shop;
pub mod task;
pub mod user;

/// Day-scoped usage snapshot for one peer-farm operation kind.
///
/// Attached to visit-enter replies and to the replies of individual
/// peer-farm operations. `cap` / `exp_cap` of zero mean unlimited.
#[derive(Clone, PartialEq, prost::Message)]
pub struct InteractLimit {
    #[prost(int32, tag = "1")]
    pub op: i32,
    #[prost(int64, tag = "2")]
    pub used: i64,
    #[prost(int64, tag = "3")]
    pub cap: i64,
    #[prost(int64, tag = "4")]
    pub exp_used: i64,
    #[prost(int64, tag = "5")]
    pub exp_cap: i64,
}

/// An item id/count pair, optionally carrying the server-side stack uid.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ItemCount {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub count: i64,
    #[prost(int64, tag = "3")]
    pub uid: i64,
}

/// Public player profile returned by login and visit-enter.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PlayerBasic {
    #[prost(int64, tag = "1")]
    pub gid: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub level: i32,
    #[prost(int64, tag = "4")]
    pub gold: i64,
}
