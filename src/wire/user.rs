//! UserService: login and keep-alive.

use super::PlayerBasic;

pub const SERVICE: &str = "gamepb.userpb.UserService";
pub const LOGIN: &str = "Login";
pub const HEARTBEAT: &str = "Heartbeat";

/// Client/device descriptors sent with login.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceInfo {
    #[prost(string, tag = "1")]
    pub client_version: String,
    #[prost(string, tag = "2")]
    pub sys_software: String,
    #[prost(string, tag = "3")]
    pub network: String,
    #[prost(string, tag = "4")]
    pub device_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginRequest {
    #[prost(int64, tag = "1")]
    pub sharer_id: i64,
    #[prost(string, tag = "2")]
    pub sharer_open_id: String,
    #[prost(message, optional, tag = "3")]
    pub device_info: Option<DeviceInfo>,
    #[prost(string, tag = "4")]
    pub scene_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginReply {
    #[prost(message, optional, tag = "1")]
    pub basic: Option<PlayerBasic>,
    #[prost(int64, tag = "2")]
    pub time_now_millis: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HeartbeatRequest {
    #[prost(int64, tag = "1")]
    pub gid: i64,
    #[prost(string, tag = "2")]
    pub client_version: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HeartbeatReply {
    #[prost(int64, tag = "1")]
    pub server_time: i64,
}
