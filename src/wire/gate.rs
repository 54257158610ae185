//! Gateway envelope: the framing every call and push travels in.

/// Message kinds carried in [`Meta::message_type`].
pub mod kind {
    pub const REQUEST: i32 = 1;
    pub const REPLY: i32 = 2;
    pub const PUSH: i32 = 3;
}

/// Routing metadata for one frame.
///
/// `client_seq` correlates replies to pending calls. `server_seq` echoes the
/// highest inbound sequence seen so far; the remote requires it for its own
/// state tracking, it plays no part in correlation.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Meta {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub method_name: String,
    #[prost(int32, tag = "3")]
    pub message_type: i32,
    #[prost(int64, tag = "4")]
    pub client_seq: i64,
    #[prost(int64, tag = "5")]
    pub server_seq: i64,
    #[prost(int32, tag = "6")]
    pub error_code: i32,
    #[prost(string, tag = "7")]
    pub error_message: String,
}

/// One wire frame: meta plus an opaque method-specific body.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(message, optional, tag = "1")]
    pub meta: Option<Meta>,
    #[prost(bytes = "vec", tag = "2")]
    pub body: Vec<u8>,
}

/// Body of a push frame: a named event with its own payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct EventMessage {
    #[prost(string, tag = "1")]
    pub message_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// Push event name for a forced disconnect.
pub const KICKOUT_EVENT: &str = "gatepb.KickoutNotify";
/// Push event name for a task-state change.
pub const TASK_CHANGE_EVENT: &str = "gamepb.taskpb.TaskChangeNotify";
