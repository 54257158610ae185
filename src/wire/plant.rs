//! PlantService: land state and every field operation, on the own farm and
//! on peer farms (the `host_gid` field selects whose lands are touched).

use super::InteractLimit;

pub const SERVICE: &str = "gamepb.plantpb.PlantService";
pub const ALL_LANDS: &str = "AllLands";
pub const HARVEST: &str = "Harvest";
pub const WATER_LAND: &str = "WaterLand";
pub const WEED_OUT: &str = "WeedOut";
pub const INSECTICIDE: &str = "Insecticide";
pub const REMOVE_PLANT: &str = "RemovePlant";
pub const PLANT: &str = "Plant";
pub const FERTILIZE: &str = "Fertilize";
pub const SOW_WEED: &str = "SowWeed";
pub const SOW_INSECT: &str = "SowInsect";

/// One growth phase of a plant. Trigger times of zero mean "never".
#[derive(Clone, PartialEq, prost::Message)]
pub struct GrowthPhase {
    #[prost(int32, tag = "1")]
    pub phase: i32,
    #[prost(int64, tag = "2")]
    pub begin_time: i64,
    #[prost(int64, tag = "3")]
    pub dry_time: i64,
    #[prost(int64, tag = "4")]
    pub weeds_time: i64,
    #[prost(int64, tag = "5")]
    pub insect_time: i64,
}

/// Server snapshot of a planted crop.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PlantState {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "3")]
    pub phases: Vec<GrowthPhase>,
    #[prost(int64, tag = "4")]
    pub dry_num: i64,
    #[prost(int64, repeated, tag = "5")]
    pub weed_owners: Vec<i64>,
    #[prost(int64, repeated, tag = "6")]
    pub insect_owners: Vec<i64>,
    #[prost(bool, tag = "7")]
    pub stealable: bool,
    #[prost(int64, tag = "8")]
    pub left_fruit_num: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Land {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(bool, tag = "2")]
    pub unlocked: bool,
    #[prost(message, optional, tag = "3")]
    pub plant: Option<PlantState>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AllLandsRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AllLandsReply {
    #[prost(message, repeated, tag = "1")]
    pub lands: Vec<Land>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HarvestRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
    #[prost(bool, tag = "3")]
    pub is_all: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HarvestReply {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<super::ItemCount>,
    #[prost(message, optional, tag = "2")]
    pub limit: Option<InteractLimit>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WaterLandRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WaterLandReply {
    #[prost(message, optional, tag = "1")]
    pub limit: Option<InteractLimit>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WeedOutRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WeedOutReply {
    #[prost(message, optional, tag = "1")]
    pub limit: Option<InteractLimit>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InsecticideRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InsecticideReply {
    #[prost(message, optional, tag = "1")]
    pub limit: Option<InteractLimit>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RemovePlantRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RemovePlantReply {}

/// Nested sowing item: which seed onto which lands.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SowItem {
    #[prost(int64, tag = "1")]
    pub seed_id: i64,
    #[prost(int64, repeated, tag = "2")]
    pub land_ids: Vec<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PlantRequest {
    #[prost(message, optional, tag = "2")]
    pub item: Option<SowItem>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PlantReply {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FertilizeRequest {
    #[prost(int64, tag = "1")]
    pub land_id: i64,
    #[prost(int64, tag = "2")]
    pub item_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FertilizeReply {}

/// Plant weeds on a peer's land (nuisance operation).
#[derive(Clone, PartialEq, prost::Message)]
pub struct SowWeedRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SowWeedReply {
    #[prost(message, optional, tag = "1")]
    pub limit: Option<InteractLimit>,
}

/// Release pests on a peer's land (nuisance operation).
#[derive(Clone, PartialEq, prost::Message)]
pub struct SowInsectRequest {
    #[prost(int64, repeated, tag = "1")]
    pub land_ids: Vec<i64>,
    #[prost(int64, tag = "2")]
    pub host_gid: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SowInsectReply {
    #[prost(message, optional, tag = "1")]
    pub limit: Option<InteractLimit>,
}
