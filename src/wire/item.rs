//! ItemService: the bag and fruit sales.

use super::ItemCount;

pub const SERVICE: &str = "gamepb.itempb.ItemService";
pub const BAG: &str = "Bag";
pub const SELL: &str = "Sell";

#[derive(Clone, PartialEq, prost::Message)]
pub struct BagRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ItemBag {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<ItemCount>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BagReply {
    #[prost(message, optional, tag = "1")]
    pub item_bag: Option<ItemBag>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SellRequest {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<ItemCount>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SellReply {
    #[prost(int64, tag = "1")]
    pub gold: i64,
}
