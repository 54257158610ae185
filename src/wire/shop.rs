//! ShopService: goods listing and purchase.

use super::ItemCount;

pub const SERVICE: &str = "gamepb.shoppb.ShopService";
pub const SHOP_INFO: &str = "ShopInfo";
pub const BUY_GOODS: &str = "BuyGoods";

/// Purchase precondition. `cond_type` 1 is a minimum-level requirement with
/// the level in `param`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GoodsCond {
    #[prost(int32, tag = "1")]
    pub cond_type: i32,
    #[prost(int64, tag = "2")]
    pub param: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Goods {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(int64, tag = "2")]
    pub item_id: i64,
    #[prost(int64, tag = "3")]
    pub price: i64,
    #[prost(bool, tag = "4")]
    pub unlocked: bool,
    #[prost(message, repeated, tag = "5")]
    pub conds: Vec<GoodsCond>,
    #[prost(int64, tag = "6")]
    pub limit_count: i64,
    #[prost(int64, tag = "7")]
    pub bought_num: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ShopInfoRequest {
    #[prost(int64, tag = "1")]
    pub shop_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ShopInfoReply {
    #[prost(message, repeated, tag = "1")]
    pub goods_list: Vec<Goods>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BuyGoodsRequest {
    #[prost(int64, tag = "1")]
    pub goods_id: i64,
    #[prost(int64, tag = "2")]
    pub num: i64,
    #[prost(int64, tag = "3")]
    pub price: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BuyGoodsReply {
    #[prost(message, repeated, tag = "1")]
    pub get_items: Vec<ItemCount>,
    #[prost(message, repeated, tag = "2")]
    pub cost_items: Vec<ItemCount>,
}
