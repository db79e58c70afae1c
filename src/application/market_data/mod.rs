pub mod backfill;
pub mod candle_builder;
pub mod order_flow_tracker;
pub mod price_feed;
pub mod spread_cache;
