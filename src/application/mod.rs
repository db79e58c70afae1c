pub mod decision_log;
pub mod events;
pub mod exits;
pub mod filter;
pub mod market_data;
pub mod news_client;
pub mod orchestrator;
pub mod risk;
pub mod system;
