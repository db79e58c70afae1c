pub mod generator;
pub mod structure;
pub mod types;
pub mod zones;
