pub mod exit_engine;
