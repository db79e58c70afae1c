pub mod order_event_ingestor;
