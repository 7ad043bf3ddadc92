pub mod cache;
pub mod config;
pub mod coordinator;
pub mod index;
pub mod observability;
pub mod progress;
pub mod publish;
pub mod queue;
pub mod worker;
