pub mod cache;
pub mod keepalive;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod retry;
pub mod tracker;
