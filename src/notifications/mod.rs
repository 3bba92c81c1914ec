pub mod dispatcher;
pub mod models;
pub mod senders;
