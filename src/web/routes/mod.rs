pub mod notification_routes;
pub mod probe_routes;
pub mod project_routes;
pub mod worker_routes;
