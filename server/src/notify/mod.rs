pub mod dispatch;
pub mod push;
pub mod routes;
pub mod store;
