pub mod auth;
pub mod configuration;
pub mod dispatch;
pub mod domain;
pub mod entities;
pub mod push_client;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
