mod error;
pub mod health_check;
pub mod notifications;
pub mod push_subscriptions;

pub use error::ApiError;
