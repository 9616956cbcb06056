pub mod client;
pub mod handlers;
pub mod json_api;
pub mod rpc;
pub mod server;
pub mod service;

pub use server::{start, ServerConfig, ServerError, ServerHandle};
pub use service::{ServiceError, SubscriberService};
