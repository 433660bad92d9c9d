pub mod adapters;
pub mod audit;
pub mod build;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod providers;
pub mod redact;
pub mod response;
pub mod router;
pub mod server;
pub mod tools;
pub mod vision;
