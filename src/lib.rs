pub mod bridge;
pub mod config;
pub mod domain;
pub mod jobs;
pub mod layout;
pub mod pipeline;
pub mod repo;
pub mod telemetry;
