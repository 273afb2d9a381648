pub mod config;
pub mod endpoints;
pub mod http;
pub mod input;
pub mod job;
pub mod observability;
pub mod orchestrator;
pub mod retrieve;
pub mod submit;
pub mod tracker;
