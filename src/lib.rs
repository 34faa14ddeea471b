pub mod analyzers;
pub mod config;
pub mod fetch;
pub mod infra;
pub mod outcome;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod scoring;
pub mod source;
pub mod store;
