pub mod broker;
pub mod cli;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod message;
pub mod pipeline;
pub mod shard;
pub mod web;
pub mod worker;
