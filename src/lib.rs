//! Incremental deploys of serverless functions and static sites.

pub mod auth;
pub mod backend;
pub mod cloud;
pub mod config;
pub mod deploy;
pub mod invoke;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod tree_render;
