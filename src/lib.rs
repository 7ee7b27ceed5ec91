//! Campaign Dispatch Engine
//!
//! This library provides the core functionality for the campaign-dispatch
//! system: bulk outbound message scheduling with per-line rate tiers,
//! humanized pacing, and a Redis-backed delayed send queue.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
