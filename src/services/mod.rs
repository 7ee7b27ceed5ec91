pub mod blocklist;
pub mod breaker;
pub mod cloud_api;
pub mod gateway;
pub mod greeting;
pub mod humanizer;
pub mod phone;
pub mod processor;
pub mod queue;
pub mod rate_limit;
pub mod reputation;
pub mod routing;
pub mod scheduler;
pub mod spintax;
pub mod template;
