pub mod campaigns;
pub mod health;
pub mod lines;
pub mod metrics;
