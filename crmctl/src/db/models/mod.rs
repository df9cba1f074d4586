//! Database request and response models, one module per table family.

pub mod activities;
pub mod contacts;
pub mod deals;
pub mod organizations;
pub mod pipeline_stages;
pub mod tags;
pub mod tasks;
pub mod users;
