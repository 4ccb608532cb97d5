//! File formats: measured point clouds and `key=value` fit settings.

pub mod point_cloud;
pub mod settings;
