pub mod service;
pub mod workflow;
