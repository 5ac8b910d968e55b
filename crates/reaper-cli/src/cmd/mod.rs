pub mod active;
pub mod config;
pub mod plan;
pub mod run;
