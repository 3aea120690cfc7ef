pub mod accounts;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod setup;
