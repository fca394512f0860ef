pub mod analytics;
pub mod backup;
pub mod classes;
pub mod core;
pub mod departments;
pub mod records;
pub mod setup;
pub mod students;
