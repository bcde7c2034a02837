pub mod backend;
pub mod config;
pub mod dashboard;
pub mod definition;
pub mod discovery;
pub mod error;
pub mod log;
pub mod process;
pub mod scheduler;
pub mod test_case;
pub mod test_log;
pub mod types;
pub mod worker;
