pub mod command;
pub mod dashboard;
