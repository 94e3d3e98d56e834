pub mod args;
pub mod commands;
pub mod script;
pub mod telemetry;
