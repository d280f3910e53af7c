pub mod commands;
pub mod config;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
