pub mod dispatcher;
pub mod error;
pub mod fleet;
pub mod fleet_config;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod settings;
pub mod store;
pub mod tasks;
pub mod terminal;
pub mod transport;

#[cfg(test)]
mod tests;
