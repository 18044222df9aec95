pub mod servers;
pub mod system;
pub mod tasks;
