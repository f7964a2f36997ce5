//! Plugin Lifecycle Supervisor: liveness/dependency tracking for
//! extension plugins with crash-loop quarantine.

pub mod evaluate;
pub mod supervisor;

pub use evaluate::evaluate;
pub use supervisor::PluginSupervisor;
