//! Integration layer: composes the five core subsystems, reads
//! configuration once at startup, and wires typed observers across
//! component boundaries.

pub mod composition;
pub mod config;
pub mod evidence;
pub mod learning;
pub mod logging;
pub mod observer;

pub use composition::{ControlPlane, RouteOutcome};
pub use config::Config;
pub use learning::LearningChannel;
pub use observer::IntegrationObserver;
