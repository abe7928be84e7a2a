//! Monitor supervisor and logging setup.

mod logging;
mod supervisor;

pub use logging::setup_logging;
pub use supervisor::MonitorSupervisor;
