pub mod log_once;
pub mod logging;

pub use log_once::LogOnce;
pub use logging::{init_logging, log_system_info};
