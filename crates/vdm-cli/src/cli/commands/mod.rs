//! CLI command handlers, one file per command.

mod check_update;
mod completions;
mod config;
mod control;
mod convert;
mod get;
mod probe;

pub use check_update::run_check_update;
pub use completions::{run_completions, run_man};
pub use config::run_config;
pub use control::run_control;
pub use convert::run_convert;
pub use get::{run_get, GetOptions};
pub use probe::run_probe;
