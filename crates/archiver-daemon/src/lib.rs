//! Index archiver daemon library exports.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: command implementations (start, backup, cleanup, plan, config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    init_logging, load_settings, run_backup, run_cleanup, show_config, show_plan, start_daemon,
};
