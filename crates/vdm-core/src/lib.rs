pub mod config;
pub mod logging;

pub mod control;
pub mod convert;
pub mod job;
mod process;
pub mod update;
pub mod ytdlp;
