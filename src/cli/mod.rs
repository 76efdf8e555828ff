//! Command-line interface handlers

mod commands;

pub use commands::{cmd_config, cmd_decode, cmd_genesis, cmd_replay, decode_frames, CliResult};
