//! Twitch chat wire protocol

pub mod frame;

pub use frame::{join_command, nick_command, parse_frame, pass_command, KEEPALIVE_REPLY};
