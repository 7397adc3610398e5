//! Error-class tokens surfaced to clients on the envelope's `error` field.
//!
//! Tokens are stable identifiers, not prose; clients translate them.

pub const INVALID_REQUEST: &str = "error.invalid.request";
pub const NICKNAME_REQUIRED: &str = "error.validation.nickname.required";

pub const LOGIN_REQUIRED: &str = "error.login.required";
pub const LOGIN_UNAVAILABLE: &str = "error.login.unavailable";
pub const PLAYER_NOT_FOUND: &str = "error.player.not_found";
pub const ALREADY_CONNECTED: &str = "error.player.already_connected";

pub const SERVER_FULL: &str = "error.server.full";

pub const CHAT_INVALID: &str = "error.chat.invalid";
pub const CHAT_EMPTY: &str = "error.chat.empty";
pub const CHAT_UNKNOWN_COMMAND: &str = "error.chat.unknown_command";
pub const CHAT_USAGE_WHISPER: &str = "error.chat.usage_whisper";
pub const CHAT_USAGE_NOTICE: &str = "error.chat.usage_notice";
pub const CHAT_USAGE_TELEPORT: &str = "error.chat.usage_teleport";
