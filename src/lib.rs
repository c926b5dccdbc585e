pub mod config;
pub mod dedup;
pub mod entry;
pub mod pipeline;
pub mod playlist;
pub mod publish;
pub mod reconcile;
pub mod source;
pub mod store;

/// Application name for XDG paths
pub const APP_NAME: &str = "livehistory";
