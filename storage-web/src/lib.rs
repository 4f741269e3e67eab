pub mod config;
pub mod http_ui;
pub mod metrics;
pub mod uploader;
