//! Library surface for hostdash_agent: adapters for the OS process table,
//! PM2 and Docker, host metrics, and the HTTP/WebSocket server around them.

pub mod action;
pub mod api;
pub mod auth;
pub mod config;
pub mod docker;
pub mod error;
pub mod exec;
pub mod metrics;
pub mod net;
pub mod pm2;
pub mod procs;
pub mod state;
pub mod tls;
pub mod types;
pub mod upstream;
pub mod views;
pub mod ws;
