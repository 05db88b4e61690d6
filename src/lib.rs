//! Sitepin: turns pasted text, map links, addresses, share payloads and device
//! readings into a site position with a label.

pub mod config;
pub mod location;
pub mod logging;
pub mod server;
