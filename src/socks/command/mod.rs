//! SOCKS5 request module
//!
//! Handles parsing SOCKS5 requests and building replies.

mod parser;
mod reply;

pub use parser::parse_request;
pub use reply::{build_reply, send_failure, send_success};
