//! Connection lifecycle events
//!
//! The server reports request and teardown events through an
//! [`EventObserver`]. Every method has a no-op default, so an observer only
//! implements the events it cares about.

use super::types::TargetAddr;
use std::net::SocketAddr;
use tracing::debug;

/// Receiver of per-connection lifecycle events
pub trait EventObserver: Send + Sync + 'static {
    /// A CONNECT request was accepted for dispatch
    fn tcp_request(&self, _client: SocketAddr, _target: &TargetAddr) {}

    /// A CONNECT session ended; `err` is `None` on a clean close
    fn tcp_closed(&self, _client: SocketAddr, _target: &TargetAddr, _err: Option<&anyhow::Error>) {
    }

    /// A UDP ASSOCIATE request was accepted for dispatch
    fn udp_associate(&self, _client: SocketAddr) {}

    /// A UDP association ended; `err` is `None` on a clean close
    fn udp_closed(&self, _client: SocketAddr, _err: Option<&anyhow::Error>) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EventObserver for NoopObserver {}

/// Observer that logs every event at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn tcp_request(&self, client: SocketAddr, target: &TargetAddr) {
        debug!(%client, %target, "TCP request");
    }

    fn tcp_closed(&self, client: SocketAddr, target: &TargetAddr, err: Option<&anyhow::Error>) {
        match err {
            Some(e) => debug!(%client, %target, "TCP closed with error: {:#}", e),
            None => debug!(%client, %target, "TCP closed"),
        }
    }

    fn udp_associate(&self, client: SocketAddr) {
        debug!(%client, "UDP associate");
    }

    fn udp_closed(&self, client: SocketAddr, err: Option<&anyhow::Error>) {
        match err {
            Some(e) => debug!(%client, "UDP closed with error: {:#}", e),
            None => debug!(%client, "UDP closed"),
        }
    }
}
