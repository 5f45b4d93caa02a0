//! Listener aggregation
//!
//! [`MultiListener`] merges any number of bound TCP listeners into a single
//! accept stream. Each listener runs its own acceptor task; accepted
//! connections and accept errors are funnelled through shared queues.

use crate::error::HonksError;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Capacity of the shared connection queue
const ACCEPT_QUEUE_SIZE: usize = 32;

type Accepted = (TcpStream, SocketAddr);

/// Several TCP listeners behind one `accept`
#[derive(Debug)]
pub struct MultiListener {
    conn_tx: mpsc::Sender<Accepted>,
    conn_rx: AsyncMutex<mpsc::Receiver<Accepted>>,
    err_tx: mpsc::UnboundedSender<io::Error>,
    err_rx: AsyncMutex<mpsc::UnboundedReceiver<io::Error>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    local_addrs: Mutex<Vec<SocketAddr>>,
}

impl MultiListener {
    /// Create an empty aggregator
    pub fn new() -> Self {
        let (conn_tx, conn_rx) = mpsc::channel(ACCEPT_QUEUE_SIZE);
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        MultiListener {
            conn_tx,
            conn_rx: AsyncMutex::new(conn_rx),
            err_tx,
            err_rx: AsyncMutex::new(err_rx),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            local_addrs: Mutex::new(Vec::new()),
        }
    }

    /// Start accepting on `listener`
    ///
    /// Returns the listener's local address. Fails with
    /// [`HonksError::ListenerClosed`] once the aggregator is closed, in
    /// which case `listener` is dropped.
    pub fn add(&self, listener: TcpListener) -> Result<SocketAddr, HonksError> {
        if self.shutdown.is_cancelled() {
            return Err(HonksError::ListenerClosed);
        }

        let local_addr = listener.local_addr()?;
        let task = tokio::spawn(accept_loop(
            listener,
            local_addr,
            self.conn_tx.clone(),
            self.err_tx.clone(),
            self.shutdown.clone(),
        ));

        lock(&self.tasks).push(task);
        lock(&self.local_addrs).push(local_addr);

        Ok(local_addr)
    }

    /// Wait for the next connection from any listener
    ///
    /// Connections from one listener are delivered in the order that
    /// listener accepted them. The first accept error of any listener is
    /// returned as [`HonksError::Accept`]. After [`MultiListener::close`]
    /// every call returns [`HonksError::ListenerClosed`].
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), HonksError> {
        let mut err_rx = self.err_rx.lock().await;
        let mut conn_rx = self.conn_rx.lock().await;

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(HonksError::ListenerClosed),
            Some(e) = err_rx.recv() => Err(HonksError::Accept(e)),
            Some(accepted) = conn_rx.recv() => Ok(accepted),
            else => Err(HonksError::ListenerClosed),
        }
    }

    /// Stop every acceptor task
    ///
    /// Idempotent. The listening sockets are closed as each task exits; use
    /// [`MultiListener::wait_closed`] to wait for that.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("Closing {} listener(s)", lock(&self.local_addrs).len());
        }
        self.shutdown.cancel();
    }

    /// Wait until every acceptor task has exited and released its socket
    pub async fn wait_closed(&self) {
        let tasks: Vec<_> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Acceptor task failed: {}", e);
            }
        }
    }

    /// Whether [`MultiListener::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Local addresses of every added listener
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        lock(&self.local_addrs).clone()
    }
}

impl Default for MultiListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MultiListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Accept on one listener until shutdown or the first error
async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    conn_tx: mpsc::Sender<Accepted>,
    err_tx: mpsc::UnboundedSender<io::Error>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => result,
        };

        match accepted {
            Ok(conn) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = conn_tx.send(conn) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Accept on {} failed: {}", local_addr, e);
                let _ = err_tx.send(e);
                break;
            }
        }
    }

    debug!("Listener on {} stopped", local_addr);
}
