//! Test utilities for Honks
//!
//! This module provides a running server, echo peers and a minimal SOCKS5
//! client used across integration tests.

#![allow(dead_code)]

use honks::config::{Config, ListenConfig, UsersConfig};
use honks::listener::MultiListener;
use honks::server::bind_listeners;
use honks::socks::Socks5Server;
use honks::transport::DirectOutbound;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A server running on loopback
pub struct TestServer {
    pub addrs: Vec<SocketAddr>,
    pub listener: Arc<MultiListener>,
    pub task: JoinHandle<Result<(), honks::HonksError>>,
}

impl TestServer {
    /// First listen address
    pub fn addr(&self) -> SocketAddr {
        self.addrs[0]
    }

    /// Close the listeners and wait for the serve loop to return
    pub async fn shutdown(self) {
        self.listener.close();
        let _ = self.task.await;
        self.listener.wait_closed().await;
    }
}

/// Test server builder
pub struct TestServerBuilder {
    listeners: usize,
    users: BTreeMap<String, String>,
    timeout: u64,
    disable_udp: bool,
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        TestServerBuilder {
            listeners: 1,
            users: BTreeMap::new(),
            timeout: 0,
            disable_udp: false,
        }
    }
}

impl TestServerBuilder {
    /// Create a new test server builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loopback listeners
    pub fn listeners(mut self, count: usize) -> Self {
        self.listeners = count;
        self
    }

    /// Add an accepted user
    pub fn user(mut self, username: &str, password: &str) -> Self {
        self.users.insert(username.to_string(), password.to_string());
        self
    }

    /// Set idle timeout in seconds
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    /// Disable UDP ASSOCIATE
    pub fn disable_udp(mut self, disable: bool) -> Self {
        self.disable_udp = disable;
        self
    }

    /// Build the configuration
    pub fn config(&self) -> Config {
        Config {
            listen: ListenConfig(vec!["127.0.0.1:0".to_string(); self.listeners]),
            timeout: self.timeout,
            disable_udp: self.disable_udp,
            users: UsersConfig(self.users.clone()),
            ..Default::default()
        }
    }

    /// Bind and start serving
    pub async fn spawn(self) -> TestServer {
        let config = self.config();
        let listener = Arc::new(bind_listeners(&config).await.unwrap());
        let server = Arc::new(Socks5Server::new(
            config.server_options(),
            DirectOutbound::with_defaults(),
        ));

        let serving = listener.clone();
        let task = tokio::spawn(async move { server.serve(&serving).await });

        TestServer {
            addrs: listener.local_addrs(),
            listener,
            task,
        }
    }
}

/// TCP echo server; returns its address
pub async fn spawn_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// UDP echo server that also reports every payload it receives
pub async fn spawn_udp_echo() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let _ = tx.send(buf[..n].to_vec());
            let _ = socket.send_to(&buf[..n], from).await;
        }
    });

    (addr, rx)
}

/// Negotiate "no authentication"; returns the selected method
pub async fn negotiate_no_auth(stream: &mut TcpStream) -> u8 {
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    reply[1]
}

/// Negotiate username/password; returns the sub-negotiation status
pub async fn negotiate_password(stream: &mut TcpStream, username: &str, password: &str) -> u8 {
    stream.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);

    let mut request = vec![0x01, username.len() as u8];
    request.extend_from_slice(username.as_bytes());
    request.push(password.len() as u8);
    request.extend_from_slice(password.as_bytes());
    stream.write_all(&request).await.unwrap();

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await.unwrap();
    assert_eq!(status[0], 0x01);
    status[1]
}

/// Encode an IP destination in request form: ATYP, address, port
pub fn encode_addr(addr: SocketAddr) -> Vec<u8> {
    let mut out = Vec::new();
    match addr.ip() {
        IpAddr::V4(ip) => {
            out.push(0x01);
            out.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            out.push(0x04);
            out.extend_from_slice(&ip.octets());
        }
    }
    out.extend_from_slice(&addr.port().to_be_bytes());
    out
}

/// Send a request with an IP destination
pub async fn send_request(stream: &mut TcpStream, command: u8, addr: SocketAddr) {
    let mut request = vec![0x05, command, 0x00];
    request.extend_from_slice(&encode_addr(addr));
    stream.write_all(&request).await.unwrap();
}

/// Send a CONNECT request with a domain destination
pub async fn send_domain_connect(stream: &mut TcpStream, domain: &str, port: u16) {
    let mut request = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await.unwrap();
}

/// Read a reply; returns the reply code and bound address
pub async fn read_reply(stream: &mut TcpStream) -> (u8, SocketAddr) {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x05);

    let ip = match header[3] {
        0x01 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await.unwrap();
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        0x04 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await.unwrap();
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        other => panic!("unexpected address type in reply: {}", other),
    };
    let port = stream.read_u16().await.unwrap();

    (header[1], SocketAddr::new(ip, port))
}

/// Wrap a payload in the UDP request header
pub fn udp_datagram(frag: u8, target: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x00, 0x00, frag];
    out.extend_from_slice(&encode_addr(target));
    out.extend_from_slice(payload);
    out
}

/// Assert the server closed the connection
pub async fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(std::time::Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("connection was not closed")
        .unwrap_or(0);
    assert_eq!(n, 0);
}
