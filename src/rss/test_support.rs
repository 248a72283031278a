//! Test fixtures: a loopback HTTP server and a static resolver.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::rss::fetcher::FetchSettings;
use crate::rss::ssrf::{is_private_ip, AddressGuard, Resolve};

/// Hostname the fixtures resolve to the loopback server.
pub const FEED_HOST: &str = "feeds.example.com";

/// Resolver answering from a fixed table. Unknown hosts fail to resolve.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, ips: &[&str]) -> Self {
        let ips = ips
            .iter()
            .map(|ip| ip.parse().expect("valid test IP"))
            .collect();
        self.hosts.insert(host.to_string(), ips);
        self
    }
}

impl Resolve for StaticResolver {
    fn resolve<'a>(&'a self, host: &'a str, _port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        let result = self
            .hosts
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"));
        async move { result }.boxed()
    }
}

/// Standard blocklist, except loopback so tests can reach [`TestServer`].
pub fn allow_loopback(ip: &IpAddr) -> bool {
    !ip.is_loopback() && is_private_ip(ip)
}

/// Guard resolving [`FEED_HOST`] to the loopback fixture.
pub fn loopback_guard() -> AddressGuard {
    let resolver = StaticResolver::new().with_host(FEED_HOST, &["127.0.0.1"]);
    AddressGuard::new(Arc::new(resolver)).with_blocklist(allow_loopback)
}

/// Small limits so the size and timeout paths are quick to hit.
pub fn test_settings() -> FetchSettings {
    FetchSettings {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_millis(300),
        max_redirects: 3,
        max_response_bytes: 1024,
        user_agent: "Noticeboard-Test/1.0".to_string(),
    }
}

/// An RSS 2.0 document with one item per `(guid, title)` pair.
pub fn rss_document(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(guid, title)| {
            format!(
                "<item><title>{title}</title><link>https://example.com/{guid}</link>\
                 <description>About {title}</description>\
                 <pubDate>Mon, 18 Nov 2024 10:00:00 +0000</pubDate><guid>{guid}</guid></item>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><rss version=\"2.0\"><channel>\
         <title>Test Feed</title><link>https://example.com</link>\
         <description>Test Description</description>{items}</channel></rss>"
    )
}

/// Canned response for one path.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Complete response with Content-Length.
    Full {
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    /// 200 with a close-delimited body of `total` bytes, written in chunks.
    Stream { chunk: Vec<u8>, total: usize },
    /// Headers and a partial body, then silence.
    Stall,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Full {
            status: 200,
            reason: "OK".to_string(),
            headers: vec![("Content-Type".to_string(), "application/rss+xml".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn status(status: u16, reason: &str) -> Self {
        Reply::Full {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Reply::Full {
            status,
            reason: "Redirect".to_string(),
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
        }
    }
}

type Routes = Arc<Mutex<HashMap<String, Reply>>>;

/// Minimal HTTP/1.1 server on 127.0.0.1 that records what it sees.
pub struct TestServer {
    addr: SocketAddr,
    routes: Routes,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::new(Mutex::new(
            routes
                .into_iter()
                .map(|(path, reply)| (path.to_string(), reply))
                .collect(),
        ));
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let routes = routes.clone();
            let connections = connections.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(socket, routes.clone(), requests.clone()));
                }
            })
        };

        Self {
            addr,
            routes,
            connections,
            requests,
            handle,
        }
    }

    /// Add or replace a route on the running server.
    pub fn with_route(self, path: &str, reply: Reply) -> Self {
        self.routes.lock().unwrap().insert(path.to_string(), reply);
        self
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// URL on [`FEED_HOST`] for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{FEED_HOST}:{}{path}", self.addr.port())
    }

    /// Number of accepted TCP connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Raw request heads, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, routes: Routes, requests: Arc<Mutex<Vec<String>>>) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head).to_string();
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    requests.lock().unwrap().push(head);

    let reply = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or_else(|| Reply::status(404, "Not Found"));

    match reply {
        Reply::Full {
            status,
            reason,
            headers,
            body,
        } => {
            let mut response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n",
                body.len()
            );
            for (name, value) in headers {
                response.push_str(&format!("{name}: {value}\r\n"));
            }
            response.push_str("\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
        Reply::Stream { chunk, total } => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/rss+xml\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let mut sent = 0;
            while sent < total {
                if socket.write_all(&chunk).await.is_err() {
                    return;
                }
                sent += chunk.len();
            }
            let _ = socket.shutdown().await;
        }
        Reply::Stall => {
            let head = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n<rss>";
            let _ = socket.write_all(head.as_bytes()).await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }
}
