// Minimal HTTP/1.1 server for driving the scanner without network access.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use url::{form_urlencoded, Url};

pub type Params = Vec<(String, String)>;
pub type Handler = Arc<dyn Fn(&str, &Params) -> (u16, String) + Send + Sync>;

pub struct TestServer {
    pub base: Url,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }

    /// Requests seen for `path` (query string excluded).
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

pub fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub async fn spawn_server<F>(handler: F) -> TestServer
where
    F: Fn(&str, &Params) -> (u16, String) + Send + Sync + 'static,
{
    let handler: Handler = Arc::new(handler);
    let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let hits_c = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            let hits = Arc::clone(&hits_c);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = sock.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let head = String::from_utf8_lossy(&buf).to_string();
                let target = head
                    .lines()
                    .next()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
                let params: Params = form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect();

                *hits.lock().unwrap().entry(path.to_string()).or_default() += 1;
                let (status, body) = handler(path, &params);

                let resp = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    if status < 400 { "OK" } else { "ERR" },
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    TestServer {
        base: Url::parse(&format!("http://{}/", addr)).unwrap(),
        hits,
    }
}
