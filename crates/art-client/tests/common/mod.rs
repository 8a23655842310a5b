//! Scripted Frame TV for integration tests.
//!
//! Speaks the control channel over plain WebSocket, records every inner
//! request, and answers through a responder closure. Side-channel
//! endpoints are plain TCP listeners spawned on demand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frameart_client::ArtConfig;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// First message after `ms.channel.connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    Ready,
    Unauthorized,
}

/// Sends unsolicited messages to every connected client.
#[derive(Clone, Default)]
pub struct Pusher {
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>,
}

impl Pusher {
    pub fn push(&self, inner: Value) {
        for client in self.clients.lock().unwrap().iter() {
            let _ = client.send(service(inner.clone()));
        }
    }

    /// Closes every control connection from the device side.
    pub fn drop_clients(&self) {
        for client in self.clients.lock().unwrap().drain(..) {
            let _ = client.send(Message::Close(None));
        }
    }
}

type Responder = Arc<dyn Fn(&Value, &Pusher) -> Vec<Value> + Send + Sync>;

pub struct MockDevice {
    pub port: u16,
    pusher: Pusher,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
}

impl MockDevice {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Value, &Pusher) -> Vec<Value> + Send + Sync + 'static,
    {
        Self::start_with(Greeting::Ready, responder).await
    }

    /// A device that records requests and never answers.
    pub async fn silent() -> Self {
        Self::start(|_, _| Vec::new()).await
    }

    pub async fn start_with<F>(greeting: Greeting, responder: F) -> Self
    where
        F: Fn(&Value, &Pusher) -> Vec<Value> + Send + Sync + 'static,
    {
        Self::spawn(greeting, false, responder).await
    }

    /// Like [`MockDevice::start`], but the first connection stops reading
    /// right after the handshake, the way a TV dozing off does.
    pub async fn stalls_first<F>(responder: F) -> Self
    where
        F: Fn(&Value, &Pusher) -> Vec<Value> + Send + Sync + 'static,
    {
        Self::spawn(Greeting::Ready, true, responder).await
    }

    async fn spawn<F>(greeting: Greeting, stall_first: bool, responder: F) -> Self
    where
        F: Fn(&Value, &Pusher) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let device = Self {
            port,
            pusher: Pusher::default(),
            requests: Arc::new(Mutex::new(Vec::new())),
            connections: Arc::new(AtomicUsize::new(0)),
        };

        let responder: Responder = Arc::new(responder);
        let pusher = device.pusher.clone();
        let requests = Arc::clone(&device.requests);
        let connections = Arc::clone(&device.connections);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle_connection(
                    stream,
                    greeting,
                    stall_first && index == 0,
                    Arc::clone(&responder),
                    pusher.clone(),
                    Arc::clone(&requests),
                ));
            }
        });
        device
    }

    pub fn config(&self) -> ArtConfig {
        ArtConfig::new("127.0.0.1")
            .port(self.port)
            .rest_port(closed_port())
            .timeout(Duration::from_secs(2))
    }

    pub fn pusher(&self) -> &Pusher {
        &self.pusher
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_named(&self, name: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["request"] == name)
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn handle_connection(
    stream: TcpStream,
    greeting: Greeting,
    stall: bool,
    responder: Responder,
    pusher: Pusher,
    requests: Arc<Mutex<Vec<Value>>>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    pusher.clients.lock().unwrap().push(out_tx.clone());

    let _ = out_tx.send(text(json!({"event": "ms.channel.connect", "data": {}})));
    let event = match greeting {
        Greeting::Ready => "ms.channel.ready",
        Greeting::Unauthorized => "ms.channel.unauthorized",
    };
    let _ = out_tx.send(text(json!({"event": event, "data": {}})));

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    if stall {
        // Keep the socket open without ever reading from it.
        std::future::pending::<()>().await;
    }

    while let Some(Ok(msg)) = source.next().await {
        match msg {
            Message::Text(body) => {
                let Ok(outer) = serde_json::from_str::<Value>(&body) else {
                    continue;
                };
                let data = outer["params"]["data"].as_str().unwrap_or("{}");
                let Ok(inner) = serde_json::from_str::<Value>(data) else {
                    continue;
                };
                requests.lock().unwrap().push(inner.clone());
                for reply in responder(&inner, &pusher) {
                    let _ = out_tx.send(service(reply));
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}

/// Wraps an inner payload in a `d2d_service_message` envelope.
pub fn service(inner: Value) -> Message {
    text(json!({"event": "d2d_service_message", "data": inner.to_string()}))
}

/// `body` tagged with the id of `request`.
pub fn reply(request: &Value, mut body: Value) -> Value {
    body["request_id"] = request["request_id"].clone();
    body["id"] = request["id"].clone();
    body
}

/// Double-encoded `conn_info`, the way devices send it.
pub fn conn_info(port: u16, key: Option<&str>) -> Value {
    let mut info = json!({"ip": "127.0.0.1", "port": port.to_string(), "secured": false});
    if let Some(key) = key {
        info["key"] = json!(key);
    }
    Value::String(info.to_string())
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn side_listener() -> (u16, std::net::TcpListener) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    (listener.local_addr().unwrap().port(), listener)
}

async fn write_header(sock: &mut TcpStream, header: &Value) {
    let bytes = serde_json::to_vec(header).unwrap();
    sock.write_all(&(bytes.len() as u32).to_be_bytes()).await.unwrap();
    sock.write_all(&bytes).await.unwrap();
}

/// Serves one batch of frames to the first connection.
pub fn serve_frames(frames: Vec<(Value, Vec<u8>)>) -> u16 {
    let (port, listener) = side_listener();
    tokio::spawn(async move {
        let listener = TcpListener::from_std(listener).unwrap();
        let (mut sock, _) = listener.accept().await.unwrap();
        for (header, payload) in frames {
            write_header(&mut sock, &header).await;
            sock.write_all(&payload).await.unwrap();
        }
        let _ = sock.shutdown().await;
    });
    port
}

/// Announces `header` but sends only `sent` payload bytes before closing.
pub fn serve_truncated(header: Value, sent: usize) -> u16 {
    let (port, listener) = side_listener();
    tokio::spawn(async move {
        let listener = TcpListener::from_std(listener).unwrap();
        let (mut sock, _) = listener.accept().await.unwrap();
        write_header(&mut sock, &header).await;
        sock.write_all(&vec![0u8; sent]).await.unwrap();
        let _ = sock.shutdown().await;
    });
    port
}

/// Accepts one upload and hands back its header and payload.
pub fn receive_upload() -> (u16, oneshot::Receiver<(Value, Vec<u8>)>) {
    let (port, listener) = side_listener();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let listener = TcpListener::from_std(listener).unwrap();
        let (mut sock, _) = listener.accept().await.unwrap();
        let len = sock.read_u32().await.unwrap() as usize;
        let mut header = vec![0u8; len];
        sock.read_exact(&mut header).await.unwrap();
        let header: Value = serde_json::from_slice(&header).unwrap();
        let size = header["fileLength"].as_u64().unwrap() as usize;
        let mut payload = vec![0u8; size];
        sock.read_exact(&mut payload).await.unwrap();
        let _ = tx.send((header, payload));
    });
    (port, rx)
}

/// Thumbnail header for a single-frame batch.
pub fn thumbnail_header(content_id: &str, len: usize) -> Value {
    json!({
        "num": 0,
        "total": 1,
        "fileLength": len,
        "fileID": content_id,
        "fileType": "jpg",
    })
}
