#![allow(dead_code)]
//! A minimal Zabbix trapper that records what it receives.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub enum Reply {
    /// Answer with `response: success` and a matching info line.
    Success,
    /// Answer with `response: failed`.
    Failed,
    /// Read the request but never answer.
    Silent,
    /// Answer with bytes that are not a trapper packet.
    Garbage,
}

pub struct FakeZabbixServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    handle: JoinHandle<()>,
}

impl FakeZabbixServer {
    pub async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let requests = requests.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        break;
                    };
                    let requests = requests.clone();
                    let reply = reply.clone();
                    tokio::spawn(async move {
                        let mut header = [0u8; 13];
                        if stream.read_exact(&mut header).await.is_err() {
                            return;
                        }
                        assert_eq!(&header[..4], b"ZBXD");
                        let len = u64::from_le_bytes(header[5..13].try_into().unwrap()) as usize;
                        let mut body = vec![0u8; len];
                        stream.read_exact(&mut body).await.unwrap();
                        let request: Value = serde_json::from_slice(&body).unwrap();
                        let count = request["data"].as_array().map_or(0, Vec::len);
                        requests.lock().unwrap().push(request);

                        let answer = match reply {
                            Reply::Success => json!({
                                "response": "success",
                                "info": format!(
                                    "processed: {count}; failed: 0; total: {count}; \
                                     seconds spent: 0.000055"
                                ),
                            }),
                            Reply::Failed => json!({
                                "response": "failed",
                                "info": "host not found",
                            }),
                            Reply::Silent => {
                                std::future::pending::<()>().await;
                                return;
                            }
                            Reply::Garbage => {
                                let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
                                return;
                            }
                        };
                        let payload = serde_json::to_vec(&answer).unwrap();
                        let mut packet = b"ZBXD\x01".to_vec();
                        packet.extend_from_slice(&(payload.len() as u64).to_le_bytes());
                        packet.extend_from_slice(&payload);
                        let _ = stream.write_all(&packet).await;
                    });
                }
            })
        };

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeZabbixServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
