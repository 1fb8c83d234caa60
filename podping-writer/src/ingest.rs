//! Writer ingest (spec §4.3): accepts URLs from one of three mutually
//! exclusive transports and forwards each to the batcher over an
//! `mpsc` channel.
//!
//! Grounded on `original_source/hive-writer/hive-writer.py`'s
//! `MyTCPHandler` for the line-socket framing (recv up to 1024 bytes,
//! strip, decode UTF-8, reply `OK`/`ERR`), generalized to async
//! `tokio::net::TcpListener` plus a `zmq` REP socket per spec's second
//! mode.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

const MAX_FRAME_BYTES: usize = 1024;

/// Enqueue a single URL onto the batcher's input channel, rejecting
/// empty (after trim) input per spec §3's `EmptyUrl` domain error.
async fn enqueue(tx: &mpsc::Sender<String>, raw: &str) -> bool {
    let url = raw.trim();
    if url.is_empty() {
        return false;
    }
    tx.send(url.to_string()).await.is_ok()
}

/// Run the TCP line-socket ingest loop until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the listener cannot bind.
#[instrument(skip(tx, shutdown), fields(host, port))]
pub async fn run_line_socket(
    host: &str,
    port: u16,
    tx: mpsc::Sender<String>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(host, port, "line-socket ingest listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (mut socket, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; MAX_FRAME_BYTES];
                    let reply = match socket.read(&mut buf).await {
                        Ok(0) => return,
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&buf[..n]);
                            if enqueue(&tx, &text).await { "OK" } else { "ERR" }
                        }
                        Err(e) => {
                            warn!(error = %e, peer = %peer, "read failed");
                            "ERR"
                        }
                    };
                    let _ = socket.write_all(reply.as_bytes()).await;
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("line-socket ingest shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Run the ZeroMQ request/reply ingest loop until `shutdown` fires.
///
/// `zmq`'s socket API is synchronous, so the receive loop runs on a
/// blocking task and polls for shutdown between frames.
///
/// # Errors
///
/// Returns an error if the socket cannot bind.
#[instrument(skip(tx, shutdown), fields(host, port))]
pub async fn run_reqrep_socket(
    host: &str,
    port: u16,
    tx: mpsc::Sender<String>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), zmq::Error> {
    let endpoint = format!("tcp://{host}:{port}");
    let context = zmq::Context::new();
    let socket = context.socket(zmq::REP)?;
    socket.set_rcvtimeo(500)?;
    socket.bind(&endpoint)?;
    info!(endpoint = %endpoint, "req/rep ingest listening");

    loop {
        if *shutdown.borrow() {
            info!("req/rep ingest shutting down");
            return Ok(());
        }
        match socket.recv_string(0) {
            Ok(Ok(text)) => {
                let accepted = enqueue(&tx, &text).await;
                let reply = if accepted { "OK" } else { "ERR" };
                if let Err(e) = socket.send(reply, 0) {
                    warn!(error = %e, "failed to send reply");
                }
            }
            Ok(Err(_)) => {
                let _ = socket.send("ERR", 0);
            }
            Err(zmq::Error::EAGAIN) => {
                let _ = shutdown.has_changed();
            }
            Err(e) => {
                warn!(error = %e, "recv failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_rejects_blank_input() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(!enqueue(&tx, "   \n").await);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_trims_and_forwards() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(enqueue(&tx, "https://a.example/f.xml \n").await);
        assert_eq!(rx.recv().await.as_deref(), Some("https://a.example/f.xml"));
    }

    #[tokio::test]
    async fn line_socket_round_trip() {
        let (tx, mut rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind failed");
        let addr = listener.local_addr().expect("addr failed");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((mut socket, _)) = accepted else { continue };
                        let tx = tx.clone();
                        let mut buf = vec![0u8; MAX_FRAME_BYTES];
                        if let Ok(n) = socket.read(&mut buf).await {
                            let text = String::from_utf8_lossy(&buf[..n]).to_string();
                            let ok = enqueue(&tx, &text).await;
                            let _ = socket.write_all(if ok { b"OK" } else { b"ERR" }).await;
                        }
                    }
                    _ = shutdown_rx.clone().changed() => return,
                }
            }
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.expect("connect failed");
        client.write_all(b"https://a.example/f.xml").await.expect("write failed");
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.expect("read failed");
        assert_eq!(&reply, b"OK");
        assert_eq!(rx.recv().await.as_deref(), Some("https://a.example/f.xml"));
    }
}
