//! Route outputs: serial-out and network-out writers.
//!
//! The hub hands lines to a `ChannelSink`, which never blocks; each writer
//! task drains its channel and exits when the hub drops the sending side.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use ais_core::LineSink;

/// Lines buffered per output before the hub starts dropping.
pub const OUTPUT_QUEUE_CAPACITY: usize = 1024;

/// Hub-side end of an output channel.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        ChannelSink { tx, dropped: 0 }
    }
}

impl LineSink for ChannelSink {
    fn forward(&mut self, line: &str) {
        if self.tx.try_send(line.to_string()).is_err() {
            self.dropped += 1;
            if self.dropped.is_power_of_two() {
                warn!(dropped = self.dropped, "output queue full");
            }
        }
    }
}

/// Append every routed line to a device node (or plain file).
pub async fn run_serial_out(path: PathBuf, mut rx: mpsc::Receiver<String>) -> std::io::Result<u64> {
    let mut out = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    info!(path = %path.display(), "serial-out open");

    let mut written = 0u64;
    while let Some(line) = rx.recv().await {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\r\n").await?;
        written += 1;
    }
    out.flush().await?;
    info!(path = %path.display(), lines = written, "serial-out closed");
    Ok(written)
}

/// Serve every routed line to all connected TCP clients.
///
/// Clients that fall behind skip lines rather than stall the others.
pub async fn run_network_out(listener: TcpListener, mut rx: mpsc::Receiver<String>) {
    let (fanout, _) = broadcast::channel::<String>(OUTPUT_QUEUE_CAPACITY);
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "network-out listening");
    }

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                // no receivers is not an error
                Some(line) => { let _ = fanout.send(line); }
                None => break,
            },
            accepted = listener.accept() => match accepted {
                Ok((sock, peer)) => {
                    debug!(%peer, "network-out client connected");
                    tokio::spawn(serve_client(sock, fanout.subscribe()));
                }
                Err(e) => warn!(error = %e, "network-out accept failed"),
            },
        }
    }
    info!("network-out closed");
}

async fn serve_client(mut sock: tokio::net::TcpStream, mut lines: broadcast::Receiver<String>) {
    loop {
        match lines.recv().await {
            Ok(line) => {
                let framed = format!("{line}\r\n");
                if sock.write_all(framed.as_bytes()).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "network-out client lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
