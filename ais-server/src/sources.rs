//! Ingestion workers: one task per configured source.
//!
//! Each worker reads a line-oriented stream and pushes `Sentence`s into the
//! hub's bounded queue. A full queue is waited on for at most
//! `INGEST_SEND_TIMEOUT`; after that the line is dropped.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ais_core::config::{SourceConfig, SourceKind};

/// Longest a source waits on a full hub queue before dropping a line.
pub const INGEST_SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between TCP reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One raw line tagged with its source and arrival time.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub source: String,
    pub line: String,
    pub timestamp: f64,
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Line counts for one source, logged when the worker exits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    pub lines: u64,
    pub dropped: u64,
}

enum PumpEnd {
    /// Stream ended.
    Eof,
    /// Shutdown requested or the hub is gone.
    Stopped,
}

struct Pump<'a> {
    name: &'a str,
    tx: &'a mpsc::Sender<Sentence>,
    shutdown: &'a CancellationToken,
    line_delay: Duration,
    report: SourceReport,
}

impl Pump<'_> {
    async fn run<R: AsyncBufRead + Unpin>(&mut self, reader: R) -> std::io::Result<PumpEnd> {
        let mut segments = reader.split(b'\n');
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(PumpEnd::Stopped),
                next = segments.next_segment() => next?,
            };
            let Some(mut raw) = next else {
                return Ok(PumpEnd::Eof);
            };
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            // Line noise is passed on lossily; the hub drops what fails to decode.
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            };
            if line.trim().is_empty() {
                continue;
            }

            let sentence = Sentence {
                source: self.name.to_string(),
                line,
                timestamp: now_secs(),
            };
            match self.tx.send_timeout(sentence, INGEST_SEND_TIMEOUT).await {
                Ok(()) => self.report.lines += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    self.report.dropped += 1;
                    debug!(source = self.name, "hub queue full, line dropped");
                }
                Err(SendTimeoutError::Closed(_)) => return Ok(PumpEnd::Stopped),
            }

            if !self.line_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Ok(PumpEnd::Stopped),
                    _ = tokio::time::sleep(self.line_delay) => {}
                }
            }
        }
    }
}

/// Run one source until its stream ends or `shutdown` fires.
pub async fn run_source(
    cfg: SourceConfig,
    tx: mpsc::Sender<Sentence>,
    shutdown: CancellationToken,
) -> SourceReport {
    let mut pump = Pump {
        name: &cfg.name,
        tx: &tx,
        shutdown: &shutdown,
        line_delay: Duration::from_millis(cfg.line_delay_ms),
        report: SourceReport {
            name: cfg.name.clone(),
            ..SourceReport::default()
        },
    };
    let address = cfg.address.as_deref().unwrap_or_default();

    match cfg.kind {
        SourceKind::File | SourceKind::Serial => match tokio::fs::File::open(address).await {
            Ok(file) => {
                info!(source = %cfg.name, path = address, "reading");
                if let Err(e) = pump.run(BufReader::new(file)).await {
                    warn!(source = %cfg.name, error = %e, "read failed");
                }
            }
            Err(e) => warn!(source = %cfg.name, path = address, error = %e, "cannot open"),
        },
        SourceKind::Stdin => {
            info!(source = %cfg.name, "reading stdin");
            if let Err(e) = pump.run(BufReader::new(tokio::io::stdin())).await {
                warn!(source = %cfg.name, error = %e, "read failed");
            }
        }
        SourceKind::Tcp => run_tcp(&mut pump, address).await,
    }

    info!(
        source = %pump.report.name,
        lines = pump.report.lines,
        dropped = pump.report.dropped,
        "source stopped"
    );
    pump.report
}

/// Connect, read until the peer closes, reconnect after a pause.
async fn run_tcp(pump: &mut Pump<'_>, address: &str) {
    loop {
        let connected = tokio::select! {
            biased;
            _ = pump.shutdown.cancelled() => return,
            c = TcpStream::connect(address) => c,
        };
        match connected {
            Ok(stream) => {
                info!(source = pump.name, address, "connected");
                match pump.run(BufReader::new(stream)).await {
                    Ok(PumpEnd::Stopped) => return,
                    Ok(PumpEnd::Eof) => warn!(source = pump.name, address, "connection closed"),
                    Err(e) => warn!(source = pump.name, address, error = %e, "read failed"),
                }
            }
            Err(e) => warn!(source = pump.name, address, error = %e, "connect failed"),
        }

        tokio::select! {
            biased;
            _ = pump.shutdown.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn file_source(lines: &str) -> (SourceConfig, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        let mut cfg = SourceConfig::new("replay", SourceKind::File);
        cfg.address = Some(file.path().to_str().unwrap().to_string());
        (cfg, file)
    }

    #[tokio::test]
    async fn test_file_source_reads_all_lines() {
        let (cfg, _file) = file_source("!one\n\n!two\r\n!three");
        let (tx, mut rx) = mpsc::channel(16);
        let report = run_source(cfg, tx, CancellationToken::new()).await;
        assert_eq!(report.lines, 3);
        assert_eq!(report.dropped, 0);

        let mut got = Vec::new();
        while let Some(s) = rx.recv().await {
            assert_eq!(s.source, "replay");
            got.push(s.line);
        }
        assert_eq!(got, vec!["!one", "!two", "!three"]);
    }

    #[tokio::test]
    async fn test_serial_noise_does_not_stop_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"!one\r\n\xff\xfe noise\r\n!two\r\n!three\r\n")
            .unwrap();
        let mut cfg = SourceConfig::new("tty", SourceKind::Serial);
        cfg.address = Some(file.path().to_str().unwrap().to_string());

        let (tx, mut rx) = mpsc::channel(16);
        let report = run_source(cfg, tx, CancellationToken::new()).await;
        assert_eq!(report.lines, 4);

        let mut got = Vec::new();
        while let Some(s) = rx.recv().await {
            got.push(s.line);
        }
        assert_eq!(got.len(), 4);
        assert_eq!(got[0], "!one");
        assert!(got[1].ends_with(" noise"));
        assert_eq!(&got[2..], ["!two", "!three"]);
    }

    #[tokio::test]
    async fn test_missing_file_reports_nothing() {
        let mut cfg = SourceConfig::new("gone", SourceKind::File);
        cfg.address = Some("/nonexistent/ais.log".into());
        let (tx, _rx) = mpsc::channel(1);
        let report = run_source(cfg, tx, CancellationToken::new()).await;
        assert_eq!(report.lines, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_after_timeout() {
        let (cfg, _file) = file_source("!a\n!b\n");
        let (tx, _rx) = mpsc::channel(1);
        let report = run_source(cfg, tx, CancellationToken::new()).await;
        assert_eq!(report.lines, 1);
        assert_eq!(report.dropped, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_delayed_replay() {
        let (mut cfg, _file) = file_source("!a\n!b\n!c\n");
        cfg.line_delay_ms = 60_000;
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_source(cfg, tx, shutdown.clone()));

        assert_eq!(rx.recv().await.unwrap().line, "!a");
        shutdown.cancel();
        let report = task.await.unwrap();
        assert_eq!(report.lines, 1);
    }

    #[tokio::test]
    async fn test_tcp_source() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"!AIVDM,1\r\n$GPGGA\r\n").await.unwrap();
        });

        let mut cfg = SourceConfig::new("net", SourceKind::Tcp);
        cfg.address = Some(addr.to_string());
        let (tx, mut rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_source(cfg, tx, shutdown.clone()));

        assert_eq!(rx.recv().await.unwrap().line, "!AIVDM,1");
        assert_eq!(rx.recv().await.unwrap().line, "$GPGGA");
        shutdown.cancel();
        let report = task.await.unwrap();
        assert_eq!(report.lines, 2);
    }
}
