//! Per-source ingestion: routing fan-out, reassembly, decode, statistics.
//!
//! Pure logic. The hub forwards raw lines to its output sinks before
//! decoding, so a line that fails to decode is still routed.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::config::SourceConfig;
use crate::decode::decode;
use crate::events::BoundedQueue;
use crate::sentence::Reassembler;
use crate::types::*;

/// Default capacity of the raw-message ring.
pub const RAW_RING_CAPACITY: usize = 500;

// ---------------------------------------------------------------------------
// Routing matrix
// ---------------------------------------------------------------------------

/// Output sink a source may be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Serial,
    Network,
}

/// Source name → set of output sinks. Built once from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingMatrix {
    routes: HashMap<String, Vec<Route>>,
}

impl RoutingMatrix {
    pub fn from_sources(sources: &[SourceConfig]) -> Self {
        let mut matrix = RoutingMatrix::default();
        for source in sources {
            if source.route_serial {
                matrix.add(&source.name, Route::Serial);
            }
            if source.route_network {
                matrix.add(&source.name, Route::Network);
            }
        }
        matrix
    }

    pub fn add(&mut self, source: &str, route: Route) {
        let routes = self.routes.entry(source.to_string()).or_default();
        if !routes.contains(&route) {
            routes.push(route);
            routes.sort();
        }
    }

    /// Sinks configured for `source`; empty for unknown sources.
    pub fn routes(&self, source: &str) -> &[Route] {
        self.routes.get(source).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Sinks and diagnostics
// ---------------------------------------------------------------------------

/// Destination for routed raw lines.
///
/// Implementations must not block; a slow sink drops lines.
pub trait LineSink {
    fn forward(&mut self, line: &str);
}

impl LineSink for Vec<String> {
    fn forward(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Per-source throughput counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    /// Lines that looked like AIS/NMEA sentences.
    pub received: u64,
    /// Lines that decoded into a meaningful record.
    pub parsed: u64,
    /// Lines rejected by reassembly or decoding.
    pub failed: u64,
}

/// One entry of the raw-message ring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEntry {
    pub source: String,
    pub kind: Option<MessageKind>,
    pub mmsi: Option<Mmsi>,
    pub line: String,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

pub struct RoutingHub {
    matrix: RoutingMatrix,
    sinks: Vec<(Route, Box<dyn LineSink + Send>)>,
    reassembler: Reassembler,
    stats: HashMap<String, SourceStats>,
    raw: BoundedQueue<RawEntry>,
}

impl RoutingHub {
    pub fn new(matrix: RoutingMatrix) -> Self {
        RoutingHub::with_raw_capacity(matrix, RAW_RING_CAPACITY)
    }

    pub fn with_raw_capacity(matrix: RoutingMatrix, capacity: usize) -> Self {
        RoutingHub {
            matrix,
            sinks: Vec::new(),
            reassembler: Reassembler::new(),
            stats: HashMap::new(),
            raw: BoundedQueue::new(capacity),
        }
    }

    /// Attach a sink for `route`. Several sinks may share a route.
    pub fn add_sink(&mut self, route: Route, sink: Box<dyn LineSink + Send>) {
        self.sinks.push((route, sink));
    }

    /// Ingest one line from `source`.
    ///
    /// Returns the decoded record to hand to the contact store. Lines that
    /// do not start with `!` or `$` are ignored entirely. Routed sinks get
    /// `raw` byte for byte; whitespace is only trimmed for decoding.
    pub fn ingest(&mut self, source: &str, raw: &str, timestamp: f64) -> Option<DecodedRecord> {
        let line = raw.trim();
        if !(line.starts_with('!') || line.starts_with('$')) {
            return None;
        }

        let stats = self.stats.entry(source.to_string()).or_default();
        stats.received += 1;

        let routes = self.matrix.routes(source);
        for (route, sink) in self.sinks.iter_mut() {
            if routes.contains(route) {
                sink.forward(raw);
            }
        }

        let outcome = self
            .reassembler
            .push(source, line)
            .and_then(|ready| ready.map(|s| decode(&s, timestamp)).transpose());

        let record = match outcome {
            Ok(record) => record,
            Err(_) => {
                stats.failed += 1;
                None
            }
        };
        if record.as_ref().is_some_and(DecodedRecord::is_parsed) {
            stats.parsed += 1;
        }

        self.raw.push(RawEntry {
            source: source.to_string(),
            kind: record.as_ref().map(DecodedRecord::kind),
            mmsi: record.as_ref().and_then(DecodedRecord::mmsi),
            line: line.to_string(),
        });
        record
    }

    /// Counters per source, ordered by source name.
    pub fn stats(&self) -> BTreeMap<String, SourceStats> {
        self.stats
            .iter()
            .map(|(name, stats)| (name.clone(), *stats))
            .collect()
    }

    /// Take everything in the raw ring, oldest first.
    pub fn drain_raw(&mut self) -> Vec<RawEntry> {
        self.raw.drain()
    }

    pub fn raw_dropped(&self) -> u64 {
        self.raw.dropped()
    }

    pub fn matrix(&self) -> &RoutingMatrix {
        &self.matrix
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;
    use crate::config::SourceKind;
    use std::sync::{Arc, Mutex};

    const POSITION: &str = "!AIVDM,1,1,,A,13uTAH002nJRLAHEwTi674rh04:8,0*2B";
    const PART1_PAYLOAD: &str = "53fATb02;`2oTPTWF21LTi<tr0hDU@R2222222169`;676p`0=iCA1C`8888";
    const PART2_PAYLOAD: &str = "88888888880";

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<String>>>);

    impl LineSink for SharedSink {
        fn forward(&mut self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    impl SharedSink {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn matrix() -> RoutingMatrix {
        let mut both = SourceConfig::new("both", SourceKind::Tcp);
        both.route_serial = true;
        both.route_network = true;
        let mut net = SourceConfig::new("net", SourceKind::Tcp);
        net.route_network = true;
        let quiet = SourceConfig::new("quiet", SourceKind::Tcp);
        RoutingMatrix::from_sources(&[both, net, quiet])
    }

    fn hub_with_sinks() -> (RoutingHub, SharedSink, SharedSink) {
        let serial = SharedSink::default();
        let network = SharedSink::default();
        let mut hub = RoutingHub::new(matrix());
        hub.add_sink(Route::Serial, Box::new(serial.clone()));
        hub.add_sink(Route::Network, Box::new(network.clone()));
        (hub, serial, network)
    }

    #[test]
    fn test_matrix_routes() {
        let m = matrix();
        assert_eq!(m.routes("both"), &[Route::Serial, Route::Network]);
        assert_eq!(m.routes("net"), &[Route::Network]);
        assert!(m.routes("quiet").is_empty());
        assert!(m.routes("unknown").is_empty());
    }

    #[test]
    fn test_ingest_decodes_and_counts() {
        let mut hub = RoutingHub::new(RoutingMatrix::default());
        let rec = hub.ingest("a", POSITION, 1.0).unwrap();
        assert_eq!(rec.mmsi(), Some(265_884_000));
        let stats = hub.stats();
        assert_eq!(
            stats["a"],
            SourceStats {
                received: 1,
                parsed: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn test_non_sentence_lines_ignored() {
        let (mut hub, serial, _) = hub_with_sinks();
        assert!(hub.ingest("both", "hello world", 1.0).is_none());
        assert!(hub.ingest("both", "", 1.0).is_none());
        assert!(hub.stats().is_empty());
        assert!(serial.lines().is_empty());
        assert!(hub.drain_raw().is_empty());
    }

    #[test]
    fn test_fan_out_exactly_once_regardless_of_decode() {
        let (mut hub, serial, network) = hub_with_sinks();
        let garbage = "!AIVDM,1,1,,A,13uTAH,0*00";
        hub.ingest("both", POSITION, 1.0);
        hub.ingest("both", garbage, 2.0);

        assert_eq!(serial.lines(), vec![POSITION.to_string(), garbage.to_string()]);
        assert_eq!(network.lines(), serial.lines());

        let stats = hub.stats();
        assert_eq!(stats["both"].received, 2);
        assert_eq!(stats["both"].parsed, 1);
        assert_eq!(stats["both"].failed, 1);
    }

    #[test]
    fn test_forwards_line_as_received() {
        let (mut hub, serial, network) = hub_with_sinks();
        let padded = format!("  {POSITION} \t");
        assert!(hub.ingest("both", &padded, 1.0).is_some());
        assert_eq!(serial.lines(), vec![padded.clone()]);
        assert_eq!(network.lines(), vec![padded]);

        let raw = hub.drain_raw();
        assert_eq!(raw[0].line, POSITION);
    }

    #[test]
    fn test_route_subset() {
        let (mut hub, serial, network) = hub_with_sinks();
        hub.ingest("net", POSITION, 1.0);
        hub.ingest("quiet", POSITION, 1.0);
        assert!(serial.lines().is_empty());
        assert_eq!(network.lines().len(), 1);
    }

    #[test]
    fn test_multi_fragment_through_hub() {
        let (mut hub, serial, _) = hub_with_sinks();
        let p1 = checksum::armor(&format!("AIVDM,2,1,3,A,{PART1_PAYLOAD},0"));
        let p2 = checksum::armor(&format!("AIVDM,2,2,3,A,{PART2_PAYLOAD},2"));

        assert!(hub.ingest("both", &p1, 1.0).is_none());
        let rec = hub.ingest("both", &p2, 1.0).unwrap();
        assert_eq!(rec.mmsi(), Some(249_849_000));
        assert_eq!(rec.kind(), MessageKind::Vdm(5));

        // raw fragments are routed as received
        assert_eq!(serial.lines(), vec![p1, p2]);
        let stats = hub.stats();
        assert_eq!(stats["both"].received, 2);
        assert_eq!(stats["both"].parsed, 1);
    }

    #[test]
    fn test_fragments_per_source_independent() {
        let mut hub = RoutingHub::new(RoutingMatrix::default());
        let p1 = checksum::armor(&format!("AIVDM,2,1,3,A,{PART1_PAYLOAD},0"));
        let p2 = checksum::armor(&format!("AIVDM,2,2,3,A,{PART2_PAYLOAD},2"));

        assert!(hub.ingest("a", &p1, 1.0).is_none());
        assert!(hub.ingest("b", POSITION, 1.0).is_some());
        assert!(hub.ingest("b", &p2, 1.0).is_none());
        assert!(hub.ingest("a", &p2, 1.0).is_some());
    }

    #[test]
    fn test_unsupported_not_counted_as_parsed() {
        let mut hub = RoutingHub::new(RoutingMatrix::default());
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        let rec = hub.ingest("gps", line, 1.0).unwrap();
        assert!(!rec.is_parsed());
        let stats = hub.stats();
        assert_eq!(stats["gps"].received, 1);
        assert_eq!(stats["gps"].parsed, 0);
        assert_eq!(stats["gps"].failed, 0);
    }

    #[test]
    fn test_raw_ring_records_and_drains() {
        let mut hub = RoutingHub::new(RoutingMatrix::default());
        hub.ingest("a", POSITION, 1.0);
        let raw = hub.drain_raw();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].source, "a");
        assert_eq!(raw[0].kind, Some(MessageKind::Vdm(1)));
        assert_eq!(raw[0].mmsi, Some(265_884_000));
        assert_eq!(raw[0].line, POSITION);
        assert!(hub.drain_raw().is_empty());
    }

    #[test]
    fn test_raw_ring_evicts_oldest() {
        let mut hub = RoutingHub::with_raw_capacity(RoutingMatrix::default(), 2);
        for _ in 0..5 {
            hub.ingest("a", POSITION, 1.0);
        }
        assert_eq!(hub.drain_raw().len(), 2);
        assert_eq!(hub.raw_dropped(), 3);
        assert_eq!(hub.stats()["a"].received, 5);
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<String> = Vec::new();
        sink.forward("!x");
        assert_eq!(sink, vec!["!x".to_string()]);
    }
}
