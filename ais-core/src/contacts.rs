//! Live vessel registry keyed by MMSI.
//!
//! Pure logic — no I/O, no clock. Every operation takes the time it
//! should consider "now" and returns the `ChangeEvent`s the caller hands
//! to the `EventDispatcher`.
//!
//! Tracks per contact: identity, kinematics, voyage data, bearing and
//! distance from own position, transponder class, version and age.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::config::{ContactConfig, PositionConfig};
use crate::events::ChangeEvent;
use crate::geo;
use crate::mid::{self, Nation};
use crate::shiptype::{self, TransponderClass};
use crate::types::*;

// ---------------------------------------------------------------------------
// Supporting records
// ---------------------------------------------------------------------------

/// Identity kept per MMSI independently of contact eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentificationRecord {
    pub mmsi: Mmsi,
    pub imo: Option<u32>,
    pub name: Option<String>,
    pub callsign: Option<String>,
}

/// Operator-assigned alert level for a vessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    None,
    Alert,
    AlertSound,
}

/// Operator remark for a vessel. Supplied from outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RemarkEntry {
    pub alert: AlertLevel,
    pub remark: Option<String>,
}

/// The observer's own location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnPosition {
    pub lat: f64,
    pub lon: f64,
    /// True for a manual override, false for a live fix.
    pub manual: bool,
    pub timestamp: f64,
}

/// Identity value with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", content = "value", rename_all = "snake_case")]
pub enum Identity<T> {
    /// Heard from the vessel in this session.
    Observed(T),
    /// Filled in from the identification table.
    Registry(T),
}

impl<T> Identity<T> {
    pub fn value(&self) -> &T {
        match self {
            Identity::Observed(v) | Identity::Registry(v) => v,
        }
    }

    pub fn is_inferred(&self) -> bool {
        matches!(self, Identity::Registry(_))
    }
}

// ---------------------------------------------------------------------------
// Contact state
// ---------------------------------------------------------------------------

/// Mutable state for a single vessel or station.
#[derive(Debug, Clone)]
pub struct Contact {
    pub mmsi: Mmsi,
    pub nation: Option<Nation>,

    // Identity
    pub imo: Option<u32>,
    pub name: Option<String>,
    pub callsign: Option<String>,
    pub shiptype: Option<u8>,
    pub typename: Option<&'static str>,

    // Kinematics
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<u16>,
    pub rot: Option<i16>,
    pub navstatus: Option<u8>,
    pub posacc: Option<bool>,

    // Voyage
    pub destination: Option<String>,
    pub eta: Option<Eta>,
    pub draught: Option<f64>,
    pub length: Option<u16>,
    pub width: Option<u16>,

    // Derived
    pub georef: Option<String>,
    pub bearing: Option<f64>,
    pub distance: Option<f64>,
    pub transponder: Option<TransponderClass>,

    // Bookkeeping
    pub source: String,
    pub creation_time: f64,
    pub last_update: f64,
    pub version: u64,
    pub old: bool,
    /// Has been emitted as an insert.
    pub displayed: bool,
}

impl Contact {
    pub fn new(mmsi: Mmsi, source: &str, timestamp: f64) -> Self {
        Contact {
            mmsi,
            nation: mid::lookup_nation(mmsi),
            imo: None,
            name: None,
            callsign: None,
            shiptype: None,
            typename: None,
            lat: None,
            lon: None,
            sog: None,
            cog: None,
            heading: None,
            rot: None,
            navstatus: None,
            posacc: None,
            destination: None,
            eta: None,
            draught: None,
            length: None,
            width: None,
            georef: None,
            bearing: None,
            distance: None,
            transponder: None,
            source: source.to_string(),
            creation_time: timestamp,
            last_update: timestamp,
            version: 0,
            old: false,
            displayed: false,
        }
    }

    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_update
    }

    /// Copy the fields present in `record` onto the contact.
    fn merge(&mut self, record: &DecodedRecord) {
        match record {
            DecodedRecord::Position(m) => {
                merge_field(&mut self.navstatus, m.navstatus);
                merge_field(&mut self.rot, m.rot);
                merge_field(&mut self.sog, m.sog);
                merge_field(&mut self.cog, m.cog);
                merge_field(&mut self.heading, m.heading);
                merge_field(&mut self.lat, m.lat);
                merge_field(&mut self.lon, m.lon);
                self.posacc = Some(m.posacc);
            }
            DecodedRecord::StaticVoyage(m) => {
                merge_field(&mut self.imo, m.imo);
                merge_field(&mut self.callsign, m.callsign.clone());
                merge_field(&mut self.name, m.name.clone());
                merge_field(&mut self.shiptype, m.shiptype);
                merge_field(&mut self.eta, m.eta);
                merge_field(&mut self.draught, m.draught);
                merge_field(&mut self.destination, m.destination.clone());
                if let Some(dims) = m.dims {
                    self.length = Some(dims.length());
                    self.width = Some(dims.width());
                }
                self.typename = self.shiptype.and_then(shiptype::type_name);
            }
            DecodedRecord::BaseStation(m) => {
                merge_field(&mut self.lat, m.lat);
                merge_field(&mut self.lon, m.lon);
                self.posacc = Some(m.posacc);
            }
            DecodedRecord::SpecialPosition(_)
            | DecodedRecord::OwnPosition(_)
            | DecodedRecord::Unsupported { .. } => {}
        }
    }

    /// Recompute georef and bearing/distance from `own`.
    fn derive_position(&mut self, own: Option<&OwnPosition>) {
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return;
        };
        self.georef = geo::georef(lat, lon);

        let Some(own) = own else {
            return;
        };
        match geo::vincenty(own.lat, own.lon, lat, lon) {
            Ok(v) => {
                self.bearing = Some(round1(v.bearing_deg));
                self.distance = Some(round1(v.distance_km));
            }
            Err(_) => {
                self.bearing = None;
                self.distance = None;
            }
        }
    }
}

fn merge_field<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn round1(val: f64) -> f64 {
    (val * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Presentation view
// ---------------------------------------------------------------------------

/// Contact as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactView {
    pub mmsi: Mmsi,
    pub nation: Option<&'static str>,
    pub imo: Option<Identity<u32>>,
    pub name: Option<Identity<String>>,
    pub callsign: Option<Identity<String>>,
    pub shiptype: Option<u8>,
    pub typename: Option<&'static str>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub georef: Option<String>,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<u16>,
    pub rot: Option<i16>,
    pub navstatus: Option<u8>,
    pub posacc: Option<bool>,
    pub destination: Option<String>,
    pub eta: Option<String>,
    pub draught: Option<f64>,
    pub length: Option<u16>,
    pub width: Option<u16>,
    pub bearing: Option<f64>,
    pub distance: Option<f64>,
    pub transponder: Option<TransponderClass>,
    pub source: String,
    pub creation_time: f64,
    pub last_update: f64,
    pub version: u64,
    pub old: bool,
    pub alert: bool,
    pub sound_alert: bool,
    pub remark: Option<String>,
}

fn identity<T: Clone>(observed: &Option<T>, registry: Option<&Option<T>>) -> Option<Identity<T>> {
    match (observed, registry) {
        (Some(v), _) => Some(Identity::Observed(v.clone())),
        (None, Some(Some(v))) => Some(Identity::Registry(v.clone())),
        _ => None,
    }
}

fn build_view(
    c: &Contact,
    identities: &HashMap<Mmsi, IdentificationRecord>,
    remarks: &HashMap<Mmsi, RemarkEntry>,
    inserting: bool,
) -> ContactView {
    let id = identities.get(&c.mmsi);
    let remark = remarks.get(&c.mmsi);
    let level = remark.map(|r| r.alert).unwrap_or_default();

    ContactView {
        mmsi: c.mmsi,
        nation: c.nation.map(|n| n.code),
        imo: identity(&c.imo, id.map(|r| &r.imo)),
        name: identity(&c.name, id.map(|r| &r.name)),
        callsign: identity(&c.callsign, id.map(|r| &r.callsign)),
        shiptype: c.shiptype,
        typename: c.typename,
        lat: c.lat,
        lon: c.lon,
        georef: c.georef.clone(),
        sog: c.sog,
        cog: c.cog,
        heading: c.heading,
        rot: c.rot,
        navstatus: c.navstatus,
        posacc: c.posacc,
        destination: c.destination.clone(),
        eta: c.eta.map(|e| e.to_string()),
        draught: c.draught,
        length: c.length,
        width: c.width,
        bearing: c.bearing,
        distance: c.distance,
        transponder: c.transponder,
        source: c.source.clone(),
        creation_time: c.creation_time,
        last_update: c.last_update,
        version: c.version,
        old: c.old,
        alert: level != AlertLevel::None,
        sound_alert: inserting && level == AlertLevel::AlertSound,
        remark: remark.and_then(|r| r.remark.clone()),
    }
}

// ---------------------------------------------------------------------------
// Contact store
// ---------------------------------------------------------------------------

/// Authoritative table of contacts plus the identification table.
///
/// Single writer: the caller serializes all mutating calls.
pub struct ContactStore {
    pub(crate) contacts: HashMap<Mmsi, Contact>,
    pub(crate) identities: HashMap<Mmsi, IdentificationRecord>,
    remarks: HashMap<Mmsi, RemarkEntry>,
    own_position: Option<OwnPosition>,
    settings: ContactConfig,
    position: PositionConfig,

    // Snapshot bookkeeping
    pub(crate) metadata_hashes: HashMap<Mmsi, u64>,
    pub(crate) last_position_snapshot: f64,

    // Counters
    pub applied: u64,
    pub rejected: u64,
}

impl ContactStore {
    pub fn new(settings: ContactConfig, position: PositionConfig) -> Self {
        let own_position = match (position.override_enabled, position.lat, position.lon) {
            (true, Some(lat), Some(lon)) => Some(OwnPosition {
                lat,
                lon,
                manual: true,
                timestamp: 0.0,
            }),
            _ => None,
        };
        ContactStore {
            contacts: HashMap::new(),
            identities: HashMap::new(),
            remarks: HashMap::new(),
            own_position,
            settings,
            position,
            metadata_hashes: HashMap::new(),
            last_position_snapshot: f64::NEG_INFINITY,
            applied: 0,
            rejected: 0,
        }
    }

    /// Apply one decoded record from `source`. Returns the event to emit, if any.
    pub fn apply(&mut self, source: &str, record: &DecodedRecord) -> Option<ChangeEvent> {
        if let DecodedRecord::OwnPosition(fix) = record {
            return self.apply_own_fix(source, fix);
        }

        let (Some(mmsi), Some(class)) = (record.mmsi(), TransponderClass::from_kind(record.kind()))
        else {
            self.rejected += 1;
            return None;
        };
        let hidden = match class {
            TransponderClass::Base => !self.settings.show_base_stations,
            TransponderClass::B => !self.settings.show_class_b,
            TransponderClass::A => false,
        };
        if hidden {
            self.rejected += 1;
            return None;
        }

        let timestamp = record.timestamp();
        let contact = self
            .contacts
            .entry(mmsi)
            .or_insert_with(|| Contact::new(mmsi, source, timestamp));

        contact.merge(record);
        contact.version += 1;
        contact.last_update = timestamp;
        contact.old = false;
        contact.source = source.to_string();
        if contact.transponder.is_none() {
            contact.transponder = Some(class);
        }
        contact.derive_position(self.own_position.as_ref());
        self.applied += 1;

        if let DecodedRecord::StaticVoyage(m) = record {
            if m.imo.is_some() {
                let entry = self
                    .identities
                    .entry(mmsi)
                    .or_insert_with(|| IdentificationRecord {
                        mmsi,
                        imo: None,
                        name: None,
                        callsign: None,
                    });
                merge_field(&mut entry.imo, contact.imo);
                merge_field(&mut entry.name, contact.name.clone());
                merge_field(&mut entry.callsign, contact.callsign.clone());
            }
        }

        if contact.version < u64::from(self.settings.min_updates) {
            return None;
        }

        let inserting = !contact.displayed;
        contact.displayed = true;
        let view = build_view(contact, &self.identities, &self.remarks, inserting);
        Some(if inserting {
            ChangeEvent::Insert(view)
        } else {
            ChangeEvent::Update(view)
        })
    }

    fn apply_own_fix(&mut self, source: &str, fix: &OwnPositionFix) -> Option<ChangeEvent> {
        if self.position.override_enabled || self.position.source.as_deref() != Some(source) {
            return None;
        }
        let own = OwnPosition {
            lat: fix.lat,
            lon: fix.lon,
            manual: false,
            timestamp: fix.timestamp,
        };
        self.own_position = Some(own.clone());
        Some(ChangeEvent::OwnPosition(own))
    }

    /// Fix own position manually. Live fixes are ignored until the override is cleared.
    pub fn set_manual_position(&mut self, lat: f64, lon: f64, timestamp: f64) -> ChangeEvent {
        self.position.override_enabled = true;
        self.position.lat = Some(lat);
        self.position.lon = Some(lon);
        let own = OwnPosition {
            lat,
            lon,
            manual: true,
            timestamp,
        };
        self.own_position = Some(own.clone());
        ChangeEvent::OwnPosition(own)
    }

    /// Resume taking own position from the configured source.
    pub fn clear_override(&mut self) {
        self.position.override_enabled = false;
    }

    pub fn own_position(&self) -> Option<&OwnPosition> {
        self.own_position.as_ref()
    }

    /// Mark and evict contacts by age. Events are ordered by MMSI.
    ///
    /// Contacts never shown are evicted without an event.
    pub fn sweep(&mut self, now: f64) -> Vec<ChangeEvent> {
        let grey = self.settings.grey_secs;
        let remove = self.settings.remove_secs;

        let mut greyed: Vec<(Mmsi, Option<f64>)> = Vec::new();
        let mut evicted: Vec<Mmsi> = Vec::new();
        for c in self.contacts.values_mut() {
            let age = c.age(now);
            if age > remove {
                evicted.push(c.mmsi);
            } else if age >= grey && !c.old {
                c.old = true;
                if c.displayed {
                    greyed.push((c.mmsi, c.distance));
                }
            }
        }
        greyed.sort_by_key(|(mmsi, _)| *mmsi);
        evicted.sort_unstable();

        let mut events: Vec<ChangeEvent> = greyed
            .into_iter()
            .map(|(mmsi, distance)| ChangeEvent::Old { mmsi, distance })
            .collect();
        for mmsi in evicted {
            self.metadata_hashes.remove(&mmsi);
            if let Some(c) = self.contacts.remove(&mmsi) {
                if c.displayed {
                    events.push(ChangeEvent::Remove { mmsi });
                }
            }
        }
        events
    }

    /// Look up one contact for the presentation layer.
    pub fn query(&self, mmsi: Mmsi) -> ChangeEvent {
        match self.contacts.get(&mmsi) {
            Some(c) => ChangeEvent::Query(build_view(c, &self.identities, &self.remarks, false)),
            None => ChangeEvent::Error {
                message: format!("no contact with MMSI {mmsi}"),
            },
        }
    }

    /// Replace the remark table.
    pub fn set_remarks(&mut self, remarks: HashMap<Mmsi, RemarkEntry>) -> ChangeEvent {
        self.remarks = remarks;
        ChangeEvent::RemarkDict {
            remarks: self
                .remarks
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Seed the identification table, e.g. from a previous session.
    pub fn load_identities(&mut self, records: impl IntoIterator<Item = IdentificationRecord>) {
        for record in records {
            self.identities.insert(record.mmsi, record);
        }
    }

    /// The identification table, ordered by MMSI.
    pub fn iddb(&self) -> ChangeEvent {
        ChangeEvent::IdDb {
            records: self.identification_rows(),
        }
    }

    pub fn get(&self, mmsi: Mmsi) -> Option<&Contact> {
        self.contacts.get(&mmsi)
    }

    pub fn identification(&self, mmsi: Mmsi) -> Option<&IdentificationRecord> {
        self.identities.get(&mmsi)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// All contacts, most recently updated first.
    pub fn contacts(&self) -> Vec<&Contact> {
        let mut all: Vec<_> = self.contacts.values().collect();
        all.sort_by(|a, b| b.last_update.total_cmp(&a.last_update));
        all
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;

    const POSITION: &str = "!AIVDM,1,1,,A,13uTAH002nJRLAHEwTi674rh04:8,0*2B";
    const VOYAGE: &str = "!AIVDM,1,1,,A,53fATb02;`2oTPTWF21LTi<tr0hDU@R2222222169`;676p`0=iCA1C`888888888888880,2*51";

    fn settings(min_updates: u32) -> ContactConfig {
        ContactConfig {
            grey_secs: 600.0,
            remove_secs: 3600.0,
            min_updates,
            show_base_stations: true,
            show_class_b: true,
        }
    }

    fn store(min_updates: u32) -> ContactStore {
        ContactStore::new(settings(min_updates), PositionConfig::default())
    }

    fn position_at(mmsi: Mmsi, lat: f64, lon: f64, ts: f64) -> DecodedRecord {
        DecodedRecord::Position(PositionReport {
            mmsi,
            kind: MessageKind::Vdm(1),
            navstatus: Some(0),
            rot: Some(0),
            sog: Some(10.0),
            cog: Some(90.0),
            heading: Some(90),
            posacc: false,
            lat: Some(lat),
            lon: Some(lon),
            timestamp: ts,
        })
    }

    fn view(ev: Option<ChangeEvent>) -> ContactView {
        match ev {
            Some(ChangeEvent::Insert(v)) | Some(ChangeEvent::Update(v)) => v,
            other => panic!("expected insert/update, got {other:?}"),
        }
    }

    // -- Creation and versioning --

    #[test]
    fn test_first_record_creates_contact() {
        let mut s = store(1);
        let rec = decode(POSITION, 10.0).unwrap();
        let ev = s.apply("a", &rec);
        assert!(matches!(ev, Some(ChangeEvent::Insert(_))));

        let c = s.get(265_884_000).unwrap();
        assert_eq!(c.version, 1);
        assert_eq!(c.nation.unwrap().code, "SE");
        assert_eq!(c.transponder, Some(TransponderClass::A));
        assert_eq!(c.creation_time, 10.0);
        assert_eq!(c.sog, Some(18.2));
        assert!(c.georef.is_some());
    }

    #[test]
    fn test_same_record_twice_bumps_version() {
        let mut s = store(1);
        let rec = decode(POSITION, 10.0).unwrap();
        s.apply("a", &rec);
        s.apply("a", &rec);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(265_884_000).unwrap().version, 2);
        s.apply("a", &rec);
        assert_eq!(s.get(265_884_000).unwrap().version, 3);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut s = store(1);
        s.apply("a", &decode(POSITION, 1.0).unwrap());
        s.apply("a", &decode(VOYAGE, 2.0).unwrap());
        let mut none_pos = position_at(265_884_000, 0.0, 0.0, 3.0);
        if let DecodedRecord::Position(p) = &mut none_pos {
            p.lat = None;
            p.lon = None;
            p.sog = None;
        }
        s.apply("a", &none_pos);

        let c = s.get(265_884_000).unwrap();
        assert_eq!(c.sog, Some(18.2));
        assert!((c.lat.unwrap() - 38.436167).abs() < 1e-6);
        assert_eq!(c.cog, Some(90.0));
        assert_eq!(c.last_update, 3.0);
    }

    #[test]
    fn test_static_voyage_fields_and_typename() {
        let mut s = store(1);
        let v = view(s.apply("a", &decode(VOYAGE, 1.0).unwrap()));
        assert_eq!(v.name, Some(Identity::Observed("WILSON LEITH".to_string())));
        assert_eq!(v.typename, Some("Cargo"));
        assert_eq!(v.length, Some(88));
        assert_eq!(v.width, Some(13));
        assert_eq!(v.eta.as_deref(), Some("11170800"));
        assert_eq!(v.nation, Some("MT"));
    }

    // -- Display threshold --

    #[test]
    fn test_min_updates_before_insert() {
        let mut s = store(3);
        let rec = position_at(265_000_001, 57.0, 11.0, 1.0);
        assert!(s.apply("a", &rec).is_none());
        assert!(s.apply("a", &rec).is_none());
        assert!(matches!(s.apply("a", &rec), Some(ChangeEvent::Insert(_))));
        assert!(matches!(s.apply("a", &rec), Some(ChangeEvent::Update(_))));
    }

    #[test]
    fn test_zero_min_updates_inserts_immediately() {
        let mut s = store(0);
        let rec = position_at(265_000_001, 57.0, 11.0, 1.0);
        assert!(matches!(s.apply("a", &rec), Some(ChangeEvent::Insert(_))));
    }

    // -- Rejections --

    #[test]
    fn test_sar_aircraft_rejected() {
        let mut s = store(1);
        let rec = DecodedRecord::SpecialPosition(SpecialPositionReport {
            mmsi: 111_232_511,
            altitude: Some(300),
            sog: Some(120.0),
            cog: Some(90.0),
            posacc: false,
            lat: Some(57.0),
            lon: Some(11.0),
            timestamp: 1.0,
        });
        assert!(s.apply("a", &rec).is_none());
        assert!(s.is_empty());
        assert_eq!(s.rejected, 1);
    }

    #[test]
    fn test_unsupported_rejected() {
        let mut s = store(1);
        let rec = DecodedRecord::Unsupported {
            kind: MessageKind::Vdm(21),
            mmsi: Some(992_651_000),
            timestamp: 1.0,
        };
        assert!(s.apply("a", &rec).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn test_hidden_base_stations() {
        let mut cfg = settings(1);
        cfg.show_base_stations = false;
        let mut s = ContactStore::new(cfg, PositionConfig::default());
        let rec = DecodedRecord::BaseStation(BaseStationReport {
            mmsi: 2_655_000,
            station_time: None,
            posacc: true,
            lat: Some(57.0),
            lon: Some(12.0),
            timestamp: 1.0,
        });
        assert!(s.apply("a", &rec).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn test_hidden_class_b() {
        let mut cfg = settings(1);
        cfg.show_class_b = false;
        let mut s = ContactStore::new(cfg, PositionConfig::default());
        let mut rec = position_at(265_000_001, 57.0, 11.0, 1.0);
        if let DecodedRecord::Position(p) = &mut rec {
            p.kind = MessageKind::Vdm(18);
        }
        assert!(s.apply("a", &rec).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn test_transponder_class_fixed_at_first_classification() {
        let mut s = store(1);
        s.apply("a", &position_at(265_000_001, 57.0, 11.0, 1.0));
        let mut b = position_at(265_000_001, 57.0, 11.0, 2.0);
        if let DecodedRecord::Position(p) = &mut b {
            p.kind = MessageKind::Vdm(18);
        }
        s.apply("a", &b);
        assert_eq!(
            s.get(265_000_001).unwrap().transponder,
            Some(TransponderClass::A)
        );
    }

    // -- Own position --

    #[test]
    fn test_own_fix_from_configured_source() {
        let position = PositionConfig {
            source: Some("gps".into()),
            ..PositionConfig::default()
        };
        let mut s = ContactStore::new(settings(1), position);
        let fix = DecodedRecord::OwnPosition(OwnPositionFix {
            lat: 57.7,
            lon: 11.9,
            timestamp: 1.0,
        });

        assert!(s.apply("other", &fix).is_none());
        assert!(s.own_position().is_none());

        match s.apply("gps", &fix) {
            Some(ChangeEvent::OwnPosition(own)) => {
                assert_eq!(own.lat, 57.7);
                assert!(!own.manual);
            }
            other => panic!("expected own position, got {other:?}"),
        }

        let v = view(s.apply("a", &position_at(265_000_001, 57.8, 12.0, 2.0)));
        assert_eq!(v.distance, Some(12.6));
        assert_eq!(v.bearing, Some(28.1));
    }

    #[test]
    fn test_override_ignores_live_fixes() {
        let position = PositionConfig {
            override_enabled: true,
            lat: Some(57.0),
            lon: Some(11.0),
            source: Some("gps".into()),
        };
        let mut s = ContactStore::new(settings(1), position);
        let fix = DecodedRecord::OwnPosition(OwnPositionFix {
            lat: 10.0,
            lon: 10.0,
            timestamp: 1.0,
        });
        assert!(s.apply("gps", &fix).is_none());
        let own = s.own_position().unwrap();
        assert_eq!(own.lat, 57.0);
        assert!(own.manual);

        let v = view(s.apply("a", &position_at(265_000_001, 58.0, 11.0, 2.0)));
        assert_eq!(v.distance, Some(111.4));
        assert_eq!(v.bearing, Some(0.0));
    }

    #[test]
    fn test_manual_position_event() {
        let mut s = store(1);
        match s.set_manual_position(1.0, 2.0, 5.0) {
            ChangeEvent::OwnPosition(own) => assert!(own.manual),
            other => panic!("expected own position, got {other:?}"),
        }
        assert_eq!(s.own_position().map(|p| p.lat), Some(1.0));
    }

    #[test]
    fn test_clear_override_resumes_live_fixes() {
        let position = PositionConfig {
            source: Some("gps".into()),
            ..PositionConfig::default()
        };
        let mut s = ContactStore::new(settings(1), position);
        s.set_manual_position(1.0, 2.0, 0.0);
        let fix = DecodedRecord::OwnPosition(OwnPositionFix {
            lat: 57.7,
            lon: 11.9,
            timestamp: 1.0,
        });
        assert!(s.apply("gps", &fix).is_none());
        s.clear_override();
        assert!(s.apply("gps", &fix).is_some());
        assert_eq!(s.own_position().map(|p| p.manual), Some(false));
    }

    #[test]
    fn test_no_distance_without_own_position() {
        let mut s = store(1);
        let v = view(s.apply("a", &position_at(265_000_001, 57.8, 12.0, 2.0)));
        assert!(v.distance.is_none());
        assert!(v.bearing.is_none());
    }

    #[test]
    fn test_distance_unavailable_when_vincenty_fails() {
        let mut s = store(1);
        s.set_manual_position(0.0, 0.0, 0.0);
        let v = view(s.apply("a", &position_at(265_000_001, 0.5, 179.7, 1.0)));
        assert!(v.distance.is_none());
        assert!(v.lat.is_some());
    }

    // -- Identification fallback --

    #[test]
    fn test_identification_upserted_on_imo() {
        let mut s = store(1);
        s.apply("a", &decode(VOYAGE, 1.0).unwrap());
        let id = s.identification(249_849_000).unwrap();
        assert_eq!(id.imo, Some(9_150_509));
        assert_eq!(id.callsign.as_deref(), Some("9HII5"));
        assert_eq!(id.name.as_deref(), Some("WILSON LEITH"));
    }

    #[test]
    fn test_identification_survives_eviction_and_fills_in() {
        let mut s = store(1);
        s.apply("a", &decode(VOYAGE, 0.0).unwrap());
        s.sweep(4000.0);
        assert!(s.get(249_849_000).is_none());
        assert!(s.identification(249_849_000).is_some());

        let v = view(s.apply("a", &position_at(249_849_000, 53.3, 7.2, 4001.0)));
        assert_eq!(v.name, Some(Identity::Registry("WILSON LEITH".to_string())));
        assert!(v.name.as_ref().unwrap().is_inferred());
        assert_eq!(v.imo.as_ref().map(|i| *i.value()), Some(9_150_509));
        // observed data wins over the registry
        let mut part_a = StaticVoyageData::empty(249_849_000, MessageKind::Vdm(24), 4002.0);
        part_a.name = Some("NEW NAME".into());
        let v = view(s.apply("a", &DecodedRecord::StaticVoyage(part_a)));
        assert_eq!(v.name, Some(Identity::Observed("NEW NAME".to_string())));
    }

    #[test]
    fn test_no_identification_without_imo() {
        let mut s = store(1);
        let mut part_a = StaticVoyageData::empty(265_000_001, MessageKind::Vdm(24), 1.0);
        part_a.name = Some("DINGHY".into());
        s.apply("a", &DecodedRecord::StaticVoyage(part_a));
        assert!(s.identification(265_000_001).is_none());
    }

    // -- Remarks --

    #[test]
    fn test_remark_merge_and_sound_on_insert_only() {
        let mut s = store(1);
        let mut remarks = HashMap::new();
        remarks.insert(
            265_000_001,
            RemarkEntry {
                alert: AlertLevel::AlertSound,
                remark: Some("watch".into()),
            },
        );
        match s.set_remarks(remarks) {
            ChangeEvent::RemarkDict { remarks } => assert_eq!(remarks.len(), 1),
            other => panic!("expected remarkdict, got {other:?}"),
        }

        let rec = position_at(265_000_001, 57.0, 11.0, 1.0);
        let first = view(s.apply("a", &rec));
        assert!(first.alert);
        assert!(first.sound_alert);
        assert_eq!(first.remark.as_deref(), Some("watch"));

        let second = view(s.apply("a", &rec));
        assert!(second.alert);
        assert!(!second.sound_alert);
    }

    #[test]
    fn test_plain_alert_never_sounds() {
        let mut s = store(1);
        let mut remarks = HashMap::new();
        remarks.insert(
            265_000_001,
            RemarkEntry {
                alert: AlertLevel::Alert,
                remark: None,
            },
        );
        s.set_remarks(remarks);
        let v = view(s.apply("a", &position_at(265_000_001, 57.0, 11.0, 1.0)));
        assert!(v.alert);
        assert!(!v.sound_alert);
    }

    // -- Aging --

    #[test]
    fn test_old_emitted_exactly_once() {
        let mut s = store(1);
        s.apply("a", &position_at(265_000_001, 57.0, 11.0, 0.0));

        assert!(s.sweep(599.0).is_empty());
        let events = s.sweep(600.0);
        assert_eq!(
            events,
            vec![ChangeEvent::Old {
                mmsi: 265_000_001,
                distance: None
            }]
        );
        assert!(s.get(265_000_001).unwrap().old);
        assert!(s.sweep(700.0).is_empty());
        assert!(s.sweep(800.0).is_empty());
    }

    #[test]
    fn test_update_clears_old() {
        let mut s = store(1);
        let rec = position_at(265_000_001, 57.0, 11.0, 0.0);
        s.apply("a", &rec);
        s.sweep(600.0);

        let v = view(s.apply("a", &position_at(265_000_001, 57.0, 11.0, 650.0)));
        assert!(!v.old);
        assert!(s.sweep(700.0).is_empty());
        assert_eq!(s.sweep(1250.0).len(), 1);
    }

    #[test]
    fn test_remove_after_threshold() {
        let mut s = store(1);
        s.set_manual_position(57.0, 11.0, 0.0);
        s.apply("a", &position_at(265_000_002, 58.0, 11.0, 0.0));
        s.apply("a", &position_at(265_000_001, 58.0, 11.0, 0.0));

        let events = s.sweep(600.0);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ChangeEvent::Old {
                mmsi: 265_000_001,
                distance: Some(111.4)
            }
        );

        assert!(s.sweep(3600.0).is_empty());
        let events = s.sweep(3600.5);
        assert_eq!(
            events,
            vec![
                ChangeEvent::Remove { mmsi: 265_000_001 },
                ChangeEvent::Remove { mmsi: 265_000_002 },
            ]
        );
        assert!(s.is_empty());
    }

    #[test]
    fn test_undisplayed_contacts_evicted_silently() {
        let mut s = store(5);
        s.apply("a", &position_at(265_000_001, 57.0, 11.0, 0.0));
        assert!(s.sweep(600.0).is_empty());
        assert!(s.sweep(4000.0).is_empty());
        assert!(s.is_empty());
    }

    #[test]
    fn test_reinserted_after_removal() {
        let mut s = store(1);
        let rec = position_at(265_000_001, 57.0, 11.0, 0.0);
        s.apply("a", &rec);
        s.sweep(4000.0);
        let again = position_at(265_000_001, 57.0, 11.0, 4001.0);
        match s.apply("a", &again) {
            Some(ChangeEvent::Insert(v)) => assert_eq!(v.version, 1),
            other => panic!("expected insert, got {other:?}"),
        }
    }

    // -- Query / iddb --

    #[test]
    fn test_query() {
        let mut s = store(1);
        s.apply("a", &position_at(265_000_001, 57.0, 11.0, 0.0));
        assert!(matches!(s.query(265_000_001), ChangeEvent::Query(_)));
        assert!(matches!(s.query(1), ChangeEvent::Error { .. }));
    }

    #[test]
    fn test_iddb_sorted() {
        let mut s = store(1);
        s.load_identities([
            IdentificationRecord {
                mmsi: 2,
                imo: Some(1),
                name: None,
                callsign: None,
            },
            IdentificationRecord {
                mmsi: 1,
                imo: Some(2),
                name: None,
                callsign: None,
            },
        ]);
        match s.iddb() {
            ChangeEvent::IdDb { records } => {
                assert_eq!(records.iter().map(|r| r.mmsi).collect::<Vec<_>>(), vec![1, 2]);
            }
            other => panic!("expected iddb, got {other:?}"),
        }
    }

    #[test]
    fn test_identity_json_tag() {
        let json = serde_json::to_string(&Identity::Registry(5u32)).unwrap();
        assert_eq!(json, r#"{"origin":"registry","value":5}"#);
    }
}
