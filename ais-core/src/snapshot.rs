//! Periodic snapshot rows for the position, metadata and identification logs.
//!
//! Each call reports only what changed since the previous call of the same
//! kind, so the logging sinks can append rows without de-duplicating.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::contacts::{Contact, ContactStore, IdentificationRecord};
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    pub time: f64,
    pub mmsi: Mmsi,
    pub lat: f64,
    pub lon: f64,
    pub georef: Option<String>,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRow {
    pub time: f64,
    pub mmsi: Mmsi,
    pub imo: Option<u32>,
    pub name: Option<String>,
    pub callsign: Option<String>,
    pub shiptype: Option<u8>,
    pub typename: Option<&'static str>,
    pub destination: Option<String>,
    pub eta: Option<String>,
    pub length: Option<u16>,
    pub width: Option<u16>,
}

impl MetadataRow {
    fn from_contact(c: &Contact, time: f64) -> Self {
        MetadataRow {
            time,
            mmsi: c.mmsi,
            imo: c.imo,
            name: c.name.clone(),
            callsign: c.callsign.clone(),
            shiptype: c.shiptype,
            typename: c.typename,
            destination: c.destination.clone(),
            eta: c.eta.map(|e| e.to_string()),
            length: c.length,
            width: c.width,
        }
    }

    fn is_blank(&self) -> bool {
        self.imo.is_none()
            && self.name.is_none()
            && self.callsign.is_none()
            && self.shiptype.is_none()
            && self.destination.is_none()
            && self.eta.is_none()
            && self.length.is_none()
            && self.width.is_none()
    }

    /// Hash of everything except the row time.
    fn identity_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.imo.hash(&mut h);
        self.name.hash(&mut h);
        self.callsign.hash(&mut h);
        self.shiptype.hash(&mut h);
        self.destination.hash(&mut h);
        self.eta.hash(&mut h);
        self.length.hash(&mut h);
        self.width.hash(&mut h);
        h.finish()
    }
}

impl ContactStore {
    /// Positions updated since the previous position snapshot, by MMSI.
    pub fn position_rows(&mut self, now: f64) -> Vec<PositionRow> {
        let since = self.last_position_snapshot;
        self.last_position_snapshot = now;

        let mut rows: Vec<PositionRow> = self
            .contacts
            .values()
            .filter(|c| c.last_update > since && c.last_update <= now)
            .filter_map(|c| {
                Some(PositionRow {
                    time: c.last_update,
                    mmsi: c.mmsi,
                    lat: c.lat?,
                    lon: c.lon?,
                    georef: c.georef.clone(),
                    sog: c.sog,
                    cog: c.cog,
                })
            })
            .collect();
        rows.sort_by_key(|r| r.mmsi);
        rows
    }

    /// Contacts whose identity or voyage fields changed since last written.
    pub fn metadata_rows(&mut self, now: f64) -> Vec<MetadataRow> {
        let mut rows = Vec::new();
        for c in self.contacts.values() {
            let row = MetadataRow::from_contact(c, now);
            if row.is_blank() {
                continue;
            }
            let hash = row.identity_hash();
            if self.metadata_hashes.insert(c.mmsi, hash) != Some(hash) {
                rows.push(row);
            }
        }
        rows.sort_by_key(|r| r.mmsi);
        rows
    }

    /// The full identification table, by MMSI.
    pub fn identification_rows(&self) -> Vec<IdentificationRecord> {
        let mut rows: Vec<_> = self.identities.values().cloned().collect();
        rows.sort_by_key(|r| r.mmsi);
        rows
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContactConfig, PositionConfig};
    use crate::decode::decode;

    const POSITION: &str = "!AIVDM,1,1,,A,13uTAH002nJRLAHEwTi674rh04:8,0*2B";
    const VOYAGE: &str = "!AIVDM,1,1,,A,53fATb02;`2oTPTWF21LTi<tr0hDU@R2222222169`;676p`0=iCA1C`888888888888880,2*51";

    fn store() -> ContactStore {
        let settings = ContactConfig {
            min_updates: 1,
            ..ContactConfig::default()
        };
        ContactStore::new(settings, PositionConfig::default())
    }

    #[test]
    fn test_position_rows_since_last_snapshot() {
        let mut s = store();
        s.apply("a", &decode(POSITION, 10.0).unwrap());

        let rows = s.position_rows(20.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mmsi, 265_884_000);
        assert_eq!(rows[0].time, 10.0);
        assert!(rows[0].georef.is_some());

        assert!(s.position_rows(30.0).is_empty());

        s.apply("a", &decode(POSITION, 35.0).unwrap());
        assert_eq!(s.position_rows(40.0).len(), 1);
    }

    #[test]
    fn test_position_rows_skip_unpositioned() {
        let mut s = store();
        s.apply("a", &decode(VOYAGE, 10.0).unwrap());
        assert!(s.position_rows(20.0).is_empty());
    }

    #[test]
    fn test_metadata_rows_only_on_change() {
        let mut s = store();
        s.apply("a", &decode(VOYAGE, 10.0).unwrap());
        s.apply("a", &decode(POSITION, 10.0).unwrap());

        let rows = s.metadata_rows(20.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mmsi, 249_849_000);
        assert_eq!(rows[0].typename, Some("Cargo"));
        assert_eq!(rows[0].eta.as_deref(), Some("11170800"));

        s.apply("a", &decode(VOYAGE, 30.0).unwrap());
        assert!(s.metadata_rows(40.0).is_empty());

        let mut changed = StaticVoyageData::empty(249_849_000, MessageKind::Vdm(5), 50.0);
        changed.destination = Some("HAMBURG".into());
        s.apply("a", &DecodedRecord::StaticVoyage(changed));
        let rows = s.metadata_rows(60.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].destination.as_deref(), Some("HAMBURG"));
    }

    #[test]
    fn test_metadata_rewritten_after_eviction() {
        let mut s = store();
        s.apply("a", &decode(VOYAGE, 0.0).unwrap());
        assert_eq!(s.metadata_rows(1.0).len(), 1);
        s.sweep(4000.0);
        s.apply("a", &decode(VOYAGE, 4001.0).unwrap());
        assert_eq!(s.metadata_rows(4002.0).len(), 1);
    }

    #[test]
    fn test_identification_rows() {
        let mut s = store();
        s.apply("a", &decode(VOYAGE, 0.0).unwrap());
        s.apply("a", &decode(POSITION, 0.0).unwrap());
        let rows = s.identification_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].imo, Some(9_150_509));
    }
}
