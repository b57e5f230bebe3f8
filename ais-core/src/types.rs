//! Shared types, error enum, and decoded record types for ais-core.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// All errors produced by ais-core.
#[derive(Debug, Error)]
pub enum AisError {
    #[error("checksum mismatch: computed {computed:02X}, declared {declared:02X}")]
    Checksum { computed: u8, declared: u8 },
    #[error("malformed field: {0}")]
    MalformedField(&'static str),
    #[error("fragment sequence mismatch: pending {pending:?}, got {got:?}")]
    Reassembly {
        pending: Option<String>,
        got: Option<String>,
    },
    #[error("vincenty formula did not converge")]
    NoConvergence,
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AisError>;

/// Maritime Mobile Service Identity.
pub type Mmsi = u32;

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Parse a hex field into an unsigned integer. Case-insensitive.
pub fn hex_u32(field: &str) -> Option<u32> {
    let field = field.trim();
    if field.is_empty() || field.len() > 8 {
        return None;
    }
    u32::from_str_radix(field, 16).ok()
}

/// Parse a hex field as a two's-complement signed integer of `bits` width.
pub fn hex_signed(field: &str, bits: u32) -> Option<i64> {
    let raw = hex_u32(field)? as i64;
    let sign = 1i64 << (bits - 1);
    if raw >= sign << 1 {
        return None;
    }
    Some(if raw & sign != 0 { raw - (sign << 1) } else { raw })
}

/// Decode hex-encoded ASCII text (two hex digits per character).
pub fn hex_text(field: &str) -> Option<String> {
    let field = field.trim();
    if !field.len().is_multiple_of(2) {
        return None;
    }
    let mut text = String::with_capacity(field.len() / 2);
    for chunk in field.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        text.push(((high << 4) | low) as char);
    }
    Some(text)
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

/// Format a byte as two uppercase hex digits.
pub fn hex_byte(b: u8) -> String {
    let mut s = String::with_capacity(2);
    s.push(HEX_CHARS[(b >> 4) as usize] as char);
    s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    s
}

pub(crate) fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// AIS 6-bit text
// ---------------------------------------------------------------------------

/// 6-bit to ASCII table: values below 32 are offset by 64, the rest map to themselves.
pub const SIXBIT_CHARSET: &[u8; 64] =
    b"@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_ !\"#$%&'()*+,-./0123456789:;<=>?";

/// Strip `@`/space padding and replace `"` with `'`. Empty text is absent.
pub fn sanitize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end_matches(['@', ' ']).trim_start();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.replace('"', "'"))
}

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// Which sentence family and message number produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "format", content = "id")]
pub enum MessageKind {
    /// `!AIVDM`/`!AIVDO` with its 6-bit message type.
    Vdm(u8),
    /// `$PAIS` with its hex subtype.
    Pais(u8),
    /// `$--GGA` own position fix.
    Gga,
    /// Any other NMEA sentence.
    Other,
}

impl MessageKind {
    /// Numeric message type, where one exists.
    pub fn number(&self) -> Option<u8> {
        match self {
            MessageKind::Vdm(n) | MessageKind::Pais(n) => Some(*n),
            MessageKind::Gga | MessageKind::Other => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Vdm(n) => write!(f, "{n}"),
            MessageKind::Pais(n) => write!(f, "PAIS{}", hex_byte(*n)),
            MessageKind::Gga => write!(f, "GGA"),
            MessageKind::Other => write!(f, "-"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded record types
// ---------------------------------------------------------------------------

/// Vessel dimensions relative to the position reference point, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub to_bow: u16,
    pub to_stern: u16,
    pub to_port: u16,
    pub to_starboard: u16,
}

impl Dimensions {
    pub fn length(&self) -> u16 {
        self.to_bow + self.to_stern
    }

    pub fn width(&self) -> u16 {
        self.to_port + self.to_starboard
    }
}

/// Estimated time of arrival (UTC, no year).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Eta {
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl Eta {
    /// Unpack the ITU 20-bit month/day/hour/minute field. Absent when any part is "not available".
    pub fn from_packed(raw: u32) -> Option<Eta> {
        let month = ((raw >> 16) & 0x0F) as u8;
        let day = ((raw >> 11) & 0x1F) as u8;
        let hour = ((raw >> 6) & 0x1F) as u8;
        let minute = (raw & 0x3F) as u8;
        Eta::new(month, day, hour, minute)
    }

    pub fn new(month: u8, day: u8, hour: u8, minute: u8) -> Option<Eta> {
        if month == 0 || month > 12 || day == 0 || hour > 23 || minute > 59 {
            return None;
        }
        Some(Eta {
            month,
            day,
            hour,
            minute,
        })
    }
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}{:02}{:02}{:02}",
            self.month, self.day, self.hour, self.minute
        )
    }
}

/// UTC date and time reported by a base station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl fmt::Display for StationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Types 1/2/3 (Class A), 18/19 (Class B) and `$PAIS,02`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    pub mmsi: Mmsi,
    pub kind: MessageKind,
    pub navstatus: Option<u8>,
    /// Rate of turn in degrees per minute.
    pub rot: Option<i16>,
    /// Speed over ground in knots.
    pub sog: Option<f64>,
    /// Course over ground in degrees.
    pub cog: Option<f64>,
    pub heading: Option<u16>,
    pub posacc: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timestamp: f64,
}

/// Type 5, type 24 parts, and `$PAIS,0E`/`0F`. Only the fields the message carries are set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticVoyageData {
    pub mmsi: Mmsi,
    pub kind: MessageKind,
    pub imo: Option<u32>,
    pub callsign: Option<String>,
    pub name: Option<String>,
    pub shiptype: Option<u8>,
    pub dims: Option<Dimensions>,
    pub eta: Option<Eta>,
    /// Draught in metres.
    pub draught: Option<f64>,
    pub destination: Option<String>,
    pub timestamp: f64,
}

impl StaticVoyageData {
    pub fn empty(mmsi: Mmsi, kind: MessageKind, timestamp: f64) -> Self {
        StaticVoyageData {
            mmsi,
            kind,
            imo: None,
            callsign: None,
            name: None,
            shiptype: None,
            dims: None,
            eta: None,
            draught: None,
            destination: None,
            timestamp,
        }
    }
}

/// Type 4.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseStationReport {
    pub mmsi: Mmsi,
    pub station_time: Option<StationTime>,
    pub posacc: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timestamp: f64,
}

/// Type 9 (SAR aircraft).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialPositionReport {
    pub mmsi: Mmsi,
    /// Altitude in metres.
    pub altitude: Option<u16>,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub posacc: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timestamp: f64,
}

/// `$--GGA` fix in decimal degrees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnPositionFix {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: f64,
}

/// Union type for all decoded records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DecodedRecord {
    Position(PositionReport),
    StaticVoyage(StaticVoyageData),
    BaseStation(BaseStationReport),
    SpecialPosition(SpecialPositionReport),
    OwnPosition(OwnPositionFix),
    /// Recognised envelope, message not decoded. Carries only what is known.
    Unsupported {
        kind: MessageKind,
        mmsi: Option<Mmsi>,
        timestamp: f64,
    },
}

impl DecodedRecord {
    /// MMSI, where the record carries one.
    pub fn mmsi(&self) -> Option<Mmsi> {
        match self {
            DecodedRecord::Position(m) => Some(m.mmsi),
            DecodedRecord::StaticVoyage(m) => Some(m.mmsi),
            DecodedRecord::BaseStation(m) => Some(m.mmsi),
            DecodedRecord::SpecialPosition(m) => Some(m.mmsi),
            DecodedRecord::OwnPosition(_) => None,
            DecodedRecord::Unsupported { mmsi, .. } => *mmsi,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            DecodedRecord::Position(m) => m.kind,
            DecodedRecord::StaticVoyage(m) => m.kind,
            DecodedRecord::BaseStation(_) => MessageKind::Vdm(4),
            DecodedRecord::SpecialPosition(_) => MessageKind::Vdm(9),
            DecodedRecord::OwnPosition(_) => MessageKind::Gga,
            DecodedRecord::Unsupported { kind, .. } => *kind,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            DecodedRecord::Position(m) => m.timestamp,
            DecodedRecord::StaticVoyage(m) => m.timestamp,
            DecodedRecord::BaseStation(m) => m.timestamp,
            DecodedRecord::SpecialPosition(m) => m.timestamp,
            DecodedRecord::OwnPosition(m) => m.timestamp,
            DecodedRecord::Unsupported { timestamp, .. } => *timestamp,
        }
    }

    /// False for records that only carry an envelope.
    pub fn is_parsed(&self) -> bool {
        !matches!(self, DecodedRecord::Unsupported { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_u32() {
        assert_eq!(hex_u32("0FD9A4E0"), Some(265_921_760));
        assert_eq!(hex_u32("ff"), Some(255));
        assert_eq!(hex_u32(""), None);
        assert_eq!(hex_u32("XYZ"), None);
    }

    #[test]
    fn test_hex_signed() {
        assert_eq!(hex_signed("FF", 8), Some(-1));
        assert_eq!(hex_signed("7F", 8), Some(127));
        assert_eq!(hex_signed("FFFFFFFF", 32), Some(-1));
        assert_eq!(hex_signed("100", 8), None);
    }

    #[test]
    fn test_hex_text() {
        assert_eq!(hex_text("454D44454E").as_deref(), Some("EMDEN"));
        assert_eq!(hex_text("454"), None);
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("9HII5  ").as_deref(), Some("9HII5"));
        assert_eq!(sanitize_text("EMDEN@@@@").as_deref(), Some("EMDEN"));
        assert_eq!(sanitize_text("SAY \"HI\"").as_deref(), Some("SAY 'HI'"));
        assert_eq!(sanitize_text("@@@@ "), None);
    }

    #[test]
    fn test_eta_packed() {
        let raw = (11 << 16) | (17 << 11) | (8 << 6);
        let eta = Eta::from_packed(raw).unwrap();
        assert_eq!(eta.to_string(), "11170800");
        // month 0 = not available
        assert!(Eta::from_packed(17 << 11).is_none());
        // hour 24 = not available
        assert!(Eta::new(1, 1, 24, 0).is_none());
    }

    #[test]
    fn test_dimensions() {
        let d = Dimensions {
            to_bow: 77,
            to_stern: 11,
            to_port: 6,
            to_starboard: 7,
        };
        assert_eq!(d.length(), 88);
        assert_eq!(d.width(), 13);
    }

    #[test]
    fn test_message_kind_display() {
        assert_eq!(MessageKind::Vdm(5).to_string(), "5");
        assert_eq!(MessageKind::Pais(0x0E).to_string(), "PAIS0E");
        assert_eq!(MessageKind::Pais(2).number(), Some(2));
        assert_eq!(MessageKind::Gga.number(), None);
    }

    #[test]
    fn test_unsupported_not_parsed() {
        let rec = DecodedRecord::Unsupported {
            kind: MessageKind::Vdm(27),
            mmsi: Some(1),
            timestamp: 0.0,
        };
        assert!(!rec.is_parsed());
        assert_eq!(rec.mmsi(), Some(1));
    }
}
