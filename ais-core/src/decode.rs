//! Decode AIS and NMEA sentences into typed records.
//!
//! Handles:
//! - `!AIVDM`/`!AIVDO` type 1-3:  Class A position report
//! - `!AIVDM` type 4:             Base station report
//! - `!AIVDM` type 5:             Static and voyage data (version 0 only)
//! - `!AIVDM` type 9:             SAR aircraft position
//! - `!AIVDM` type 18/19:         Class B position report
//! - `!AIVDM` type 24:            Static data report, part A and B
//! - `$PAIS` 02/0E/0F:            Vendor position, identification, voyage
//! - `$--GGA`:                    Own position fix
//!
//! Anything else with a valid checksum decodes to `DecodedRecord::Unsupported`.

use crate::checksum;
use crate::sentence::{is_vdm_talker, parse_vdm};
use crate::types::*;

// ---------------------------------------------------------------------------
// Not-available sentinels (ITU-R M.1371)
// ---------------------------------------------------------------------------

const NAVSTATUS_NA: u32 = 15;
const SOG_NA: u32 = 1023;
const COG_NA: u32 = 3600;
const HEADING_NA: u32 = 511;
const ALTITUDE_NA: u32 = 4095;
const LON_NA: i64 = 181 * 600_000;
const LAT_NA: i64 = 91 * 600_000;

/// Maximum rate of turn after the non-linear transform, degrees/minute.
const ROT_LIMIT: f64 = 720.0;

// ---------------------------------------------------------------------------
// Payload bits
// ---------------------------------------------------------------------------

/// Unarmored AIS payload: one 6-bit value per payload character.
#[derive(Debug, Clone)]
pub struct Payload {
    sextets: Vec<u8>,
}

impl Payload {
    /// Map each payload character to its 6-bit value.
    ///
    /// Characters below 48 or above 119 are invalid; 48-87 map to
    /// `c - 48`, 88-119 map to `c - 56`.
    pub fn unarmor(payload: &str) -> Result<Payload> {
        let mut sextets = Vec::with_capacity(payload.len());
        for c in payload.bytes() {
            let v = match c {
                48..=87 => c - 48,
                88..=119 => c - 56,
                _ => return Err(AisError::MalformedField("payload character")),
            };
            sextets.push(v);
        }
        Ok(Payload { sextets })
    }

    pub fn len_bits(&self) -> usize {
        self.sextets.len() * 6
    }

    fn bit(&self, i: usize) -> u32 {
        let sextet = self.sextets[i / 6];
        ((sextet >> (5 - i % 6)) & 1) as u32
    }

    /// Read `len` bits (at most 32) starting at bit `start` as unsigned.
    pub fn uint(&self, start: usize, len: usize) -> Result<u32> {
        if len > 32 || start + len > self.len_bits() {
            return Err(AisError::MalformedField("payload length"));
        }
        Ok((start..start + len).fold(0u32, |acc, i| (acc << 1) | self.bit(i)))
    }

    /// Read `len` bits as a two's-complement signed value.
    pub fn int(&self, start: usize, len: usize) -> Result<i64> {
        let raw = self.uint(start, len)? as i64;
        let sign = 1i64 << (len - 1);
        Ok(if raw & sign != 0 { raw - (sign << 1) } else { raw })
    }

    pub fn flag(&self, start: usize) -> Result<bool> {
        Ok(self.uint(start, 1)? == 1)
    }

    /// Read `chars` 6-bit characters and sanitize them.
    pub fn text(&self, start: usize, chars: usize) -> Result<Option<String>> {
        let mut raw = String::with_capacity(chars);
        for i in 0..chars {
            let idx = self.uint(start + i * 6, 6)? as usize;
            raw.push(SIXBIT_CHARSET[idx] as char);
        }
        Ok(sanitize_text(&raw))
    }
}

// ---------------------------------------------------------------------------
// Field conversions
// ---------------------------------------------------------------------------

/// Convert the signed 8-bit ITU rate-of-turn indicator to degrees/minute.
///
/// -128 and ±127 carry no rate and are absent. Other values follow
/// `(raw / 4.733)^2`, signed, clamped to ±720.
pub fn rot_from_raw(raw: i64) -> Option<i16> {
    if raw.abs() >= 127 {
        return None;
    }
    let magnitude = ((raw.abs() as f64) / 4.733).powi(2).round().min(ROT_LIMIT);
    let rot = if raw < 0 { -magnitude } else { magnitude };
    Some(rot as i16)
}

fn navstatus(raw: u32) -> Option<u8> {
    (raw != NAVSTATUS_NA).then_some(raw as u8)
}

fn sog_tenths(raw: u32) -> Option<f64> {
    (raw != SOG_NA).then(|| raw as f64 / 10.0)
}

fn cog_tenths(raw: u32) -> Option<f64> {
    (raw < COG_NA).then(|| raw as f64 / 10.0)
}

fn heading(raw: u32) -> Option<u16> {
    (raw != HEADING_NA && raw < 360).then_some(raw as u16)
}

/// Longitude from 1/10000-minute units. 181° is "not available".
fn longitude(raw: i64) -> Option<f64> {
    if raw == LON_NA || raw.abs() > 180 * 600_000 {
        return None;
    }
    Some(round6(raw as f64 / 600_000.0))
}

/// Latitude from 1/10000-minute units. 91° is "not available".
fn latitude(raw: i64) -> Option<f64> {
    if raw == LAT_NA || raw.abs() > 90 * 600_000 {
        return None;
    }
    Some(round6(raw as f64 / 600_000.0))
}

fn nonzero(raw: u32) -> Option<u32> {
    (raw != 0).then_some(raw)
}

fn dimensions(to_bow: u32, to_stern: u32, to_port: u32, to_starboard: u32) -> Option<Dimensions> {
    if to_bow == 0 && to_stern == 0 && to_port == 0 && to_starboard == 0 {
        return None;
    }
    Some(Dimensions {
        to_bow: to_bow as u16,
        to_stern: to_stern as u16,
        to_port: to_port as u16,
        to_starboard: to_starboard as u16,
    })
}

fn round6(val: f64) -> f64 {
    (val * 1_000_000.0).round() / 1_000_000.0
}

// ---------------------------------------------------------------------------
// AIVDM message decoders
// ---------------------------------------------------------------------------

/// Types 1, 2, 3: Class A position report.
pub fn decode_class_a_position(p: &Payload, msg_type: u8, timestamp: f64) -> Result<PositionReport> {
    Ok(PositionReport {
        mmsi: p.uint(8, 30)?,
        kind: MessageKind::Vdm(msg_type),
        navstatus: navstatus(p.uint(38, 4)?),
        rot: rot_from_raw(p.int(42, 8)?),
        sog: sog_tenths(p.uint(50, 10)?),
        posacc: p.flag(60)?,
        lon: longitude(p.int(61, 28)?),
        lat: latitude(p.int(89, 27)?),
        cog: cog_tenths(p.uint(116, 12)?),
        heading: heading(p.uint(128, 9)?),
        timestamp,
    })
}

/// Types 18, 19: Class B position report.
pub fn decode_class_b_position(p: &Payload, msg_type: u8, timestamp: f64) -> Result<PositionReport> {
    Ok(PositionReport {
        mmsi: p.uint(8, 30)?,
        kind: MessageKind::Vdm(msg_type),
        navstatus: None,
        rot: None,
        sog: sog_tenths(p.uint(46, 10)?),
        posacc: p.flag(56)?,
        lon: longitude(p.int(57, 28)?),
        lat: latitude(p.int(85, 27)?),
        cog: cog_tenths(p.uint(112, 12)?),
        heading: heading(p.uint(124, 9)?),
        timestamp,
    })
}

/// Type 4: base station report.
pub fn decode_base_station(p: &Payload, timestamp: f64) -> Result<BaseStationReport> {
    let year = p.uint(38, 14)?;
    let month = p.uint(52, 4)?;
    let day = p.uint(56, 5)?;
    let hour = p.uint(61, 5)?;
    let minute = p.uint(66, 6)?;
    let second = p.uint(72, 6)?;

    let time_valid = year != 0
        && (1..=12).contains(&month)
        && day != 0
        && hour < 24
        && minute < 60
        && second < 60;
    let station_time = time_valid.then_some(StationTime {
        year: year as u16,
        month: month as u8,
        day: day as u8,
        hour: hour as u8,
        minute: minute as u8,
        second: second as u8,
    });

    Ok(BaseStationReport {
        mmsi: p.uint(8, 30)?,
        station_time,
        posacc: p.flag(78)?,
        lon: longitude(p.int(79, 28)?),
        lat: latitude(p.int(107, 27)?),
        timestamp,
    })
}

/// Type 5: static and voyage related data.
///
/// Only AIS version indicator 0 is decoded; other versions are reported
/// as unsupported type 5 records.
pub fn decode_static_voyage(p: &Payload, timestamp: f64) -> Result<DecodedRecord> {
    let mmsi = p.uint(8, 30)?;
    if p.uint(38, 2)? != 0 {
        return Ok(DecodedRecord::Unsupported {
            kind: MessageKind::Vdm(5),
            mmsi: Some(mmsi),
            timestamp,
        });
    }

    let draught = p.uint(294, 8)?;
    Ok(DecodedRecord::StaticVoyage(StaticVoyageData {
        mmsi,
        kind: MessageKind::Vdm(5),
        imo: nonzero(p.uint(40, 30)?),
        callsign: p.text(70, 7)?,
        name: p.text(112, 20)?,
        shiptype: nonzero(p.uint(232, 8)?).map(|t| t as u8),
        dims: dimensions(
            p.uint(240, 9)?,
            p.uint(249, 9)?,
            p.uint(258, 6)?,
            p.uint(264, 6)?,
        ),
        eta: Eta::from_packed(p.uint(274, 20)?),
        draught: (draught != 0).then(|| draught as f64 / 10.0),
        destination: p.text(302, 20)?,
        timestamp,
    }))
}

/// Type 9: standard SAR aircraft position report.
pub fn decode_sar_position(p: &Payload, timestamp: f64) -> Result<SpecialPositionReport> {
    let altitude = p.uint(38, 12)?;
    let sog = p.uint(50, 10)?;
    Ok(SpecialPositionReport {
        mmsi: p.uint(8, 30)?,
        altitude: (altitude != ALTITUDE_NA).then_some(altitude as u16),
        // SAR speed is in whole knots
        sog: (sog != SOG_NA).then_some(sog as f64),
        posacc: p.flag(60)?,
        lon: longitude(p.int(61, 28)?),
        lat: latitude(p.int(89, 27)?),
        cog: cog_tenths(p.uint(116, 12)?),
        timestamp,
    })
}

/// Type 24: static data report. Part A carries the name, part B the rest.
pub fn decode_static_data_report(p: &Payload, timestamp: f64) -> Result<DecodedRecord> {
    let mmsi = p.uint(8, 30)?;
    let mut data = StaticVoyageData::empty(mmsi, MessageKind::Vdm(24), timestamp);

    match p.uint(38, 2)? {
        0 => {
            data.name = p.text(40, 20)?;
        }
        1 => {
            data.shiptype = nonzero(p.uint(40, 8)?).map(|t| t as u8);
            data.callsign = p.text(90, 7)?;
            data.dims = dimensions(
                p.uint(132, 9)?,
                p.uint(141, 9)?,
                p.uint(150, 6)?,
                p.uint(156, 6)?,
            );
        }
        _ => {
            return Ok(DecodedRecord::Unsupported {
                kind: MessageKind::Vdm(24),
                mmsi: Some(mmsi),
                timestamp,
            })
        }
    }

    Ok(DecodedRecord::StaticVoyage(data))
}

/// Decode an unarmored single-sentence payload.
pub fn decode_payload(payload: &str, timestamp: f64) -> Result<DecodedRecord> {
    let p = Payload::unarmor(payload)?;
    let msg_type = p.uint(0, 6)? as u8;

    match msg_type {
        1..=3 => decode_class_a_position(&p, msg_type, timestamp).map(DecodedRecord::Position),
        4 => decode_base_station(&p, timestamp).map(DecodedRecord::BaseStation),
        5 => decode_static_voyage(&p, timestamp),
        9 => decode_sar_position(&p, timestamp).map(DecodedRecord::SpecialPosition),
        18 | 19 => decode_class_b_position(&p, msg_type, timestamp).map(DecodedRecord::Position),
        24 => decode_static_data_report(&p, timestamp),
        _ => Ok(DecodedRecord::Unsupported {
            kind: MessageKind::Vdm(msg_type),
            mmsi: p.uint(8, 30).ok(),
            timestamp,
        }),
    }
}

// ---------------------------------------------------------------------------
// $PAIS
// ---------------------------------------------------------------------------

fn hex_field(fields: &[&str], idx: usize) -> Result<u32> {
    fields
        .get(idx)
        .and_then(|f| hex_u32(f))
        .ok_or(AisError::MalformedField("pais hex field"))
}

fn hex_signed_field(fields: &[&str], idx: usize, bits: u32) -> Result<i64> {
    fields
        .get(idx)
        .and_then(|f| hex_signed(f, bits))
        .ok_or(AisError::MalformedField("pais signed field"))
}

fn hex_text_field(fields: &[&str], idx: usize) -> Result<Option<String>> {
    let text = fields
        .get(idx)
        .and_then(|f| hex_text(f))
        .ok_or(AisError::MalformedField("pais text field"))?;
    Ok(sanitize_text(&text))
}

/// Decode the body of a `$PAIS` sentence. Unknown subtypes are unsupported, not errors.
pub fn decode_pais(body: &str, timestamp: f64) -> Result<DecodedRecord> {
    let fields: Vec<&str> = body.split(',').collect();
    let subtype = fields
        .get(1)
        .and_then(|f| hex_u32(f))
        .filter(|s| *s <= 0xFF)
        .ok_or(AisError::MalformedField("pais subtype"))? as u8;
    let kind = MessageKind::Pais(subtype);

    match subtype {
        0x02 => Ok(DecodedRecord::Position(PositionReport {
            mmsi: hex_field(&fields, 2)?,
            kind,
            navstatus: navstatus(hex_field(&fields, 3)?),
            rot: rot_from_raw(hex_signed_field(&fields, 4, 8)?),
            sog: sog_tenths(hex_field(&fields, 5)?),
            posacc: hex_field(&fields, 6)? == 1,
            lon: longitude(hex_signed_field(&fields, 7, 32)?),
            lat: latitude(hex_signed_field(&fields, 8, 32)?),
            cog: cog_tenths(hex_field(&fields, 9)?),
            heading: heading(hex_field(&fields, 10)?),
            timestamp,
        })),
        0x0E => {
            let mut data = StaticVoyageData::empty(hex_field(&fields, 2)?, kind, timestamp);
            data.imo = nonzero(hex_field(&fields, 3)?);
            data.callsign = hex_text_field(&fields, 4)?;
            data.name = hex_text_field(&fields, 5)?;
            Ok(DecodedRecord::StaticVoyage(data))
        }
        0x0F => {
            let mut data = StaticVoyageData::empty(hex_field(&fields, 2)?, kind, timestamp);
            data.shiptype = nonzero(hex_field(&fields, 3)?).map(|t| t as u8);
            data.dims = dimensions(
                hex_field(&fields, 4)?,
                hex_field(&fields, 5)?,
                hex_field(&fields, 6)?,
                hex_field(&fields, 7)?,
            );
            let draught = hex_field(&fields, 8)?;
            data.draught = (draught != 0).then(|| draught as f64 / 10.0);
            data.eta = Eta::from_packed(hex_field(&fields, 9)?);
            data.destination = hex_text_field(&fields, 10)?;
            Ok(DecodedRecord::StaticVoyage(data))
        }
        _ => Ok(DecodedRecord::Unsupported {
            kind,
            mmsi: fields.get(2).and_then(|f| hex_u32(f)),
            timestamp,
        }),
    }
}

// ---------------------------------------------------------------------------
// $--GGA
// ---------------------------------------------------------------------------

/// Convert NMEA `(d)ddmm.mmmm` plus hemisphere to signed decimal degrees.
fn nmea_degrees(value: &str, hemisphere: &str, negative: &str) -> Result<f64> {
    let raw: f64 = value
        .parse()
        .map_err(|_| AisError::MalformedField("gga coordinate"))?;
    if !raw.is_finite() {
        return Err(AisError::MalformedField("gga coordinate"));
    }
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        h if h == negative => Ok(-round6(decimal)),
        "N" | "E" => Ok(round6(decimal)),
        _ => Err(AisError::MalformedField("gga hemisphere")),
    }
}

/// Decode the body of a `$--GGA` sentence into an own position fix.
pub fn decode_gga(body: &str, timestamp: f64) -> Result<OwnPositionFix> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 7 {
        return Err(AisError::MalformedField("gga field count"));
    }
    if fields[6].is_empty() || fields[6] == "0" {
        return Err(AisError::MalformedField("gga fix quality"));
    }

    let lat = nmea_degrees(fields[2], fields[3], "S")?;
    let lon = nmea_degrees(fields[4], fields[5], "W")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AisError::MalformedField("gga coordinate range"));
    }

    Ok(OwnPositionFix {
        lat,
        lon,
        timestamp,
    })
}

// ---------------------------------------------------------------------------
// Main decode function
// ---------------------------------------------------------------------------

/// Decode one complete sentence.
///
/// Validates the checksum, then routes on the talker. Multi-fragment
/// sentences must be joined by the `Reassembler` first.
pub fn decode(sentence: &str, timestamp: f64) -> Result<DecodedRecord> {
    let body = checksum::verify(sentence)?;
    let talker = body.split(',').next().unwrap_or("");

    if is_vdm_talker(talker) {
        let frag = parse_vdm(body)?;
        if frag.fragment_count != 1 {
            return Err(AisError::MalformedField("unassembled fragment"));
        }
        return decode_payload(frag.payload, timestamp);
    }

    if talker == "PAIS" {
        return decode_pais(body, timestamp);
    }

    if talker.len() == 5 && talker.ends_with("GGA") {
        return decode_gga(body, timestamp).map(DecodedRecord::OwnPosition);
    }

    Ok(DecodedRecord::Unsupported {
        kind: MessageKind::Other,
        mmsi: None,
        timestamp,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
