//! Armored AIS sentence envelopes and multi-part reassembly.
//!
//! Responsibilities:
//! - Split a checksummed `!AIVDM`/`!AIVDO` body into its envelope fields
//! - Join multi-fragment sentences per source into one synthetic sentence
//! - Keep reassembly state independent per source

use std::collections::HashMap;

use crate::checksum;
use crate::types::{AisError, Result};

/// Envelope fields of one `!AIVDM` fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdmFragment<'a> {
    /// Talker and sentence type, e.g. `AIVDM`.
    pub talker: &'a str,
    pub fragment_count: u8,
    pub fragment_index: u8,
    /// Sequential message id; empty for single-fragment sentences.
    pub sequence_id: &'a str,
    pub channel: &'a str,
    pub payload: &'a str,
    pub fill_bits: u8,
}

/// True for armored AIS talkers (`AIVDM`, `AIVDO`).
pub fn is_vdm_talker(talker: &str) -> bool {
    matches!(talker, "AIVDM" | "AIVDO")
}

/// Parse the checksum-stripped body of an armored sentence.
pub fn parse_vdm(body: &str) -> Result<VdmFragment<'_>> {
    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 7 {
        return Err(AisError::MalformedField("vdm field count"));
    }
    if !is_vdm_talker(fields[0]) {
        return Err(AisError::MalformedField("vdm talker"));
    }

    let fragment_count: u8 = fields[1]
        .parse()
        .map_err(|_| AisError::MalformedField("fragment count"))?;
    let fragment_index: u8 = fields[2]
        .parse()
        .map_err(|_| AisError::MalformedField("fragment index"))?;
    if fragment_count == 0 || fragment_index == 0 || fragment_index > fragment_count {
        return Err(AisError::MalformedField("fragment numbering"));
    }
    let fill_bits: u8 = fields[6]
        .parse()
        .map_err(|_| AisError::MalformedField("fill bits"))?;

    Ok(VdmFragment {
        talker: fields[0],
        fragment_count,
        fragment_index,
        sequence_id: fields[3],
        channel: fields[4],
        payload: fields[5],
        fill_bits,
    })
}

// ---------------------------------------------------------------------------
// Reassembly
// ---------------------------------------------------------------------------

/// A partially collected multi-fragment sentence.
#[derive(Debug, Clone)]
struct Collecting {
    talker: String,
    sequence_id: String,
    fragment_count: u8,
    payloads: Vec<String>,
}

/// Joins multi-part sentences sharing a sequence id, one state per source.
///
/// A source with no entry is idle. Non-VDM lines and single-fragment
/// sentences pass straight through.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<String, Collecting>,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler::default()
    }

    /// Feed one line from `source`.
    ///
    /// Returns `Ok(Some(line))` when a complete sentence is ready for
    /// decoding, `Ok(None)` while fragments are being collected, and an
    /// error when a fragment is invalid or out of sequence. Errors reset
    /// the source to idle.
    pub fn push(&mut self, source: &str, line: &str) -> Result<Option<String>> {
        let line = line.trim();
        if !line.starts_with('!') {
            return Ok(Some(line.to_string()));
        }

        let body = checksum::verify(line)?;
        let frag = parse_vdm(body)?;

        if frag.fragment_count == 1 {
            return Ok(Some(line.to_string()));
        }

        if frag.fragment_index == 1 {
            self.pending.insert(
                source.to_string(),
                Collecting {
                    talker: frag.talker.to_string(),
                    sequence_id: frag.sequence_id.to_string(),
                    fragment_count: frag.fragment_count,
                    payloads: vec![frag.payload.to_string()],
                },
            );
            return Ok(None);
        }

        let Some(mut collecting) = self.pending.remove(source) else {
            return Err(AisError::Reassembly {
                pending: None,
                got: Some(frag.sequence_id.to_string()),
            });
        };

        let in_order = collecting.sequence_id == frag.sequence_id
            && collecting.fragment_count == frag.fragment_count
            && usize::from(frag.fragment_index) == collecting.payloads.len() + 1;
        if !in_order {
            return Err(AisError::Reassembly {
                pending: Some(collecting.sequence_id),
                got: Some(frag.sequence_id.to_string()),
            });
        }

        collecting.payloads.push(frag.payload.to_string());
        if collecting.payloads.len() < usize::from(collecting.fragment_count) {
            self.pending.insert(source.to_string(), collecting);
            return Ok(None);
        }

        let body = format!(
            "{},1,1,,,{},0",
            collecting.talker,
            collecting.payloads.concat()
        );
        Ok(Some(checksum::armor(&body)))
    }

    /// True if `source` has an unfinished collection.
    pub fn is_collecting(&self, source: &str) -> bool {
        self.pending.contains_key(source)
    }

    /// Drop any unfinished collection for `source`.
    pub fn reset(&mut self, source: &str) {
        self.pending.remove(source);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
