//! Ship and cargo type names, and transponder classification.

use serde::Serialize;

use crate::types::MessageKind;

/// Name for an ITU ship-and-cargo type code (1-99).
///
/// Codes 20-29, 40-49, 60-69, 70-79, 80-89 and 90-99 share a category
/// name; the second digit only carries the hazard category.
pub fn type_name(code: u8) -> Option<&'static str> {
    let name = match code {
        20..=29 => "Wing in ground",
        30 => "Fishing",
        31 | 32 => "Towing",
        33 => "Dredging",
        34 => "Diving ops",
        35 => "Military ops",
        36 => "Sailing",
        37 => "Pleasure craft",
        40..=49 => "High speed craft",
        50 => "Pilot vessel",
        51 => "Search and rescue",
        52 => "Tug",
        53 => "Port tender",
        54 => "Anti-pollution",
        55 => "Law enforcement",
        58 => "Medical transport",
        59 => "Noncombatant ship",
        60..=69 => "Passenger",
        70..=79 => "Cargo",
        80..=89 => "Tanker",
        90..=99 => "Other",
        _ => return None,
    };
    Some(name)
}

// ---------------------------------------------------------------------------
// Transponder class
// ---------------------------------------------------------------------------

/// Kind of station a contact is, from the message types it transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransponderClass {
    A,
    B,
    Base,
}

impl TransponderClass {
    /// Classify a message kind. `None` for kinds that do not classify a station.
    pub fn from_kind(kind: MessageKind) -> Option<TransponderClass> {
        match kind {
            MessageKind::Vdm(1..=3) | MessageKind::Vdm(5) => Some(TransponderClass::A),
            MessageKind::Pais(0x02) | MessageKind::Pais(0x0E) | MessageKind::Pais(0x0F) => {
                Some(TransponderClass::A)
            }
            MessageKind::Vdm(4) => Some(TransponderClass::Base),
            MessageKind::Vdm(18) | MessageKind::Vdm(19) | MessageKind::Vdm(24) => {
                Some(TransponderClass::B)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for TransponderClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransponderClass::A => write!(f, "A"),
            TransponderClass::B => write!(f, "B"),
            TransponderClass::Base => write!(f, "base"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
