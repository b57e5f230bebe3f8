//! Geodesy — Vincenty inverse distance/bearing on WGS-84, and GEOREF.
//!
//! Vincenty iterates on the longitude difference on the auxiliary sphere.
//! Nearly antipodal points may fail to converge within the iteration
//! limit; callers treat that as "no distance available".

use serde::Serialize;

use crate::types::{AisError, Result};

/// WGS-84 semi-major axis (metres).
const WGS84_A: f64 = 6_378_137.0;

/// WGS-84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;

const MAX_ITERATIONS: usize = 20;
const CONVERGENCE: f64 = 1e-12;

const METRES_PER_NM: f64 = 1852.0;

/// Initial bearing and distance between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoVector {
    /// Initial bearing, degrees clockwise from true north, in `[0, 360)`.
    pub bearing_deg: f64,
    pub distance_km: f64,
    pub distance_nm: f64,
}

/// Vincenty inverse formula from point 1 to point 2 (decimal degrees).
pub fn vincenty(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<GeoVector> {
    let b = WGS84_A * (1.0 - WGS84_F);
    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - WGS84_F) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    let mut converged = false;
    let (mut sin_sigma, mut cos_sigma, mut sigma) = (0.0, 0.0, 0.0);
    let (mut cos_sq_alpha, mut cos_2sigma_m) = (0.0, 0.0);
    let (mut sin_lambda, mut cos_lambda) = (0.0, 0.0);

    for _ in 0..MAX_ITERATIONS {
        (sin_lambda, cos_lambda) = lambda.sin_cos();
        sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Ok(GeoVector {
                bearing_deg: 0.0,
                distance_km: 0.0,
                distance_nm: 0.0,
            });
        }
        cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha = 0
        cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));
        if (lambda - previous).abs() < CONVERGENCE {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(AisError::NoConvergence);
    }

    let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - b.powi(2)) / b.powi(2);
    let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    let delta_sigma = big_b
        * sin_sigma
        * (cos_2sigma_m
            + big_b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                    - big_b / 6.0
                        * cos_2sigma_m
                        * (-3.0 + 4.0 * sin_sigma.powi(2))
                        * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));
    let metres = b * big_a * (sigma - delta_sigma);

    let azimuth = (cos_u2 * sin_lambda).atan2(cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda);

    Ok(GeoVector {
        bearing_deg: azimuth.to_degrees().rem_euclid(360.0),
        distance_km: metres / 1000.0,
        distance_nm: metres / METRES_PER_NM,
    })
}

// ---------------------------------------------------------------------------
// GEOREF
// ---------------------------------------------------------------------------

/// GEOREF letters: A-Z without I and O.
const GEOREF_LETTERS: &[u8; 24] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

/// World Geographic Reference System code at one-minute precision,
/// e.g. `NKMN5842`.
pub fn georef(lat: f64, lon: f64) -> Option<String> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }

    // Whole minutes from the south-west origin; the epsilon absorbs
    // binary representation error in values like 147.7 * 60.
    let lon_min = (((lon + 180.0) * 60.0 + 1e-6).floor() as i64).min(360 * 60 - 1);
    let lat_min = (((lat + 90.0) * 60.0 + 1e-6).floor() as i64).min(180 * 60 - 1);

    let letter = |i: i64| GEOREF_LETTERS[i as usize] as char;
    Some(format!(
        "{}{}{}{}{:02}{:02}",
        letter(lon_min / 900),
        letter(lat_min / 900),
        letter((lon_min / 60) % 15),
        letter((lat_min / 60) % 15),
        lon_min % 60,
        lat_min % 60,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
