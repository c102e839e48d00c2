//! WGS84 coordinate transforms and unit-sphere geometry
//!
//! Converts between Earth-centered Cartesian (ECEF, meters) and geodetic
//! latitude/longitude/height on the WGS84 ellipsoid, and provides the
//! angular-distance primitives used for clustering points on the unit
//! sphere.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// WGS84 semi-major axis in meters
pub const WGS84_A: f64 = 6378137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257223563;

/// Convergence threshold for the iterative geodetic inversion, in meters
const Z_CONVERGENCE_M: f64 = 1e-4;

/// Geodetic position on the WGS84 ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geodetic {
    /// Latitude in radians
    pub lat: f64,
    /// Longitude in radians
    pub lon: f64,
    /// Ellipsoidal height in meters
    pub height: f64,
}

impl Geodetic {
    pub fn from_degrees(lat_deg: f64, lon_deg: f64, height: f64) -> Self {
        Self {
            lat: lat_deg.to_radians(),
            lon: lon_deg.to_radians(),
            height,
        }
    }

    pub fn lat_deg(&self) -> f64 {
        self.lat.to_degrees()
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon.to_degrees()
    }
}

/// Convert an ECEF position (meters) to geodetic coordinates.
///
/// Iterative Bowring-style inversion: the z-correction is refined until
/// successive estimates differ by less than 0.1 mm. Points on the polar
/// axis (x² + y² ≈ 0) map to ±90° latitude and 0° longitude.
pub fn ecef_to_geodetic(r: [f64; 3]) -> Geodetic {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let r2 = r[0] * r[0] + r[1] * r[1];

    let mut v = WGS84_A;
    let mut z = r[2];
    let mut zk = 0.0;
    while (z - zk).abs() >= Z_CONVERGENCE_M {
        zk = z;
        let sinp = z / (r2 + z * z).sqrt();
        v = WGS84_A / (1.0 - e2 * sinp * sinp).sqrt();
        z = r[2] + v * e2 * sinp;
    }

    let lat = if r2 > 1e-12 {
        (z / r2.sqrt()).atan()
    } else if r[2] > 0.0 {
        FRAC_PI_2
    } else if r[2] < 0.0 {
        -FRAC_PI_2
    } else {
        0.0
    };
    let lon = if r2 > 1e-12 { r[1].atan2(r[0]) } else { 0.0 };

    Geodetic {
        lat,
        lon,
        height: (r2 + z * z).sqrt() - v,
    }
}

/// Convert a geodetic position to ECEF (meters). Closed form.
pub fn geodetic_to_ecef(pos: Geodetic) -> [f64; 3] {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let (sinp, cosp) = pos.lat.sin_cos();
    let (sinl, cosl) = pos.lon.sin_cos();
    let v = WGS84_A / (1.0 - e2 * sinp * sinp).sqrt();
    [
        (v + pos.height) * cosp * cosl,
        (v + pos.height) * cosp * sinl,
        (v * (1.0 - e2) + pos.height) * sinp,
    ]
}

/// Euclidean norm of a 3-vector
pub fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Dot product of two 3-vectors
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Scale a 3-vector to unit length. The caller must ensure a non-zero norm.
pub fn unit(v: [f64; 3]) -> [f64; 3] {
    let n = norm(v);
    [v[0] / n, v[1] / n, v[2] / n]
}

/// Angular distance in radians between two unit vectors.
///
/// The dot product is clamped to [-1, 1] so that identical or antipodal
/// vectors perturbed by floating round-off never produce NaN.
pub fn angular_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    dot(a, b).clamp(-1.0, 1.0).acos()
}
