//! Coordinates and conversions
//!
//! The estimation pipeline works in WGS84 Earth Centered, Earth Fixed
//! Cartesian coordinates throughout. Geodetic coordinates are needed for the
//! troposphere model, the local-level rotation and the output stage:
//!  * [`ECEF`] - Cartesian coordinates, Earth Centered, Earth Fixed
//!  * [`LLHRadians`] - Geodetic coordinates, Latitude Longitude Height
//!  * [`NEU`] - Local direction coordinates, North East Up
//!  * [`AzimuthElevation`] - Relative direction coordinates, Azimuth Elevation

use nalgebra::{Matrix3, Vector3};
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// WGS84 semi-major axis, m
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = 6.694_379_990_14e-3;
/// Earth rotation rate, rad/s
pub const OMEGA_EARTH: f64 = 7.292_115_146_7e-5;

/// WGS84 Earth Centered, Earth Fixed (ECEF) Cartesian coordinates (X, Y, Z).
///
/// Internally stored as an array of 3 [`f64`] values: x, y, z all in meters
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct ECEF(Vector3<f64>);

impl ECEF {
    /// Create an [`ECEF`] object from the given X, Y, Z components
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> ECEF {
        ECEF(Vector3::new(x, y, z))
    }

    /// Create an [`ECEF`] object from a [`nalgebra::Vector3<f64>`]
    #[must_use]
    pub fn from_vector3(vector: Vector3<f64>) -> ECEF {
        ECEF(vector)
    }

    /// Get a reference to the inner [`Vector3<f64>`]
    #[must_use]
    pub fn as_vector_ref(&self) -> &Vector3<f64> {
        &self.0
    }

    /// Get the X component
    #[must_use]
    pub fn x(&self) -> f64 {
        self.0[0]
    }

    /// Get the Y component
    #[must_use]
    pub fn y(&self) -> f64 {
        self.0[1]
    }

    /// Get the Z component
    #[must_use]
    pub fn z(&self) -> f64 {
        self.0[2]
    }

    /// Euclidean distance from the geocenter
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.0.norm()
    }

    /// Converts a [`ECEF`] position into a [`LLHRadians`] position.
    ///
    /// Uses the classic Bowring fixed point iteration on the latitude, which
    /// converges to well below a millimeter in a handful of rounds for any
    /// terrestrial point.
    #[must_use]
    pub fn to_llh(&self) -> LLHRadians {
        let p = (self.x() * self.x() + self.y() * self.y()).sqrt();
        let lon = self.y().atan2(self.x());

        if p < 1e-9 {
            // on the rotation axis
            let lat = if self.z() >= 0.0 {
                std::f64::consts::FRAC_PI_2
            } else {
                -std::f64::consts::FRAC_PI_2
            };
            let b = WGS84_A * (1.0 - WGS84_E2).sqrt();
            return LLHRadians::new(lat, lon, self.z().abs() - b);
        }

        let mut lat = (self.z() / p / (1.0 - WGS84_E2)).atan();
        let mut height = 0.0;
        for _ in 0..6 {
            let sin_lat = lat.sin();
            let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
            height = p / lat.cos() - n;
            lat = (self.z() / p / (1.0 - WGS84_E2 * n / (n + height))).atan();
        }
        LLHRadians::new(lat, lon, height)
    }

    /// Rotate the vector from this point to `point` into the local
    /// north/east/up frame at this point
    #[must_use]
    pub fn neu_to(&self, point: &ECEF) -> NEU {
        let d = point.0 - self.0;
        NEU(self.to_llh().rotation_to_neu() * d)
    }

    /// Determine the [`AzimuthElevation`] of `point` as seen from this point
    #[must_use]
    pub fn azel_to(&self, point: &ECEF) -> AzimuthElevation {
        let neu = self.neu_to(point);
        let mut az = neu.e().atan2(neu.n());
        if az < 0.0 {
            az += 2.0 * std::f64::consts::PI;
        }
        let el = neu.u().atan2((neu.n() * neu.n() + neu.e() * neu.e()).sqrt());
        AzimuthElevation { az, el }
    }
}

impl Add for ECEF {
    type Output = ECEF;
    fn add(self, rhs: ECEF) -> ECEF {
        ECEF(self.0 + rhs.0)
    }
}

impl AddAssign for ECEF {
    fn add_assign(&mut self, rhs: ECEF) {
        self.0 += rhs.0;
    }
}

impl Sub for ECEF {
    type Output = ECEF;
    fn sub(self, rhs: ECEF) -> ECEF {
        ECEF(self.0 - rhs.0)
    }
}

impl SubAssign for ECEF {
    fn sub_assign(&mut self, rhs: ECEF) {
        self.0 -= rhs.0;
    }
}

impl Mul<ECEF> for f64 {
    type Output = ECEF;
    fn mul(self, rhs: ECEF) -> ECEF {
        ECEF(self * rhs.0)
    }
}

/// WGS84 geodetic coordinates, latitude and longitude in radians and height
/// above the ellipsoid in meters
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct LLHRadians {
    lat: f64,
    lon: f64,
    height: f64,
}

impl LLHRadians {
    /// Create an [`LLHRadians`] object from the given components
    #[must_use]
    pub fn new(lat: f64, lon: f64, height: f64) -> LLHRadians {
        LLHRadians { lat, lon, height }
    }

    /// Get the latitude component, radians
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.lat
    }

    /// Get the longitude component, radians
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.lon
    }

    /// Get the height component, meters
    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Converts a [`LLHRadians`] position into a [`ECEF`] position
    #[must_use]
    pub fn to_ecef(&self) -> ECEF {
        let sin_lat = self.lat.sin();
        let cos_lat = self.lat.cos();
        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        ECEF::new(
            (n + self.height) * cos_lat * self.lon.cos(),
            (n + self.height) * cos_lat * self.lon.sin(),
            ((1.0 - WGS84_E2) * n + self.height) * sin_lat,
        )
    }

    /// Rotation matrix taking an ECEF difference vector into the local
    /// north/east/up frame at this point
    #[must_use]
    pub fn rotation_to_neu(&self) -> Matrix3<f64> {
        let (sin_lat, cos_lat) = (self.lat.sin(), self.lat.cos());
        let (sin_lon, cos_lon) = (self.lon.sin(), self.lon.cos());
        Matrix3::new(
            -sin_lat * cos_lon,
            -sin_lat * sin_lon,
            cos_lat,
            -sin_lon,
            cos_lon,
            0.0,
            cos_lat * cos_lon,
            cos_lat * sin_lon,
            sin_lat,
        )
    }
}

/// Local-level coordinates relative to a reference point, North East Up,
/// all in meters
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct NEU(Vector3<f64>);

impl NEU {
    /// Create an [`NEU`] object from the given components
    #[must_use]
    pub fn new(n: f64, e: f64, u: f64) -> NEU {
        NEU(Vector3::new(n, e, u))
    }

    /// Get the north component
    #[must_use]
    pub fn n(&self) -> f64 {
        self.0[0]
    }

    /// Get the east component
    #[must_use]
    pub fn e(&self) -> f64 {
        self.0[1]
    }

    /// Get the up component
    #[must_use]
    pub fn u(&self) -> f64 {
        self.0[2]
    }

    /// The components as a plain array, in north/east/up order
    #[must_use]
    pub fn to_array(self) -> [f64; 3] {
        [self.n(), self.e(), self.u()]
    }
}

/// WGS84 local horizontal coordinates consisting of an Azimuth and Elevation,
/// with angles stored as radians
///
/// Azimuth can range from $0$ to $2\pi$, north has an azimuth of $0$.
/// Elevation can range from $-\frac{\pi}{2}$ to $\frac{\pi}{2}$.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct AzimuthElevation {
    az: f64,
    el: f64,
}

impl AzimuthElevation {
    /// Create an [`AzimuthElevation`] object from the given azimuth and elevation
    #[must_use]
    pub fn new(az: f64, el: f64) -> AzimuthElevation {
        AzimuthElevation { az, el }
    }

    /// Get the Azimuth component
    #[must_use]
    pub fn az(&self) -> f64 {
        self.az
    }

    /// Get the Elevation component
    #[must_use]
    pub fn el(&self) -> f64 {
        self.el
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    const D2R: f64 = std::f64::consts::PI / 180.0;

    #[test]
    fn llh_ecef_roundtrip() {
        let llh = LLHRadians::new(37.779804 * D2R, -122.391751 * D2R, 60.0);
        let ecef = llh.to_ecef();
        let back = ecef.to_llh();

        assert_float_eq!(back.latitude(), llh.latitude(), abs <= 1e-11);
        assert_float_eq!(back.longitude(), llh.longitude(), abs <= 1e-11);
        assert_float_eq!(back.height(), llh.height(), abs <= 1e-4);
    }

    #[test]
    fn equator_and_poles() {
        let b = WGS84_A * (1.0 - WGS84_E2).sqrt();

        let on_equator = ECEF::new(WGS84_A, 0.0, 0.0).to_llh();
        assert_float_eq!(on_equator.latitude(), 0.0, abs <= 1e-12);
        assert_float_eq!(on_equator.height(), 0.0, abs <= 1e-6);

        let north_pole = ECEF::new(0.0, 0.0, b + 22.0).to_llh();
        assert_float_eq!(north_pole.latitude(), 90.0 * D2R, abs <= 1e-9);
        assert_float_eq!(north_pole.height(), 22.0, abs <= 1e-6);
    }

    #[test]
    fn azel_of_zenith_satellite() {
        // a satellite straight above a point on the equator
        let rover = ECEF::new(WGS84_A, 0.0, 0.0);
        let sat = ECEF::new(WGS84_A + 2.0e7, 0.0, 0.0);
        let azel = rover.azel_to(&sat);
        assert_float_eq!(azel.el(), 90.0 * D2R, abs <= 1e-9);
    }

    #[test]
    fn neu_axes() {
        let rover = ECEF::new(WGS84_A, 0.0, 0.0);
        // a point slightly to the geographic east
        let east = ECEF::new(WGS84_A, 100.0, 0.0);
        let neu = rover.neu_to(&east);
        assert_float_eq!(neu.e(), 100.0, abs <= 1e-6);
        assert_float_eq!(neu.n(), 0.0, abs <= 1e-6);

        // and to the north
        let north = ECEF::new(WGS84_A, 0.0, 100.0);
        let neu = rover.neu_to(&north);
        assert_float_eq!(neu.n(), 100.0, abs <= 1e-6);
        assert_float_eq!(neu.e(), 0.0, abs <= 1e-6);
    }
}
