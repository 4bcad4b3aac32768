use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::GisError;

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// GRS 1980 ellipsoid (NAD 83).
const GRS80_SEMI_MAJOR_M: f64 = 6_378_137.0;
const GRS80_INVERSE_FLATTENING: f64 = 298.257_222_101;

/// US survey foot in meters.
const US_SURVEY_FOOT_M: f64 = 1200.0 / 3937.0;

/// NAD 1983 StatePlane Colorado North FIPS 0501, Lambert conformal conic with two
/// standard parallels. Angles in degrees, false origin in US survey feet.
const CO_NORTH_STANDARD_PARALLEL_1: f64 = 40.0 + 47.0 / 60.0;
const CO_NORTH_STANDARD_PARALLEL_2: f64 = 39.0 + 43.0 / 60.0;
const CO_NORTH_ORIGIN_LAT: f64 = 39.0 + 20.0 / 60.0;
const CO_NORTH_CENTRAL_MERIDIAN: f64 = -105.5;
const CO_NORTH_FALSE_EASTING_FT: f64 = 3_000_000.0;
const CO_NORTH_FALSE_NORTHING_FT: f64 = 1_000_000.0;

/// Coordinate systems the map and geodatabase understand, keyed by EPSG WKID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SpatialReference {
    /// Geographic WGS 84 (EPSG:4326), degrees.
    #[default]
    Wgs84,
    /// Spherical Web Mercator (EPSG:3857), meters.
    WebMercator,
    /// NAD 1983 StatePlane Colorado North FIPS 0501 (EPSG:2231), US survey feet.
    ColoradoNorth,
}

impl SpatialReference {
    pub const fn wkid(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
            Self::ColoradoNorth => 2231,
        }
    }

    pub fn from_wkid(wkid: u32) -> Result<Self, GisError> {
        match wkid {
            4326 => Ok(Self::Wgs84),
            3857 | 102100 => Ok(Self::WebMercator),
            // 2876 is the HARN realization; same projection parameters
            2231 | 2876 => Ok(Self::ColoradoNorth),
            other => Err(GisError::UnsupportedSpatialReference(other)),
        }
    }

    /// Converts a longitude/latitude pair into this reference's units.
    pub fn project(self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::Wgs84 => (lon, lat),
            Self::WebMercator => {
                let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
                let x = EARTH_RADIUS_M * lon.to_radians();
                let y = EARTH_RADIUS_M * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Self::ColoradoNorth => LambertConic::colorado_north().forward(lon, lat),
        }
    }

    /// Inverse of [`SpatialReference::project`].
    pub fn unproject(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Wgs84 => (x, y),
            Self::WebMercator => {
                let lon = (x / EARTH_RADIUS_M).to_degrees();
                let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
                (lon, lat)
            }
            Self::ColoradoNorth => LambertConic::colorado_north().inverse(x, y),
        }
    }

    /// Reprojects a coordinate from `self` into `target`.
    pub fn transform_to(self, target: SpatialReference, x: f64, y: f64) -> (f64, f64) {
        if self == target {
            return (x, y);
        }
        let (lon, lat) = self.unproject(x, y);
        target.project(lon, lat)
    }

    /// Padding applied around a degenerate extent (a single point), in map units.
    pub(crate) const fn minimum_extent(self) -> f64 {
        match self {
            Self::Wgs84 => 0.01,
            Self::WebMercator => 1_000.0,
            Self::ColoradoNorth => 3_000.0,
        }
    }
}

/// Ellipsoidal Lambert conformal conic (2SP), after Snyder, *Map Projections: A Working
/// Manual*, eq. 15-1 to 15-11. Projected units are set by `unit_m`.
#[derive(Debug, Clone, Copy)]
struct LambertConic {
    e: f64,
    n: f64,
    a_f: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
    unit_m: f64,
}

impl LambertConic {
    fn colorado_north() -> Self {
        Self::new(
            CO_NORTH_STANDARD_PARALLEL_1,
            CO_NORTH_STANDARD_PARALLEL_2,
            CO_NORTH_ORIGIN_LAT,
            CO_NORTH_CENTRAL_MERIDIAN,
            (CO_NORTH_FALSE_EASTING_FT, CO_NORTH_FALSE_NORTHING_FT),
            US_SURVEY_FOOT_M,
        )
    }

    fn new(
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_origin: (f64, f64),
        unit_m: f64,
    ) -> Self {
        let f = 1.0 / GRS80_INVERSE_FLATTENING;
        let e = (2.0 * f - f * f).sqrt();
        let m = |lat: f64| {
            let phi = lat.to_radians();
            phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt()
        };
        let (m1, m2) = (m(lat1), m(lat2));
        let (t1, t2) = (iso_t(e, lat1.to_radians()), iso_t(e, lat2.to_radians()));
        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let a_f = GRS80_SEMI_MAJOR_M * m1 / (n * t1.powf(n));
        let rho0 = a_f * iso_t(e, lat0.to_radians()).powf(n);
        Self {
            e,
            n,
            a_f,
            rho0,
            lon0: lon0.to_radians(),
            false_easting: false_origin.0 * unit_m,
            false_northing: false_origin.1 * unit_m,
            unit_m,
        }
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let rho = self.a_f * iso_t(self.e, lat.to_radians()).powf(self.n);
        let theta = self.n * (lon.to_radians() - self.lon0);
        let x = self.false_easting + rho * theta.sin();
        let y = self.false_northing + self.rho0 - rho * theta.cos();
        (x / self.unit_m, y / self.unit_m)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x * self.unit_m - self.false_easting;
        let dy = self.rho0 - (y * self.unit_m - self.false_northing);
        let rho = self.n.signum() * dx.hypot(dy);
        let theta = (self.n.signum() * dx).atan2(self.n.signum() * dy);
        let t = (rho / self.a_f).powf(1.0 / self.n);

        let mut phi = PI / 2.0 - 2.0 * t.atan();
        for _ in 0..15 {
            let esin = self.e * phi.sin();
            let next =
                PI / 2.0 - 2.0 * (t * ((1.0 - esin) / (1.0 + esin)).powf(self.e / 2.0)).atan();
            let converged = (next - phi).abs() < 1e-12;
            phi = next;
            if converged {
                break;
            }
        }
        ((theta / self.n + self.lon0).to_degrees(), phi.to_degrees())
    }
}

fn iso_t(e: f64, phi: f64) -> f64 {
    let esin = e * phi.sin();
    (PI / 4.0 - phi / 2.0).tan() / ((1.0 - esin) / (1.0 + esin)).powf(e / 2.0)
}

impl TryFrom<u32> for SpatialReference {
    type Error = GisError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_wkid(value)
    }
}

impl From<SpatialReference> for u32 {
    fn from(value: SpatialReference) -> Self {
        value.wkid()
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.wkid())
    }
}
