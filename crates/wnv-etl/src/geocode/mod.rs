mod nominatim;

pub use nominatim::{NominatimConfig, NominatimGeocoder, DEFAULT_NOMINATIM_URL};

use std::fmt::Debug;

/// A WGS 84 position. Construction through [`Coordinate::new`] guarantees valid ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoding service answered with HTTP {0}")]
    Status(u16),
    #[error("unexpected geocoding response: {0}")]
    InvalidResponse(String),
}

/// Resolves a free-text address to a coordinate.
///
/// `Ok(None)` means the service answered but found no match; `Err` covers transport and
/// protocol failures. Callers treat both as an unresolved address.
pub trait Geocoder: Debug {
    fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError>;
}

impl<G: Geocoder + ?Sized> Geocoder for &G {
    fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError> {
        (**self).geocode(address)
    }
}
