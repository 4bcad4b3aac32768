use std::cell::Cell;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{Coordinate, GeocodeError, Geocoder};

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: Url,
    pub user_agent: String,
    pub timeout: Duration,
    /// Minimum spacing between requests. The public endpoint allows one per second.
    pub throttle: Duration,
}

/// Blocking client for the Nominatim `/search` endpoint.
#[derive(Debug)]
pub struct NominatimGeocoder {
    client: Client,
    config: NominatimConfig,
    last_request: Cell<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(config: NominatimConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Cell::new(None),
        })
    }

    fn wait_for_slot(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.config.throttle {
                std::thread::sleep(self.config.throttle - elapsed);
            }
        }
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError> {
        self.wait_for_slot();
        debug!(address, "querying nominatim");

        let response = self
            .client
            .get(self.config.base_url.clone())
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send();
        self.last_request.set(Some(Instant::now()));

        let response = response?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let places: Vec<Place> = response
            .json()
            .map_err(|err| GeocodeError::InvalidResponse(err.to_string()))?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        parse_place(&place).map(Some)
    }
}

fn parse_place(place: &Place) -> Result<Coordinate, GeocodeError> {
    let parse = |label: &str, raw: &str| {
        raw.trim()
            .trim_matches(['\'', '"'])
            .parse::<f64>()
            .map_err(|_| GeocodeError::InvalidResponse(format!("{label} '{raw}' is not a number")))
    };
    let latitude = parse("lat", &place.lat)?;
    let longitude = parse("lon", &place.lon)?;

    Coordinate::new(latitude, longitude).ok_or_else(|| {
        GeocodeError::InvalidResponse(format!(
            "coordinate out of range: {latitude}, {longitude}"
        ))
    })
}
