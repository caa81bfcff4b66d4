//! Station master data: eva number to name and location.
//!
//! Realtime messages identify a station only by its eva number. Matching
//! a trip against the schedule also needs the station's name and
//! coordinates, which come from the StaDa station dataset, fetched from
//! the API at startup or loaded from a previously saved file.

pub mod client;

use std::collections::HashMap;
use std::path::Path;

use geo::Point;
use tracing::debug;

use crate::domain::EvaNumber;

pub use client::{StadaClient, StadaClientConfig, StadaResponse, StadaStation};

/// Errors from fetching or loading station master data.
#[derive(Debug, thiserror::Error)]
pub enum StationsError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication failed
    #[error("unauthorized: check STADA_CLIENT_ID and STADA_API_KEY")]
    Unauthorized,

    /// API returned an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to read a saved dataset
    #[error("could not read station dataset: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the dataset JSON
    #[error("could not parse station dataset: {0}")]
    Json(#[from] serde_json::Error),
}

/// Normalizes a stop name for comparison across datasets.
pub fn normalize_stop_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One station, as the matcher needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub eva: EvaNumber,
    pub name: String,
    pub normalized_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Station {
    pub fn coordinates(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Immutable eva number lookup built once at startup.
pub struct StationTable {
    by_eva: HashMap<EvaNumber, Station>,
}

impl StationTable {
    pub fn new(stations: impl IntoIterator<Item = Station>) -> Self {
        Self {
            by_eva: stations
                .into_iter()
                .map(|station| (station.eva, station))
                .collect(),
        }
    }

    pub fn get(&self, eva: EvaNumber) -> Option<&Station> {
        self.by_eva.get(&eva)
    }

    pub fn len(&self) -> usize {
        self.by_eva.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_eva.is_empty()
    }

    /// Builds the table from a StaDa dataset. A station record can carry
    /// several eva numbers; each becomes its own entry. Numbers without
    /// usable coordinates cannot take part in location matching and are
    /// skipped.
    pub fn from_dataset(dataset: &StadaResponse) -> Self {
        let mut by_eva = HashMap::new();
        for station in &dataset.result {
            for eva in &station.eva_numbers {
                let Some(location) = &eva.geographic_coordinates else {
                    debug!(
                        name = %station.name,
                        number = eva.number,
                        "station without coordinates skipped",
                    );
                    continue;
                };
                // GeoJSON point order: longitude first.
                let [longitude, latitude, ..] = location.coordinates[..] else {
                    debug!(
                        name = %station.name,
                        number = eva.number,
                        "station with malformed coordinates skipped",
                    );
                    continue;
                };
                by_eva.insert(
                    EvaNumber::new(eva.number),
                    Station {
                        eva: EvaNumber::new(eva.number),
                        name: station.name.clone(),
                        normalized_name: normalize_stop_name(&station.name),
                        latitude,
                        longitude,
                    },
                );
            }
        }
        Self { by_eva }
    }

    /// Loads a previously saved dataset from disk.
    pub fn from_dataset_file(path: &Path) -> Result<Self, StationsError> {
        let raw = std::fs::read_to_string(path)?;
        let dataset: StadaResponse = serde_json::from_str(&raw)?;
        Ok(Self::from_dataset(&dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_normalize_by_trimming_and_lowercasing() {
        assert_eq!(normalize_stop_name("  Tapfheim "), "tapfheim");
        assert_eq!(normalize_stop_name("München Hbf"), "münchen hbf");
        assert_eq!(normalize_stop_name(""), "");
    }

    fn dataset() -> StadaResponse {
        serde_json::from_str(
            r#"{
                "result": [
                    {
                        "name": "Tapfheim",
                        "evaNumbers": [
                            {
                                "number": 8000001,
                                "geographicCoordinates": {
                                    "type": "Point",
                                    "coordinates": [10.7055, 48.6775]
                                }
                            }
                        ]
                    },
                    {
                        "name": "Nowhere",
                        "evaNumbers": [{"number": 8000002}]
                    },
                    {
                        "name": "No eva numbers at all"
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn dataset_entries_without_coordinates_are_skipped() {
        let table = StationTable::from_dataset(&dataset());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(EvaNumber::new(8_000_002)), None);

        let station = table.get(EvaNumber::new(8_000_001)).unwrap();
        assert_eq!(station.name, "Tapfheim");
        assert_eq!(station.normalized_name, "tapfheim");
        assert_eq!(station.latitude, 48.6775);
        assert_eq!(station.longitude, 10.7055);
        assert_eq!(station.coordinates(), Point::new(10.7055, 48.6775));
    }

    #[test]
    fn saved_datasets_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.json");
        std::fs::write(
            &path,
            r#"{"result": [{"name": "Tapfheim", "evaNumbers": [{"number": 8000001, "geographicCoordinates": {"type": "Point", "coordinates": [10.7055, 48.6775]}}]}]}"#,
        )
        .unwrap();

        let table = StationTable::from_dataset_file(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }

    #[test]
    fn broken_dataset_files_are_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StationTable::from_dataset_file(&path),
            Err(StationsError::Json(_))
        ));
    }
}
