//! Deterministic fixtures for tests and demos.
//!
//! Records are laid out around central London with a spread of distances,
//! statuses and types so that radius, filter and ordering behaviour can be
//! asserted without a real backend.

use serde_json::json;

use crate::{geo::GeoPoint, record::Record};

/// Trafalgar Square area, the reference centre for the fixtures.
pub const LONDON: GeoPoint = GeoPoint {
    lat: 51.5074,
    lng: -0.1278,
};

/// Configuration for [`scatter`].
#[derive(Debug, Clone)]
pub struct ScatterConfig {
    pub center: GeoPoint,
    pub count: usize,
    pub max_radius_km: f64,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            center: LONDON,
            count: 200,
            max_radius_km: 10.0,
        }
    }
}

/// Hand-placed records around [`LONDON`].
pub fn london_records() -> Vec<Record> {
    let rows = [
        ("ldn-001", 51.5080, -0.1281, "active", "mast", "lattice", "Charing Cross rooftop"),
        ("ldn-002", 51.5101, -0.1340, "active", "rooftop", "monopole", "Piccadilly Circus"),
        ("ldn-003", 51.5033, -0.1196, "pending", "mast", "lattice", "South Bank"),
        ("ldn-004", 51.5155, -0.1419, "active", "streetworks", "small-cell", "Oxford Circus"),
        ("ldn-005", 51.4995, -0.1248, "decommissioned", "mast", "monopole", "Westminster"),
        ("ldn-006", 51.5194, -0.1270, "active", "rooftop", "lattice", "Bloomsbury"),
        ("ldn-007", 51.4946, -0.1003, "active", "mast", "lattice", "Elephant and Castle"),
        ("ldn-008", 51.5287, -0.0836, "pending", "rooftop", "monopole", "Shoreditch"),
        ("ldn-009", 51.4613, -0.1156, "active", "mast", "lattice", "Brixton"),
        ("ldn-010", 51.5450, -0.0553, "active", "streetworks", "small-cell", "Hackney"),
        ("ldn-011", 51.5560, -0.2795, "active", "mast", "lattice", "Wembley"),
        ("ldn-012", 51.4700, -0.4543, "active", "mast", "monopole", "Heathrow"),
    ];

    rows.into_iter()
        .map(|(id, lat, lng, status, kind, class, title)| {
            Record::new(id, GeoPoint { lat, lng })
                .with_field("status", status)
                .with_field("type", kind)
                .with_field("classification", class)
                .with_field("title", title)
                .with_field("address", format!("{title}, London"))
                .with_field("operator", "Example Networks")
                .with_field("coordinates", json!({ "lat": lat, "lng": lng }))
        })
        .collect()
}

/// Spread `count` records on a spiral out to `max_radius_km` from the centre.
///
/// The layout is deterministic, so tests can rely on record counts per radius.
pub fn scatter(config: &ScatterConfig) -> Vec<Record> {
    let statuses = ["active", "pending", "decommissioned"];
    let kinds = ["mast", "rooftop", "streetworks"];
    let count = config.count.max(1);

    (0..config.count)
        .map(|i| {
            let fraction = (i + 1) as f64 / count as f64;
            let distance_km = config.max_radius_km * fraction;
            let bearing = (i as f64 * 137.508).to_radians();
            let d_lat = distance_km * bearing.cos() / crate::geo::KM_PER_DEGREE;
            let d_lng = distance_km * bearing.sin()
                / (crate::geo::KM_PER_DEGREE * config.center.lat.to_radians().cos().max(0.01));
            let location = GeoPoint {
                lat: (config.center.lat + d_lat).clamp(-90.0, 90.0),
                lng: (config.center.lng + d_lng).clamp(-180.0, 180.0),
            };
            Record::new(format!("scatter-{i:04}"), location)
                .with_field("status", statuses[i % statuses.len()])
                .with_field("type", kinds[i % kinds.len()])
                .with_field("title", format!("Site {i}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_km;

    #[test]
    fn test_london_records_are_valid() {
        let records = london_records();
        assert_eq!(records.len(), 12);
        assert!(records.iter().all(|r| r.location.is_valid()));
    }

    #[test]
    fn test_scatter_stays_within_radius() {
        let config = ScatterConfig {
            count: 50,
            max_radius_km: 4.0,
            ..Default::default()
        };
        let records = scatter(&config);
        assert_eq!(records.len(), 50);
        for r in &records {
            assert!(haversine_km(&config.center, &r.location) <= 4.0 + 0.05);
        }
    }
}
