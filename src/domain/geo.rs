use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::department::{Department, GpsStatus};

/// Mean Earth radius used for geofencing, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and on the globe: latitude in [-90, 90], longitude in [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// An administrator-defined location employees may check in from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckInPoint {
    #[schema(example = 10)]
    pub id: u64,
    #[schema(example = "Head office")]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Allowed radius around the point. Absent means nothing is ever in range.
    #[schema(example = 150, nullable = true)]
    pub radius_meters: Option<u32>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl CheckInPoint {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }
}

/// Whole meters, rounded to the nearest meter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize, ToSchema,
)]
#[display(fmt = "{} m", _0)]
#[serde(transparent)]
pub struct Meters(pub u64);

impl Meters {
    pub fn from_f64(meters: f64) -> Self {
        Meters(meters.round() as u64)
    }
}

/// A check-in point offered to the resolver, with the distance already
/// measured if the caller has one.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub point: CheckInPoint,
    pub distance: Option<Meters>,
}

impl Candidate {
    pub fn measured(point: CheckInPoint, distance: Meters) -> Self {
        Self {
            point,
            distance: Some(distance),
        }
    }
}

impl From<CheckInPoint> for Candidate {
    fn from(point: CheckInPoint) -> Self {
        Self {
            point,
            distance: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Consider points whose `disabled_at` is set.
    pub include_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Resolution {
    /// No position has been acquired yet.
    Locating,
    /// Nothing to check in against.
    NoPoints,
    Resolved {
        nearest: CheckInPoint,
        distance: Meters,
        in_range: bool,
    },
}

impl Resolution {
    pub fn permits_check_in(&self) -> bool {
        matches!(self, Resolution::Resolved { in_range: true, .. })
    }
}

/// Great-circle distance between two points in meters (haversine).
pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    // rounding can push h a hair past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Picks the closest candidate to `position` and reports whether the user is
/// inside its radius.
///
/// Ties go to the earliest candidate. Candidates whose distance cannot be
/// computed (non-finite coordinates) are skipped.
pub fn resolve_nearest_point(
    position: Option<GeoPoint>,
    candidates: &[Candidate],
    options: ResolveOptions,
) -> Resolution {
    let Some(position) = position else {
        return Resolution::Locating;
    };

    let mut best: Option<(&CheckInPoint, Meters)> = None;

    for candidate in candidates {
        if candidate.point.is_disabled() && !options.include_disabled {
            continue;
        }

        let distance = match candidate.distance {
            Some(d) => d,
            None => {
                let d = haversine_distance(position, candidate.point.location());
                if !d.is_finite() {
                    continue;
                }
                Meters::from_f64(d)
            }
        };

        if best.map_or(true, |(_, current)| distance < current) {
            best = Some((&candidate.point, distance));
        }
    }

    match best {
        None => Resolution::NoPoints,
        Some((point, distance)) => Resolution::Resolved {
            in_range: distance.0 <= u64::from(point.radius_meters.unwrap_or(0)),
            nearest: point.clone(),
            distance,
        },
    }
}

/// A department can serve as a GPS check-in point only once its address has
/// been converted to coordinates and both coordinates are usable.
pub fn is_location_check_in_eligible(department: &Department) -> bool {
    department.gps_status == GpsStatus::Converted
        && matches!(department.latitude, Some(lat) if lat.is_finite())
        && matches!(department.longitude, Some(lon) if lon.is_finite())
}
