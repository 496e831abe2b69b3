use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::domain::geo::{CheckInPoint, is_location_check_in_eligible};

/// Progress of turning a department's street address into coordinates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GpsStatus {
    #[default]
    Unconverted,
    Converted,
    Failed,
}

/// Raw `departments` row.
#[derive(Debug, sqlx::FromRow)]
pub struct DepartmentRow {
    pub id: u64,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_meters: Option<u32>,
    pub gps_status: String,
    /// comma separated
    pub allowed_ips: Option<String>,
    pub disabled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: u64,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_meters: Option<u32>,
    pub gps_status: GpsStatus,
    pub allowed_ips: Vec<IpAddr>,
    pub disabled_at: Option<DateTime<Utc>>,
}

impl Department {
    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }

    /// The department as a GPS check-in point, if it is usable as one.
    pub fn check_in_point(&self) -> Option<CheckInPoint> {
        if !is_location_check_in_eligible(self) {
            return None;
        }
        Some(CheckInPoint {
            id: self.id,
            name: self.name.clone(),
            latitude: self.latitude?,
            longitude: self.longitude?,
            radius_meters: self.radius_meters,
            disabled_at: self.disabled_at,
        })
    }
}

/// Parses the stored allow-list, skipping entries that are not addresses.
pub fn parse_allowed_ips(department_id: u64, raw: &str) -> Vec<IpAddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!(department_id, entry = s, "Ignoring invalid allowed IP");
                None
            }
        })
        .collect()
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        let gps_status = row.gps_status.parse().unwrap_or_else(|_| {
            tracing::warn!(
                department_id = row.id,
                gps_status = %row.gps_status,
                "Unknown GPS status, treating as unconverted"
            );
            GpsStatus::Unconverted
        });

        Self {
            allowed_ips: row
                .allowed_ips
                .as_deref()
                .map(|raw| parse_allowed_ips(row.id, raw))
                .unwrap_or_default(),
            id: row.id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            radius_meters: row.radius_meters,
            gps_status,
            disabled_at: row.disabled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(gps_status: &str, allowed_ips: Option<&str>) -> DepartmentRow {
        DepartmentRow {
            id: 3,
            name: "Branch".into(),
            latitude: Some(23.7),
            longitude: Some(90.3),
            radius_meters: Some(200),
            gps_status: gps_status.into(),
            allowed_ips: allowed_ips.map(Into::into),
            disabled_at: None,
        }
    }

    #[test]
    fn converted_row_becomes_check_in_point() {
        let department = Department::from(row("converted", None));
        assert_eq!(department.gps_status, GpsStatus::Converted);
        let point = department.check_in_point().unwrap();
        assert_eq!(point.id, 3);
        assert_eq!(point.radius_meters, Some(200));
    }

    #[test]
    fn unknown_status_is_unconverted() {
        let department = Department::from(row("geocoding", None));
        assert_eq!(department.gps_status, GpsStatus::Unconverted);
        assert!(department.check_in_point().is_none());
    }

    #[test]
    fn allowed_ips_skip_garbage() {
        let department = Department::from(row("converted", Some("10.0.0.1, nope,,2001:db8::1")));
        assert_eq!(
            department.allowed_ips,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "2001:db8::1".parse::<IpAddr>().unwrap()
            ]
        );
    }
}
