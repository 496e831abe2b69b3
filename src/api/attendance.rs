use std::net::IpAddr;

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::domain::geo::{
    Candidate, CheckInPoint, GeoPoint, Meters, ResolveOptions, Resolution, resolve_nearest_point,
};
use crate::domain::ip::is_ip_check_in_allowed;
use crate::error::ApiError;
use crate::model::attendance::CheckInMethod;
use crate::model::department::Department;
use crate::repo::attendance::{self as repo, CheckInOutcome};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    #[schema(example = "gps")]
    pub method: CheckInMethod,
    /// Required for GPS check-in
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NearestQuery {
    /// Current latitude, omit while the device is still locating
    pub latitude: Option<f64>,
    /// Current longitude
    pub longitude: Option<f64>,
}

fn invalid_position(point: GeoPoint) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid location ({}, {}): latitude must be within -90..90 and longitude within -180..180",
        point.latitude, point.longitude
    ))
}

/// The reported position, `None` while either coordinate is missing.
fn position(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<GeoPoint>, ApiError> {
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Ok(None);
    };
    let point = GeoPoint::new(latitude, longitude);
    if !point.is_valid() {
        return Err(invalid_position(point));
    }
    Ok(Some(point))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NearestState {
    Locating,
    NoPoints,
    /// The employee's departments have no usable coordinates yet.
    Unavailable,
    Resolved,
}

impl From<&Resolution> for NearestState {
    fn from(resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Locating => NearestState::Locating,
            Resolution::NoPoints => NearestState::NoPoints,
            Resolution::Resolved { .. } => NearestState::Resolved,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct NearestPointResponse {
    pub state: NearestState,
    pub nearest: Option<CheckInPoint>,
    #[schema(example = 87, nullable = true)]
    pub distance_meters: Option<u64>,
    #[schema(example = true, nullable = true)]
    pub in_range: Option<bool>,
    #[schema(example = "You are 87 m from Head office, within the allowed 150 m")]
    pub message: String,
}

fn candidates(departments: &[Department]) -> Vec<Candidate> {
    departments
        .iter()
        .filter_map(Department::check_in_point)
        .map(Candidate::from)
        .collect()
}

const GPS_NOT_SET_UP: &str =
    "Location check-in is not set up for your department yet, contact HR or use IP check-in";

fn out_of_range_message(point: &CheckInPoint, distance: Meters) -> String {
    format!(
        "You are {} from {}, check-in is allowed within {} m",
        distance,
        point.name,
        point.radius_meters.unwrap_or(0)
    )
}

/// Decides a GPS check-in against the employee's departments.
pub(crate) fn gps_decision(
    departments: &[Department],
    position: Option<GeoPoint>,
    options: ResolveOptions,
) -> Result<(CheckInPoint, Meters), ApiError> {
    if let Some(point) = position.filter(|p| !p.is_valid()) {
        return Err(invalid_position(point));
    }

    let candidates = candidates(departments);
    if candidates.is_empty() && !departments.is_empty() {
        return Err(ApiError::BadRequest(GPS_NOT_SET_UP.into()));
    }

    match resolve_nearest_point(position, &candidates, options) {
        Resolution::Locating => Err(ApiError::BadRequest(
            "Your location is not available yet, wait for GPS and try again".into(),
        )),
        Resolution::NoPoints => Err(ApiError::BadRequest(
            "No check-in location is configured".into(),
        )),
        Resolution::Resolved {
            nearest,
            distance,
            in_range: false,
        } => Err(ApiError::BadRequest(out_of_range_message(&nearest, distance))),
        Resolution::Resolved {
            nearest, distance, ..
        } => Ok((nearest, distance)),
    }
}

/// Decides an IP check-in: the first active department whose allow-list
/// contains the client address wins.
pub(crate) fn ip_decision(
    departments: &[Department],
    client: Option<IpAddr>,
) -> Result<&Department, ApiError> {
    let client = client.ok_or_else(|| {
        ApiError::BadRequest("Could not determine your IP address".into())
    })?;

    let active = || departments.iter().filter(|d| !d.is_disabled());

    if let Some(department) = active().find(|d| is_ip_check_in_allowed(client, &d.allowed_ips)) {
        return Ok(department);
    }

    if active().all(|d| d.allowed_ips.is_empty()) {
        return Err(ApiError::BadRequest(
            "IP check-in is not set up for your department".into(),
        ));
    }

    Err(ApiError::BadRequest(format!(
        "Check-in is not allowed from {client}"
    )))
}

fn describe(departments: &[Department], position: Option<GeoPoint>, options: ResolveOptions) -> NearestPointResponse {
    let candidates = candidates(departments);
    if candidates.is_empty() && !departments.is_empty() && position.is_some() {
        return NearestPointResponse {
            state: NearestState::Unavailable,
            nearest: None,
            distance_meters: None,
            in_range: None,
            message: GPS_NOT_SET_UP.into(),
        };
    }

    let resolution = resolve_nearest_point(position, &candidates, options);
    let state = NearestState::from(&resolution);

    match resolution {
        Resolution::Locating => NearestPointResponse {
            state,
            nearest: None,
            distance_meters: None,
            in_range: None,
            message: "Getting your location...".into(),
        },
        Resolution::NoPoints => NearestPointResponse {
            state,
            nearest: None,
            distance_meters: None,
            in_range: None,
            message: "No check-in location is configured".into(),
        },
        Resolution::Resolved {
            nearest,
            distance,
            in_range,
        } => NearestPointResponse {
            state,
            message: if in_range {
                format!(
                    "You are {} from {}, within the allowed {} m",
                    distance,
                    nearest.name,
                    nearest.radius_meters.unwrap_or(0)
                )
            } else {
                out_of_range_message(&nearest, distance)
            },
            distance_meters: Some(distance.0),
            in_range: Some(in_range),
            nearest: Some(nearest),
        },
    }
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Checked in successfully", body = Object, example = json!({
            "message": "Checked in successfully",
            "check_in_point": "Head office",
            "distance_meters": 87
        })),
        (status = 400, description = "Invalid coordinates, out of range, not set up, or already checked in today", body = Object, example = json!({
            "message": "Already checked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    req: HttpRequest,
    payload: web::Json<CheckInRequest>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.require_employee()?;
    let departments = repo::departments_for_employee(pool.get_ref(), employee_id).await?;

    let (point_id, point_name, distance) = match payload.method {
        CheckInMethod::Gps => {
            let options = ResolveOptions {
                include_disabled: config.checkin_include_disabled,
            };
            let (point, distance) = gps_decision(
                &departments,
                position(payload.latitude, payload.longitude)?,
                options,
            )?;
            (point.id, point.name, Some(distance))
        }
        CheckInMethod::Ip => {
            let client = req.peer_addr().map(|addr| addr.ip());
            let department = ip_decision(&departments, client)?;
            (department.id, department.name.clone(), None)
        }
    };

    let outcome = repo::record_check_in(
        pool.get_ref(),
        employee_id,
        payload.method,
        point_id,
        distance.map(|d| d.0),
    )
    .await?;

    match outcome {
        CheckInOutcome::AlreadyCheckedIn => Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "Already checked in today"
        }))),
        CheckInOutcome::Recorded => {
            info!(
                employee_id,
                method = %payload.method,
                point_id,
                distance = ?distance,
                "Checked in"
            );
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Checked in successfully",
                "check_in_point": point_name,
                "distance_meters": distance.map(|d| d.0),
            })))
        }
    }
}

/// Check-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = Object, example = json!({
            "message": "Checked out successfully"
        })),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.require_employee()?;

    if !repo::record_check_out(pool.get_ref(), employee_id).await? {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "No active check-in found for today"
        })));
    }

    info!(employee_id, "Checked out");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Checked out successfully"
    })))
}

/// Nearest check-in point preview, used by the check-in screen while the
/// employee moves around.
#[utoipa::path(
    get,
    path = "/api/attendance/nearest",
    params(NearestQuery),
    responses(
        (status = 200, description = "Resolver state for the given position", body = NearestPointResponse),
        (status = 400, description = "Coordinates outside the valid latitude/longitude range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn nearest_point(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<NearestQuery>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.require_employee()?;
    let departments = repo::departments_for_employee(pool.get_ref(), employee_id).await?;

    let options = ResolveOptions {
        include_disabled: config.checkin_include_disabled,
    };

    Ok(HttpResponse::Ok().json(describe(
        &departments,
        position(query.latitude, query.longitude)?,
        options,
    )))
}

/// Today's attendance record of the caller
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's attendance row"),
        (status = 404, description = "Not checked in today"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.require_employee()?;

    match repo::today(pool.get_ref(), employee_id).await? {
        Some(attendance) => Ok(HttpResponse::Ok().json(attendance)),
        None => Err(ApiError::NotFound("Attendance for today")),
    }
}
