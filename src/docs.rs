use crate::api::approval::{ApprovalView, DecisionPayload};
use crate::api::attendance::{CheckInRequest, NearestPointResponse, NearestState};
use crate::api::leave_request::{CreateLeave, LeaveResponse};
use crate::api::overtime::{CreateOvertime, OvertimeResponse};
use crate::domain::approval::{ApprovalKind, ApprovalRecord, RecordStatus, RequestStatus};
use crate::domain::geo::{CheckInPoint, GeoPoint};
use crate::model::attendance::CheckInMethod;
use crate::model::leave_request::{LeaveDetails, LeaveType};
use crate::model::overtime_request::OvertimeDetails;
use crate::repo::approval::AwaitingDecision;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Check-in & Approvals API",
        version = "1.0.0",
        description = r#"
## Attendance check-in and multi-level approvals

### 🔹 Key Features
- **Attendance**
  - GPS check-in against the nearest department check-in point, within its radius
  - IP check-in against a department's allowed addresses
  - Nearest check-in point preview while the device is locating
- **Leave & Overtime**
  - Sequential approval chains, one approver per level
  - Approve, reject, or cancel, with progress and a readable status line

### 🔐 Security
All endpoints are protected using **JWT Bearer authentication**.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::nearest_point,
        crate::api::attendance::today,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::awaiting_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,

        crate::api::overtime::create_overtime,
        crate::api::overtime::get_overtime,
        crate::api::overtime::awaiting_overtime,
        crate::api::overtime::approve_overtime,
        crate::api::overtime::reject_overtime,
        crate::api::overtime::cancel_overtime
    ),
    components(
        schemas(
            CheckInRequest,
            CheckInMethod,
            NearestPointResponse,
            NearestState,
            CheckInPoint,
            GeoPoint,
            CreateLeave,
            LeaveType,
            LeaveDetails,
            LeaveResponse,
            CreateOvertime,
            OvertimeDetails,
            OvertimeResponse,
            DecisionPayload,
            ApprovalView,
            ApprovalRecord,
            ApprovalKind,
            RequestStatus,
            RecordStatus,
            AwaitingDecision
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance check-in APIs"),
        (name = "Leave", description = "Leave requests and their approval chain"),
        (name = "Overtime", description = "Overtime requests and their approval chain"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
