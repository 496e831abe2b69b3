pub mod attendance;
pub mod department;
pub mod leave_request;
pub mod overtime_request;
pub mod role;
