pub mod approval;
pub mod attendance;
