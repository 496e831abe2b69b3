pub mod approval;
pub mod geo;
pub mod ip;
