pub mod authentication;
pub mod quiz;
