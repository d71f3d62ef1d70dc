pub mod note;
pub mod quiz;
pub mod session;
