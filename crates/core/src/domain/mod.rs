pub mod appointment;
pub mod interaction;
pub mod session;
pub mod treatment;
