pub mod admin;
pub mod devices;
pub mod health;
pub mod passcode;
pub mod session;
