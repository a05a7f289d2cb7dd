pub mod device;
pub mod repository;
pub mod types;
