//! sea-orm entities for the auth service database.

pub mod admin_elevations;
pub mod outbox_events;
pub mod sessions;
pub mod users;
