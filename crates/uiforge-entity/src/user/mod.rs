//! User domain entities.

pub mod model;
pub mod role;
pub mod snapshot;

pub use model::{CreateUser, User};
pub use role::UserRole;
pub use snapshot::UserSnapshot;
