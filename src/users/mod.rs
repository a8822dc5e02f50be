//! Identity records and the store the auth core resolves them against.

pub mod model;
pub mod store;

pub use self::model::{Identity, NewIdentity, Role};
pub use self::store::{IdentityStore, PgIdentityStore};
