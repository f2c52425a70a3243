mod changes;
mod metadata;
mod repository;
mod schema;

pub use changes::{ChangeKind, LocalChange, PendingChanges};
pub use repository::Repository;
pub use schema::SCHEMA_VERSION;
