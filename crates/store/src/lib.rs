//! Collaborator implementations for promptloom: fixture-backed caller data
//! and composition persistence.

pub mod fixture;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use fixture::{CallerFixture, Fixture};
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCompositionStore;
