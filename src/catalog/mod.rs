//! Catalog module for collection schemas.
//!
//! The catalog stores collection descriptions in the datastore, next to the
//! commit graph. Field kinds form a closed set so every consumer matches on
//! them exhaustively.

mod manager;
mod schema;
mod types;

pub use manager::Catalog;
pub use schema::{CollectionDescription, SchemaBuilder, SchemaError};
pub use types::{FieldDefinition, FieldKind, ScalarKind};
