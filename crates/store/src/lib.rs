//! SQLite-backed artifact store.
//!
//! The store keeps six relational tables (builds, resources, files, the
//! component join tables, components) under a content-addressed resource
//! layer:
//! - **Builds** partition everything into campaigns; readiness is a
//!   monotonic flag.
//! - **Resources** deduplicate bytes by content id: uploading the same
//!   archive twice stores it once.
//! - **Files** are named handles into the resource layer, with the lookback
//!   rule that a source "visible at" a build is the most recent one created
//!   at or before it.
//! - **Components** aggregate files into deliverables and answer the
//!   "latest per (name, platform)" shipping view.
//!
//! Mutations commit as single transactions; a reader never observes a
//! component without its join rows. The raw-add operations preserve ids and
//! creation dates so a mirror can replicate an upstream store verbatim.

mod builds;
mod bulk;
mod components;
mod db;
pub mod error;
mod files;
#[cfg(test)]
mod fixtures;
mod interface;
mod raw;
mod resources;
mod rows;
mod store;

pub use crate::bulk::{BulkQuery, BulkQueryResult, BulkResponse};
pub use crate::components::{BuildData, ComponentFilter};
pub use crate::db::Database;
pub use crate::interface::{StoreReader, StoreWriter};
pub use crate::store::Store;
