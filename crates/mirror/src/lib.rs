//! Local mirror of an upstream depot store.
//!
//! A [`LocalMirror`] owns its own database and optionally points at an
//! upstream [`StoreReader`](depot_store::StoreReader). It is a full writer
//! over its local state and adds three layered pull mechanisms:
//! - raw-add operations that merge upstream records verbatim (ids and
//!   creation dates preserved) and are idempotent under replay,
//! - single-entity pulls (`add_build_info_from_store`,
//!   `add_source_from_store`, `add_component_from_store`),
//! - a cache-through bulk planner (`bulk_update_from_store`) that answers
//!   what it can from the local database and batches the rest upstream in
//!   configurable chunks.

pub mod config;
mod mirror;

pub use crate::mirror::LocalMirror;
pub use depot_store::error;
