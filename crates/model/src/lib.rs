//! Entity model for the depot artifact store.
//!
//! This crate defines the value types exchanged across the store surface and
//! their boundary dictionary shapes:
//! - **BuildInfo**: a build campaign `(setup, build_date, build_version)`
//!   with a store-assigned id and a monotonic readiness flag.
//! - **Resource**: content-addressed bytes, keyed by an opaque content id
//!   (conventionally a BLAKE3 digest) and deduplicated by the store.
//! - **File**: a named, versioned handle to a resource, bound to a build.
//! - **Component**: a shippable aggregate of files, sources, readme,
//!   attachments and release labels.
//!
//! The store crates hold the relational rows; values here are the
//! self-consistent bundles returned by queries (a file embeds its build info
//! and resource, a component embeds its files).

pub mod build;
pub mod component;
pub mod error;
pub mod file;
pub mod resource;
pub mod timestamp;

pub use crate::build::BuildInfo;
pub use crate::component::{AttachmentEntry, AttachmentsDict, Component, ComponentDict};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::file::{File, FileDict, FileKind};
pub use crate::resource::{Resource, resource_id};
