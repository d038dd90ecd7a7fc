//! The store capability surface.
//!
//! Capabilities form a subset lattice rather than a class tree: every
//! [`StoreWriter`] is a [`StoreReader`], and a local mirror is a writer that
//! additionally holds an upstream reader. Concrete stores implement one of
//! the traits; callers hold `&dyn StoreReader`/`&dyn StoreWriter` and don't
//! care what is behind it.

use crate::bulk::{BulkQuery, BulkQueryResult};
use crate::components::{BuildData, ComponentFilter};
use crate::error::Result;
use crate::store::Store;
use async_trait::async_trait;
use depot_model::{BuildInfo, Component, File, FileKind};
use std::path::{Path, PathBuf};

/// Read-only store operations.
///
/// Every operation returns immutable value snapshots; a value and its
/// aggregated sub-values (a component and its files, a file and its resource
/// and build info) form a self-consistent bundle.
#[async_trait]
pub trait StoreReader: Send + Sync {
    async fn get_build_info(&self, bid: &str) -> Result<BuildInfo>;

    async fn get_latest_build_info(
        &self,
        setup: &str,
        date: Option<&str>,
        version: Option<&str>,
        ready_only: bool,
    ) -> Result<BuildInfo>;

    async fn get_build_info_list(
        &self,
        date: Option<&str>,
        setup: Option<&str>,
        version: Option<&str>,
        nb_days: u32,
    ) -> Result<Vec<BuildInfo>>;

    async fn list_components(
        &self,
        bid: &str,
        component: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>>;

    async fn latest_components(
        &self,
        setup: &str,
        component_filter: ComponentFilter,
    ) -> Result<Vec<Component>>;

    async fn list_release_components(
        &self,
        release: &str,
        component: Option<&str>,
        version: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>>;

    async fn get_build_data(&self, bid: &str) -> Result<BuildData>;

    async fn get_source_info(&self, name: &str, bid: &str, kind: FileKind) -> Result<File>;

    async fn latest_thirdparty(
        &self,
        name: &str,
        tp_id: Option<&str>,
        rid: Option<&str>,
    ) -> Result<Option<File>>;

    async fn download_resource(&self, resource_id: &str, dest: &Path) -> Result<PathBuf>;

    async fn bulk_query(&self, queries: &[BulkQuery]) -> Result<Vec<BulkQueryResult>>;
}

/// Read-write store operations.
#[async_trait]
pub trait StoreWriter: StoreReader {
    async fn create_build_id(&self, setup: &str, date: &str, version: &str) -> Result<BuildInfo>;

    async fn mark_build_ready(&self, bid: &str) -> Result<bool>;

    async fn copy_build_id(&self, bid: &str, dest_setup: &str) -> Result<BuildInfo>;

    async fn submit_file(&self, file: &File) -> Result<File>;

    async fn create_thirdparty(&self, file: &File) -> Result<File>;

    async fn update_file_metadata(&self, file: &File) -> Result<File>;

    async fn submit_component(&self, component: &Component) -> Result<Component>;

    async fn add_component_attachment(
        &self,
        component_id: &str,
        file_id: &str,
        name: &str,
    ) -> Result<()>;
}

#[async_trait]
impl StoreReader for Store {
    async fn get_build_info(&self, bid: &str) -> Result<BuildInfo> {
        Store::get_build_info(self, bid).await
    }

    async fn get_latest_build_info(
        &self,
        setup: &str,
        date: Option<&str>,
        version: Option<&str>,
        ready_only: bool,
    ) -> Result<BuildInfo> {
        Store::get_latest_build_info(self, setup, date, version, ready_only).await
    }

    async fn get_build_info_list(
        &self,
        date: Option<&str>,
        setup: Option<&str>,
        version: Option<&str>,
        nb_days: u32,
    ) -> Result<Vec<BuildInfo>> {
        Store::get_build_info_list(self, date, setup, version, nb_days).await
    }

    async fn list_components(
        &self,
        bid: &str,
        component: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>> {
        Store::list_components(self, bid, component, platform).await
    }

    async fn latest_components(
        &self,
        setup: &str,
        component_filter: ComponentFilter,
    ) -> Result<Vec<Component>> {
        Store::latest_components(self, setup, component_filter).await
    }

    async fn list_release_components(
        &self,
        release: &str,
        component: Option<&str>,
        version: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>> {
        Store::list_release_components(self, release, component, version, platform).await
    }

    async fn get_build_data(&self, bid: &str) -> Result<BuildData> {
        Store::get_build_data(self, bid).await
    }

    async fn get_source_info(&self, name: &str, bid: &str, kind: FileKind) -> Result<File> {
        Store::get_source_info(self, name, bid, kind).await
    }

    async fn latest_thirdparty(
        &self,
        name: &str,
        tp_id: Option<&str>,
        rid: Option<&str>,
    ) -> Result<Option<File>> {
        Store::latest_thirdparty(self, name, tp_id, rid).await
    }

    async fn download_resource(&self, resource_id: &str, dest: &Path) -> Result<PathBuf> {
        Store::download_resource(self, resource_id, dest).await
    }

    async fn bulk_query(&self, queries: &[BulkQuery]) -> Result<Vec<BulkQueryResult>> {
        Store::bulk_query(self, queries).await
    }
}

#[async_trait]
impl StoreWriter for Store {
    async fn create_build_id(&self, setup: &str, date: &str, version: &str) -> Result<BuildInfo> {
        Store::create_build_id(self, setup, date, version).await
    }

    async fn mark_build_ready(&self, bid: &str) -> Result<bool> {
        Store::mark_build_ready(self, bid).await
    }

    async fn copy_build_id(&self, bid: &str, dest_setup: &str) -> Result<BuildInfo> {
        Store::copy_build_id(self, bid, dest_setup).await
    }

    async fn submit_file(&self, file: &File) -> Result<File> {
        Store::submit_file(self, file).await
    }

    async fn create_thirdparty(&self, file: &File) -> Result<File> {
        Store::create_thirdparty(self, file).await
    }

    async fn update_file_metadata(&self, file: &File) -> Result<File> {
        Store::update_file_metadata(self, file).await
    }

    async fn submit_component(&self, component: &Component) -> Result<Component> {
        Store::submit_component(self, component).await
    }

    async fn add_component_attachment(
        &self,
        component_id: &str,
        file_id: &str,
        name: &str,
    ) -> Result<()> {
        Store::add_component_attachment(self, component_id, file_id, name).await
    }
}
