//! A writer store with an upstream to pull from.

use crate::config;
use async_trait::async_trait;
use depot_model::{BuildInfo, Component, File, FileKind};
use depot_store::error::{ErrorKind, Result};
use depot_store::{
    BuildData, BulkQuery, BulkQueryResult, BulkResponse, ComponentFilter, Store, StoreReader,
    StoreWriter,
};
use exn::{OptionExt, ResultExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A local store that can selectively pull entities from an upstream reader
/// and cache them for offline reuse.
///
/// The mirror is a full [`StoreWriter`] over its own database. The upstream
/// handle is only consulted by the pull operations and by
/// [`download_resource`](StoreReader::download_resource), since resource
/// paths in a mirrored database usually point at the upstream machine.
pub struct LocalMirror {
    store: Store,
    upstream: Option<Arc<dyn StoreReader>>,
    bulk_chunk_size: Option<usize>,
}

impl LocalMirror {
    /// Open (or create) a mirror database at the given path.
    pub async fn open(path: impl AsRef<Path>, upstream: Option<Arc<dyn StoreReader>>) -> Result<Self> {
        Ok(Self { store: Store::open(path).await?, upstream, bulk_chunk_size: None })
    }

    /// Open an in-memory mirror, mostly useful for tests.
    pub async fn in_memory(upstream: Option<Arc<dyn StoreReader>>) -> Result<Self> {
        Ok(Self { store: Store::in_memory().await?, upstream, bulk_chunk_size: None })
    }

    /// Override the upstream bulk chunk size instead of reading it from the
    /// environment.
    pub fn with_bulk_chunk_size(mut self, chunk_size: usize) -> Self {
        self.bulk_chunk_size = Some(chunk_size);
        self
    }

    /// The local store behind this mirror.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn upstream(&self) -> Option<&Arc<dyn StoreReader>> {
        self.upstream.as_ref()
    }

    /// See [`Store::raw_add_build_info`].
    pub async fn raw_add_build_info(&self, build_info: &BuildInfo) -> Result<bool> {
        self.store.raw_add_build_info(build_info).await
    }

    /// See [`Store::raw_add_file`].
    pub async fn raw_add_file(&self, file: &mut File) -> Result<bool> {
        self.store.raw_add_file(file).await
    }

    /// See [`Store::raw_add_component`].
    pub async fn raw_add_component(&self, component: &mut Component) -> Result<bool> {
        self.store.raw_add_component(component).await
    }

    /// Make sure `bid` exists locally, fetching it from `from_store` when
    /// missing.
    pub async fn add_build_info_from_store(&self, from_store: &dyn StoreReader, bid: &str) -> Result<()> {
        match self.store.get_build_info(bid).await {
            Ok(_) => Ok(()),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => {
                let build = from_store.get_build_info(bid).await?;
                self.store.raw_add_build_info(&build).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Pull one source (or thirdparty) file from `from_store`.
    ///
    /// Without an explicit `bid`, the upstream latest ready build for
    /// `setup` (optionally restricted by `date`) decides which source is
    /// current.
    pub async fn add_source_from_store(
        &self,
        from_store: &dyn StoreReader,
        name: &str,
        bid: Option<&str>,
        setup: Option<&str>,
        date: Option<&str>,
        kind: FileKind,
    ) -> Result<()> {
        let build = match bid {
            None => {
                let setup = setup.ok_or_raise(|| {
                    ErrorKind::InvalidInput("either a build id or a setup is required".to_string())
                })?;
                let build = from_store.get_latest_build_info(setup, date, None, true).await?;
                self.store.raw_add_build_info(&build).await?;
                build
            }
            Some(bid) => match self.store.get_build_info(bid).await {
                Ok(build) => build,
                Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => {
                    let build = from_store.get_build_info(bid).await?;
                    self.store.raw_add_build_info(&build).await?;
                    build
                }
                Err(err) => return Err(err),
            },
        };
        let mut file = from_store.get_source_info(name, &build.id, kind).await?;
        self.store.raw_add_file(&mut file).await?;
        tracing::debug!(name, bid = %build.id, "pulled source from upstream");
        Ok(())
    }

    /// Pull the latest components matching the filters from `from_store`.
    /// Fails when nothing matches.
    pub async fn add_component_from_store(
        &self,
        from_store: &dyn StoreReader,
        setup: &str,
        component_filter: ComponentFilter,
    ) -> Result<()> {
        let components = from_store.latest_components(setup, component_filter.clone()).await?;
        if components.is_empty() {
            exn::bail!(ErrorKind::NotFound(format!(
                "no component matching criteria: setup={setup:?}, filter={component_filter:?}"
            )));
        }
        for mut component in components {
            self.store.raw_add_component(&mut component).await?;
        }
        Ok(())
    }

    /// Flush everything to disk; optionally copy the database file to
    /// `path`.
    pub async fn save(&self, path: Option<&Path>) -> Result<()> {
        self.store.database().checkpoint().await?;
        if let Some(dest) = path {
            let Some(db_path) = self.store.database().path() else {
                exn::bail!(ErrorKind::InvalidInput(
                    "an in-memory mirror cannot be saved to a file".to_string()
                ));
            };
            if dest != db_path {
                tokio::fs::copy(db_path, dest)
                    .await
                    .or_raise(|| ErrorKind::ResourceIo(dest.to_path_buf()))?;
            }
        }
        Ok(())
    }

    /// Cache-through bulk planner.
    ///
    /// Source queries are first resolved against the local database; only
    /// the misses travel upstream, in chunks, and every upstream response is
    /// raw-added so the next call is a local hit. Remote results come first
    /// in the combined output, local cache hits after.
    pub async fn bulk_update_from_store(
        &self,
        from_store: &dyn StoreReader,
        queries: &[BulkQuery],
    ) -> Result<Vec<BulkQueryResult>> {
        let mut deferred: Vec<BulkQuery> = Vec::new();
        let mut required_bids: BTreeSet<String> = BTreeSet::new();
        let mut local_results: Vec<BulkQueryResult> = Vec::new();

        for original in queries {
            let mut query = original.clone();
            if query.query.as_deref() != Some("source") {
                // Component (and malformed) queries are not cached locally.
                deferred.push(query);
                continue;
            }

            // Normalize: default kind, resolve a missing bid through the
            // upstream latest build for the given setup.
            if query.kind.is_none() {
                query.kind = Some("source".to_string());
            }
            if query.bid.as_deref().unwrap_or("").is_empty() {
                if let Some(setup) = query.setup.as_deref() {
                    if let Ok(build) =
                        from_store.get_latest_build_info(setup, query.date.as_deref(), None, true).await
                    {
                        query.bid = Some(build.id);
                    }
                }
            }
            if let Some(bid) = query.bid.as_deref() {
                if !bid.is_empty() {
                    required_bids.insert(bid.to_string());
                }
            }

            // Local probe.
            let name = query.name.clone().unwrap_or_default();
            let bid = query.bid.clone().unwrap_or_default();
            let probe = match query.kind.as_deref().unwrap_or("source").parse::<FileKind>() {
                Ok(kind) if !name.is_empty() => self.store.get_source_info(&name, &bid, kind).await,
                _ => {
                    deferred.push(query);
                    continue;
                }
            };
            match probe {
                Ok(file) => {
                    // A regular source only counts as cached when it was
                    // produced under the queried build; for thirdparties
                    // presence is enough.
                    let exact_build = file.build.as_ref().is_some_and(|build| build.id == bid);
                    if query.kind.as_deref() == Some("source") && !exact_build {
                        deferred.push(query);
                    } else {
                        local_results.push(BulkQueryResult {
                            query,
                            response: Some(BulkResponse::File(file)),
                            msg: String::new(),
                        });
                    }
                }
                Err(_) => deferred.push(query),
            }
        }

        let chunk_size = self.bulk_chunk_size.unwrap_or_else(config::bulk_chunk_size).max(1);
        tracing::info!(
            queries = deferred.len(),
            chunks = deferred.len().div_ceil(chunk_size),
            chunk_size,
            "performing upstream bulk queries"
        );

        let mut results = Vec::with_capacity(queries.len());
        for chunk in deferred.chunks(chunk_size) {
            let chunk_results = from_store.bulk_query(chunk).await?;
            for chunk_result in &chunk_results {
                match &chunk_result.response {
                    None => {}
                    Some(BulkResponse::File(file)) => {
                        let mut file = file.clone();
                        self.store.raw_add_file(&mut file).await?;
                    }
                    Some(BulkResponse::Component(component)) => {
                        let mut component = component.clone();
                        self.store.raw_add_component(&mut component).await?;
                    }
                }
            }
            results.extend(chunk_results);
        }

        for bid in &required_bids {
            self.add_build_info_from_store(from_store, bid).await?;
        }

        // Remote results first, local cache hits after.
        results.extend(local_results);
        Ok(results)
    }
}

#[async_trait]
impl StoreReader for LocalMirror {
    async fn get_build_info(&self, bid: &str) -> Result<BuildInfo> {
        self.store.get_build_info(bid).await
    }

    async fn get_latest_build_info(
        &self,
        setup: &str,
        date: Option<&str>,
        version: Option<&str>,
        ready_only: bool,
    ) -> Result<BuildInfo> {
        self.store.get_latest_build_info(setup, date, version, ready_only).await
    }

    async fn get_build_info_list(
        &self,
        date: Option<&str>,
        setup: Option<&str>,
        version: Option<&str>,
        nb_days: u32,
    ) -> Result<Vec<BuildInfo>> {
        self.store.get_build_info_list(date, setup, version, nb_days).await
    }

    async fn list_components(
        &self,
        bid: &str,
        component: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>> {
        self.store.list_components(bid, component, platform).await
    }

    async fn latest_components(
        &self,
        setup: &str,
        component_filter: ComponentFilter,
    ) -> Result<Vec<Component>> {
        self.store.latest_components(setup, component_filter).await
    }

    async fn list_release_components(
        &self,
        release: &str,
        component: Option<&str>,
        version: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>> {
        self.store.list_release_components(release, component, version, platform).await
    }

    async fn get_build_data(&self, bid: &str) -> Result<BuildData> {
        self.store.get_build_data(bid).await
    }

    async fn get_source_info(&self, name: &str, bid: &str, kind: FileKind) -> Result<File> {
        self.store.get_source_info(name, bid, kind).await
    }

    async fn latest_thirdparty(
        &self,
        name: &str,
        tp_id: Option<&str>,
        rid: Option<&str>,
    ) -> Result<Option<File>> {
        self.store.latest_thirdparty(name, tp_id, rid).await
    }

    async fn download_resource(&self, resource_id: &str, dest: &Path) -> Result<PathBuf> {
        match &self.upstream {
            Some(upstream) => upstream.download_resource(resource_id, dest).await,
            None => self.store.download_resource(resource_id, dest).await,
        }
    }

    async fn bulk_query(&self, queries: &[BulkQuery]) -> Result<Vec<BulkQueryResult>> {
        self.store.bulk_query(queries).await
    }
}

#[async_trait]
impl StoreWriter for LocalMirror {
    async fn create_build_id(&self, setup: &str, date: &str, version: &str) -> Result<BuildInfo> {
        self.store.create_build_id(setup, date, version).await
    }

    async fn mark_build_ready(&self, bid: &str) -> Result<bool> {
        self.store.mark_build_ready(bid).await
    }

    async fn copy_build_id(&self, bid: &str, dest_setup: &str) -> Result<BuildInfo> {
        self.store.copy_build_id(bid, dest_setup).await
    }

    async fn submit_file(&self, file: &File) -> Result<File> {
        self.store.submit_file(file).await
    }

    async fn create_thirdparty(&self, file: &File) -> Result<File> {
        self.store.create_thirdparty(file).await
    }

    async fn update_file_metadata(&self, file: &File) -> Result<File> {
        self.store.update_file_metadata(file).await
    }

    async fn submit_component(&self, component: &Component) -> Result<Component> {
        self.store.submit_component(component).await
    }

    async fn add_component_attachment(
        &self,
        component_id: &str,
        file_id: &str,
        name: &str,
    ) -> Result<()> {
        self.store.add_component_attachment(component_id, file_id, name).await
    }
}
