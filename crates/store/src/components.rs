//! Component registry: deliverable aggregates over files.

use crate::builds;
use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::files;
use crate::rows::{ComponentFileJoinRow, ComponentRow, Role, metadata_from_text, metadata_to_text};
use crate::store::{Store, filter_value, unique_id};
use depot_model::{Component, File, timestamp};
use exn::OptionExt;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;

/// Optional filters for [`Store::latest_components`]. The `"all"` wildcard
/// and the empty string mean "no filter", like everywhere else on the query
/// surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentFilter {
    pub date: Option<String>,
    pub platform: Option<String>,
    pub component: Option<String>,
    pub specname: Option<String>,
    pub build_id: Option<String>,
}

impl ComponentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_specname(mut self, specname: impl Into<String>) -> Self {
        self.specname = Some(specname.into());
        self
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }
}

/// Everything recorded under one build campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildData {
    /// Files of kind source or thirdparty, most recent first.
    pub sources: Vec<File>,
    /// Components, most recent first.
    pub components: Vec<Component>,
}

pub(crate) async fn get_component_row_opt(
    conn: &mut SqliteConnection,
    component_id: &str,
) -> Result<Option<ComponentRow>> {
    let mut rows: Vec<ComponentRow> = sqlx::query_as(include_str!("../queries/get_component.sql"))
        .bind(component_id)
        .fetch_all(conn)
        .await
        .or_db_err()?;
    match rows.len() {
        0 => Ok(None),
        1 => Ok(Some(rows.remove(0))),
        _ => Err(exn::Exn::from(ErrorKind::AmbiguousMatch(format!(
            "multiple component rows with id {component_id:?}"
        )))),
    }
}

async fn component_role_files(
    conn: &mut SqliteConnection,
    component_id: &str,
    role: Role,
) -> Result<Vec<(Option<String>, File)>> {
    let rows: Vec<ComponentFileJoinRow> =
        sqlx::query_as(include_str!("../queries/list_component_files.sql"))
            .bind(component_id)
            .bind(role.as_str())
            .fetch_all(conn)
            .await
            .or_db_err()?;
    rows.into_iter()
        .map(|row| {
            let name = row.attachment_name.clone();
            Ok((name, row.file.into_file(Some(row.role_internal))?))
        })
        .collect()
}

/// Assemble the full component bundle behind a row: build info, role files,
/// readme, attachments and release labels.
pub(crate) async fn load_component_conn(
    conn: &mut SqliteConnection,
    row: ComponentRow,
) -> Result<Component> {
    let build = builds::get_build_info_conn(conn, &row.build_id).await?;
    let files = component_role_files(conn, &row.id, Role::File)
        .await?
        .into_iter()
        .map(|(_, file)| file)
        .collect();
    let sources = component_role_files(conn, &row.id, Role::Source)
        .await?
        .into_iter()
        .map(|(_, file)| file)
        .collect();
    let attachments = component_role_files(conn, &row.id, Role::Attachment)
        .await?
        .into_iter()
        .map(|(name, file)| {
            let name = name.ok_or_raise(|| ErrorKind::InvalidData("attachment name"))?;
            Ok((name, file))
        })
        .collect::<Result<BTreeMap<String, File>>>()?;
    let readme = match &row.readme_id {
        Some(fid) => Some(files::get_file_conn(conn, fid).await?),
        None => None,
    };
    let releases: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_component_releases.sql"))
        .bind(&row.id)
        .fetch_all(&mut *conn)
        .await
        .or_db_err()?;
    Ok(Component {
        id: Some(row.id),
        build_id: row.build_id,
        name: row.name,
        platform: row.platform,
        version: row.version,
        specname: row.specname,
        files,
        sources,
        readme,
        attachments,
        releases,
        is_valid: row.is_valid,
        is_published: row.is_published,
        creation_date: timestamp::parse(&row.creation_date)?,
        metadata: metadata_from_text(&row.metadata)?,
        build: Some(build),
    })
}

fn required_id<'a>(file: &'a File, what: &str) -> Result<&'a str> {
    file.id.as_deref().filter(|id| !id.is_empty()).ok_or_raise(|| {
        ErrorKind::InvalidInput(format!("{what} {:?} has not been uploaded", file.name))
    })
}

pub(crate) async fn insert_component_file_conn(
    conn: &mut SqliteConnection,
    role: Role,
    file_id: &str,
    component_id: &str,
    internal: bool,
    attachment_name: Option<&str>,
) -> Result<()> {
    sqlx::query(include_str!("../queries/insert_component_file.sql"))
        .bind(role.as_str())
        .bind(file_id)
        .bind(component_id)
        .bind(internal)
        .bind(attachment_name)
        .execute(conn)
        .await
        .or_db_err()?;
    Ok(())
}

pub(crate) async fn insert_component_release_conn(
    conn: &mut SqliteConnection,
    release: &str,
    component_id: &str,
) -> Result<()> {
    sqlx::query(include_str!("../queries/insert_component_release.sql"))
        .bind(release)
        .bind(component_id)
        .execute(conn)
        .await
        .or_db_err()?;
    Ok(())
}

/// Submit a component without committing. Readme, binaries and attachments
/// are uploaded as part of the same transaction; sources must already be in
/// the store.
pub(crate) async fn submit_component_conn(
    conn: &mut SqliteConnection,
    component: &Component,
) -> Result<Component> {
    let build_id = component
        .build
        .as_ref()
        .map(|build| build.id.as_str())
        .filter(|id| !id.is_empty())
        .unwrap_or(component.build_id.as_str());
    if build_id.is_empty() {
        exn::bail!(ErrorKind::InvalidInput(
            "no build id associated with the component to submit".to_string()
        ));
    }

    let readme = match &component.readme {
        Some(readme) => Some(files::submit_file_conn(conn, readme).await?),
        None => None,
    };

    let mut binaries = Vec::with_capacity(component.files.len());
    for file in &component.files {
        binaries.push(files::submit_file_conn(conn, file).await?);
    }

    let mut attachments = BTreeMap::new();
    for (name, file) in &component.attachments {
        if name.is_empty() {
            exn::bail!(ErrorKind::InvalidInput("attachment name cannot be empty".to_string()));
        }
        attachments.insert(name.clone(), files::submit_file_conn(conn, file).await?);
    }

    // Sources are submitted out of band; here they only need to resolve.
    for source in &component.sources {
        let fid = required_id(source, "source file")?;
        files::get_file_conn(conn, fid).await?;
    }

    let component_id = unique_id();
    sqlx::query(include_str!("../queries/insert_component.sql"))
        .bind(&component_id)
        .bind(&component.name)
        .bind(&component.platform)
        .bind(&component.version)
        .bind(component.specname.as_deref())
        .bind(build_id)
        .bind(timestamp::format(timestamp::now())?)
        .bind(component.is_valid)
        .bind(component.is_published)
        .bind(readme.as_ref().and_then(|readme| readme.id.as_deref()))
        .bind(metadata_to_text(&component.metadata)?)
        .execute(&mut *conn)
        .await
        .or_db_err()?;

    for file in &binaries {
        insert_component_file_conn(conn, Role::File, required_id(file, "file")?, &component_id, file.internal, None)
            .await?;
    }
    for source in &component.sources {
        insert_component_file_conn(
            conn,
            Role::Source,
            required_id(source, "source file")?,
            &component_id,
            source.internal,
            None,
        )
        .await?;
    }
    for (name, file) in &attachments {
        insert_component_file_conn(
            conn,
            Role::Attachment,
            required_id(file, "attachment")?,
            &component_id,
            file.internal,
            Some(name.as_str()),
        )
        .await?;
    }
    for release in &component.releases {
        insert_component_release_conn(conn, release, &component_id).await?;
    }
    tracing::debug!(name = %component.name, platform = %component.platform, "submitted component");

    let row = get_component_row_opt(conn, &component_id)
        .await?
        .ok_or_raise(|| ErrorKind::NotFound(format!("no component with id {component_id:?}")))?;
    load_component_conn(conn, row).await
}

impl Store {
    /// Upload a component and its files as one atomic unit: a reader never
    /// observes the component row without its join rows.
    pub async fn submit_component(&self, component: &Component) -> Result<Component> {
        let mut tx = self.begin().await?;
        let submitted = submit_component_conn(&mut *tx, component).await?;
        tx.commit().await.or_db_err()?;
        Ok(submitted)
    }

    /// Components recorded under one build, optionally filtered by name and
    /// platform.
    pub async fn list_components(
        &self,
        bid: &str,
        component: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>> {
        let component = filter_value(component);
        let platform = filter_value(platform);
        let mut conn = self.acquire().await?;
        let rows: Vec<ComponentRow> = sqlx::query_as(include_str!("../queries/list_components.sql"))
            .bind(bid)
            .bind(component)
            .bind(component)
            .bind(platform)
            .bind(platform)
            .fetch_all(&mut *conn)
            .await
            .or_db_err()?;
        let mut components = Vec::with_capacity(rows.len());
        for row in rows {
            components.push(load_component_conn(&mut *conn, row).await?);
        }
        Ok(components)
    }

    /// The "what should be shipped" view: for each `(name, platform)` pair
    /// matching the filters, the single most recent component, with the
    /// result set ordered most recent first.
    pub async fn latest_components(
        &self,
        setup: &str,
        component_filter: ComponentFilter,
    ) -> Result<Vec<Component>> {
        let date = filter_value(component_filter.date.as_deref());
        let component = filter_value(component_filter.component.as_deref());
        let platform = filter_value(component_filter.platform.as_deref());
        let specname = filter_value(component_filter.specname.as_deref());
        let build_id = filter_value(component_filter.build_id.as_deref());
        let mut conn = self.acquire().await?;
        let rows: Vec<ComponentRow> = sqlx::query_as(include_str!("../queries/latest_components.sql"))
            .bind(setup)
            .bind(date)
            .bind(date)
            .bind(component)
            .bind(component)
            .bind(platform)
            .bind(platform)
            .bind(specname)
            .bind(specname)
            .bind(build_id)
            .bind(build_id)
            .fetch_all(&mut *conn)
            .await
            .or_db_err()?;
        let mut components = Vec::with_capacity(rows.len());
        for row in rows {
            components.push(load_component_conn(&mut *conn, row).await?);
        }
        Ok(components)
    }

    /// Components attached to a release label. The optional equality
    /// filters are applied on the loaded values.
    pub async fn list_release_components(
        &self,
        release: &str,
        component: Option<&str>,
        version: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<Component>> {
        let component = filter_value(component);
        let version = filter_value(version);
        let platform = filter_value(platform);
        let mut conn = self.acquire().await?;
        let rows: Vec<ComponentRow> =
            sqlx::query_as(include_str!("../queries/list_release_components.sql"))
                .bind(release)
                .fetch_all(&mut *conn)
                .await
                .or_db_err()?;
        let mut components = Vec::with_capacity(rows.len());
        for row in rows {
            components.push(load_component_conn(&mut *conn, row).await?);
        }
        components.retain(|candidate| {
            component.is_none_or(|name| candidate.name == name)
                && version.is_none_or(|version| candidate.version == version)
                && platform.is_none_or(|platform| candidate.platform == platform)
        });
        Ok(components)
    }

    /// All sources (including thirdparties) and components recorded under a
    /// build, both most recent first.
    pub async fn get_build_data(&self, bid: &str) -> Result<BuildData> {
        let mut conn = self.acquire().await?;
        let source_rows: Vec<crate::rows::FileJoinRow> =
            sqlx::query_as(include_str!("../queries/list_build_sources.sql"))
                .bind(bid)
                .fetch_all(&mut *conn)
                .await
                .or_db_err()?;
        let sources = source_rows
            .into_iter()
            .map(|row| row.into_file(None))
            .collect::<Result<Vec<File>>>()?;
        let component_rows: Vec<ComponentRow> =
            sqlx::query_as(include_str!("../queries/list_build_components.sql"))
                .bind(bid)
                .fetch_all(&mut *conn)
                .await
                .or_db_err()?;
        let mut components = Vec::with_capacity(component_rows.len());
        for row in component_rows {
            components.push(load_component_conn(&mut *conn, row).await?);
        }
        Ok(BuildData { sources, components })
    }

    /// Append an attachment to an existing component.
    pub async fn add_component_attachment(
        &self,
        component_id: &str,
        file_id: &str,
        name: &str,
    ) -> Result<()> {
        if name.is_empty() {
            exn::bail!(ErrorKind::InvalidInput("attachment name cannot be empty".to_string()));
        }
        let mut tx = self.begin().await?;
        get_component_row_opt(&mut *tx, component_id)
            .await?
            .ok_or_raise(|| ErrorKind::NotFound(format!("no component with id {component_id:?}")))?;
        files::get_file_conn(&mut *tx, file_id).await?;
        insert_component_file_conn(&mut *tx, Role::Attachment, file_id, component_id, true, Some(name))
            .await?;
        tx.commit().await.or_db_err()?;
        Ok(())
    }

    /// Look up a component by id.
    pub async fn get_component(&self, component_id: &str) -> Result<Component> {
        let mut conn = self.acquire().await?;
        let row = get_component_row_opt(&mut *conn, component_id)
            .await?
            .ok_or_raise(|| ErrorKind::NotFound(format!("no component with id {component_id:?}")))?;
        load_component_conn(&mut *conn, row).await
    }

}
