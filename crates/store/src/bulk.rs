//! Bulk query planner.
//!
//! A bulk query is a list of loosely-typed records, answered item by item.
//! Per-item failures never poison the batch: every problem is reported as a
//! message string on the corresponding result record.

use crate::components::ComponentFilter;
use crate::store::Store;
use crate::error::Result;
use depot_model::{Component, File, FileKind};
use serde::{Deserialize, Serialize};

/// One record of a bulk query payload. Everything is optional at the wire
/// level; validation happens per query type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl BulkQuery {
    /// A `query = "component"` record.
    pub fn component(setup: impl Into<String>, platform: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            query: Some("component".to_string()),
            setup: Some(setup.into()),
            platform: Some(platform.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A `query = "source"` record.
    pub fn source(name: impl Into<String>) -> Self {
        Self {
            query: Some("source".to_string()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_bid(mut self, bid: impl Into<String>) -> Self {
        self.bid = Some(bid.into());
        self
    }

    pub fn with_setup(mut self, setup: impl Into<String>) -> Self {
        self.setup = Some(setup.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// The payload of a successful bulk query item.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkResponse {
    Component(Component),
    File(File),
}

/// Result record for one bulk query item.
///
/// At most one of `response` / `msg` is set; a third-party source query with
/// no match legitimately sets neither.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkQueryResult {
    pub query: BulkQuery,
    pub response: Option<BulkResponse>,
    pub msg: String,
}

impl BulkQueryResult {
    fn empty(query: &BulkQuery) -> Self {
        Self { query: query.clone(), response: None, msg: String::new() }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

impl Store {
    /// Answer a batch of typed queries. Individual failures are captured on
    /// the matching result record and never propagate.
    pub async fn bulk_query(&self, queries: &[BulkQuery]) -> Result<Vec<BulkQueryResult>> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push(self.bulk_query_one(query).await);
        }
        Ok(results)
    }

    async fn bulk_query_one(&self, query: &BulkQuery) -> BulkQueryResult {
        let mut result = BulkQueryResult::empty(query);
        let Some(query_type) = query.query.as_deref() else {
            result.msg = "Invalid query: missing 'query' key".to_string();
            return result;
        };
        match query_type {
            "component" => {
                let (Some(setup), Some(platform), Some(name)) =
                    (non_empty(&query.setup), non_empty(&query.platform), non_empty(&query.name))
                else {
                    result.msg = format!(
                        "Invalid component query: one or more mandatory keys \
                         (setup, platform, name) is missing from query {query:?}"
                    );
                    return result;
                };
                let filter = ComponentFilter {
                    date: query.date.clone(),
                    platform: Some(platform.to_string()),
                    component: Some(name.to_string()),
                    ..ComponentFilter::default()
                };
                match self.latest_components(setup, filter).await {
                    Ok(components) => match components.into_iter().next() {
                        Some(component) => result.response = Some(BulkResponse::Component(component)),
                        None => result.msg = "No component matching criteria".to_string(),
                    },
                    Err(err) => result.msg = err.to_string(),
                }
            }
            "source" => {
                let Some(name) = query.name.as_deref() else {
                    result.msg = "Invalid source query: missing name".to_string();
                    return result;
                };
                if query.kind.as_deref().unwrap_or("source") == "thirdparty" {
                    match self.latest_thirdparty(name, None, None).await {
                        Ok(Some(file)) => result.response = Some(BulkResponse::File(file)),
                        // No message on a third-party miss; the record stays
                        // empty, matching the reference behavior.
                        Ok(None) => {}
                        Err(err) => result.msg = err.to_string(),
                    }
                } else {
                    match query.bid.as_deref() {
                        None => result.msg = "Invalid source query: missing build ID".to_string(),
                        Some(bid) => match self.get_source_info(name, bid, FileKind::Source).await {
                            Ok(file) => result.response = Some(BulkResponse::File(file)),
                            Err(err) => result.msg = err.to_string(),
                        },
                    }
                }
            }
            other => result.msg = format!("Invalid query type {other:?}"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use depot_model::{Component, FileKind};

    #[tokio::test]
    async fn test_bulk_query_partial_failures() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let source = fixtures::bound_file(
            &build.id,
            FileKind::Source,
            "present",
            &fixtures::payload(dir.path(), "p.tgz", b"P"),
        );
        store.submit_file(&source).await.unwrap();

        let queries = [
            BulkQuery::source("present").with_bid(&build.id),
            BulkQuery { query: Some("source".to_string()), ..BulkQuery::default() },
            BulkQuery { query: Some("whatever".to_string()), ..BulkQuery::default() },
        ];
        let results = store.bulk_query(&queries).await.unwrap();
        assert_eq!(results.len(), 3);

        assert!(results[0].msg.is_empty());
        match results[0].response.as_ref().unwrap() {
            BulkResponse::File(file) => assert_eq!(file.name, "present"),
            other => panic!("expected a file response, got {other:?}"),
        }
        assert!(results[1].response.is_none());
        assert_eq!(results[1].msg, "Invalid source query: missing name");
        assert!(results[2].response.is_none());
        assert_eq!(results[2].msg, "Invalid query type \"whatever\"");
    }

    #[tokio::test]
    async fn test_bulk_query_missing_query_key() {
        let store = fixtures::store().await;
        let results = store.bulk_query(&[BulkQuery::default()]).await.unwrap();
        assert_eq!(results[0].msg, "Invalid query: missing 'query' key");
    }

    #[tokio::test]
    async fn test_bulk_query_source_not_found_message() {
        let store = fixtures::store().await;
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        let results = store
            .bulk_query(&[BulkQuery::source("absent").with_bid(&build.id)])
            .await
            .unwrap();
        assert!(results[0].response.is_none());
        assert!(results[0].msg.contains("not found"));
    }

    #[tokio::test]
    async fn test_bulk_query_component() {
        let store = fixtures::store().await;
        let build = store.create_build_id("test", "20241028", "1.0").await.unwrap();
        store
            .submit_component(&Component::new(&build.id, "gdb", "x86_64-linux", "1"))
            .await
            .unwrap();

        let queries = [
            BulkQuery::component("test", "x86_64-linux", "gdb"),
            BulkQuery::component("test", "x86_64-linux", "gnat"),
            BulkQuery { query: Some("component".to_string()), setup: Some("test".to_string()), ..BulkQuery::default() },
        ];
        let results = store.bulk_query(&queries).await.unwrap();
        match results[0].response.as_ref().unwrap() {
            BulkResponse::Component(component) => assert_eq!(component.name, "gdb"),
            other => panic!("expected a component response, got {other:?}"),
        }
        assert_eq!(results[1].msg, "No component matching criteria");
        assert!(results[2].msg.starts_with("Invalid component query:"));
    }

    #[tokio::test]
    async fn test_bulk_query_thirdparty_miss_is_silent() {
        let store = fixtures::store().await;
        let results = store
            .bulk_query(&[BulkQuery::source("zlib.tgz").with_kind("thirdparty")])
            .await
            .unwrap();
        assert!(results[0].response.is_none());
        assert!(results[0].msg.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_query_thirdparty_hit() {
        let store = fixtures::store().await;
        let dir = tempfile::tempdir().unwrap();
        let build = store.create_build_id("thirdparties", "20241028", "1.0").await.unwrap();
        let thirdparty = fixtures::bound_file(
            &build.id,
            FileKind::Thirdparty,
            "zlib.tgz",
            &fixtures::payload(dir.path(), "zlib.tgz", b"z"),
        );
        store.submit_file(&thirdparty).await.unwrap();

        let results = store
            .bulk_query(&[BulkQuery::source("zlib.tgz").with_kind("thirdparty")])
            .await
            .unwrap();
        match results[0].response.as_ref().unwrap() {
            BulkResponse::File(file) => assert_eq!(file.kind, FileKind::Thirdparty),
            other => panic!("expected a file response, got {other:?}"),
        }
    }
}
