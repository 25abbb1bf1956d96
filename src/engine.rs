//! Engine orchestration: index lifecycle, batched document submission,
//! file reconciliation, query execution, and deletion.
//!
//! The engine is synchronous in structure — one network call at a time, no
//! background work. All traffic goes through the injected [`Transport`], so
//! every path can be exercised against canned responses.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Instant;

use crate::batch::BatchUploader;
use crate::config::Config;
use crate::document::{AttachedFile, ContentItem, DocKind, Document};
use crate::extract;
use crate::query::{self, ContextScope, SearchFilters, MAX_RESULTS};
use crate::results::{self, AccessChecker, AccessDecision, ResultDocument, WRAP_CLOSE, WRAP_OPEN};
use crate::transport::Transport;

/// Reachability of the configured search endpoint, reported as a plain-text
/// message for administrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Ready,
    NotConfigured,
    Unreachable(String),
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Ready => write!(f, "Search server is ready"),
            ServerStatus::NotConfigured => {
                write!(f, "Search engine endpoint, index or API version is not configured")
            }
            ServerStatus::Unreachable(detail) => {
                write!(f, "Search server is not responding: {}", detail)
            }
        }
    }
}

/// Options for one indexing run.
#[derive(Debug, Default)]
pub struct IndexOptions {
    /// Also index each item's attached files.
    pub index_files: bool,
    /// The area has never been indexed; every item is treated as new and
    /// reconciliation is skipped.
    pub first_run: bool,
    /// Deadline checked between items; at least one item is always
    /// processed so a short deadline cannot stall progress forever.
    pub stop_at: Option<Instant>,
}

/// Counters for one indexing run. Failures surface here, not as errors:
/// callers detect partial failure by comparing `docs` against `records`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    /// Items processed from the iterator.
    pub records: usize,
    /// Documents successfully submitted.
    pub docs: usize,
    /// Documents given up on (serialization failures, rejected flushes).
    pub ignored: usize,
    /// `modified` timestamp of the last processed item.
    pub last_indexed: i64,
    /// The run stopped at the deadline with items remaining.
    pub partial: bool,
}

/// An already-indexed file record read back during reconciliation.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexedFileRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub filecontenthash: String,
    #[serde(rename = "type", default = "file_kind")]
    pub kind: DocKind,
}

fn file_kind() -> DocKind {
    DocKind::File
}

/// The connector engine.
pub struct SearchEngine<T: Transport> {
    config: Config,
    transport: T,
    total_matched: usize,
}

impl<T: Transport> SearchEngine<T> {
    pub fn new(config: Config, transport: T) -> Self {
        Self {
            config,
            transport,
            total_matched: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build a request URL for a path under the configured index.
    ///
    /// Missing endpoint, index or API version is a configuration error and
    /// fatal at the operation that needs the URL.
    fn endpoint_url(&self, path: &str) -> Result<String> {
        let search = &self.config.search;
        if search.endpoint.is_empty() || search.index.is_empty() || search.api_version.is_empty() {
            bail!("Search engine endpoint, index or API version is not configured");
        }

        Ok(format!(
            "{}/indexes/{}{}?api-version={}",
            search.endpoint.trim_end_matches('/'),
            search.index,
            path,
            search.api_version
        ))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Index lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Check endpoint reachability, reporting a plain-text status.
    pub async fn server_status(&self) -> ServerStatus {
        let url = match self.endpoint_url("") {
            Ok(url) => url,
            Err(_) => return ServerStatus::NotConfigured,
        };

        match self.transport.get(&url).await {
            Ok(response) if response.status == 200 => ServerStatus::Ready,
            Ok(response) => ServerStatus::Unreachable(format!("error code {}", response.status)),
            Err(e) => ServerStatus::Unreachable(e.to_string()),
        }
    }

    /// Whether the configured index exists.
    pub async fn check_index(&self) -> Result<bool> {
        let url = self.endpoint_url("")?;
        let response = self.transport.get(&url).await?;
        Ok(response.status == 200)
    }

    /// Create the index with the full field schema. Failure is fatal.
    pub async fn create_index(&self) -> Result<()> {
        let url = self.endpoint_url("")?;
        let schema = crate::document::index_schema(&self.config.search.index);
        let response = self
            .transport
            .put(&url, serde_json::to_string(&schema)?)
            .await?;

        if response.status != 201 {
            bail!(
                "Failed to create index '{}' (error code {}): {}",
                self.config.search.index,
                response.status,
                response.body
            );
        }
        Ok(())
    }

    /// Called when indexing is triggered; on a full run, create the index
    /// if it does not exist yet.
    pub async fn index_starting(&self, full_index: bool) -> Result<()> {
        if full_index && !self.check_index().await? {
            self.create_index().await?;
        }
        Ok(())
    }

    /// Whether file indexing is configured and the Tika server answers.
    pub async fn file_indexing_enabled(&self) -> bool {
        if !self.config.files.enabled {
            return false;
        }
        let url = self.config.files.tika_base_url();
        matches!(self.transport.get(&url).await, Ok(r) if r.status == 200)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Indexing
    // ═══════════════════════════════════════════════════════════════════

    /// Index a sequence of content items through the batch upload engine.
    ///
    /// Items are processed in order. The deadline is checked between whole
    /// items only, never mid-reconciliation, and the first item is always
    /// processed. A final forced flush drains the buffer before returning.
    pub async fn add_documents(
        &self,
        items: &[&dyn ContentItem],
        options: &IndexOptions,
    ) -> Result<IndexReport> {
        let url = self.endpoint_url("/docs/index")?;
        let mut uploader = BatchUploader::new(
            &self.transport,
            url,
            self.config.batching.max_payload_bytes,
            self.config.batching.max_payload_docs,
        );

        let mut report = IndexReport::default();

        for item in items {
            if report.records > 0 {
                if let Some(stop_at) = options.stop_at {
                    if Instant::now() >= stop_at {
                        report.partial = true;
                        break;
                    }
                }
            }

            let document = item.export();
            report.last_indexed = document.modified;
            report.records += 1;
            report.ignored += uploader.add(Some(&document), true, false).await?;

            if options.index_files {
                let is_new = options.first_run || item.is_new();
                report.ignored += self
                    .process_item_files(*item, is_new, &document, &mut uploader)
                    .await?;
            }
        }

        report.ignored += uploader.add(None, true, true).await?;
        report.docs = report.records.saturating_sub(report.ignored);
        Ok(report)
    }

    /// Submit a single document immediately, outside a batch run.
    pub async fn add_document(&self, item: &dyn ContentItem, index_files: bool) -> Result<bool> {
        let document = item.export();
        let url = self.endpoint_url("/docs/index")?;
        let body = serde_json::to_string(&json!({ "value": [document] }))?;
        let response = self.transport.post(&url, body).await?;

        if response.status != 200 && response.status != 201 {
            eprintln!(
                "Warning: failed to add document {}: {}",
                document.id, response.body
            );
            return Ok(false);
        }

        if index_files {
            let mut uploader = BatchUploader::new(
                &self.transport,
                self.endpoint_url("/docs/index")?,
                self.config.batching.max_payload_bytes,
                self.config.batching.max_payload_docs,
            );
            self.process_item_files(item, item.is_new(), &document, &mut uploader)
                .await?;
        }

        Ok(true)
    }

    /// Reconcile and submit one item's attached files, then force a flush
    /// to drain any buffered file documents (even when there are none).
    async fn process_item_files(
        &self,
        item: &dyn ContentItem,
        is_new: bool,
        document: &Document,
        uploader: &mut BatchUploader<'_>,
    ) -> Result<usize> {
        let files = if is_new {
            // First-time indexing: nothing remote to diff against.
            item.files()
        } else {
            let (keep, stale) = self.reconcile_files(document, item.files()).await?;
            for id in &stale {
                // File documents are not expressible through the standard
                // document deletion API, so each is deleted individually.
                self.delete_by_id(id).await?;
            }
            keep
        };

        let mut ignored = 0;
        for file in &files {
            let filetext =
                extract::extract_file_text(&self.config.files, &self.transport, file).await;
            let filedoc = document.export_file(file, filetext);
            ignored += uploader.add(Some(&filedoc), false, false).await?;
        }

        ignored += uploader.add(None, false, true).await?;
        Ok(ignored)
    }

    /// Page through the indexed file records for an item and diff them
    /// against the currently attached files.
    ///
    /// Returns the files that still need (re)submission and the ids of
    /// indexed records whose file is no longer attached. A file is dropped
    /// from the submission set only when its modified time, title and
    /// content hash all match the indexed record; any difference leaves it
    /// in place, and the upsert overwrites the stale entry.
    async fn reconcile_files(
        &self,
        document: &Document,
        files: Vec<AttachedFile>,
    ) -> Result<(Vec<AttachedFile>, Vec<String>)> {
        let rows = self.config.batching.page_size;
        let mut unchanged: HashSet<String> = HashSet::new();
        let mut stale: Vec<String> = Vec::new();

        let (mut total, mut page) = self.indexed_files_page(document, 0, rows).await?;
        let mut fetched = 0;

        loop {
            for record in &page {
                match files.iter().find(|f| f.id == record.id) {
                    Some(file) => {
                        if record.modified == file.modified
                            && record.title == file.filename
                            && record.filecontenthash == file.content_hash()
                        {
                            unchanged.insert(record.id.clone());
                        }
                    }
                    None => stale.push(record.id.clone()),
                }
            }

            fetched += rows;
            if fetched >= total {
                break;
            }
            // The total is re-read every page in case records changed
            // underneath us between requests.
            let (next_total, next_page) = self.indexed_files_page(document, fetched, rows).await?;
            total = next_total;
            page = next_page;
        }

        let keep = files
            .into_iter()
            .filter(|f| !unchanged.contains(&f.id))
            .collect();
        Ok((keep, stale))
    }

    /// Fetch one page of indexed file records for an item, along with the
    /// server-reported total. A response without a `value` array
    /// short-circuits with a count of zero.
    async fn indexed_files_page(
        &self,
        document: &Document,
        start: usize,
        rows: usize,
    ) -> Result<(usize, Vec<IndexedFileRecord>)> {
        let url = self.endpoint_url("/docs/search")?;
        let request = query::files_query(document, start, rows);
        let response = self
            .transport
            .post(&url, serde_json::to_string(&request)?)
            .await?;

        let parsed: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        let Some(values) = parsed.get("value").and_then(Value::as_array) else {
            return Ok((0, Vec::new()));
        };

        let total = parsed
            .get("@odata.count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        let mut records = Vec::with_capacity(values.len());
        for value in values {
            let record: IndexedFileRecord = serde_json::from_value(value.clone())
                .context("Malformed indexed file record")?;
            records.push(record);
        }

        Ok((total, records))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Search
    // ═══════════════════════════════════════════════════════════════════

    /// Execute a search request and post-process the results.
    ///
    /// `limit` of zero means the default result cap. Granted results beyond
    /// the limit are not materialized but still count toward
    /// [`query_total_count`](Self::query_total_count).
    pub async fn execute_query(
        &mut self,
        filters: &SearchFilters,
        scope: &ContextScope,
        limit: usize,
        checker: &dyn AccessChecker,
    ) -> Result<Vec<ResultDocument>> {
        let url = self.endpoint_url("/docs/search")?;
        let limit = if limit == 0 { MAX_RESULTS } else { limit };

        let request = query::with_highlighting(query::build_query(filters, scope));
        let response = self
            .transport
            .post(&url, serde_json::to_string(&request)?)
            .await?;

        let raw: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        self.total_matched = 0;
        self.process_results(&raw, limit, checker).await
    }

    /// Total granted results for the most recent query, including those
    /// beyond the requested limit. Used for pagination.
    pub fn query_total_count(&self) -> usize {
        self.total_matched
    }

    async fn process_results(
        &mut self,
        raw: &Value,
        limit: usize,
        checker: &dyn AccessChecker,
    ) -> Result<Vec<ResultDocument>> {
        let mut docs = Vec::new();
        let Some(values) = raw.get("value").and_then(Value::as_array) else {
            return Ok(docs);
        };

        for result in values {
            let areaid = result.get("areaid").and_then(Value::as_str).unwrap_or("");
            if !checker.resolve_area(areaid) {
                continue;
            }
            let itemid = result.get("itemid").and_then(Value::as_i64).unwrap_or(0);

            match checker.check_access(areaid, itemid) {
                AccessDecision::DeniedPurge => {
                    // Self-healing removal of content that no longer exists.
                    if let Some(id) = result.get("id").and_then(Value::as_str) {
                        self.delete_by_id(id).await?;
                    }
                }
                AccessDecision::Denied => {}
                AccessDecision::Granted => {
                    if docs.len() < limit {
                        let mut value = result.clone();
                        results::apply_highlights(&mut value);
                        results::rewrite_result_markers(&mut value, WRAP_OPEN, WRAP_CLOSE);
                        match serde_json::from_value::<ResultDocument>(value) {
                            Ok(doc) => docs.push(doc),
                            Err(e) => {
                                eprintln!("Warning: skipping malformed search result: {}", e)
                            }
                        }
                    }
                    self.total_matched += 1;
                }
            }
        }

        Ok(docs)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Deletion
    // ═══════════════════════════════════════════════════════════════════

    /// Delete one document by index key via the bulk endpoint.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let url = self.endpoint_url("/docs/index")?;
        let body = serde_json::to_string(&json!({
            "value": [{ "@search.action": "delete", "id": id }]
        }))?;

        let response = self.transport.post(&url, body).await?;
        if response.status != 200 {
            eprintln!("Warning: failed to delete document {}: {}", id, response.body);
            return Ok(false);
        }
        Ok(true)
    }

    /// Delete the entire index and recreate it empty.
    ///
    /// A 404 on deletion means the index did not exist, which is treated
    /// the same as a successful deletion.
    pub async fn delete_all(&self) -> Result<bool> {
        let url = self.endpoint_url("")?;
        let response = self.transport.delete(&url).await?;

        if response.status == 204 || response.status == 404 {
            self.create_index().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Delete every indexed record belonging to one search area.
    pub async fn delete_area(&self, areaid: &str) -> Result<bool> {
        let mut all_deleted = true;
        for record in self.area_records(areaid).await? {
            if let Some(id) = record.get("id").and_then(Value::as_str) {
                all_deleted &= self.delete_by_id(id).await?;
            }
        }
        Ok(all_deleted)
    }

    /// Collect every indexed record in an area, page by page.
    async fn area_records(&self, areaid: &str) -> Result<Vec<Value>> {
        let rows = self.config.batching.page_size;
        let url = self.endpoint_url("/docs/search")?;
        let mut records = Vec::new();
        let mut start = 0;

        loop {
            let request = query::area_query(areaid, start, rows);
            let response = self
                .transport
                .post(&url, serde_json::to_string(&request)?)
                .await?;

            let parsed: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
            let Some(page) = parsed.get("value").and_then(Value::as_array) else {
                break;
            };
            let total = parsed
                .get("@odata.count")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;

            records.extend(page.iter().cloned());
            start += rows;
            if start >= total {
                break;
            }
        }

        Ok(records)
    }
}
