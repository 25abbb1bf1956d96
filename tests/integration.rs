//! End-to-end connector flows against a scripted transport: index
//! bootstrap, an indexing run with file reconciliation, and a search with
//! access filtering and highlight rewriting.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use serde_json::{json, Value};

use azsearch_sync::config::{self, Config};
use azsearch_sync::document::{AttachedFile, ContentItem, Document};
use azsearch_sync::engine::{IndexOptions, SearchEngine};
use azsearch_sync::query::{ContextScope, SearchFilters};
use azsearch_sync::results::{AccessChecker, AccessDecision};
use azsearch_sync::transport::MockTransport;

fn setup_config() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("azs.toml");
    fs::write(
        &config_path,
        r#"[search]
endpoint = "https://unit.search.windows.net"
index = "content"
api_key = "secret"

[files]
enabled = true
"#,
    )
    .unwrap();
    (tmp, config_path)
}

fn engine() -> (TempDir, SearchEngine<MockTransport>) {
    let (tmp, config_path) = setup_config();
    let cfg: Config = config::load_config(&config_path).unwrap();
    (tmp, SearchEngine::new(cfg, MockTransport::new()))
}

struct Post {
    doc: Document,
    files: Vec<AttachedFile>,
    is_new: bool,
}

impl Post {
    fn new(id: &str, itemid: i64, title: &str, modified: i64) -> Self {
        let mut doc = Document::new_item(id, itemid, "mod_forum-post");
        doc.title = title.to_string();
        doc.content = format!("Body of {}", title);
        doc.modified = modified;
        doc.contextid = 7;
        doc.courseid = "11".to_string();
        Self {
            doc,
            files: Vec::new(),
            is_new: false,
        }
    }

    fn with_file(mut self, id: &str, filename: &str, modified: i64, content: &[u8]) -> Self {
        self.files.push(AttachedFile {
            id: id.to_string(),
            filename: filename.to_string(),
            mimetype: "text/plain".to_string(),
            modified,
            content: content.to_vec(),
        });
        self
    }
}

impl ContentItem for Post {
    fn export(&self) -> Document {
        self.doc.clone()
    }
    fn files(&self) -> Vec<AttachedFile> {
        self.files.clone()
    }
    fn is_new(&self) -> bool {
        self.is_new
    }
}

struct ForumAccess;

impl AccessChecker for ForumAccess {
    fn resolve_area(&self, areaid: &str) -> bool {
        areaid == "mod_forum-post"
    }
    fn check_access(&self, _areaid: &str, itemid: i64) -> AccessDecision {
        match itemid {
            13 => AccessDecision::Denied,
            66 => AccessDecision::DeniedPurge,
            _ => AccessDecision::Granted,
        }
    }
}

#[tokio::test]
async fn test_bootstrap_and_indexing_run() {
    let (_tmp, engine) = engine();

    // Index does not exist yet; the run creates it first.
    engine.transport().push_response(404, "");
    engine.transport().push_response(201, "");
    engine.index_starting(true).await.unwrap();

    let items = [
        Post::new("mod_forum-post-1", 1, "Welcome", 100),
        Post::new("mod_forum-post-2", 2, "Week one", 200),
    ];
    let refs: Vec<&dyn ContentItem> = items.iter().map(|i| i as &dyn ContentItem).collect();

    let report = engine
        .add_documents(&refs, &IndexOptions::default())
        .await
        .unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.docs, 2);
    assert_eq!(report.ignored, 0);
    assert_eq!(report.last_indexed, 200);
    assert!(!report.partial);

    let requests = engine.transport().requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[1].method, "PUT");
    assert_eq!(requests[2].method, "POST");
    assert!(requests[2].url.contains("/indexes/content/docs/index"));
    assert!(requests[2].url.contains("api-version=2016-09-01"));

    let body: Value = serde_json::from_str(&requests[2].body).unwrap();
    let docs = body["value"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["@search.action"], "mergeOrUpload");
    assert_eq!(docs[0]["id"], "mod_forum-post-1");
    assert_eq!(docs[1]["title"], "Week one");
}

#[tokio::test]
async fn test_indexing_run_reconciles_files() {
    let (_tmp, engine) = engine();

    let item = Post::new("mod_forum-post-1", 1, "Welcome", 100)
        .with_file("file-kept", "syllabus.txt", 50, b"course syllabus")
        .with_file("file-changed", "notes.txt", 60, b"updated notes");
    let refs: Vec<&dyn ContentItem> = vec![&item];

    // The index already holds: file-kept (unchanged), file-changed with a
    // stale hash, and file-orphan no longer attached to the item.
    let kept = &item.files[0];
    let listing = json!({
        "@odata.count": 3,
        "value": [
            {
                "id": "file-kept",
                "title": kept.filename,
                "modified": kept.modified,
                "filecontenthash": kept.content_hash(),
                "type": 2,
            },
            {
                "id": "file-changed",
                "title": "notes.txt",
                "modified": 60,
                "filecontenthash": "stale-hash",
                "type": 2,
            },
            {
                "id": "file-orphan",
                "title": "old.txt",
                "modified": 10,
                "filecontenthash": "gone",
                "type": 2,
            },
        ],
    });
    engine.transport().push_response(200, listing.to_string());

    let options = IndexOptions {
        index_files: true,
        ..Default::default()
    };
    let report = engine.add_documents(&refs, &options).await.unwrap();
    assert_eq!(report.docs, 1);

    let posts = engine.transport().requests_with_method("POST");

    // The orphan was deleted individually.
    let deletes: Vec<&_> = posts.iter().filter(|r| r.body.contains("\"delete\"")).collect();
    assert_eq!(deletes.len(), 1);
    let body: Value = serde_json::from_str(&deletes[0].body).unwrap();
    assert_eq!(body["value"][0]["id"], "file-orphan");

    // The bulk flush carries the parent and the changed file, not the
    // unchanged one.
    let bulk = posts
        .iter()
        .find(|r| r.url.contains("/docs/index") && !r.body.contains("\"delete\""))
        .expect("expected a bulk flush");
    let body: Value = serde_json::from_str(&bulk.body).unwrap();
    let ids: Vec<&str> = body["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["mod_forum-post-1", "file-changed"]);

    // The changed file carries the parent's metadata and its own text.
    let filedoc = &body["value"][1];
    assert_eq!(filedoc["parentid"], "mod_forum-post-1");
    assert_eq!(filedoc["type"], 2);
    assert_eq!(filedoc["title"], "notes.txt");
    assert_eq!(filedoc["filetext"], "updated notes");
}

#[tokio::test]
async fn test_rejected_flush_reduces_success_counts() {
    let (_tmp, engine) = engine();
    engine.transport().push_response(413, "");

    let items = [
        Post::new("a", 1, "One", 100),
        Post::new("b", 2, "Two", 200),
        Post::new("c", 3, "Three", 300),
    ];
    let refs: Vec<&dyn ContentItem> = items.iter().map(|i| i as &dyn ContentItem).collect();

    let report = engine
        .add_documents(&refs, &IndexOptions::default())
        .await
        .unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(report.ignored, 3);
    assert_eq!(report.docs, 0);
}

#[tokio::test]
async fn test_search_with_access_filtering_and_highlights() {
    let (_tmp, mut engine) = engine();

    let response = json!({
        "@odata.count": 4,
        "value": [
            {
                "id": "mod_forum-post-42",
                "parentid": "mod_forum-post-42",
                "itemid": 42,
                "title": "Deployment checklist",
                "content": "full body text",
                "contextid": 7,
                "areaid": "mod_forum-post",
                "type": 1,
                "courseid": "11",
                "owneruserid": 3,
                "modified": 1504505792,
                "@search.highlights": {
                    "content": ["about @@HI_S@@deployment@@HI_E@@ @@HI_S@@steps@@HI_E@@"],
                },
            },
            {
                "id": "mod_forum-post-13",
                "itemid": 13,
                "title": "Hidden post",
                "areaid": "mod_forum-post",
                "type": 1,
            },
            {
                "id": "mod_forum-post-66",
                "itemid": 66,
                "title": "Deleted post",
                "areaid": "mod_forum-post",
                "type": 1,
            },
            {
                "id": "mod_wiki-page-9",
                "itemid": 9,
                "title": "Unknown area",
                "areaid": "mod_wiki-page",
                "type": 1,
            },
        ],
    });
    engine.transport().push_response(200, response.to_string());

    let filters = SearchFilters {
        q: "deployment".to_string(),
        ..Default::default()
    };
    let results = engine
        .execute_query(&filters, &ContextScope::contexts(vec![7]), 10, &ForumAccess)
        .await
        .unwrap();

    // Only the granted forum post survives; adjacent highlight fragments
    // were collapsed into one wrapped span.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "mod_forum-post-42");
    assert_eq!(results[0].content, "about <mark>deployment steps</mark>");
    assert_eq!(engine.query_total_count(), 1);

    let posts = engine.transport().requests_with_method("POST");

    // The search request carried the context filter and highlight markers.
    let search: Value = serde_json::from_str(&posts[0].body).unwrap();
    assert_eq!(search["filter"], "(search.in(contextid, '7'))");
    assert_eq!(search["highlightPreTag"], "@@HI_S@@");

    // The purged result triggered an index deletion.
    let delete = posts
        .iter()
        .find(|r| r.body.contains("\"delete\""))
        .expect("expected a purge delete");
    let body: Value = serde_json::from_str(&delete.body).unwrap();
    assert_eq!(body["value"][0]["id"], "mod_forum-post-66");
}

#[tokio::test]
async fn test_delete_all_recreates_empty_index() {
    let (_tmp, engine) = engine();
    engine.transport().push_response(204, "");
    engine.transport().push_response(201, "");

    assert!(engine.delete_all().await.unwrap());

    let requests = engine.transport().requests();
    assert_eq!(requests[0].method, "DELETE");
    assert_eq!(requests[1].method, "PUT");
    let schema: Value = serde_json::from_str(&requests[1].body).unwrap();
    assert_eq!(schema["name"], "content");
}
