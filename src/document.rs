//! Wire document model and the index field catalogue.
//!
//! Each indexable unit (a content item, or one file attached to an item) is a
//! flat [`Document`]. Every exported document carries an `@search.action`
//! discriminator so the bulk endpoint treats it as an upsert
//! (`mergeOrUpload`) or a deletion (`delete`).
//!
//! The field catalogue ([`schema_fields`]) is a single tagged description
//! consumed by both the index-creation path (schema PUT) and the document
//! export path, so the two can never drift apart.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Bulk endpoint action discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "mergeOrUpload")]
    MergeOrUpload,
    #[serde(rename = "delete")]
    Delete,
}

/// Whether a document represents a whole content item or one attached file.
///
/// Serialized as the integer the index stores: item = 1, file = 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Item,
    File,
}

impl DocKind {
    pub fn as_wire(self) -> i32 {
        match self {
            DocKind::Item => 1,
            DocKind::File => 2,
        }
    }

    pub fn from_wire(value: i32) -> Self {
        if value == 2 {
            DocKind::File
        } else {
            DocKind::Item
        }
    }
}

impl Serialize for DocKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for DocKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(DocKind::from_wire(i32::deserialize(deserializer)?))
    }
}

/// One indexable unit in Azure Search wire shape.
///
/// `parentid` equals `id` for top-level items and points at the owning item
/// for file documents. `filetext` is searchable but never retrievable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "@search.action")]
    pub action: Action,
    pub id: String,
    pub parentid: String,
    pub itemid: i64,
    pub title: String,
    pub content: String,
    pub contextid: i64,
    pub areaid: String,
    #[serde(rename = "type")]
    pub kind: DocKind,
    pub courseid: String,
    pub owneruserid: i64,
    pub modified: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groupid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filetext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filecontenthash: Option<String>,
}

impl Document {
    /// Create a top-level item document with upsert semantics.
    ///
    /// `parentid` defaults to the document's own id, the invariant for
    /// top-level items.
    pub fn new_item(id: impl Into<String>, itemid: i64, areaid: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            action: Action::MergeOrUpload,
            parentid: id.clone(),
            id,
            itemid,
            title: String::new(),
            content: String::new(),
            contextid: 0,
            areaid: areaid.into(),
            kind: DocKind::Item,
            courseid: String::new(),
            owneruserid: 0,
            modified: 0,
            userid: None,
            groupid: None,
            description1: None,
            description2: None,
            filetext: None,
            filecontenthash: None,
        }
    }

    /// Export the document for one of its attached files.
    ///
    /// The file document inherits the item's area/course/context fields but
    /// drops the item body and descriptions; the extracted file text and the
    /// content hash take their place.
    pub fn export_file(&self, file: &AttachedFile, filetext: String) -> Document {
        let mut doc = self.clone();
        doc.content = String::new();
        doc.description1 = None;
        doc.description2 = None;

        doc.id = file.id.clone();
        doc.parentid = self.id.clone();
        doc.kind = DocKind::File;
        doc.title = file.filename.clone();
        doc.modified = file.modified;
        doc.filetext = Some(filetext);
        doc.filecontenthash = Some(file.content_hash());
        doc
    }
}

/// A file currently attached to a content item.
///
/// `id` is the source system's native file key, not the synthesized index
/// key of the owning item.
#[derive(Debug, Clone)]
pub struct AttachedFile {
    pub id: String,
    pub filename: String,
    pub mimetype: String,
    pub modified: i64,
    pub content: Vec<u8>,
}

impl AttachedFile {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Hex sha256 of the file body, compared against the indexed record
    /// during reconciliation.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        hex::encode(hasher.finalize())
    }
}

/// A content item as supplied by the host content framework.
///
/// The engine only sees items through this seam: an exported parent
/// document, the currently attached files, and whether the item has ever
/// been indexed before (new items skip reconciliation entirely).
pub trait ContentItem {
    fn export(&self) -> Document;
    fn files(&self) -> Vec<AttachedFile>;
    fn is_new(&self) -> bool {
        false
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Field catalogue
// ═══════════════════════════════════════════════════════════════════════

/// Azure Search EDM field types used by this index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    String,
    Int32,
}

impl EdmType {
    pub fn as_wire(self) -> &'static str {
        match self {
            EdmType::String => "Edm.String",
            EdmType::Int32 => "Edm.Int32",
        }
    }
}

/// Schema description of one index field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: EdmType,
    pub retrievable: bool,
    pub searchable: bool,
    pub filterable: bool,
    pub key: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: EdmType) -> Self {
        Self {
            name,
            kind,
            retrievable: true,
            searchable: false,
            filterable: false,
            key: false,
        }
    }

    const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    const fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    const fn key(mut self) -> Self {
        self.key = true;
        self
    }

    const fn not_retrievable(mut self) -> Self {
        self.retrievable = false;
        self
    }

    fn to_value(self) -> Value {
        let mut field = json!({
            "name": self.name,
            "type": self.kind.as_wire(),
            "retrievable": self.retrievable,
            "searchable": self.searchable,
            "filterable": self.filterable,
        });
        // "key" is only meaningful on the index key field.
        if self.key {
            field["key"] = json!(true);
        }
        field
    }
}

/// Fields every document must carry.
pub const REQUIRED_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", EdmType::String).searchable().key(),
    FieldSpec::new("parentid", EdmType::String),
    FieldSpec::new("itemid", EdmType::Int32),
    FieldSpec::new("title", EdmType::String).searchable(),
    FieldSpec::new("content", EdmType::String).searchable(),
    FieldSpec::new("contextid", EdmType::Int32).filterable(),
    FieldSpec::new("areaid", EdmType::String).filterable(),
    FieldSpec::new("type", EdmType::Int32),
    FieldSpec::new("courseid", EdmType::String).filterable(),
    FieldSpec::new("owneruserid", EdmType::Int32),
    FieldSpec::new("modified", EdmType::Int32).filterable(),
];

/// Fields documents may carry.
pub const OPTIONAL_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("userid", EdmType::Int32),
    FieldSpec::new("groupid", EdmType::Int32),
    FieldSpec::new("description1", EdmType::String).searchable(),
    FieldSpec::new("description2", EdmType::String).searchable(),
    FieldSpec::new("filetext", EdmType::String)
        .searchable()
        .not_retrievable(),
];

/// The full catalogue, required fields first.
pub fn schema_fields() -> Vec<FieldSpec> {
    REQUIRED_FIELDS
        .iter()
        .chain(OPTIONAL_FIELDS.iter())
        .copied()
        .collect()
}

/// Index schema submitted on index creation.
pub fn index_schema(index: &str) -> Value {
    let fields: Vec<Value> = schema_fields().into_iter().map(FieldSpec::to_value).collect();
    json!({ "name": index, "fields": fields })
}
