//! Core data model: projects, records, and collection schemas.
//!
//! A [`Record`] is one semantically meaningful unit (function, type, document
//! section, conversation) destined for a single entry in the external vector
//! index. Records are a tagged sum over [`RecordPayload`]; the ingestion
//! pipeline dispatches on [`RecordKind`] when grouping for flush.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// A discovered source tree, classified and persisted by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project name (directory basename)
    pub name: String,
    /// Absolute root path of the project
    pub root_path: PathBuf,
    /// Dominant language kind, from classification
    pub language_kind: LanguageKind,
    /// Glob patterns to include (empty means all source files)
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Glob patterns to exclude
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Classification confidence: 1 = manifest-based, 2 = convention-based
    pub priority: u8,
    /// Number of matching source files found at discovery time
    pub file_count: usize,
}

/// Dominant language of a project, inferred from its manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageKind {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    Unknown,
}

/// Discriminator over record kinds; one kind maps to one store collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    CodeChunk,
    TypeDefinition,
    DocChunk,
    ConversationMemory,
}

impl RecordKind {
    /// All kinds, in flush order
    pub const ALL: [RecordKind; 4] = [
        RecordKind::CodeChunk,
        RecordKind::TypeDefinition,
        RecordKind::DocChunk,
        RecordKind::ConversationMemory,
    ];

    /// Collection (class) name in the external index
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::CodeChunk => "CodeChunk",
            RecordKind::TypeDefinition => "TypeDefinition",
            RecordKind::DocChunk => "DocChunk",
            RecordKind::ConversationMemory => "ConversationMemory",
        }
    }

    /// The field set the live collection must carry for this kind
    pub fn schema(&self) -> CollectionSchema {
        let mut fields = vec![
            FieldSpec::new("content", FieldType::Text),
            FieldSpec::new("sourcePath", FieldType::Text),
            FieldSpec::new("project", FieldType::Text),
        ];
        match self {
            RecordKind::CodeChunk => fields.extend([
                FieldSpec::new("name", FieldType::Text),
                FieldSpec::new("chunkType", FieldType::Text),
                FieldSpec::new("lineStart", FieldType::Int),
                FieldSpec::new("lineEnd", FieldType::Int),
                FieldSpec::new("signature", FieldType::Text),
                FieldSpec::new("exported", FieldType::Boolean),
                FieldSpec::new("isAsync", FieldType::Boolean),
                FieldSpec::new("imports", FieldType::TextArray),
                FieldSpec::new("exports", FieldType::TextArray),
                FieldSpec::new("usedTypes", FieldType::TextArray),
                FieldSpec::new("complexity", FieldType::Int),
            ]),
            RecordKind::TypeDefinition => fields.extend([
                FieldSpec::new("name", FieldType::Text),
                FieldSpec::new("typeKind", FieldType::Text),
                FieldSpec::new("properties", FieldType::TextArray),
                FieldSpec::new("extendsTypes", FieldType::TextArray),
                FieldSpec::new("fromDatabase", FieldType::Boolean),
            ]),
            RecordKind::DocChunk => fields.extend([
                FieldSpec::new("title", FieldType::Text),
                FieldSpec::new("section", FieldType::Text),
                FieldSpec::new("chunkIndex", FieldType::Int),
            ]),
            RecordKind::ConversationMemory => fields.extend([
                FieldSpec::new("sessionId", FieldType::Text),
                FieldSpec::new("summary", FieldType::Text),
                FieldSpec::new("topics", FieldType::TextArray),
                FieldSpec::new("timestamp", FieldType::Text),
                FieldSpec::new("agentType", FieldType::Text),
                FieldSpec::new("model", FieldType::Text),
                FieldSpec::new("cost", FieldType::Number),
                FieldSpec::new("inputTokens", FieldType::Int),
                FieldSpec::new("outputTokens", FieldType::Int),
                FieldSpec::new("parentSessionId", FieldType::Text),
            ]),
        }
        CollectionSchema {
            class: self.collection().to_string(),
            fields,
        }
    }
}

/// One semantic unit extracted from a source artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Owning project name (foreign key into the projects manifest)
    pub project: String,
    /// Path relative to the project root
    pub source_path: String,
    /// Text body sent to the index for embedding
    pub content: String,
    /// Kind-specific fields
    pub payload: RecordPayload,
}

/// Kind-specific record fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RecordPayload {
    CodeChunk {
        name: String,
        chunk_type: String,
        line_start: usize,
        line_end: usize,
        signature: String,
        exported: bool,
        is_async: bool,
        imports: Vec<String>,
        exports: Vec<String>,
        used_types: Vec<String>,
        complexity: u32,
    },
    TypeDefinition {
        name: String,
        type_kind: String,
        properties: Vec<String>,
        extends_types: Vec<String>,
        from_database: bool,
    },
    DocChunk {
        title: String,
        section: String,
        chunk_index: usize,
    },
    ConversationMemory {
        session_id: String,
        summary: String,
        topics: Vec<String>,
        timestamp: String,
        agent_type: String,
        model: String,
        cost: f64,
        input_tokens: u64,
        output_tokens: u64,
        parent_session_id: Option<String>,
    },
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match &self.payload {
            RecordPayload::CodeChunk { .. } => RecordKind::CodeChunk,
            RecordPayload::TypeDefinition { .. } => RecordKind::TypeDefinition,
            RecordPayload::DocChunk { .. } => RecordKind::DocChunk,
            RecordPayload::ConversationMemory { .. } => RecordKind::ConversationMemory,
        }
    }

    /// Natural key: `(project, sourcePath, kind-specific discriminator)`.
    ///
    /// ConversationMemory is keyed by session id alone so that a session stays
    /// unique per store regardless of where its transcript file lives.
    pub fn natural_key(&self) -> String {
        match &self.payload {
            RecordPayload::CodeChunk {
                name, line_start, ..
            } => format!("{}\u{1f}{}\u{1f}{}:{}", self.project, self.source_path, name, line_start),
            RecordPayload::TypeDefinition { name, .. } => {
                format!("{}\u{1f}{}\u{1f}{}", self.project, self.source_path, name)
            }
            RecordPayload::DocChunk { chunk_index, .. } => {
                format!("{}\u{1f}{}\u{1f}{}", self.project, self.source_path, chunk_index)
            }
            RecordPayload::ConversationMemory { session_id, .. } => session_id.clone(),
        }
    }

    /// Deterministic object id derived from the natural key, formatted as a
    /// UUID so re-upserting the same record replaces rather than duplicates.
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind().collection().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.natural_key().as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!(
            "{}-{}-{}-{}-{}",
            &hash[0..8],
            &hash[8..12],
            &hash[12..16],
            &hash[16..20],
            &hash[20..32]
        )
    }

    /// Flatten into the property map the store expects. Every key here must
    /// appear in the kind's [`CollectionSchema`].
    pub fn to_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("content".into(), json!(self.content));
        props.insert("sourcePath".into(), json!(self.source_path));
        props.insert("project".into(), json!(self.project));
        match &self.payload {
            RecordPayload::CodeChunk {
                name,
                chunk_type,
                line_start,
                line_end,
                signature,
                exported,
                is_async,
                imports,
                exports,
                used_types,
                complexity,
            } => {
                props.insert("name".into(), json!(name));
                props.insert("chunkType".into(), json!(chunk_type));
                props.insert("lineStart".into(), json!(line_start));
                props.insert("lineEnd".into(), json!(line_end));
                props.insert("signature".into(), json!(signature));
                props.insert("exported".into(), json!(exported));
                props.insert("isAsync".into(), json!(is_async));
                props.insert("imports".into(), json!(imports));
                props.insert("exports".into(), json!(exports));
                props.insert("usedTypes".into(), json!(used_types));
                props.insert("complexity".into(), json!(complexity));
            }
            RecordPayload::TypeDefinition {
                name,
                type_kind,
                properties,
                extends_types,
                from_database,
            } => {
                props.insert("name".into(), json!(name));
                props.insert("typeKind".into(), json!(type_kind));
                props.insert("properties".into(), json!(properties));
                props.insert("extendsTypes".into(), json!(extends_types));
                props.insert("fromDatabase".into(), json!(from_database));
            }
            RecordPayload::DocChunk {
                title,
                section,
                chunk_index,
            } => {
                props.insert("title".into(), json!(title));
                props.insert("section".into(), json!(section));
                props.insert("chunkIndex".into(), json!(chunk_index));
            }
            RecordPayload::ConversationMemory {
                session_id,
                summary,
                topics,
                timestamp,
                agent_type,
                model,
                cost,
                input_tokens,
                output_tokens,
                parent_session_id,
            } => {
                props.insert("sessionId".into(), json!(session_id));
                props.insert("summary".into(), json!(summary));
                props.insert("topics".into(), json!(topics));
                props.insert("timestamp".into(), json!(timestamp));
                props.insert("agentType".into(), json!(agent_type));
                props.insert("model".into(), json!(model));
                props.insert("cost".into(), json!(cost));
                props.insert("inputTokens".into(), json!(input_tokens));
                props.insert("outputTokens".into(), json!(output_tokens));
                props.insert(
                    "parentSessionId".into(),
                    json!(parent_session_id.clone().unwrap_or_default()),
                );
            }
        }
        props
    }
}

/// The named field set the external store enforces per record kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub class: String,
    pub fields: Vec<FieldSpec>,
}

impl CollectionSchema {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// A single named field in a collection schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: &str, data_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
        }
    }
}

/// Store-level field data types (Weaviate's primitive set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    TextArray,
    Int,
    Number,
    Boolean,
}

impl FieldType {
    /// Wire name in the store's schema API
    pub fn wire_name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::TextArray => "text[]",
            FieldType::Int => "int",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "text" | "string" => Some(FieldType::Text),
            "text[]" | "string[]" => Some(FieldType::TextArray),
            "int" => Some(FieldType::Int),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }

    /// Default value filled in for records that predate a field
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Text => json!(""),
            FieldType::TextArray => json!([]),
            FieldType::Int => json!(0),
            FieldType::Number => json!(0.0),
            FieldType::Boolean => json!(false),
        }
    }
}

/// One ranked search hit returned by the store, score in [0, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedHit {
    pub score: f32,
    pub collection: String,
    pub properties: Map<String, Value>,
}
