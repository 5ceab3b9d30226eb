//! The fixed three-tool menu and the values that flow through it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ToolParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: std::collections::BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: std::collections::BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(
        mut self,
        name: impl Into<String>,
        schema: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertySchema {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            schema_type: "string".to_string(),
            description: Some(description.into()),
        }
    }
}

const RAG_SEARCH_DESCRIPTION: &str = "MANDATORY FIRST STEP: Search the local legal database of Indian laws \
(IPC and BNS sections, central Acts, legal procedures). ALWAYS call this tool first for ANY legal question.";

const WEB_SEARCH_DESCRIPTION: &str = "FALLBACK ONLY: Search trusted government and legal websites. Use only \
when rag_search returned no results or for very recent legal updates. Do NOT use if rag_search found \
relevant results.";

const READ_URL_DESCRIPTION: &str = "Read the full text of one webpage. Only for URLs on trusted domains \
(gov.in, nic.in, indiankanoon.org) returned by web_search.";

/// One of the three tools the model may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    RetrieveLocal,
    SearchWeb,
    ReadPage,
}

impl ToolKind {
    /// Declaration order, which is also the order the pseudo-tag parser scans in.
    pub const ALL: [ToolKind; 3] = [ToolKind::RetrieveLocal, ToolKind::SearchWeb, ToolKind::ReadPage];

    /// Name declared to the model.
    pub fn wire_name(self) -> &'static str {
        match self {
            ToolKind::RetrieveLocal => "rag_search",
            ToolKind::SearchWeb => "web_search",
            ToolKind::ReadPage => "read_url",
        }
    }

    /// Alternate name some prompts and logs use for the same tool.
    pub fn alias(self) -> &'static str {
        match self {
            ToolKind::RetrieveLocal => "retrieve_local",
            ToolKind::SearchWeb => "search_web",
            ToolKind::ReadPage => "read_page",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == name || kind.alias() == name)
    }

    /// The single argument key this tool reads.
    pub fn argument_key(self) -> &'static str {
        match self {
            ToolKind::RetrieveLocal | ToolKind::SearchWeb => "query",
            ToolKind::ReadPage => "url",
        }
    }

    pub fn definition(self) -> ToolDefinition {
        let (description, argument) = match self {
            ToolKind::RetrieveLocal => (RAG_SEARCH_DESCRIPTION, "The legal question to search for"),
            ToolKind::SearchWeb => (WEB_SEARCH_DESCRIPTION, "Search query for Indian legal information"),
            ToolKind::ReadPage => (READ_URL_DESCRIPTION, "URL of the webpage to read"),
        };
        ToolDefinition::new(self.wire_name(), description).with_parameters(
            ToolParameters::new().add_property(self.argument_key(), PropertySchema::string(argument), true),
        )
    }

    pub fn display(self) -> ToolDisplay {
        match self {
            ToolKind::RetrieveLocal => ToolDisplay {
                name: "Legal Database".to_string(),
                icon: "📚".to_string(),
                searching: "Searching legal database".to_string(),
                detail: "Indian Penal Code, BNS, Acts & Sections".to_string(),
            },
            ToolKind::SearchWeb => ToolDisplay {
                name: "Web Search".to_string(),
                icon: "🌐".to_string(),
                searching: "Searching trusted legal websites".to_string(),
                detail: "gov.in, indiankanoon.org".to_string(),
            },
            ToolKind::ReadPage => ToolDisplay {
                name: "Reading Page".to_string(),
                icon: "📄".to_string(),
                searching: "Reading webpage content".to_string(),
                detail: String::new(),
            },
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// The tool menu declared to the model on every call.
pub fn tool_menu() -> Vec<ToolDefinition> {
    ToolKind::ALL.into_iter().map(ToolKind::definition).collect()
}

/// Human-facing labels for progress events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDisplay {
    pub name: String,
    pub icon: String,
    pub searching: String,
    pub detail: String,
}

impl ToolDisplay {
    pub fn for_name(name: &str) -> Self {
        match ToolKind::from_name(name) {
            Some(kind) => kind.display(),
            None => Self {
                name: name.to_string(),
                icon: "🔧".to_string(),
                searching: format!("Running {}", name),
                detail: String::new(),
            },
        }
    }
}

/// A tool request, either declared by the model or scraped from its text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Provider-assigned call id; absent for pseudo-tag calls.
    pub id: Option<String>,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.name)
    }

    /// The `query` argument, else the `url` argument, for display.
    pub fn display_query(&self) -> String {
        ["query", "url"]
            .iter()
            .find_map(|key| self.arguments.get(*key).and_then(argument_text))
            .unwrap_or_default()
    }
}

fn argument_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Validated, per-tool arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArgs {
    RetrieveLocal { query: String },
    SearchWeb { query: String },
    ReadPage { url: String },
}

impl ToolArgs {
    pub fn parse(kind: ToolKind, arguments: &Map<String, Value>) -> Result<Self, Error> {
        let key = kind.argument_key();
        let value = arguments
            .get(key)
            .and_then(argument_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::argument(kind.wire_name(), format!("missing '{}' argument", key)))?;

        Ok(match kind {
            ToolKind::RetrieveLocal => ToolArgs::RetrieveLocal { query: value },
            ToolKind::SearchWeb => ToolArgs::SearchWeb { query: value },
            ToolKind::ReadPage => ToolArgs::ReadPage { url: value },
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolArgs::RetrieveLocal { .. } => ToolKind::RetrieveLocal,
            ToolArgs::SearchWeb { .. } => ToolKind::SearchWeb,
            ToolArgs::ReadPage { .. } => ToolKind::ReadPage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    NoResults,
    Blocked,
    Error,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::NoResults => "no_results",
            ToolStatus::Blocked => "blocked",
            ToolStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub index: usize,
    pub act: String,
    pub section: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebRecord {
    pub index: usize,
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub title: String,
    pub text: String,
    pub domain: String,
}

/// Payload of a tool result. Serialises as a bare list or object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolData {
    Sections(Vec<SectionRecord>),
    Web(Vec<WebRecord>),
    Page(PageRecord),
}

impl ToolData {
    pub fn len(&self) -> usize {
        match self {
            ToolData::Sections(records) => records.len(),
            ToolData::Web(records) => records.len(),
            ToolData::Page(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uniform `{status, data, reason}` envelope returned by every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ToolData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ToolResult {
    pub fn success(data: ToolData) -> Self {
        Self {
            status: ToolStatus::Success,
            data: Some(data),
            reason: None,
        }
    }

    pub fn no_results(empty: ToolData) -> Self {
        Self {
            status: ToolStatus::NoResults,
            data: Some(empty),
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Blocked,
            data: None,
            reason: Some(reason.into()),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            data: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Number of records a successful call produced; zero otherwise.
    pub fn count(&self) -> usize {
        match (&self.status, &self.data) {
            (ToolStatus::Success, Some(data)) => data.len(),
            _ => 0,
        }
    }
}
