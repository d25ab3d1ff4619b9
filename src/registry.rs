//! In-memory index of every tool exposed by the connected sessions.
//!
//! The index is a copy-on-write snapshot: readers clone an `Arc` to the
//! current snapshot and never observe a half-applied `index` call. Writers
//! are serialized and publish a fresh snapshot when they are done.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rmcp::model::JsonObject;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{OptimizerError, OptimizerResult};
use crate::session::{ToolDescriptor, ToolSession};

/// Maximum description length used in the prompt summary.
const PROMPT_DESCRIPTION_CHARS: usize = 100;

/// Options controlling how tools are named when indexed.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Register tools as `<server>_<tool>` instead of the bare tool name.
    pub namespace_tools: bool,
}

/// One indexed tool and a weak handle back to the session that owns it.
#[derive(Clone)]
pub struct ToolRecord {
    /// Unique name within the registry.
    pub name: String,
    /// Name of the tool on its server (differs from `name` when namespaced).
    pub remote_name: String,
    pub server_name: String,
    pub description: String,
    pub input_schema: JsonObject,
    session: Weak<dyn ToolSession>,
}

impl ToolRecord {
    /// The owning session, if it is still alive.
    pub fn session(&self) -> Option<Arc<dyn ToolSession>> {
        self.session.upgrade()
    }
}

impl fmt::Debug for ToolRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRecord")
            .field("name", &self.name)
            .field("remote_name", &self.remote_name)
            .field("server_name", &self.server_name)
            .field("description", &self.description)
            .field("connected", &(self.session.strong_count() > 0))
            .finish()
    }
}

/// Agent-facing view of a tool, as returned by `find_tool`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub server: String,
    pub description: String,
    pub schema_summary: String,
    pub input_schema: JsonObject,
}

impl ToolSummary {
    /// Short text block suitable for pasting into a prompt.
    pub fn render(&self) -> String {
        format!(
            "{}  (server: {})\n    Description : {}\n    Arguments   : {}",
            self.name, self.server, self.description, self.schema_summary
        )
    }
}

#[derive(Default)]
struct Snapshot {
    records: Vec<Arc<ToolRecord>>,
    by_name: HashMap<String, usize>,
}

/// Registry of tools across all indexed sessions.
pub struct ToolRegistry {
    options: RegistryOptions,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl ToolRegistry {
    /// Create an empty registry with default options.
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            options,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(()),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Enumerate the session's tools and index them.
    ///
    /// Returns the number of tools added. Names already present are rejected
    /// and the first registration is kept. If enumeration fails nothing is
    /// added for this session.
    pub async fn index(&self, session: &Arc<dyn ToolSession>) -> OptimizerResult<usize> {
        let server = session.server_name().to_string();
        let tools = session
            .list_tools()
            .await
            .map_err(|e| OptimizerError::connection(&server, format!("{e:#}")))?;

        if tools.is_empty() {
            warn!(server = %server, "Session reported no tools");
            return Ok(0);
        }

        Ok(self.insert_tools(session, tools))
    }

    fn insert_tools(&self, session: &Arc<dyn ToolSession>, tools: Vec<ToolDescriptor>) -> usize {
        let server = session.server_name();
        let _guard = self.writer.lock();

        let current = self.current();
        let mut records = current.records.clone();
        let mut by_name = current.by_name.clone();
        let mut added = 0;

        for tool in tools {
            if tool.name.trim().is_empty() {
                warn!(server = %server, "Skipping tool with an empty name");
                continue;
            }

            let name = if self.options.namespace_tools {
                format!("{}_{}", server.to_lowercase(), tool.name)
            } else {
                tool.name.clone()
            };

            if let Some(&existing) = by_name.get(&name) {
                warn!(
                    tool = %name,
                    server = %server,
                    registered_by = %records[existing].server_name,
                    "Rejecting duplicate tool name; keeping first registration"
                );
                continue;
            }

            debug!(tool = %name, server = %server, "Indexed tool");
            by_name.insert(name.clone(), records.len());
            records.push(Arc::new(ToolRecord {
                name,
                remote_name: tool.name,
                server_name: server.to_string(),
                description: tool.description,
                input_schema: tool.input_schema,
                session: Arc::downgrade(session),
            }));
            added += 1;
        }

        *self.snapshot.write() = Arc::new(Snapshot { records, by_name });
        info!(server = %server, added, "Indexed session tools");
        added
    }

    /// Keyword search over names, descriptions and input schemas.
    ///
    /// Ranking: exact name match, then name substring, then description
    /// substring, then keyword overlap (more query words matched first).
    /// Ties keep insertion order. An empty query lists everything.
    pub fn search(&self, query: &str) -> Vec<Arc<ToolRecord>> {
        let snapshot = self.current();
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return snapshot.records.clone();
        }

        let words: HashSet<String> = keywords(&query).collect();
        let mut ranked: Vec<_> = snapshot
            .records
            .iter()
            .filter_map(|record| match_rank(record, &query, &words).map(|rank| (rank, record)))
            .collect();

        // stable: equal ranks stay in insertion order
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, record)| record.clone()).collect()
    }

    /// `search` truncated to at most `limit` results.
    pub fn search_top(&self, query: &str, limit: usize) -> Vec<Arc<ToolRecord>> {
        let mut results = self.search(query);
        results.truncate(limit);
        results
    }

    /// Exact lookup by registered name.
    pub fn get(&self, name: &str) -> Option<Arc<ToolRecord>> {
        let snapshot = self.current();
        snapshot
            .by_name
            .get(name)
            .map(|&idx| snapshot.records[idx].clone())
    }

    /// Agent-facing summary of one record.
    pub fn summary(&self, record: &ToolRecord) -> ToolSummary {
        ToolSummary {
            name: record.name.clone(),
            server: record.server_name.clone(),
            description: record.description.clone(),
            schema_summary: schema_outline(&record.input_schema),
            input_schema: record.input_schema.clone(),
        }
    }

    /// All records in insertion order.
    pub fn records(&self) -> Vec<Arc<ToolRecord>> {
        self.current().records.clone()
    }

    /// Distinct server names, in the order they were first indexed.
    pub fn servers(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for record in self.current().records.iter() {
            if !seen.contains(&record.server_name) {
                seen.push(record.server_name.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.current().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().records.is_empty()
    }

    /// Markdown overview of every server and its tools, for agent instructions.
    pub fn summary_for_prompt(&self) -> String {
        let snapshot = self.current();
        let mut by_server: Vec<(String, Vec<String>)> = Vec::new();

        for record in snapshot.records.iter() {
            let line = format!(
                "  • {}: {}",
                record.name,
                truncate_chars(&record.description, PROMPT_DESCRIPTION_CHARS)
            );
            match by_server.iter_mut().find(|(s, _)| *s == record.server_name) {
                Some((_, lines)) => lines.push(line),
                None => by_server.push((record.server_name.clone(), vec![line])),
            }
        }

        let mut lines = vec!["## Connected MCP Servers".to_string(), String::new()];
        for (server, tool_lines) in by_server {
            lines.push(format!("### {}  ({} tools)", server, tool_lines.len()));
            lines.extend(tool_lines);
            lines.push(String::new());
        }
        lines.push("Use `find_tool` to discover exact tool names and input schemas.".to_string());
        lines.push("Use `call_tool` to execute a tool once you know its exact name.".to_string());
        lines.join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

type Rank = (u8, Reverse<usize>);

fn match_rank(record: &ToolRecord, query: &str, words: &HashSet<String>) -> Option<Rank> {
    let name = record.name.to_lowercase();
    if name == query {
        return Some((0, Reverse(0)));
    }
    if name.contains(query) {
        return Some((1, Reverse(0)));
    }
    let description = record.description.to_lowercase();
    if description.contains(query) {
        return Some((2, Reverse(0)));
    }

    let mut haystack: HashSet<String> = keywords(&name).collect();
    haystack.extend(keywords(&description));
    haystack.extend(keywords(&schema_text(&record.input_schema).to_lowercase()));

    let found = words.iter().filter(|w| haystack.contains(*w)).count();
    (found > 0).then_some((3, Reverse(found)))
}

fn keywords(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
}

/// Property names and descriptions from the schema's top-level properties.
fn schema_text(schema: &JsonObject) -> String {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return String::new();
    };

    let mut text = String::new();
    for (name, prop) in props {
        text.push_str(name);
        text.push(' ');
        if let Some(desc) = prop.get("description").and_then(Value::as_str) {
            text.push_str(desc);
            text.push(' ');
        }
    }
    text
}

/// `arg: type (required), ...` for the schema's top-level properties.
fn schema_outline(schema: &JsonObject) -> String {
    let props = match schema.get("properties").and_then(Value::as_object) {
        Some(p) if !p.is_empty() => p,
        _ => return "(no arguments)".to_string(),
    };

    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    props
        .iter()
        .map(|(name, prop)| {
            let ty = match prop.get("type") {
                Some(Value::String(t)) => t.clone(),
                Some(Value::Array(ts)) => ts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("|"),
                _ => "any".to_string(),
            };
            if required.contains(name.as_str()) {
                format!("{name}: {ty} (required)")
            } else {
                format!("{name}: {ty}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
