// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tool catalog: the four backend lookups a chat turn can draw on.
//!
//! Tools are fixed at build time. The catalog renders their parameter
//! declarations as JSON Schema for introspection and validates incoming
//! [`ToolCall`]s against them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Names of the tools the executor understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    GetBookshelf,
    SearchBooks,
    GetBookNotes,
    SearchNotes,
}

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ParamType {
    String,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub required: bool,
    pub description: &'static str,
}

/// Immutable description of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolDefinition {
    /// JSON Schema object for the parameters.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    json!({ "type": p.kind.to_string(), "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// `{name, description, parameters}` as listed by `GET /api/tools`.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name.to_string(),
            "description": self.description,
            "parameters": self.parameters_schema(),
        })
    }
}

const KEYWORD: ParamSpec = ParamSpec {
    name: "keyword",
    kind: ParamType::String,
    required: true,
    description: "Text to look for",
};

const BOOK_ID: ParamSpec = ParamSpec {
    name: "bookId",
    kind: ParamType::String,
    required: true,
    description: "Backend identifier of the book",
};

/// Indexed by `ToolName as usize`.
static DEFINITIONS: &[ToolDefinition] = &[
    ToolDefinition {
        name: ToolName::GetBookshelf,
        description: "List every book on the reader's shelf with highlight and note counts",
        params: &[],
    },
    ToolDefinition {
        name: ToolName::SearchBooks,
        description: "Find books on the shelf whose title or author matches a keyword",
        params: &[KEYWORD],
    },
    ToolDefinition {
        name: ToolName::GetBookNotes,
        description: "Fetch all highlights and thoughts recorded for one book",
        params: &[
            BOOK_ID,
            ParamSpec {
                name: "bookName",
                kind: ParamType::String,
                required: false,
                description: "Display name used when the backend does not return one",
            },
        ],
    },
    ToolDefinition {
        name: ToolName::SearchNotes,
        description: "Search highlights and thoughts by keyword, in one book or across the shelf",
        params: &[
            KEYWORD,
            ParamSpec {
                required: false,
                description: "Restrict the search to this book",
                ..BOOK_ID
            },
        ],
    },
];

/// A request to run one tool. Built by the analyzer, consumed by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: ToolName) -> Self {
        Self {
            name: name.to_string(),
            arguments: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    pub fn get_bookshelf() -> Self {
        Self::new(ToolName::GetBookshelf)
    }

    pub fn search_books(keyword: &str) -> Self {
        Self::new(ToolName::SearchBooks).with_arg("keyword", keyword)
    }

    pub fn search_notes(keyword: &str) -> Self {
        Self::new(ToolName::SearchNotes).with_arg("keyword", keyword)
    }

    pub fn get_book_notes(book_id: &str) -> Self {
        Self::new(ToolName::GetBookNotes).with_arg("bookId", book_id)
    }
}

/// Registry of available tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolCatalog;

impl ToolCatalog {
    pub fn new() -> Self {
        Self
    }

    pub fn get(&self, name: ToolName) -> &'static ToolDefinition {
        &DEFINITIONS[name as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<&'static ToolDefinition> {
        let name: ToolName = name.parse().ok()?;
        Some(self.get(name))
    }

    /// Every definition, sorted by name.
    pub fn definitions(&self) -> Vec<&'static ToolDefinition> {
        let mut defs: Vec<_> = ToolName::iter().map(|n| self.get(n)).collect();
        defs.sort_by_key(|d| d.name.to_string());
        defs
    }

    /// Every definition as JSON, sorted by name.
    pub fn to_json(&self) -> Vec<Value> {
        self.definitions().iter().map(|d| d.to_json()).collect()
    }

    pub fn len(&self) -> usize {
        DEFINITIONS.len()
    }

    pub fn is_empty(&self) -> bool {
        DEFINITIONS.is_empty()
    }
}
