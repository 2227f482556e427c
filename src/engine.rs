//! The Query-Executor Bridge contract. The engine itself is an
//! external collaborator — out of scope here, only its interface is.

use ahash::AHashMap;
use async_trait::async_trait;

use crate::error::Error;

/// Wall-clock time spent inside a single engine call, in milliseconds.
/// `-1` is the sentinel for "this call never happened".
pub type EngineTiming = i64;

pub const NO_CALL: EngineTiming = -1;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Boolean(bool),
    String(String),
    /// Anything the core doesn't need to inspect structurally: numbers,
    /// nodes, function items, maps, arrays. Carried as its serialized form
    /// plus a type annotation so assertions that only need `assert-type` or
    /// string-value semantics still work without the core understanding XDM.
    Opaque { type_name: String, rendering: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub value: ItemValue,
}

impl Item {
    pub fn type_name(&self) -> &str {
        match &self.value {
            ItemValue::Boolean(_) => "xs:boolean",
            ItemValue::String(_) => "xs:string",
            ItemValue::Opaque { type_name, .. } => type_name,
        }
    }
}

/// An opaque XDM value crossing the core/engine boundary. The core never
/// constructs one itself; it only inspects what the engine hands back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    items: Vec<Item>,
}

impl Sequence {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_at(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    /// `TrueSingleton`: exactly one item, and that
    /// item is the boolean `true`.
    pub fn is_true_singleton(&self) -> bool {
        matches!(self.items.as_slice(), [Item { value: ItemValue::Boolean(true) }])
    }

    pub fn as_boolean_singleton(&self) -> Option<bool> {
        match self.items.as_slice() {
            [Item { value: ItemValue::Boolean(b) }] => Some(*b),
            _ => None,
        }
    }

    pub fn as_string_singleton(&self) -> Option<&str> {
        match self.items.as_slice() {
            [Item { value: ItemValue::String(s) }] => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A query failure as reported by the engine: a code plus a human-readable
/// description. Matched against `error(code)` assertions by code only.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Success {
        result: Sequence,
        compilation_time: EngineTiming,
        execution_time: EngineTiming,
    },
    Failure {
        error: QueryError,
        compilation_time: EngineTiming,
        execution_time: EngineTiming,
    },
}

/// Everything needed to run one query against one resolved environment.
/// Borrowed rather than owned so a single `ExecutionContext` can be reused
/// across a primary run and any number of helper-query runs.
pub struct QueryRequest<'a> {
    pub query: &'a str,
    pub static_base_uri: Option<&'a str>,
    pub context_item: Option<&'a Sequence>,
    pub variables: &'a AHashMap<String, Sequence>,
}

/// The external evaluator. Every method may suspend (the actor only
/// suspends between inbound messages, so these calls happen synchronously
/// from the Runner's point of view, one at a time).
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute_query(&self, request: QueryRequest<'_>) -> Result<QueryOutcome, Error>;

    /// Parses a source document into whatever internal node representation
    /// the engine uses, returning it wrapped as a single-item `Sequence`.
    async fn parse_xml(&self, bytes: &[u8], uri: Option<&str>) -> Result<Sequence, Error>;

    async fn sequence_to_string(&self, sequence: &Sequence) -> Result<String, Error>;

    /// Adaptive serialization per XPath/XQuery "Adaptive" output method;
    /// used for rendering a sequence for diagnostics rather than for an
    /// `assert-string-value` comparison.
    async fn sequence_to_string_adaptive(&self, sequence: &Sequence) -> Result<String, Error>;
}

/// Runs `query` with `$result` bound to `prior`. Every helper assertion
/// query that inspects the primary result does so through this path.
pub async fn execute_query_with_result(
    engine: &dyn QueryEngine,
    query: &str,
    prior: &Sequence,
    static_base_uri: Option<&str>,
) -> Result<QueryOutcome, Error> {
    let mut variables = AHashMap::default();
    variables.insert("result".to_string(), prior.clone());
    engine
        .execute_query(QueryRequest {
            query,
            static_base_uri,
            context_item: None,
            variables: &variables,
        })
        .await
}
