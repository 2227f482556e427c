//! The input data model. Values of these types arrive already
//! parsed — parsing the XQTS catalog XML into them is an external
//! collaborator's job (the test-catalog parser, out of scope here).

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub file: PathBuf,
    /// Absent means the case is structurally invalid.
    pub test: Option<Test>,
    pub environment: Option<EnvironmentSpec>,
    /// Absent means the case has no expected result, which is also invalid —
    /// the Assertion Evaluator treats a missing result as an `Error` verdict.
    pub result: Option<Assertion>,
    /// Spec-version/feature dependency tags (e.g. `"XQuery30+"`), carried
    /// through unchanged. The core never filters on these — that selection
    /// belongs to the orchestrator, which decides whether to call in at all
    /// before a `TestCase` ever reaches a Runner.
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Inline(String),
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvironmentSpec {
    /// The boundary case: `name == "empty"` forces the context sequence to
    /// empty even if a role-"." source exists.
    pub name: Option<String>,
    pub static_base_uri: Option<String>,
    pub schemas: Vec<PathBuf>,
    pub sources: Vec<Source>,
    pub resources: Vec<Resource>,
    pub collections: Vec<Collection>,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub file: PathBuf,
    /// `Some(".")` marks the context-sequence source; any other non-empty
    /// value is an environment-specific binding role this core does not
    /// interpret (only the catalog/orchestrator layer gives it meaning).
    pub role: Option<String>,
    pub uri: Option<String>,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub file: PathBuf,
    pub uri: String,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub uri: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub as_type: Option<String>,
    pub select: Option<String>,
}

/// The expected-result assertion tree. Inner nodes (`AllOf`,
/// `AnyOf`) recurse; every other variant is a leaf comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    AllOf(Vec<Assertion>),
    AnyOf(Vec<Assertion>),
    Assert(String),
    AssertCount(usize),
    AssertDeepEq(String),
    AssertEq(String),
    AssertEmpty,
    AssertFalse,
    AssertPermutation(String),
    AssertSerializationError(String),
    AssertStringValue {
        expected: String,
        normalize_space: bool,
    },
    AssertTrue,
    AssertType(String),
    AssertXml {
        expected: XmlExpected,
        ignore_prefixes: bool,
    },
    SerializationMatches {
        regex: String,
        flags: String,
    },
    /// `error(code)`: the test expects the primary query to fail.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlExpected {
    Literal(String),
    /// A path into the resolved environment (schema/source/resource bytes).
    Path(PathBuf),
}
