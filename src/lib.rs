//! Test-Case Runner Core: the actor-shaped heart of an XQuery Test Suite
//! execution engine. Fans in resources for a test case, drives the query
//! engine, evaluates the expected-result assertion tree, and produces a
//! verdict. The test-catalog parser, the resource cache, the query engine,
//! the orchestrator, and any reporting sink are external collaborators —
//! only their interfaces live here.

pub mod assertion;
pub mod context;
pub mod engine;
pub mod error;
mod hashmap;
pub mod ids;
pub mod pending;
pub mod queries;
pub mod resource_cache;
pub mod runner;
pub mod testcase;
pub mod verdict;
pub mod xmldiff;

pub use engine::{Item, ItemValue, QueryEngine, QueryError, QueryOutcome, QueryRequest, Sequence};
pub use error::{Error, OpaqueError, Result};
pub use ids::TestCaseId;
pub use pending::{PendingPaths, ResolvedEnvironment};
pub use resource_cache::{ResourceCache, ResourceEvent};
pub use runner::{InboundMessage, OutboundMessage, Runner};
pub use testcase::{
    Assertion, Collection, EnvironmentSpec, Param, Resource, Source, Test, TestCase, XmlExpected,
};
pub use verdict::{TestResult, Timings, Verdict};
