//! End-to-end scenarios exercising the full RunTestCase -> RanTestCase path
//! through a single Runner, against a stubbed engine and resource cache.
//! Mirrors the six scenarios and the boundary cases called out for the
//! Assertion Evaluator and Dispatcher.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use xqts_runner_core::{
    Assertion, EnvironmentSpec, Error, InboundMessage, Item, ItemValue, OpaqueError,
    OutboundMessage, QueryEngine, QueryError, QueryOutcome, QueryRequest, ResourceCache,
    ResourceEvent, Runner, Sequence, Source, Test, TestCase, TestResult,
};

/// Canned-response stub: keyed by the exact query text the Context Builder
/// or Assertion Evaluator would send. Panics on an unrecognized query, so a
/// test failure points straight at the missing stub rather than silently
/// misbehaving.
struct StubEngine {
    responses: HashMap<String, QueryOutcome>,
}

impl StubEngine {
    fn new(responses: Vec<(&str, QueryOutcome)>) -> Self {
        Self {
            responses: responses
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

fn success(sequence: Sequence) -> QueryOutcome {
    QueryOutcome::Success {
        result: sequence,
        compilation_time: 1,
        execution_time: 1,
    }
}

fn failure(code: &str) -> QueryOutcome {
    QueryOutcome::Failure {
        error: QueryError {
            code: code.to_string(),
            message: format!("stub failure {code}"),
        },
        compilation_time: 1,
        execution_time: 1,
    }
}

fn int_item(value: &str) -> Item {
    Item {
        value: ItemValue::Opaque {
            type_name: "xs:integer".to_string(),
            rendering: value.to_string(),
        },
    }
}

fn bool_item(value: bool) -> Item {
    Item {
        value: ItemValue::Boolean(value),
    }
}

#[async_trait]
impl QueryEngine for StubEngine {
    async fn execute_query(&self, request: QueryRequest<'_>) -> Result<QueryOutcome, Error> {
        match self.responses.get(request.query) {
            Some(outcome) => Ok(outcome.clone()),
            None => panic!("unstubbed query: {}", request.query),
        }
    }

    async fn parse_xml(&self, bytes: &[u8], _uri: Option<&str>) -> Result<Sequence, Error> {
        let text = String::from_utf8_lossy(bytes).to_string();
        Ok(Sequence::new(vec![Item {
            value: ItemValue::String(text),
        }]))
    }

    async fn sequence_to_string(&self, sequence: &Sequence) -> Result<String, Error> {
        Ok(render(sequence))
    }

    async fn sequence_to_string_adaptive(&self, sequence: &Sequence) -> Result<String, Error> {
        Ok(render(sequence))
    }
}

fn render(sequence: &Sequence) -> String {
    sequence
        .items()
        .iter()
        .map(|item| match &item.value {
            ItemValue::Boolean(b) => b.to_string(),
            ItemValue::String(s) => s.clone(),
            ItemValue::Opaque { rendering, .. } => rendering.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// No environment dependencies, so `RunTestCase` never touches the cache.
struct NoopCache;

#[async_trait]
impl ResourceCache for NoopCache {
    async fn request_schema(&self, _path: PathBuf) {}
    async fn request_source(&self, _path: PathBuf) {}
    async fn request_resource(&self, _path: PathBuf) {}
    async fn request_query(&self, _path: PathBuf) {}
}

fn inline_case(name: &str, query: &str, result: Assertion) -> TestCase {
    TestCase {
        name: name.to_string(),
        file: PathBuf::from(format!("{name}.xml")),
        test: Some(Test::Inline(query.to_string())),
        environment: None,
        result: Some(result),
        requires: vec![],
    }
}

async fn run_single(
    engine: StubEngine,
    test_case: TestCase,
) -> TestResult {
    let (_events_tx, events_rx) = mpsc::unbounded_channel::<ResourceEvent>();
    let (runner, sender) = Runner::new(Arc::new(engine), Arc::new(NoopCache), events_rx);
    let (manager_tx, mut manager_rx) = mpsc::unbounded_channel::<OutboundMessage<()>>();

    let handle = tokio::spawn(runner.run());

    sender
        .send(InboundMessage::RunTestCase {
            test_set_ref: (),
            test_set: "stub-set".to_string(),
            test_case: Arc::new(test_case),
            manager: manager_tx,
        })
        .unwrap();

    let running = manager_rx.recv().await.expect("RunningTestCase");
    assert!(matches!(running, OutboundMessage::RunningTestCase { .. }));

    let ran = manager_rx.recv().await.expect("RanTestCase");
    drop(sender);
    handle.abort();

    match ran {
        OutboundMessage::RanTestCase { result, .. } => result,
        _ => panic!("expected RanTestCase"),
    }
}

#[tokio::test]
async fn scenario_1_inline_arithmetic_passes() {
    let engine = StubEngine::new(vec![
        ("1 + 1", success(Sequence::new(vec![int_item("2")]))),
        ("(2) eq $result", success(Sequence::new(vec![bool_item(true)]))),
    ]);
    let case = inline_case("arith", "1 + 1", Assertion::AssertEq("2".to_string()));
    let result = run_single(engine, case).await;
    assert!(matches!(result, TestResult::Pass { .. }), "{result:?}");
}

#[tokio::test]
async fn scenario_2_matching_error_code_passes() {
    let engine = StubEngine::new(vec![(r#"xs:integer("abc")"#, failure("FORG0001"))]);
    let case = inline_case(
        "bad-cast",
        r#"xs:integer("abc")"#,
        Assertion::Error("FORG0001".to_string()),
    );
    let result = run_single(engine, case).await;
    assert!(matches!(result, TestResult::Pass { .. }), "{result:?}");
}

#[tokio::test]
async fn scenario_3_permutation_passes_deep_eq_fails() {
    let deep_equal_query = "deep-equal((1, 2, 3), $result)";
    let permutation_query =
        "deep-equal(\
for $i in $result order by (if ($i instance of xs:string) then concat('str_', $i) else string($i)) return $i, \
for $i in (1, 2, 3) order by (if ($i instance of xs:string) then concat('str_', $i) else string($i)) return $i)";

    let sequence = Sequence::new(vec![int_item("3"), int_item("1"), int_item("2")]);

    let engine = StubEngine::new(vec![
        ("(3, 1, 2)", success(sequence.clone())),
        (permutation_query, success(Sequence::new(vec![bool_item(true)]))),
        (deep_equal_query, success(Sequence::new(vec![bool_item(false)]))),
    ]);
    let permutation_case = inline_case(
        "perm",
        "(3, 1, 2)",
        Assertion::AssertPermutation("1, 2, 3".to_string()),
    );
    let result = run_single(engine, permutation_case).await;
    assert!(matches!(result, TestResult::Pass { .. }), "{result:?}");

    let engine = StubEngine::new(vec![
        ("(3, 1, 2)", success(sequence)),
        (deep_equal_query, success(Sequence::new(vec![bool_item(false)]))),
    ]);
    let deep_eq_case = inline_case(
        "perm-deep-eq",
        "(3, 1, 2)",
        Assertion::AssertDeepEq("1, 2, 3".to_string()),
    );
    let result = run_single(engine, deep_eq_case).await;
    assert!(matches!(result, TestResult::Failure { .. }), "{result:?}");
}

#[tokio::test]
async fn scenario_4_context_sequence_from_role_dot_source() {
    let engine = StubEngine::new(vec![
        ("count(/a/b)", success(Sequence::new(vec![int_item("1")]))),
        ("(1) eq $result", success(Sequence::new(vec![bool_item(true)]))),
    ]);

    let test_case = TestCase {
        name: "context-source".to_string(),
        file: PathBuf::from("context-source.xml"),
        test: Some(Test::Inline("count(/a/b)".to_string())),
        environment: Some(EnvironmentSpec {
            name: None,
            static_base_uri: None,
            schemas: vec![],
            sources: vec![Source {
                file: PathBuf::from("doc.xml"),
                role: Some(".".to_string()),
                uri: None,
                encoding: None,
            }],
            resources: vec![],
            collections: vec![],
            params: vec![],
        }),
        result: Some(Assertion::AssertEq("1".to_string())),
        requires: vec![],
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel::<ResourceEvent>();
    let (runner, sender) = Runner::new(Arc::new(engine), Arc::new(NoopCache), events_rx);
    let (manager_tx, mut manager_rx) = mpsc::unbounded_channel::<OutboundMessage<()>>();
    let handle = tokio::spawn(runner.run());

    sender
        .send(InboundMessage::RunTestCase {
            test_set_ref: (),
            test_set: "stub-set".to_string(),
            test_case: Arc::new(test_case),
            manager: manager_tx,
        })
        .unwrap();

    let doc_path = PathBuf::from("doc.xml");
    events_tx
        .send(ResourceEvent::CachedResource {
            path: doc_path,
            bytes: Arc::from(b"<a><b/></a>".as_slice()),
        })
        .unwrap();

    let _running = manager_rx.recv().await.expect("RunningTestCase");

    let ran = manager_rx.recv().await.expect("RanTestCase");
    drop(events_tx);
    drop(sender);
    handle.abort();

    match ran {
        OutboundMessage::RanTestCase { result, .. } => {
            assert!(matches!(result, TestResult::Pass { .. }), "{result:?}");
        }
        _ => panic!("expected RanTestCase"),
    }
}

#[tokio::test]
async fn scenario_5_resource_fetch_error_surfaces_as_error_verdict() {
    let test_case = TestCase {
        name: "path-query".to_string(),
        file: PathBuf::from("path-query.xml"),
        test: Some(Test::Path(PathBuf::from("q.xq"))),
        environment: None,
        result: Some(Assertion::AssertEmpty),
        requires: vec![],
    };

    let engine = StubEngine::new(vec![]);
    let (events_tx, events_rx) = mpsc::unbounded_channel::<ResourceEvent>();
    let (runner, sender) = Runner::new(Arc::new(engine), Arc::new(NoopCache), events_rx);
    let (manager_tx, mut manager_rx) = mpsc::unbounded_channel::<OutboundMessage<()>>();
    let handle = tokio::spawn(runner.run());

    sender
        .send(InboundMessage::RunTestCase {
            test_set_ref: (),
            test_set: "stub-set".to_string(),
            test_case: Arc::new(test_case),
            manager: manager_tx,
        })
        .unwrap();

    events_tx
        .send(ResourceEvent::ResourceGetError {
            path: PathBuf::from("q.xq"),
            error: OpaqueError(Arc::new(anyhow::anyhow!("disk read failed"))),
        })
        .unwrap();

    let running = manager_rx.recv().await.expect("RunningTestCase");
    assert!(matches!(running, OutboundMessage::RunningTestCase { .. }));

    let ran = manager_rx.recv().await.expect("RanTestCase");
    drop(events_tx);
    drop(sender);
    handle.abort();

    match ran {
        OutboundMessage::RanTestCase { result, .. } => {
            assert!(matches!(result, TestResult::Error { .. }), "{result:?}");
        }
        _ => panic!("expected RanTestCase"),
    }
}

#[tokio::test]
async fn scenario_6_assert_xml_pass_and_failure() {
    let serialize_query = xqts_runner_core::queries::assert_xml_serialization_query();

    let matching_engine = StubEngine::new(vec![
        ("<x/>", success(Sequence::new(vec![Item { value: ItemValue::String("<x/>".to_string()) }]))),
        (serialize_query.as_str(), success(Sequence::new(vec![Item { value: ItemValue::String("<x/>".to_string()) }]))),
    ]);
    let pass_case = inline_case(
        "xml-pass",
        "<x/>",
        Assertion::AssertXml {
            expected: xqts_runner_core::XmlExpected::Literal("<x/>".to_string()),
            ignore_prefixes: false,
        },
    );
    let result = run_single(matching_engine, pass_case).await;
    assert!(matches!(result, TestResult::Pass { .. }), "{result:?}");

    let mismatching_engine = StubEngine::new(vec![
        ("<x/>", success(Sequence::new(vec![Item { value: ItemValue::String("<x/>".to_string()) }]))),
        (serialize_query.as_str(), success(Sequence::new(vec![Item { value: ItemValue::String("<x/>".to_string()) }]))),
    ]);
    let fail_case = inline_case(
        "xml-fail",
        "<x/>",
        Assertion::AssertXml {
            expected: xqts_runner_core::XmlExpected::Literal("<y/>".to_string()),
            ignore_prefixes: false,
        },
    );
    let result = run_single(mismatching_engine, fail_case).await;
    match result {
        TestResult::Failure { reason, .. } => {
            assert!(!reason.contains("/ignorable-wrapper"), "{reason}");
        }
        other => panic!("expected Failure, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_test_case_yields_error_without_engine_call() {
    let engine = StubEngine::new(vec![]);
    let case = TestCase {
        name: "no-test".to_string(),
        file: PathBuf::from("no-test.xml"),
        test: None,
        environment: None,
        result: Some(Assertion::AssertEmpty),
        requires: vec![],
    };
    let result = run_single(engine, case).await;
    assert!(matches!(result, TestResult::Error { .. }));
}

#[tokio::test]
async fn duplicate_submission_is_a_no_op() {
    // A schema dependency keeps the case pending in the waiter index (rather
    // than running immediately), so a second submission for the same id has
    // a live pending entry to collide with.
    let test_case = TestCase {
        name: "dup".to_string(),
        file: PathBuf::from("dup.xml"),
        test: Some(Test::Inline("()".to_string())),
        environment: Some(EnvironmentSpec {
            name: None,
            static_base_uri: None,
            schemas: vec![PathBuf::from("schema.xsd")],
            sources: vec![],
            resources: vec![],
            collections: vec![],
            params: vec![],
        }),
        result: Some(Assertion::AssertEmpty),
        requires: vec![],
    };

    let engine = StubEngine::new(vec![("()", success(Sequence::empty()))]);
    let (events_tx, events_rx) = mpsc::unbounded_channel::<ResourceEvent>();
    let (runner, sender) = Runner::new(Arc::new(engine), Arc::new(NoopCache), events_rx);
    let (manager_tx, mut manager_rx) = mpsc::unbounded_channel::<OutboundMessage<()>>();
    let handle = tokio::spawn(runner.run());

    for _ in 0..2 {
        sender
            .send(InboundMessage::RunTestCase {
                test_set_ref: (),
                test_set: "stub-set".to_string(),
                test_case: Arc::new(test_case.clone()),
                manager: manager_tx.clone(),
            })
            .unwrap();
    }

    events_tx
        .send(ResourceEvent::CachedResource {
            path: PathBuf::from("schema.xsd"),
            bytes: Arc::from(b"".as_slice()),
        })
        .unwrap();

    let running = manager_rx.recv().await.expect("RunningTestCase");
    assert!(matches!(running, OutboundMessage::RunningTestCase { .. }));
    let ran = manager_rx.recv().await.expect("RanTestCase");
    assert!(matches!(ran, OutboundMessage::RanTestCase { .. }));

    drop(manager_tx);
    drop(events_tx);
    drop(sender);
    handle.abort();

    // Exactly one Running/Ran pair for the duplicated id: the channel has
    // nothing else queued.
    assert!(manager_rx.recv().await.is_none());
}

#[tokio::test]
async fn assert_type_ignores_parameter_type_argument_list() {
    let engine = StubEngine::new(vec![
        ("1.00", success(Sequence::new(vec![int_item("1.00")]))),
        (
            "$result instance of xs:decimal",
            success(Sequence::new(vec![bool_item(true)])),
        ),
    ]);
    let case = inline_case(
        "assert-type-param",
        "1.00",
        Assertion::AssertType("xs:decimal(5,2)".to_string()),
    );
    let result = run_single(engine, case).await;
    assert!(matches!(result, TestResult::Pass { .. }), "{result:?}");
}

#[tokio::test]
async fn assert_xpath_checks_true_singleton_not_effective_boolean_value() {
    // A non-boolean, non-empty result would pass under `boolean(...)` (its
    // effective boolean value) but must fail the raw-result TrueSingleton
    // check `assert` actually specifies.
    let engine = StubEngine::new(vec![
        ("1", success(Sequence::new(vec![int_item("1")]))),
        ("1 + 1", success(Sequence::new(vec![int_item("2")]))),
    ]);
    let case = inline_case("assert-raw", "1", Assertion::Assert("1 + 1".to_string()));
    let result = run_single(engine, case).await;
    assert!(matches!(result, TestResult::Failure { .. }), "{result:?}");
}

#[tokio::test]
async fn serialization_matches_routes_through_engine_fn_matches() {
    let matches_query = xqts_runner_core::queries::matches_query("^<x/>$", "");
    let engine = StubEngine::new(vec![
        (
            "<x/>",
            success(Sequence::new(vec![Item {
                value: ItemValue::String("<x/>".to_string()),
            }])),
        ),
        (
            "serialize($result)",
            success(Sequence::new(vec![Item {
                value: ItemValue::String("<x/>".to_string()),
            }])),
        ),
        (matches_query.as_str(), success(Sequence::new(vec![bool_item(true)]))),
    ]);
    let case = inline_case(
        "serialization-matches",
        "<x/>",
        Assertion::SerializationMatches {
            regex: "^<x/>$".to_string(),
            flags: "".to_string(),
        },
    );
    let result = run_single(engine, case).await;
    assert!(matches!(result, TestResult::Pass { .. }), "{result:?}");
}

#[tokio::test]
async fn timings_are_no_call_when_engine_never_invoked() {
    // assert-count and assert-empty never need a helper query.
    let engine = StubEngine::new(vec![("()", success(Sequence::empty()))]);
    let case = inline_case("never-calls-helper", "()", Assertion::AssertEmpty);
    let result = run_single(engine, case).await;
    match result {
        TestResult::Pass { timings, .. } => {
            assert_eq!(timings.compilation_time, 1);
            assert_eq!(timings.execution_time, 1);
        }
        other => panic!("expected Pass, got {other:?}"),
    }
}
