//! The Dispatcher and the Runner actor that owns it: a
//! single-threaded cooperative loop over one inbox, fanning resource
//! requests out to the cache and scheduling test-case execution once every
//! dependency is in hand.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::context::ContextBuilder;
use crate::engine::{QueryEngine, QueryOutcome, QueryRequest};
use crate::error::Error;
use crate::ids::TestCaseId;
use crate::pending::{PendingCasesIndex, PendingPaths, PendingTestCase, ResolvedEnvironment};
use crate::resource_cache::{ResourceCache, ResourceEvent};
use crate::testcase::{Assertion, Test, TestCase};
use crate::verdict::{TestResult, Timings, Verdict};

/// Inbound to a Runner. `S` is the embedder's opaque test-set reference,
/// handed back verbatim on every outbound message.
pub enum InboundMessage<S> {
    RunTestCase {
        test_set_ref: S,
        test_set: String,
        test_case: Arc<TestCase>,
        manager: mpsc::UnboundedSender<OutboundMessage<S>>,
    },
    RunTestCaseInternal {
        id: TestCaseId,
    },
}

#[derive(Debug, Clone)]
pub enum OutboundMessage<S> {
    RunningTestCase { test_set_ref: S, test_case: String },
    RanTestCase { test_set_ref: S, result: TestResult },
}

/// Owns one Pending-Cases Index and processes its inbox to completion.
/// Resource-cache replies arrive on a dedicated channel rather than through
/// `InboundMessage` so `ResourceCache` never needs to know about `S`.
pub struct Runner<E, C, S> {
    engine: Arc<E>,
    cache: Arc<C>,
    index: PendingCasesIndex<S>,
    inbox: mpsc::UnboundedReceiver<InboundMessage<S>>,
    self_sender: mpsc::UnboundedSender<InboundMessage<S>>,
    resource_events: mpsc::UnboundedReceiver<ResourceEvent>,
}

impl<E, C, S> Runner<E, C, S>
where
    E: QueryEngine + 'static,
    C: ResourceCache + 'static,
    S: Clone + Send + 'static,
{
    pub fn new(
        engine: Arc<E>,
        cache: Arc<C>,
        resource_events: mpsc::UnboundedReceiver<ResourceEvent>,
    ) -> (Self, mpsc::UnboundedSender<InboundMessage<S>>) {
        let (self_sender, inbox) = mpsc::unbounded_channel();
        let runner = Self {
            engine,
            cache,
            index: PendingCasesIndex::new(),
            inbox,
            self_sender: self_sender.clone(),
            resource_events,
        };
        (runner, self_sender)
    }

    /// Runs until both channels close. Each branch of the `select!` handles
    /// exactly one inbound message at a time: a single-threaded cooperative
    /// scheduling model.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    match message {
                        Some(message) => self.handle_inbound(message).await,
                        None => break,
                    }
                }
                event = self.resource_events.recv() => {
                    match event {
                        Some(event) => self.handle_resource_event(event).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle_inbound(&mut self, message: InboundMessage<S>) {
        match message {
            InboundMessage::RunTestCase {
                test_set_ref,
                test_set,
                test_case,
                manager,
            } => {
                self.handle_run_test_case(test_set_ref, test_set, test_case, manager)
                    .await;
            }
            InboundMessage::RunTestCaseInternal { id } => {
                if let Some(pending) = self.index.take(&id) {
                    self.run_internal(id, pending).await;
                }
            }
        }
    }

    async fn handle_run_test_case(
        &mut self,
        test_set_ref: S,
        test_set: String,
        test_case: Arc<TestCase>,
        manager: mpsc::UnboundedSender<OutboundMessage<S>>,
    ) {
        let id = TestCaseId::new(test_set, test_case.name.clone());

        let Some(test) = &test_case.test else {
            let _ = manager.send(OutboundMessage::RunningTestCase {
                test_set_ref: test_set_ref.clone(),
                test_case: test_case.name.clone(),
            });
            let _ = manager.send(OutboundMessage::RanTestCase {
                test_set_ref,
                result: Verdict::Error(Error::InvalidTestCase).into_result(
                    id.test_set,
                    id.test_case,
                    Timings::NONE,
                ),
            });
            return;
        };

        let paths = self.gather_paths(&test_case);
        let has_dependencies = !paths.schemas.is_empty()
            || !paths.sources.is_empty()
            || !paths.resources.is_empty()
            || paths.query.is_some();

        if !has_dependencies {
            debug!(test_case = %id, "inline query with no dependencies, running immediately");
            let pending = PendingTestCase {
                test_set_ref,
                test_case,
                manager,
                resolved: ResolvedEnvironment::default(),
            };
            self.run_internal(id, pending).await;
            return;
        }

        for path in &paths.schemas {
            self.cache.request_schema(path.clone()).await;
        }
        for path in &paths.sources {
            self.cache.request_source(path.clone()).await;
        }
        for path in &paths.resources {
            self.cache.request_resource(path.clone()).await;
        }
        if let Some(path) = &paths.query {
            self.cache.request_query(path.clone()).await;
        }

        let registered =
            self.index
                .register(id.clone(), test_set_ref, test_case, manager, paths);
        if !registered {
            debug!(test_case = %id, "duplicate RunTestCase, ignored");
        }
    }

    /// Every schema/source/resource file and collection-member source file
    /// the test depends on, plus the query path if the test references one.
    fn gather_paths(&self, test_case: &TestCase) -> PendingPaths {
        let mut paths = PendingPaths::default();

        if let Some(env) = &test_case.environment {
            paths.schemas = env.schemas.clone();
            paths.sources = env.sources.iter().map(|s| s.file.clone()).collect();
            paths.resources = env.resources.iter().map(|r| r.file.clone()).collect();
            for collection in &env.collections {
                paths
                    .sources
                    .extend(collection.sources.iter().map(|s| s.file.clone()));
            }
        }

        if let Some(Test::Path(path)) = &test_case.test {
            paths.query = Some(path.clone());
        }

        paths
    }

    async fn handle_resource_event(&mut self, event: ResourceEvent) {
        match event {
            ResourceEvent::CachedResource { path, bytes } => {
                let ready = self.index.deliver(&path, bytes);
                for id in ready {
                    debug!(test_case = %id, "all dependencies resolved, scheduling run");
                    let _ = self
                        .self_sender
                        .send(InboundMessage::RunTestCaseInternal { id });
                }
            }
            ResourceEvent::ResourceGetError { path, error } => {
                let affected = self.index.fail(&path);
                for id in affected {
                    let Some(pending) = self.index.take(&id) else {
                        continue;
                    };
                    let _ = pending.manager.send(OutboundMessage::RunningTestCase {
                        test_set_ref: pending.test_set_ref.clone(),
                        test_case: pending.test_case.name.clone(),
                    });
                    let _ = pending.manager.send(OutboundMessage::RanTestCase {
                        test_set_ref: pending.test_set_ref,
                        result: Verdict::Error(Error::ResourceFetch(path.clone(), error.clone()))
                            .into_result(id.test_set, id.test_case, Timings::NONE),
                    });
                }
            }
        }
    }

    async fn run_internal(&mut self, id: TestCaseId, pending: PendingTestCase<S>) {
        let span = info_span!("test_case", test_set = %id.test_set, test_case = %id.test_case);
        async {
            let _ = pending.manager.send(OutboundMessage::RunningTestCase {
                test_set_ref: pending.test_set_ref.clone(),
                test_case: pending.test_case.name.clone(),
            });

            let result = self.execute(&id, &pending.test_case, &pending.resolved).await;

            let _ = pending.manager.send(OutboundMessage::RanTestCase {
                test_set_ref: pending.test_set_ref,
                result,
            });
        }
        .instrument(span)
        .await;
    }

    /// Synchronous (from the actor's point of view) end-to-end execution:
    /// context building, the primary query, and assertion evaluation. Never
    /// suspends on anything but engine calls.
    async fn execute(
        &self,
        id: &TestCaseId,
        test_case: &TestCase,
        resolved: &ResolvedEnvironment,
    ) -> TestResult {
        let Some(assertion) = &test_case.result else {
            return Verdict::Error(Error::InvalidTestCase).into_result(
                id.test_set.clone(),
                id.test_case.clone(),
                Timings::NONE,
            );
        };

        let builder = ContextBuilder::new(self.engine.as_ref(), test_case, resolved);
        let context = match builder.build().await {
            Ok(context) => context,
            Err(error) => {
                return Verdict::Error(error).into_result(
                    id.test_set.clone(),
                    id.test_case.clone(),
                    Timings::NONE,
                )
            }
        };

        let outcome = self
            .engine
            .execute_query(QueryRequest {
                query: &context.query,
                static_base_uri: context.static_base_uri.as_deref(),
                context_item: context.context_item.as_ref(),
                variables: &context.variables,
            })
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                if is_unrecoverable(&error) {
                    error!(test_case = %id, %error, "unrecoverable engine failure");
                }
                return Verdict::Error(error).into_result(
                    id.test_set.clone(),
                    id.test_case.clone(),
                    Timings::NONE,
                );
            }
        };

        self.evaluate_assertion(id, assertion, resolved, &context.static_base_uri, &outcome)
            .await
    }

    async fn evaluate_assertion(
        &self,
        id: &TestCaseId,
        assertion: &Assertion,
        resolved: &ResolvedEnvironment,
        static_base_uri: &Option<String>,
        outcome: &QueryOutcome,
    ) -> TestResult {
        if assertion_uses_parameterized_type(assertion) {
            warn!(test_case = %id, "assert-type parameter types are ignored");
        }

        let ctx = crate::assertion::AssertionContext {
            engine: self.engine.as_ref(),
            static_base_uri: static_base_uri.as_deref(),
            resolved,
        };

        match crate::assertion::evaluate_top(assertion, &ctx, outcome).await {
            Ok((verdict, timings)) => {
                verdict.into_result(id.test_set.clone(), id.test_case.clone(), timings)
            }
            Err(error) => {
                Verdict::Error(error).into_result(id.test_set.clone(), id.test_case.clone(), Timings::NONE)
            }
        }
    }
}

fn is_unrecoverable(error: &Error) -> bool {
    matches!(error, Error::Engine(opaque) if {
        let text = opaque.to_string();
        text.contains("OutOfMemory") || text.contains("StackOverflow")
    })
}

fn assertion_uses_parameterized_type(assertion: &Assertion) -> bool {
    match assertion {
        Assertion::AssertType(type_expr) => type_expr.contains('('),
        Assertion::AllOf(children) | Assertion::AnyOf(children) => {
            children.iter().any(assertion_uses_parameterized_type)
        }
        _ => false,
    }
}
