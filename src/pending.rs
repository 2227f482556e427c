//! Pending-Cases Index: per-resource waiter maps plus fan-in
//! readiness detection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::hashmap::{FxIndexMap, FxIndexSet};
use crate::ids::TestCaseId;
use crate::runner::OutboundMessage;
use crate::testcase::TestCase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    Schema,
    Source,
    Resource,
    Query,
}

/// Built up as resources arrive; mutated only by appending, never shrinks.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEnvironment {
    pub schemas: FxIndexMap<PathBuf, Arc<[u8]>>,
    pub sources: FxIndexMap<PathBuf, Arc<[u8]>>,
    pub resources: FxIndexMap<PathBuf, Arc<[u8]>>,
    pub query: Option<Arc<[u8]>>,
}

impl ResolvedEnvironment {
    fn insert(&mut self, category: ResourceCategory, path: PathBuf, bytes: Arc<[u8]>) {
        match category {
            ResourceCategory::Schema => {
                self.schemas.insert(path, bytes);
            }
            ResourceCategory::Source => {
                self.sources.insert(path, bytes);
            }
            ResourceCategory::Resource => {
                self.resources.insert(path, bytes);
            }
            ResourceCategory::Query => {
                self.query = Some(bytes);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PendingPaths {
    pub schemas: Vec<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub query: Option<PathBuf>,
}

pub struct PendingTestCase<S> {
    pub test_set_ref: S,
    pub test_case: Arc<TestCase>,
    pub manager: mpsc::UnboundedSender<OutboundMessage<S>>,
    pub resolved: ResolvedEnvironment,
}

/// `(RunTestCase, ResolvedEnvironment)` keyed by `TestCaseId`, plus the four
/// `path -> waiters` maps. Invariant: a `TestCaseId` is present in `pending`
/// iff it still appears in at least one waiter map, except transiently
/// inside `deliver`/`fail`.
pub struct PendingCasesIndex<S> {
    schema_waiters: FxIndexMap<PathBuf, FxIndexSet<TestCaseId>>,
    source_waiters: FxIndexMap<PathBuf, FxIndexSet<TestCaseId>>,
    resource_waiters: FxIndexMap<PathBuf, FxIndexSet<TestCaseId>>,
    query_waiters: FxIndexMap<PathBuf, FxIndexSet<TestCaseId>>,
    // number of (category, path) registrations still outstanding per id;
    // lets deliver/fail detect readiness in O(1) instead of scanning all
    // four maps for every delivery.
    outstanding: FxIndexMap<TestCaseId, usize>,
    pending: FxIndexMap<TestCaseId, PendingTestCase<S>>,
}

impl<S> Default for PendingCasesIndex<S> {
    fn default() -> Self {
        Self {
            schema_waiters: FxIndexMap::default(),
            source_waiters: FxIndexMap::default(),
            resource_waiters: FxIndexMap::default(),
            query_waiters: FxIndexMap::default(),
            outstanding: FxIndexMap::default(),
            pending: FxIndexMap::default(),
        }
    }
}

impl<S> PendingCasesIndex<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: refuses to overwrite a still-live pending entry, so a
    /// duplicate `RunTestCase` submission becomes a no-op. Returns whether
    /// this call actually registered a new entry.
    pub fn register(
        &mut self,
        id: TestCaseId,
        test_set_ref: S,
        test_case: Arc<TestCase>,
        manager: mpsc::UnboundedSender<OutboundMessage<S>>,
        paths: PendingPaths,
    ) -> bool {
        if self.pending.contains_key(&id) {
            return false;
        }

        let mut count = 0usize;
        for path in &paths.schemas {
            self.schema_waiters
                .entry(path.clone())
                .or_default()
                .insert(id.clone());
            count += 1;
        }
        for path in &paths.sources {
            self.source_waiters
                .entry(path.clone())
                .or_default()
                .insert(id.clone());
            count += 1;
        }
        for path in &paths.resources {
            self.resource_waiters
                .entry(path.clone())
                .or_default()
                .insert(id.clone());
            count += 1;
        }
        if let Some(path) = &paths.query {
            self.query_waiters
                .entry(path.clone())
                .or_default()
                .insert(id.clone());
            count += 1;
        }

        self.outstanding.insert(id.clone(), count);
        self.pending.insert(
            id,
            PendingTestCase {
                test_set_ref,
                test_case,
                manager,
                resolved: ResolvedEnvironment::default(),
            },
        );
        true
    }

    fn decrement(&mut self, id: &TestCaseId) -> bool {
        if let Some(count) = self.outstanding.get_mut(id) {
            if *count > 0 {
                *count -= 1;
            }
            *count == 0
        } else {
            false
        }
    }

    /// Appends a resolved entry of the corresponding kind to every waiter of
    /// `path`, across all four categories, and returns the subset that now
    /// await nothing else.
    pub fn deliver(&mut self, path: &Path, bytes: Arc<[u8]>) -> FxIndexSet<TestCaseId> {
        let mut ready = FxIndexSet::default();

        if let Some(waiters) = self.schema_waiters.shift_remove(path) {
            for id in waiters {
                if let Some(entry) = self.pending.get_mut(&id) {
                    entry
                        .resolved
                        .insert(ResourceCategory::Schema, path.to_path_buf(), bytes.clone());
                }
                if self.decrement(&id) {
                    ready.insert(id);
                }
            }
        }
        if let Some(waiters) = self.source_waiters.shift_remove(path) {
            for id in waiters {
                if let Some(entry) = self.pending.get_mut(&id) {
                    entry
                        .resolved
                        .insert(ResourceCategory::Source, path.to_path_buf(), bytes.clone());
                }
                if self.decrement(&id) {
                    ready.insert(id);
                }
            }
        }
        if let Some(waiters) = self.resource_waiters.shift_remove(path) {
            for id in waiters {
                if let Some(entry) = self.pending.get_mut(&id) {
                    entry.resolved.insert(
                        ResourceCategory::Resource,
                        path.to_path_buf(),
                        bytes.clone(),
                    );
                }
                if self.decrement(&id) {
                    ready.insert(id);
                }
            }
        }
        if let Some(waiters) = self.query_waiters.shift_remove(path) {
            for id in waiters {
                if let Some(entry) = self.pending.get_mut(&id) {
                    entry
                        .resolved
                        .insert(ResourceCategory::Query, path.to_path_buf(), bytes.clone());
                }
                if self.decrement(&id) {
                    ready.insert(id);
                }
            }
        }

        ready
    }

    /// Removes `path` from all four waiter maps and returns every
    /// `TestCaseId` that was waiting on it, so the dispatcher can emit an
    /// `Error` verdict for each. Pending entries are left in place; the
    /// caller retrieves (and drops) them via `take`.
    pub fn fail(&mut self, path: &Path) -> FxIndexSet<TestCaseId> {
        let mut affected = FxIndexSet::default();
        for waiters in [
            self.schema_waiters.shift_remove(path),
            self.source_waiters.shift_remove(path),
            self.resource_waiters.shift_remove(path),
            self.query_waiters.shift_remove(path),
        ]
        .into_iter()
        .flatten()
        {
            for id in waiters {
                affected.insert(id);
            }
        }
        for id in &affected {
            self.remove_all_waits(id);
        }
        affected
    }

    fn remove_all_waits(&mut self, id: &TestCaseId) {
        for map in [
            &mut self.schema_waiters,
            &mut self.source_waiters,
            &mut self.resource_waiters,
            &mut self.query_waiters,
        ] {
            map.retain(|_, waiters| {
                waiters.shift_remove(id);
                !waiters.is_empty()
            });
        }
    }

    /// Removes and returns the pending entry, for scheduling.
    pub fn take(&mut self, id: &TestCaseId) -> Option<PendingTestCase<S>> {
        self.outstanding.shift_remove(id);
        self.pending.shift_remove(id)
    }
}
