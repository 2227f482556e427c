use std::fmt;

/// `(TestSetName, TestCaseName)` — the key every waiter map and verdict is
/// addressed by. The test-set *reference* the embedder hands back to us is a
/// separate, opaque value (see `runner::InboundMessage::RunTestCase`); this
/// id only carries the two names needed to key internal bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestCaseId {
    pub test_set: String,
    pub test_case: String,
}

impl TestCaseId {
    pub fn new(test_set: impl Into<String>, test_case: impl Into<String>) -> Self {
        Self {
            test_set: test_set.into(),
            test_case: test_case.into(),
        }
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.test_set, self.test_case)
    }
}
