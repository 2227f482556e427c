//! The four-way verdict union and its timing data.

use std::ops::Add;

use crate::engine::{EngineTiming, NO_CALL};
use crate::error::Error;

/// Summed compilation/execution time across the primary query and every
/// helper query invoked while evaluating the assertion tree. Composes
/// under addition; `NO_CALL` entries are treated as zero when summed so a
/// test case that never calls the engine reports `NO_CALL` overall, while
/// one that calls it even once reports a real sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Timings {
    pub compilation_time: EngineTiming,
    pub execution_time: EngineTiming,
}

impl Timings {
    pub const NONE: Timings = Timings {
        compilation_time: NO_CALL,
        execution_time: NO_CALL,
    };

    pub fn new(compilation_time: EngineTiming, execution_time: EngineTiming) -> Self {
        Self {
            compilation_time,
            execution_time,
        }
    }

    fn sum_field(a: EngineTiming, b: EngineTiming) -> EngineTiming {
        match (a == NO_CALL, b == NO_CALL) {
            (true, true) => NO_CALL,
            (true, false) => b,
            (false, true) => a,
            (false, false) => a + b,
        }
    }
}

impl Add for Timings {
    type Output = Timings;

    fn add(self, rhs: Timings) -> Timings {
        Timings {
            compilation_time: Self::sum_field(self.compilation_time, rhs.compilation_time),
            execution_time: Self::sum_field(self.execution_time, rhs.execution_time),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Timings::NONE
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TestResult {
    Pass {
        test_set: String,
        test_case: String,
        timings: Timings,
    },
    Failure {
        test_set: String,
        test_case: String,
        timings: Timings,
        reason: String,
    },
    Error {
        test_set: String,
        test_case: String,
        timings: Timings,
        error: Error,
    },
    AssumptionFailed {
        test_set: String,
        test_case: String,
        timings: Timings,
        reason: String,
    },
}

impl TestResult {
    pub fn test_set(&self) -> &str {
        match self {
            TestResult::Pass { test_set, .. }
            | TestResult::Failure { test_set, .. }
            | TestResult::Error { test_set, .. }
            | TestResult::AssumptionFailed { test_set, .. } => test_set,
        }
    }

    pub fn test_case(&self) -> &str {
        match self {
            TestResult::Pass { test_case, .. }
            | TestResult::Failure { test_case, .. }
            | TestResult::Error { test_case, .. }
            | TestResult::AssumptionFailed { test_case, .. } => test_case,
        }
    }

    pub fn timings(&self) -> Timings {
        match self {
            TestResult::Pass { timings, .. }
            | TestResult::Failure { timings, .. }
            | TestResult::Error { timings, .. }
            | TestResult::AssumptionFailed { timings, .. } => *timings,
        }
    }
}

/// The verdict constructor's output kind, carried separately from the
/// `(test_set, test_case)` identity it gets stitched onto in
/// `Runner::execute`.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Failure(String),
    Error(Error),
    AssumptionFailed(String),
}

impl Verdict {
    pub fn into_result(self, test_set: String, test_case: String, timings: Timings) -> TestResult {
        match self {
            Verdict::Pass => TestResult::Pass {
                test_set,
                test_case,
                timings,
            },
            Verdict::Failure(reason) => TestResult::Failure {
                test_set,
                test_case,
                timings,
                reason,
            },
            Verdict::Error(error) => TestResult::Error {
                test_set,
                test_case,
                timings,
                error,
            },
            Verdict::AssumptionFailed(reason) => TestResult::AssumptionFailed {
                test_set,
                test_case,
                timings,
                reason,
            },
        }
    }
}
