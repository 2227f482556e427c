//! The Assertion Evaluator: recursively walks the expected-result
//! tree against the primary query's outcome, re-invoking the engine for any
//! leaf that needs to inspect `$result`.

use async_recursion::async_recursion;

use crate::engine::{
    execute_query_with_result, Item, ItemValue, QueryEngine, QueryError, QueryOutcome, Sequence,
};
use crate::error::Error;
use crate::pending::ResolvedEnvironment;
use crate::queries;
use crate::testcase::{Assertion, XmlExpected};
use crate::verdict::{Timings, Verdict};
use crate::xmldiff;

pub struct AssertionContext<'a> {
    pub engine: &'a dyn QueryEngine,
    pub static_base_uri: Option<&'a str>,
    pub resolved: &'a ResolvedEnvironment,
}

/// The primary query's outcome, as handed to the evaluator.
enum PrimaryOutcome<'a> {
    Success(&'a Sequence),
    Failure(&'a QueryError),
}

/// Pass/fail with a human-readable reason for the failing case.
type LeafOutcome = Result<(), String>;

/// Runs the assertion tree against the primary outcome and produces a
/// verdict plus the summed timings (primary call included).
pub async fn evaluate_top(
    assertion: &Assertion,
    ctx: &AssertionContext<'_>,
    outcome: &QueryOutcome,
) -> Result<(Verdict, Timings), Error> {
    let mut timings = match outcome {
        QueryOutcome::Success {
            compilation_time,
            execution_time,
            ..
        }
        | QueryOutcome::Failure {
            compilation_time,
            execution_time,
            ..
        } => Timings::new(*compilation_time, *execution_time),
    };

    let primary = match outcome {
        QueryOutcome::Success { result, .. } => PrimaryOutcome::Success(result),
        QueryOutcome::Failure { error, .. } => PrimaryOutcome::Failure(error),
    };

    let leaf = evaluate(assertion, ctx, &primary, &mut timings).await?;
    let verdict = match leaf {
        Ok(()) => Verdict::Pass,
        Err(reason) => Verdict::Failure(reason),
    };
    Ok((verdict, timings))
}

#[async_recursion]
async fn evaluate(
    assertion: &Assertion,
    ctx: &AssertionContext<'_>,
    outcome: &PrimaryOutcome<'_>,
    timings: &mut Timings,
) -> Result<LeafOutcome, Error> {
    match assertion {
        Assertion::AllOf(children) => {
            for child in children {
                match evaluate(child, ctx, outcome, timings).await? {
                    Ok(()) => continue,
                    failed @ Err(_) => return Ok(failed),
                }
            }
            Ok(Ok(()))
        }
        Assertion::AnyOf(children) => {
            let mut reasons = Vec::new();
            for child in children {
                match evaluate(child, ctx, outcome, timings).await? {
                    Ok(()) => return Ok(Ok(())),
                    Err(reason) => reasons.push(reason),
                }
            }
            Ok(Err(format!("no branch of any-of matched: [{}]", reasons.join("; "))))
        }
        Assertion::Error(code) => Ok(match outcome {
            PrimaryOutcome::Failure(error) if &error.code == code => Ok(()),
            PrimaryOutcome::Failure(error) => Err(format!(
                "expected error {code}, got error {}",
                error.code
            )),
            PrimaryOutcome::Success(_) => {
                Err(format!("expected error {code}, got a result"))
            }
        }),
        other => match outcome {
            PrimaryOutcome::Failure(error) => Ok(Err(format!(
                "expected a result, got error {}: {}",
                error.code, error.message
            ))),
            PrimaryOutcome::Success(result) => {
                let outcome = evaluate_value_assertion(other, ctx, result, timings).await?;
                Ok(match outcome {
                    Ok(()) => Ok(()),
                    Err(reason) => {
                        let actual = render_actual(ctx, result).await;
                        Err(format!("{reason} (actual: {actual})"))
                    }
                })
            }
        },
    }
}

/// A length-bounded, adaptive-serialization rendering of the actual result
/// sequence, folded into failure reasons so a single runaway sequence can't
/// blow up a report.
const MAX_RENDERED_LEN: usize = 500;

async fn render_actual(ctx: &AssertionContext<'_>, sequence: &Sequence) -> String {
    match ctx.engine.sequence_to_string_adaptive(sequence).await {
        Ok(rendered) if rendered.chars().count() > MAX_RENDERED_LEN => {
            let truncated: String = rendered.chars().take(MAX_RENDERED_LEN).collect();
            format!("{truncated}... (truncated)")
        }
        Ok(rendered) => rendered,
        Err(_) => "<unrenderable sequence>".to_string(),
    }
}

async fn run_helper(
    ctx: &AssertionContext<'_>,
    query: &str,
    prior: &Sequence,
    timings: &mut Timings,
) -> Result<Sequence, Error> {
    let outcome = execute_query_with_result(ctx.engine, query, prior, ctx.static_base_uri).await?;
    match outcome {
        QueryOutcome::Success {
            result,
            compilation_time,
            execution_time,
        } => {
            *timings = *timings + Timings::new(compilation_time, execution_time);
            Ok(result)
        }
        QueryOutcome::Failure {
            error,
            compilation_time,
            execution_time,
        } => {
            *timings = *timings + Timings::new(compilation_time, execution_time);
            Err(anyhow::anyhow!("helper query failed: {} ({})", error.message, error.code).into())
        }
    }
}

async fn evaluate_value_assertion(
    assertion: &Assertion,
    ctx: &AssertionContext<'_>,
    result: &Sequence,
    timings: &mut Timings,
) -> Result<LeafOutcome, Error> {
    match assertion {
        Assertion::Assert(expr) => {
            let helper = run_helper(ctx, expr, result, timings).await?;
            Ok(bool_outcome(&helper, || format!("expression did not hold: {expr}")))
        }
        Assertion::AssertEq(expected) => {
            let helper = run_helper(ctx, &queries::value_eq_query(expected), result, timings).await?;
            Ok(bool_outcome(&helper, || format!("not equal to {expected}")))
        }
        Assertion::AssertDeepEq(expected) => {
            let helper = run_helper(ctx, &queries::deep_equal_query(expected), result, timings).await?;
            Ok(bool_outcome(&helper, || format!("not deep-equal to {expected}")))
        }
        Assertion::AssertPermutation(expected) => {
            let helper =
                run_helper(ctx, &queries::deep_equal_sorted_query(expected), result, timings).await?;
            Ok(bool_outcome(&helper, || format!("not a permutation of {expected}")))
        }
        Assertion::AssertCount(expected) => Ok(if result.item_count() == *expected {
            Ok(())
        } else {
            Err(format!(
                "expected {} items, got {}",
                expected,
                result.item_count()
            ))
        }),
        Assertion::AssertEmpty => Ok(if result.is_empty() {
            Ok(())
        } else {
            Err(format!("expected empty sequence, got {} items", result.item_count()))
        }),
        Assertion::AssertTrue => Ok(if result.is_true_singleton() {
            Ok(())
        } else {
            Err("expected the singleton true()".to_string())
        }),
        Assertion::AssertFalse => Ok(match result.as_boolean_singleton() {
            Some(false) => Ok(()),
            _ => Err("expected the singleton false()".to_string()),
        }),
        Assertion::AssertType(type_name) => {
            let base_type = queries::strip_parameter_type(type_name);
            let helper = run_helper(ctx, &queries::instance_of_query(&base_type), result, timings).await?;
            Ok(bool_outcome(&helper, || format!("not an instance of {type_name}")))
        }
        Assertion::AssertStringValue {
            expected,
            normalize_space,
        } => {
            let query = if *normalize_space {
                queries::QUERY_ASSERT_STRING_VALUE_NORMALIZED_SPACE
            } else {
                queries::QUERY_ASSERT_STRING_VALUE
            };
            let helper = run_helper(ctx, query, result, timings).await?;
            let actual = helper.as_string_singleton().unwrap_or_default();
            let expected_compared = if *normalize_space {
                let expected_seq = Sequence::new(vec![Item {
                    value: ItemValue::String(expected.clone()),
                }]);
                let normalized =
                    run_helper(ctx, queries::QUERY_NORMALIZED_SPACE, &expected_seq, timings).await?;
                normalized.as_string_singleton().unwrap_or_default().to_string()
            } else {
                expected.clone()
            };
            Ok(if actual == expected_compared {
                Ok(())
            } else {
                Err(format!("string value mismatch: expected {expected_compared:?}, got {actual:?}"))
            })
        }
        Assertion::AssertXml {
            expected,
            ignore_prefixes: _,
        } => {
            let helper = run_helper(ctx, &queries::assert_xml_serialization_query(), result, timings).await?;
            let actual_xml = helper.as_string_singleton().unwrap_or_default().to_string();
            let expected_xml = resolve_xml_expected(ctx, expected)?;

            let wrapped_expected = xmldiff::wrap_in_ignorable_wrapper(&expected_xml);
            let wrapped_actual = xmldiff::wrap_in_ignorable_wrapper(&actual_xml);

            match xmldiff::diff(&wrapped_expected, &wrapped_actual) {
                Ok(None) => Ok(Ok(())),
                Ok(Some(difference)) => Ok(Err(format!(
                    "xml differs at {}: {}",
                    difference.path, difference.description
                ))),
                Err(err) => Err(anyhow::Error::from(err).into()),
            }
        }
        Assertion::SerializationMatches { regex, flags } => {
            let serialized =
                run_helper(ctx, queries::QUERY_DEFAULT_SERIALIZATION, result, timings).await?;
            let query = queries::matches_query(regex, flags);
            let helper = run_helper(ctx, &query, &serialized, timings).await?;
            Ok(bool_outcome(&helper, || {
                format!("serialized output did not match /{regex}/{flags}")
            }))
        }
        Assertion::AssertSerializationError(expected_code) => {
            let query_result =
                execute_query_with_result(ctx.engine, queries::QUERY_DEFAULT_SERIALIZATION, result, ctx.static_base_uri)
                    .await?;
            Ok(match query_result {
                QueryOutcome::Success {
                    compilation_time,
                    execution_time,
                    ..
                } => {
                    *timings = *timings + Timings::new(compilation_time, execution_time);
                    Err("expected serialization to fail, but it succeeded".to_string())
                }
                QueryOutcome::Failure {
                    error,
                    compilation_time,
                    execution_time,
                } => {
                    *timings = *timings + Timings::new(compilation_time, execution_time);
                    if expected_code == "*" || &error.code == expected_code {
                        Ok(())
                    } else {
                        Err(format!(
                            "expected serialization error {expected_code}, got {}",
                            error.code
                        ))
                    }
                }
            })
        }
        Assertion::Error(_) | Assertion::AllOf(_) | Assertion::AnyOf(_) => {
            unreachable!("handled in evaluate()")
        }
    }
}

fn bool_outcome(sequence: &Sequence, reason: impl FnOnce() -> String) -> LeafOutcome {
    if sequence.is_true_singleton() {
        Ok(())
    } else {
        Err(reason())
    }
}

fn resolve_xml_expected(ctx: &AssertionContext<'_>, expected: &XmlExpected) -> Result<String, Error> {
    match expected {
        XmlExpected::Literal(text) => Ok(text.clone()),
        XmlExpected::Path(path) => {
            let bytes = ctx
                .resolved
                .sources
                .get(path)
                .or_else(|| ctx.resolved.resources.get(path))
                .cloned()
                .ok_or_else(|| Error::MissingResolvedPath(path.clone()))?;
            String::from_utf8(bytes.to_vec()).map_err(|e| anyhow::Error::from(e).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn true_sequence() -> Sequence {
        Sequence::new(vec![Item {
            value: ItemValue::Boolean(true),
        }])
    }

    fn false_sequence() -> Sequence {
        Sequence::new(vec![Item {
            value: ItemValue::Boolean(false),
        }])
    }

    #[test]
    fn bool_outcome_passes_on_true_singleton() {
        assert!(bool_outcome(&true_sequence(), || "x".to_string()).is_ok());
    }

    #[test]
    fn bool_outcome_fails_on_false_singleton() {
        assert!(bool_outcome(&false_sequence(), || "x".to_string()).is_err());
    }
}
