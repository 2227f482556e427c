//! Literal helper-query text used by the Assertion Evaluator.
//! These strings are re-parsed and compiled by the engine on every use —
//! the core never caches compiled forms.

pub const QUERY_NORMALIZED_SPACE: &str = "normalize-space($result)";

pub const QUERY_ASSERT_STRING_VALUE: &str =
    "string-join(for $r in $result return string($r), \" \")";

pub const QUERY_ASSERT_STRING_VALUE_NORMALIZED_SPACE: &str =
    "normalize-space(string-join(for $r in $result return string($r), \" \"))";

/// Declares the shared `output:serialization-parameters` element every
/// serialization-based query prepends.
const SERIALIZATION_PARAMETERS_PREAMBLE: &str = "declare variable $local:default-serialization := \
<output:serialization-parameters xmlns:output=\"http://www.w3.org/2010/xslt-xquery-serialization\">\
<output:method value=\"xml\"/>\
<output:indent value=\"no\"/>\
<output:omit-xml-declaration value=\"yes\"/>\
</output:serialization-parameters>;\n";

pub const QUERY_DEFAULT_SERIALIZATION: &str = "serialize($result)";

/// `QUERY_ASSERT_XML_SERIALIZATION` is built lazily (it's the preamble plus
/// a call) rather than as a single `&str` constant.
pub fn assert_xml_serialization_query() -> String {
    format!("{SERIALIZATION_PARAMETERS_PREAMBLE}fn:serialize($result, $local:default-serialization)")
}

/// `$result instance of <type>` — used by `assert-type`. Callers are
/// expected to have already stripped any parameterized-type argument list
/// from `type_name` via `strip_parameter_type`.
pub fn instance_of_query(type_name: &str) -> String {
    format!("$result instance of {type_name}")
}

/// Strips a parameterized-type argument list (e.g. `(5,2)` in
/// `xs:decimal(5,2)?`) from a type name, keeping the base type and any
/// trailing cardinality indicator. Parameter types are ignored rather than
/// enforced.
pub fn strip_parameter_type(type_name: &str) -> String {
    let Some(open) = type_name.find('(') else {
        return type_name.to_string();
    };
    let close = type_name[open..]
        .find(')')
        .map(|i| open + i + 1)
        .unwrap_or(type_name.len());
    format!("{}{}", &type_name[..open], &type_name[close..])
}

/// `fn:matches($result, "<regex>", "<flags>")` — used by
/// `serialization-matches` against the serialized `$result`.
pub fn matches_query(regex: &str, flags: &str) -> String {
    format!("fn:matches($result, \"{regex}\", \"{flags}\")")
}

/// `deep-equal((<expected>), $result)` — used by `assert-deep-eq`.
pub fn deep_equal_query(expected: &str) -> String {
    format!("deep-equal(({expected}), $result)")
}

/// `<expected> eq $result` — used by `assert-eq`.
pub fn value_eq_query(expected: &str) -> String {
    format!("({expected}) eq $result")
}

/// A permutation comparison sorts both sides with a string-tagged key (so
/// `xs:string` values stay distinct from numerics under sort) and then
/// `deep-equal`s them.
pub fn deep_equal_sorted_query(expected: &str) -> String {
    format!(
        "deep-equal(\
for $i in $result order by (if ($i instance of xs:string) then concat('str_', $i) else string($i)) return $i, \
for $i in ({expected}) order by (if ($i instance of xs:string) then concat('str_', $i) else string($i)) return $i)"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_parameter_type_leaves_plain_type_alone() {
        assert_eq!(strip_parameter_type("xs:decimal"), "xs:decimal");
    }

    #[test]
    fn strip_parameter_type_drops_the_argument_list() {
        assert_eq!(strip_parameter_type("xs:decimal(5,2)"), "xs:decimal");
    }

    #[test]
    fn strip_parameter_type_keeps_trailing_cardinality() {
        assert_eq!(strip_parameter_type("xs:decimal(5,2)?"), "xs:decimal?");
        assert_eq!(strip_parameter_type("xs:decimal(5,2)*"), "xs:decimal*");
    }
}
