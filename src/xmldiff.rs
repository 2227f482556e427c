//! Structural XML diffing for `assert-xml`. `xot` gives us
//! `deep_equal` as a plain boolean; assertion evaluation wants a path to
//! the first divergence, so this module walks the two trees by hand.

use regex::Regex;
use xot::{Node, Xot};

/// A single point of divergence, reported as a child-index path from the
/// document root (e.g. `/0/2` — second child of the first child).
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub path: String,
    pub description: String,
}

/// Both the expected and actual XML fragments for `assert-xml` are wrapped
/// in a synthetic root element before parsing, since a fragment may have
/// multiple top-level nodes; the wrapper's own position is stripped back
/// out of any reported path.
pub fn wrap_in_ignorable_wrapper(fragment: &str) -> String {
    format!("<ignorable-wrapper>{fragment}</ignorable-wrapper>")
}

/// Strips a leading `/ignorable-wrapper` or `/ignorable-wrapper[N]` segment
/// from a reported difference path. Substitutes `/` if stripping would
/// otherwise leave an empty path.
pub fn strip_ignorable_wrapper_prefix(path: &str) -> String {
    let re = Regex::new(r"^/ignorable-wrapper(?:\[[0-9]+\])?").expect("static pattern");
    let stripped = re.replace(path, "").to_string();
    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped
    }
}

/// Parses both `expected` and `actual` (each already wrapped) and returns
/// the first structural difference found, if any, with wrapper-prefix
/// stripped from the path.
pub fn diff(expected: &str, actual: &str) -> Result<Option<Difference>, xot::Error> {
    let mut xot = Xot::new();
    let expected_root = xot.parse(expected)?;
    let actual_root = xot.parse(actual)?;

    let expected_doc = xot.document_element(expected_root)?;
    let actual_doc = xot.document_element(actual_root)?;

    let mut difference = diff_nodes(&xot, expected_doc, actual_doc, "");
    if let Some(diff) = &mut difference {
        diff.path = strip_ignorable_wrapper_prefix(&diff.path);
    }
    Ok(difference)
}

/// Recursively compares two nodes, short-circuiting on the first
/// divergence. `path` is the already-built path to `expected`/`actual`.
pub fn diff_nodes(xot: &Xot, expected: Node, actual: Node, path: &str) -> Option<Difference> {
    if xot.deep_equal(expected, actual) {
        return None;
    }

    if let (Some(expected_el), Some(actual_el)) = (xot.element(expected), xot.element(actual)) {
        if expected_el.name() != actual_el.name() {
            return Some(Difference {
                path: path.to_string(),
                description: format!(
                    "element name mismatch: expected {:?}, got {:?}",
                    expected_el.name(),
                    actual_el.name()
                ),
            });
        }

        let expected_children: Vec<Node> = xot.children(expected).collect();
        let actual_children: Vec<Node> = xot.children(actual).collect();

        if expected_children.len() != actual_children.len() {
            return Some(Difference {
                path: path.to_string(),
                description: format!(
                    "child count mismatch: expected {}, got {}",
                    expected_children.len(),
                    actual_children.len()
                ),
            });
        }

        for (index, (expected_child, actual_child)) in expected_children
            .into_iter()
            .zip(actual_children)
            .enumerate()
        {
            let child_path = format!("{path}/{index}");
            if let Some(found) = diff_nodes(xot, expected_child, actual_child, &child_path) {
                return Some(found);
            }
        }

        return Some(Difference {
            path: path.to_string(),
            description: "subtrees differ".to_string(),
        });
    }

    if let (Some(expected_text), Some(actual_text)) = (xot.text(expected), xot.text(actual)) {
        if expected_text.get() != actual_text.get() {
            return Some(Difference {
                path: path.to_string(),
                description: format!(
                    "text mismatch: expected {:?}, got {:?}",
                    expected_text.get(),
                    actual_text.get()
                ),
            });
        }
        return None;
    }

    Some(Difference {
        path: path.to_string(),
        description: "node kind mismatch".to_string(),
    })
}
