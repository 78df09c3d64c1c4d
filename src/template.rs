//! Placeholder substitution for system prompts.
//!
//! Templates reference context values as `{fieldName}`. Rendering is a single
//! left-to-right pass: each recognised placeholder is replaced by its value
//! verbatim, unknown placeholders are kept as written, and inserted values are
//! never scanned again, so a brand name containing `{category}` stays literal.

use std::collections::BTreeMap;

/// A placeholder occurrence: byte range of `{name}` in the template and the name.
fn scan(template: &str) -> impl Iterator<Item = (usize, usize, &str)> + '_ {
    let mut cursor = 0usize;
    std::iter::from_fn(move || {
        while let Some(rel) = template[cursor..].find('{') {
            let open = cursor + rel;
            let after = open + 1;
            let Some(close_rel) = template[after..].find('}') else {
                cursor = template.len();
                return None;
            };
            let name = &template[after..after + close_rel];
            if name.is_empty() || name.contains('{') {
                // Not a placeholder; the next `{` may still open one.
                cursor = after;
                continue;
            }
            let end = after + close_rel + 1;
            cursor = end;
            return Some((open, end, name));
        }
        cursor = template.len();
        None
    })
}

/// Replace every `{name}` that has an entry in `values`.
pub fn render_template(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut last = 0usize;
    for (start, end, name) in scan(template) {
        if let Some(value) = values.get(name) {
            out.push_str(&template[last..start]);
            out.push_str(value);
            last = end;
        }
    }
    out.push_str(&template[last..]);
    out
}

/// Distinct placeholder names in first-seen order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (_, _, name) in scan(template) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Placeholders the template uses but `values` does not provide.
pub fn unresolved_placeholders(template: &str, values: &BTreeMap<String, String>) -> Vec<String> {
    placeholders(template)
        .into_iter()
        .filter(|name| !values.contains_key(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unknown_placeholder_left_verbatim() {
        let rendered = render_template("Hello {name}, {missing}", &values(&[("name", "X")]));
        assert_eq!(rendered, "Hello X, {missing}");
    }

    #[test]
    fn replaces_every_occurrence() {
        let rendered = render_template(
            "{brand} loves {brand}. Category: {category}.",
            &values(&[("brand", "Acme"), ("category", "Snacks")]),
        );
        assert_eq!(rendered, "Acme loves Acme. Category: Snacks.");
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let rendered = render_template(
            "{brand} / {category}",
            &values(&[("brand", "{category}"), ("category", "Snacks")]),
        );
        assert_eq!(rendered, "{category} / Snacks");
    }

    #[test]
    fn values_with_regex_and_dollar_syntax_are_literal() {
        let rendered = render_template("Price: {price}", &values(&[("price", "$1 (.*) \\d")]));
        assert_eq!(rendered, "Price: $1 (.*) \\d");
    }

    #[test]
    fn braces_that_are_not_placeholders_survive() {
        let template = r#"Return {"score": 1} for {brand}. Unclosed { brace and {}"#;
        let rendered = render_template(template, &values(&[("brand", "Acme")]));
        assert_eq!(
            rendered,
            r#"Return {"score": 1} for Acme. Unclosed { brace and {}"#
        );
    }

    #[test]
    fn doubled_braces_wrap_the_value() {
        let rendered = render_template("{{brand}}", &values(&[("brand", "Acme")]));
        assert_eq!(rendered, "{Acme}");
    }

    #[test]
    fn rendering_is_repeatable() {
        let template = "Brand {brand}, TA {targetAudience}";
        let ctx = values(&[("brand", "Acme"), ("targetAudience", "Students")]);
        assert_eq!(render_template(template, &ctx), render_template(template, &ctx));
    }

    #[test]
    fn lists_placeholders_in_order() {
        let template = "{b} {a} {b} {c}";
        assert_eq!(placeholders(template), vec!["b", "a", "c"]);
        assert_eq!(
            unresolved_placeholders(template, &values(&[("a", "1")])),
            vec!["b", "c"]
        );
    }
}
