//! Attribute tokenizing for raw tag bodies

use crate::error::{EsiError, Result};

/// Split a raw tag body such as
/// `include src="https://svc/cart" timeout="8ms"` into an ordered
/// `[name, value, name, value, …]` list.
///
/// A separator is any whitespace character or `=`, except inside a quoted
/// region. A `'` or `"` opens a region and only the same character closes
/// it; the other quote character stays literal inside. The leading element
/// (the tag name) is dropped. Values of length ≥ 3 lose their surrounding
/// quote characters and outer whitespace.
pub fn split_attributes(raw: &str) -> Result<Vec<String>> {
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        let is_separator = match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                false
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    false
                } else {
                    c.is_whitespace() || c == '='
                }
            }
        };

        if is_separator {
            if !current.is_empty() {
                fields.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }

    if fields.is_empty() {
        return Ok(fields);
    }
    fields.remove(0); // always the tag name, e.g. "include"

    if fields.len() % 2 == 1 {
        return Err(EsiError::ImbalancedAttributes(fields));
    }

    for value in fields.iter_mut().skip(1).step_by(2) {
        if value.chars().count() >= 3 {
            let mut chars = value.chars();
            chars.next();
            chars.next_back();
            *value = chars.as_str().to_string();
        }
        *value = value.trim().to_string();
    }

    Ok(fields)
}

/// Split a comma-separated attribute value into trimmed, non-empty items.
pub fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic_pairs() {
        let fields =
            split_attributes(r#"include src="https://svc/cart" timeout="8ms" onerror="f.html""#)
                .unwrap();
        assert_eq!(
            fields,
            vec![
                "src",
                "https://svc/cart",
                "timeout",
                "8ms",
                "onerror",
                "f.html"
            ]
        );
    }

    #[test]
    fn test_split_single_quotes_keep_inner_doubles() {
        let fields =
            split_attributes(r#"include src='https://svc/cart={{ header["x"] }}' ttl="9ms""#)
                .unwrap();
        assert_eq!(fields[0], "src");
        assert_eq!(fields[1], r#"https://svc/cart={{ header["x"] }}"#);
        assert_eq!(&fields[2..], ["ttl", "9ms"]);
    }

    #[test]
    fn test_split_equals_inside_quotes_is_literal() {
        let fields = split_attributes(r#"include src="https://svc/a?b=c&d=e""#).unwrap();
        assert_eq!(fields, vec!["src", "https://svc/a?b=c&d=e"]);
    }

    #[test]
    fn test_split_value_round_trip() {
        // a value with no quote character survives unchanged
        let fields = split_attributes(r#"include onerror="service down""#).unwrap();
        assert_eq!(fields, vec!["onerror", "service down"]);
    }

    #[test]
    fn test_split_empty_and_name_only() {
        assert!(split_attributes("").unwrap().is_empty());
        assert!(split_attributes("include").unwrap().is_empty());
    }

    #[test]
    fn test_split_imbalanced() {
        let err = split_attributes(r#"include src="a" stray"#).unwrap_err();
        assert!(matches!(err, EsiError::ImbalancedAttributes(_)));
    }

    #[test]
    fn test_split_preserves_nul_bytes() {
        let fields = split_attributes("include\u{0} src=\"https:...\" ").unwrap();
        assert_eq!(fields, vec!["src", "https:..."]);
    }

    #[test]
    fn test_short_value_not_unquoted() {
        // two characters or fewer: nothing to strip
        let fields = split_attributes(r#"include src=ab"#).unwrap();
        assert_eq!(fields, vec!["src", "ab"]);
    }

    #[test]
    fn test_comma_list() {
        assert_eq!(
            comma_list("Cookie,Accept-Language, Authorization"),
            vec!["Cookie", "Accept-Language", "Authorization"]
        );
        assert_eq!(comma_list(" a ,, b "), vec!["a", "b"]);
        assert!(comma_list("").is_empty());
    }
}
