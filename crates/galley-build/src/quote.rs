//! Quoting for Dockerfile and compose values.

use serde_json::Value;

/// JSON string literal. Valid in Dockerfile exec form and as a YAML
/// double-quoted scalar.
pub(crate) fn json_string(value: &str) -> String {
    Value::from(value).to_string()
}

/// Exec-form argument list, e.g. `["python","manage.py"]`.
pub(crate) fn json_array(items: &[String]) -> String {
    Value::from(items.to_vec()).to_string()
}

/// `ENV`/`LABEL` value. Bare when nothing in it is special to the Dockerfile
/// parser, otherwise double quoted with `\`, `"` and `$` escaped so the value
/// is stored literally instead of being expanded at build time.
pub(crate) fn dockerfile_value(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '$' | '\\' | '#'));
    if plain {
        value.to_owned()
    } else {
        dockerfile_quoted(value)
    }
}

/// Double-quoted Dockerfile value with `\`, `"` and `$` escaped.
pub(crate) fn dockerfile_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Compose interpolates `$`; `$$` keeps it literal.
pub(crate) fn compose_string(value: &str) -> String {
    json_string(&value.replace('$', "$$"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_escapes_quotes_and_backslashes() {
        assert_eq!(json_string(r#"say "hi" \o/"#), r#""say \"hi\" \\o/""#);
    }

    #[test]
    fn plain_values_stay_bare() {
        assert_eq!(dockerfile_value("1"), "1");
        assert_eq!(dockerfile_value("app.settings"), "app.settings");
        assert_eq!(dockerfile_value("two words"), "\"two words\"");
        assert_eq!(dockerfile_value(""), "\"\"");
    }

    #[test]
    fn dollar_signs_are_not_expanded() {
        assert_eq!(dockerfile_value("cost$5 $HOME"), r#""cost\$5 \$HOME""#);
        assert_eq!(dockerfile_value(r#"a "b" \c"#), r#""a \"b\" \\c""#);
    }

    #[test]
    fn compose_doubles_dollar_signs() {
        assert_eq!(compose_string("pa$$word $HOME"), r#""pa$$$$word $$HOME""#);
    }

    #[test]
    fn array_is_exec_form() {
        let args = vec!["python".to_owned(), "manage.py".to_owned()];
        assert_eq!(json_array(&args), r#"["python","manage.py"]"#);
    }
}
