//! Minimal `{name}` placeholder rendering for client ids and notes.
//!
//! `{{` and `}}` produce literal braces. Any other brace that does not form
//! a known placeholder is an error, so callers can fall back to something
//! sensible instead of emitting a half-rendered string.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownKey(String),

    #[error("unbalanced brace at offset {0}")]
    Unbalanced(usize),
}

/// Substitute every `{key}` in `template` with its value from `vars`.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::Unbalanced(pos)),
                        Some((_, k)) => key.push(k),
                    }
                }
                let value = vars
                    .get(key.as_str())
                    .ok_or(TemplateError::UnknownKey(key))?;
                out.push_str(value);
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(TemplateError::Unbalanced(pos)),
            other => out.push(other),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<&'static str, String> {
        HashMap::from([
            ("hostname", "web01".to_string()),
            ("domain", "corp.local".to_string()),
        ])
    }

    #[test]
    fn substitutes_placeholders() {
        assert_eq!(
            render("{hostname}.{domain}", &vars()).unwrap(),
            "web01.corp.local"
        );
        assert_eq!(render("no placeholders", &vars()).unwrap(), "no placeholders");
    }

    #[test]
    fn escaped_braces_are_literal() {
        assert_eq!(
            render("{{literal}} {hostname}", &vars()).unwrap(),
            "{literal} web01"
        );
    }

    #[test]
    fn unknown_key_is_an_error() {
        assert_eq!(
            render("{hostname}-{serial}", &vars()),
            Err(TemplateError::UnknownKey("serial".to_string()))
        );
    }

    #[test]
    fn unbalanced_braces_are_errors() {
        assert_eq!(render("{hostname", &vars()), Err(TemplateError::Unbalanced(0)));
        assert_eq!(render("web}01", &vars()), Err(TemplateError::Unbalanced(3)));
        assert!(render("{host{name}}", &vars()).is_err());
    }
}
