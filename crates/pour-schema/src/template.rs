//! Placeholder templates for caveats and test checks.
//!
//! Templates are parsed once, when the formula is loaded, so every token is
//! known to be valid before anything runs. Rendering is then a total
//! function: it substitutes values and cannot fail.

use thiserror::Error;

/// Errors found while parsing a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{{` without a matching `}}`.
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    /// A placeholder name that is not recognized.
    #[error("unknown placeholder '{{{{{0}}}}}'")]
    Unknown(String),

    /// `{{dir:x}}` where `x` is not an install-plan entry.
    #[error("placeholder '{{{{dir:{0}}}}}' does not name an install entry")]
    UnknownDir(String),

    /// A placeholder that exists but is not allowed here.
    #[error("placeholder '{{{{{0}}}}}' is only available in tests")]
    NotAllowed(String),
}

/// A recognized placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// `{{prefix}}`: the installation root.
    Prefix,
    /// `{{name}}`: the formula name.
    Name,
    /// `{{version}}`: the resolved version.
    Version,
    /// `{{testpath}}`: scratch directory of the running test.
    TestPath,
    /// `{{dir:<entry>}}`: an installed directory from the install plan.
    Dir(String),
}

/// What a template may refer to where it is used.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// Install-plan entries valid for `{{dir:...}}`.
    pub install_entries: &'a [String],
    /// Whether `{{testpath}}` is allowed.
    pub allow_testpath: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Token),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `text` against the tokens permitted by `scope`.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] for unterminated or unknown placeholders.
    pub fn parse(text: &str, scope: Scope<'_>) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = text;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;
            let token = parse_token(after[..end].trim(), scope)?;
            segments.push(Segment::Token(token));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: text.to_string(),
            segments,
        })
    }

    /// Substitute every placeholder with the value produced by `value`.
    pub fn render(&self, mut value: impl FnMut(&Token) -> String) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Token(t) => out.push_str(&value(t)),
            }
        }
        out
    }
}

fn parse_token(name: &str, scope: Scope<'_>) -> Result<Token, TemplateError> {
    if let Some(entry) = name.strip_prefix("dir:") {
        let entry = entry.trim().trim_end_matches('/');
        if scope.install_entries.iter().any(|e| e == entry) {
            return Ok(Token::Dir(entry.to_string()));
        }
        return Err(TemplateError::UnknownDir(entry.to_string()));
    }
    match name {
        "prefix" | "opt_prefix" => Ok(Token::Prefix),
        "name" => Ok(Token::Name),
        "version" => Ok(Token::Version),
        "testpath" if scope.allow_testpath => Ok(Token::TestPath),
        "testpath" => Err(TemplateError::NotAllowed(name.to_string())),
        other => Err(TemplateError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(entries: &[String], allow_testpath: bool) -> Scope<'_> {
        Scope {
            install_entries: entries,
            allow_testpath,
        }
    }

    #[test]
    fn renders_known_tokens() {
        let entries = vec!["scripts".to_string()];
        let t = Template::parse(
            "run {{ dir:scripts }}/install.sh from {{prefix}}",
            scope(&entries, false),
        )
        .unwrap();
        let out = t.render(|tok| match tok {
            Token::Prefix => "/opt/x".to_string(),
            Token::Dir(d) => format!("/opt/x/{d}"),
            _ => String::new(),
        });
        assert_eq!(out, "run /opt/x/scripts/install.sh from /opt/x");
    }

    #[test]
    fn rejects_unknown_and_unterminated() {
        let entries = vec!["config".to_string()];
        assert_eq!(
            Template::parse("{{cellar}}", scope(&entries, false)),
            Err(TemplateError::Unknown("cellar".into()))
        );
        assert_eq!(
            Template::parse("a {{prefix", scope(&entries, false)),
            Err(TemplateError::Unterminated(2))
        );
        assert_eq!(
            Template::parse("{{dir:scripts}}", scope(&entries, false)),
            Err(TemplateError::UnknownDir("scripts".into()))
        );
        assert_eq!(
            Template::parse("{{testpath}}", scope(&entries, false)),
            Err(TemplateError::NotAllowed("testpath".into()))
        );
    }

    #[test]
    fn plain_text_round_trips() {
        let t = Template::parse("nothing to see", scope(&[], false)).unwrap();
        assert_eq!(t.render(|_| unreachable!()), "nothing to see");
    }
}
