//! Placeholder substitution for caveats and test checks.

use std::path::Path;

use pour_schema::{Template, Token};

/// Marker placed at the top of the caveats of every unverified install.
pub const UNVERIFIED_WARNING: &str = "WARNING: UNVERIFIED";

/// Resolved values for template placeholders.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub prefix: &'a Path,
    pub name: &'a str,
    pub version: &'a str,
    pub testpath: Option<&'a Path>,
}

impl RenderContext<'_> {
    pub fn value(&self, token: &Token) -> String {
        match token {
            Token::Prefix => self.prefix.display().to_string(),
            Token::Name => self.name.to_string(),
            Token::Version => self.version.to_string(),
            Token::Dir(entry) => self.prefix.join(entry).display().to_string(),
            // Only test templates may contain it; parsing enforces that.
            Token::TestPath => self
                .testpath
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn render(&self, template: &Template) -> String {
        template.render(|token| self.value(token))
    }
}

/// Produce the post-install guidance shown to the user.
///
/// Never fails: every placeholder was validated when the formula loaded.
/// Unverified installs always get a warning, even without caveats.
pub fn render(template: Option<&Template>, ctx: &RenderContext<'_>, unverified: bool) -> String {
    let mut out = String::new();
    if unverified {
        out.push_str(UNVERIFIED_WARNING);
        out.push_str(": ");
        out.push_str(ctx.name);
        out.push_str(" was installed without an integrity check.\n");
    }
    if let Some(template) = template {
        out.push_str(ctx.render(template).trim_end());
        out.push('\n');
    }
    out
}
