//! Directives - named instructions attached to fields through tags
//!
//! A tag is a `;`-separated list of clauses. Each clause is either a bare
//! name (`required`) or a name with a `,`-separated argument list
//! (`form=page,page_index`):
//!
//! ```text
//! "form=name;default=18"  →  [form(name), default(18)]
//! "query=page, index"     →  [query("page", " index")]   (interior spaces kept)
//! ```

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use crate::error::BindError;

/// Valid directive names: ASCII letters, digits and underscore
static DIRECTIVE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("directive name regex"));

/// Check a directive (and executor) name against the identifier pattern.
pub fn is_valid_directive_name(name: &str) -> bool {
    DIRECTIVE_NAME_RE.is_match(name)
}

/// A parsed tag clause: the executor name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Directive {
    /// Name of the executor to run
    pub name: String,
    /// Ordered arguments (whitespace preserved)
    pub argv: Vec<String>,
}

impl Directive {
    /// Create a directive without validating the name.
    pub fn new<I, S>(name: impl Into<String>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a directive that takes no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argv: Vec::new(),
        }
    }

    /// Parse one tag clause.
    ///
    /// The clause is trimmed, split on the first `=`, and the remainder is
    /// split on `,` without trimming the arguments.
    ///
    /// ```
    /// use tagbind::Directive;
    ///
    /// let d = Directive::parse("form=page,page_index").unwrap();
    /// assert_eq!(d, Directive::new("form", ["page", "page_index"]));
    /// assert!(Directive::parse("=page").is_err());
    /// ```
    pub fn parse(clause: &str) -> Result<Self, BindError> {
        let clause = clause.trim();
        let (name, argv) = match clause.split_once('=') {
            Some((name, rest)) => (name, rest.split(',').map(str::to_string).collect()),
            None => (clause, Vec::new()),
        };

        if !is_valid_directive_name(name) {
            return Err(BindError::InvalidDirectiveName {
                name: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            argv,
        })
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.argv.get(index).map(String::as_str)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.argv.is_empty() {
            return f.write_str(&self.name);
        }
        write!(f, "{}={}", self.name, self.argv.join(","))
    }
}

/// Parse a whole tag into its ordered directive list.
///
/// Empty clauses are dropped; a name repeated within one tag is rejected.
pub fn parse_tag(tag: &str) -> Result<Vec<Directive>, BindError> {
    let mut directives = Vec::new();
    let mut seen = FxHashSet::default();

    for clause in tag.split(';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let directive = Directive::parse(clause)?;
        if !seen.insert(directive.name.clone()) {
            return Err(BindError::DuplicateDirective {
                name: directive.name,
            });
        }
        directives.push(directive);
    }

    Ok(directives)
}

/// Render a directive list back into tag syntax.
pub fn format_tag(directives: &[Directive]) -> String {
    directives
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}
