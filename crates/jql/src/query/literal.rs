//! Rendering of constant values as query-language literals.
//!
//! - integers: bare digits
//! - dates: `"yyyy/MM/dd"`
//! - everything else: the natural string form in double quotes
//!
//! Null and empty-string sentinels never reach this module; the compiler turns
//! them into `is null` / `is empty` first. Arrays are rendered without the
//! surrounding parentheses, which belong to the caller (`in (...)`).

use crate::expr::{TypeRef, Value};

const DATE_FORMAT: &str = "%Y/%m/%d";

/// Comma bookkeeping for list contexts.
///
/// The first item written after a reset gets no separator, every later one is
/// preceded by `", "`.
#[derive(Debug, Clone)]
pub struct Separator {
    first: bool,
}

impl Default for Separator {
    fn default() -> Self {
        Self { first: true }
    }
}

impl Separator {
    pub fn reset(&mut self) {
        self.first = true;
    }

    /// Separator text to emit before the next item
    pub fn next(&mut self) -> &'static str {
        if self.first {
            self.first = false;
            ""
        } else {
            ", "
        }
    }
}

/// Formats constants for embedding in query text
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralFormatter {
    escape_quotes: bool,
}

impl LiteralFormatter {
    /// With `escape_quotes` off, embedded `"` are copied verbatim, matching what
    /// the legacy search parser has always received.
    pub fn new(escape_quotes: bool) -> Self {
        Self { escape_quotes }
    }

    /// Render a scalar. A `String` declared type forces quotes on integers.
    pub fn scalar(&self, value: &Value, ty: &TypeRef) -> String {
        match value {
            Value::Null | Value::Source(_) => String::new(),
            Value::Int(i) if !matches!(ty.underlying(), TypeRef::String) => i.to_string(),
            Value::Date(date) => format!("\"{}\"", date.format(DATE_FORMAT)),
            Value::Array(items) => {
                let mut separator = Separator::default();
                self.array(items, &ty.element_type(), &mut separator)
            }
            other => self.quoted(&other.to_string()),
        }
    }

    /// Render array elements comma-separated. Resets `separator` first.
    pub fn array(&self, items: &[Value], element_ty: &TypeRef, separator: &mut Separator) -> String {
        separator.reset();
        let mut out = String::new();
        for item in items {
            out.push_str(separator.next());
            out.push_str(&self.element(item, element_ty));
        }
        out
    }

    fn element(&self, item: &Value, element_ty: &TypeRef) -> String {
        match item {
            Value::Date(date) => format!("\"{}\"", date.format(DATE_FORMAT)),
            Value::Int(i) if !matches!(element_ty.underlying(), TypeRef::String) => i.to_string(),
            other => self.quoted(&other.to_string()),
        }
    }

    fn quoted(&self, text: &str) -> String {
        if self.escape_quotes {
            format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
        } else {
            format!("\"{}\"", text)
        }
    }
}
