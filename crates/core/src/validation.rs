//! Field-level validation errors for catalog structures.
//!
//! A [`FieldError`] accumulates issues; each issue is a message plus the
//! field paths it applies to. Issues sharing a message are reported together:
//!
//! ```text
//! field must be a UUID: Plans[0].id, id
//! missing field(s): name
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static OSB_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-.]+$").expect("Invalid OSB name regex"));
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    )
    .expect("Invalid UUID regex")
});
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*:(//)?\S+$").expect("Invalid URL regex"));

#[derive(Debug, Clone, PartialEq)]
struct Issue {
    message: String,
    paths: Vec<String>,
}

/// Zero or more validation issues. An empty `FieldError` means "valid".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldError {
    issues: Vec<Issue>,
}

impl FieldError {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            issues: vec![Issue {
                message: message.into(),
                paths: vec![path.into()],
            }],
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new("missing field(s)", field)
    }

    pub fn invalid_value(value: &str, field: &str) -> Self {
        Self::new(format!("invalid value: {value}"), field)
    }

    pub fn duplicate(value: &str, field: &str) -> Self {
        Self::new(format!("duplicate value: {value}"), field)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn also(mut self, other: FieldError) -> Self {
        self.issues.extend(other.issues);
        self
    }

    /// Merge the error side of a nested validation result.
    pub fn also_result(self, other: Result<(), FieldError>) -> Self {
        match other {
            Ok(()) => self,
            Err(e) => self.also(e),
        }
    }

    /// Prefix every path with `field.`.
    pub fn via_field(mut self, field: &str) -> Self {
        for issue in &mut self.issues {
            for p in &mut issue.paths {
                *p = format!("{field}.{p}");
            }
        }
        self
    }

    /// Prefix every path with `field[index].`.
    pub fn via_field_index(self, field: &str, index: usize) -> Self {
        self.via_field(&format!("{field}[{index}]"))
    }

    pub fn into_result(self) -> Result<(), FieldError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Result<(), FieldError>> for FieldError {
    fn from(r: Result<(), FieldError>) -> Self {
        r.err().unwrap_or_default()
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for issue in &self.issues {
            match grouped.iter_mut().find(|(m, _)| *m == issue.message) {
                Some((_, paths)) => paths.extend(issue.paths.iter().cloned()),
                None => grouped.push((issue.message.clone(), issue.paths.clone())),
            }
        }
        grouped.sort_by(|a, b| a.0.cmp(&b.0));
        let lines: Vec<String> = grouped
            .into_iter()
            .map(|(message, mut paths)| {
                paths.sort();
                paths.dedup();
                format!("{message}: {}", paths.join(", "))
            })
            .collect();
        f.write_str(&lines.join("\n"))
    }
}

impl std::error::Error for FieldError {}

// ── Validators ──────────────────────────────────────────────────────────────

pub fn err_if_blank(value: &str, field: &str) -> FieldError {
    if value.is_empty() {
        FieldError::missing(field)
    } else {
        FieldError::none()
    }
}

pub fn err_if_not_uuid(value: &str, field: &str) -> FieldError {
    if UUID.is_match(value) {
        FieldError::none()
    } else {
        FieldError::new("field must be a UUID", field)
    }
}

pub fn err_if_not_url(value: &str, field: &str) -> FieldError {
    if URL.is_match(value) {
        FieldError::none()
    } else {
        FieldError::new("field must be a URL", field)
    }
}

pub fn err_if_not_osb_name(value: &str, field: &str) -> FieldError {
    err_if_not_match(value, &OSB_NAME, field)
}

pub fn err_if_not_match(value: &str, re: &Regex, field: &str) -> FieldError {
    if re.is_match(value) {
        FieldError::none()
    } else {
        FieldError::new(format!("field must match '{}'", re.as_str()), field)
    }
}

/// Records `value` in `seen`; reports a duplicate if it was already there.
pub fn err_if_duplicate(value: &str, field: &str, seen: &mut HashSet<String>) -> FieldError {
    if seen.insert(value.to_string()) {
        FieldError::none()
    } else {
        FieldError::duplicate(value, field)
    }
}
