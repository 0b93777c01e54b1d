use std::fmt;

use super::ModelError;

/// Function names that collide with routes or buckets the backend creates itself.
pub const RESERVED_FUNCTION_NAMES: &[&str] = &["public", "ws", "api", "stackmate"];

/// Maximum length of function and public site names.
pub const MAX_RESOURCE_NAME_LEN: usize = 64;

/// Maximum length of project, stage and node names. These end up inside
/// cloud resource names, which have tight limits.
pub const MAX_SCOPE_NAME_LEN: usize = 32;

/// The kind of thing being named, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Project,
    Stage,
    Node,
    Function,
    PublicSite,
}

impl NameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Stage => "stage",
            Self::Node => "node",
            Self::Function => "function",
            Self::PublicSite => "public site",
        }
    }

    fn max_len(&self) -> usize {
        match self {
            Self::Function | Self::PublicSite => MAX_RESOURCE_NAME_LEN,
            Self::Project | Self::Stage | Self::Node => MAX_SCOPE_NAME_LEN,
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a name: 1..=max characters of ASCII letters, digits, `-` and `_`,
/// starting with a letter or digit.
pub fn validate_name(kind: NameKind, name: &str) -> Result<(), ModelError> {
    let invalid = |reason: String| ModelError::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty".to_string()));
    }
    if name.len() > kind.max_len() {
        return Err(invalid(format!(
            "longer than {} characters",
            kind.max_len()
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(invalid(format!("character '{}' is not allowed", c)));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("must start with a letter or digit".to_string()));
    }
    Ok(())
}

/// Validate a function name, including the reserved name check.
pub fn validate_function_name(name: &str) -> Result<(), ModelError> {
    validate_name(NameKind::Function, name)?;
    if RESERVED_FUNCTION_NAMES.contains(&name) {
        return Err(ModelError::ReservedName(name.to_string()));
    }
    Ok(())
}
