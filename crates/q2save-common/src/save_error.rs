// save_error.rs — error and warning types for the save system

use std::fmt;

use thiserror::Error;

/// Every way a save or load can fail.
///
/// `Structural`, `Range` and `Reference` are normally recovered in place and
/// only surface as errors in strict mode. The rest always abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("{path}: {message}")]
    Structural { path: String, message: String },

    #[error("{path}: {message}")]
    Range { path: String, message: String },

    #[error("{path}: {message}")]
    Reference { path: String, message: String },

    #[error("{context} save: {message}")]
    Version { context: String, message: String },

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("registration: {0}")]
    Registration(String),

    #[error("couldn't decode save document: {0}")]
    Parse(String),
}

impl SaveError {
    pub fn structural(path: impl Into<String>, message: impl Into<String>) -> Self {
        SaveError::Structural { path: path.into(), message: message.into() }
    }

    pub fn registration(message: impl Into<String>) -> Self {
        SaveError::Registration(message.into())
    }

    /// True for the kinds that are warnings in lenient mode.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SaveError::Structural { .. } | SaveError::Range { .. } | SaveError::Reference { .. }
        )
    }
}

/// Breadcrumb for `field` under `path`, e.g.
/// `entities::12.monsterinfo::reinforcements[0]`.
pub fn breadcrumb(path: &[String], field: &str) -> String {
    let base = path.join("::");
    if base.is_empty() {
        field.to_string()
    } else if field.is_empty() || field.starts_with('[') {
        format!("{base}{field}")
    } else {
        format!("{base}.{field}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    Structural,
    Range,
    Reference,
}

/// A recovered problem with the breadcrumb path of the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveWarning {
    pub kind: WarningKind,
    pub path: String,
    pub message: String,
}

impl SaveWarning {
    pub fn new(kind: WarningKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        SaveWarning { kind, path: path.into(), message: message.into() }
    }

    pub fn into_error(self) -> SaveError {
        let SaveWarning { kind, path, message } = self;
        match kind {
            WarningKind::Structural => SaveError::Structural { path, message },
            WarningKind::Range => SaveError::Range { path, message },
            WarningKind::Reference => SaveError::Reference { path, message },
        }
    }
}

impl fmt::Display for SaveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_upgrades_to_matching_error() {
        let w = SaveWarning::new(WarningKind::Range, "game::clients[0].health", "int32 out of range");
        let e = w.clone().into_error();
        assert!(e.is_recoverable());
        assert_eq!(e.to_string(), w.to_string());
        assert!(matches!(e, SaveError::Range { .. }));
    }

    #[test]
    fn test_breadcrumb_joins_segments() {
        let path = vec!["entities".to_string(), "12".to_string()];
        assert_eq!(breadcrumb(&path, "health"), "entities::12.health");
        assert_eq!(breadcrumb(&path, "[3]"), "entities::12[3]");
        assert_eq!(breadcrumb(&[], "game"), "game");
    }

    #[test]
    fn test_version_error_message() {
        let e = SaveError::Version {
            context: "game".into(),
            message: "expected save version 1 but found 0".into(),
        };
        assert_eq!(e.to_string(), "game save: expected save version 1 but found 0");
        assert!(!e.is_recoverable());
    }
}
