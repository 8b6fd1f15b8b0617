use crate::class::ClassUid;

pub type Result<T> = std::result::Result<T, HiveError>;

/// Recoverable failures reported by hives and the registry
///
/// Running out of slots is never one of these (hives always grow),
/// and reference counting misuse is fatal rather than reported.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HiveError {
    #[error("object is not owned by this hive")]
    NotFound,
    #[error("object has already been removed from the hive")]
    NotActive,
    #[error("no factory registered for class {0}")]
    UnknownClass(ClassUid),
    #[error("class {uid} holds {found}, not {expected}")]
    ClassMismatch {
        uid: ClassUid,
        expected: &'static str,
        found: &'static str,
    },
    #[error("a different factory is already registered for class {0}")]
    DuplicateClass(ClassUid),
}
