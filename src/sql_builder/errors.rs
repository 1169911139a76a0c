use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlBuildError {
    #[error("Statement has no FROM clause (call `from` or `from_fresh` first)")]
    MissingFrom,

    #[error("Statement selects nothing (at least one select item is required)")]
    EmptySelect,

    #[error("Placeholder `:{0}` is not bound to any parameter")]
    UnboundParameter(String),

    #[error("Unsupported SQL dialect `{0}` (expected `sqlite` or `postgresql`)")]
    UnsupportedDialect(String),
}
