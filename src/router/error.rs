use thiserror::Error;

/// Reasons a route cannot be registered.
///
/// Every one of these is a programming mistake in the route table; they are
/// reported from [`Router::register`](super::Router::register) and never at
/// request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("method must not be empty")]
    EmptyMethod,

    #[error("path must begin with '/' in path '{path}'")]
    MissingLeadingSlash { path: String },

    #[error("a handle is already registered for path '{path}'")]
    Duplicate { path: String },

    #[error(
        "'{segment}' in new path '{path}' conflicts with existing wildcard '{wildcard}' in existing prefix '{prefix}'"
    )]
    WildcardConflict {
        segment: String,
        path: String,
        wildcard: String,
        prefix: String,
    },

    #[error("wildcard segment '{wildcard}' conflicts with existing children in path '{path}'")]
    ChildConflict { wildcard: String, path: String },

    #[error("only one wildcard per path segment is allowed, has: '{wildcard}' in path '{path}'")]
    MultipleWildcards { wildcard: String, path: String },

    #[error("wildcards must be named with a non-empty name in path '{path}'")]
    UnnamedWildcard { path: String },

    #[error("catch-all routes are only allowed at the end of the path in path '{path}'")]
    CatchAllNotLast { path: String },

    #[error("no / before catch-all in path '{path}'")]
    MissingSlashBeforeCatchAll { path: String },

    #[error("catch-all conflicts with existing handle for the path segment root in path '{path}'")]
    CatchAllRootConflict { path: String },

    #[error("path must end with /*filepath in path '{path}'")]
    FileServerPattern { path: String },
}
