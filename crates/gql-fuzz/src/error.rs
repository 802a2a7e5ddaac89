//! Error types.

use thiserror::Error;

/// Faults raised while turning an introspection result into a [`Schema`](crate::Schema).
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("introspection result has no `__schema` object")]
    MissingSchema,

    #[error("malformed introspection result: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("root type `{0}` is not declared in the schema")]
    MissingRootType(String),
}

/// Reasons a payload could not be built for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    /// No live object of the required type exists yet.
    ///
    /// This is expected during a run: the operation is simply not runnable
    /// against the current object bucket.
    #[error("hard dependency not met: no live `{type_name}` for input `{field}`")]
    UnmetHardDependency { type_name: String, field: String },

    #[error("input `{field}` nests deeper than {limit} levels")]
    InputTooDeep { field: String, limit: usize },

    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("type `{0}` is referenced but not declared")]
    UnknownType(String),

    #[error("enum `{0}` declares no values")]
    EmptyEnum(String),
}

impl MaterializeError {
    pub fn is_unmet_dependency(&self) -> bool {
        matches!(self, MaterializeError::UnmetHardDependency { .. })
    }
}

/// The request never produced a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BucketError {
    #[error("`{0}` is not an object type of this schema")]
    UnknownObjectType(String),
}
