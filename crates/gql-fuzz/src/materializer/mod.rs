//! Turning an operation into a request payload.
//!
//! The materializer never touches server state: it reads a snapshot of the
//! [`ObjectBucket`] and reports which live ids it used, leaving the engine
//! to react to whatever the server does with them.
//!
//! Payloads are pretty-printed, one selection per line with two spaces of
//! indentation per level, so server error locations point at exactly one
//! selection:
//!
//! ```text
//! mutation {
//!   createTransaction(amount: 12) {
//!     id
//!     payer {
//!       id
//!     }
//!   }
//! }
//! ```

mod input;
mod output;
pub mod scalar;

use crate::bucket::ObjectBucket;
use crate::config::FuzzConfig;
use crate::error::MaterializeError;
use crate::schema::{OperationId, Schema, TypeRef};
use input::InputRenderer;
use output::{render, OutputBounds, Selection, SelectionBuilder};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A ready-to-send payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Materialized {
    pub operation: OperationId,
    pub payload: String,
    /// Object type to the live id the payload references for it.
    pub used_objects: BTreeMap<String, String>,
}

/// Builds payloads for the operations of one schema.
pub struct Materializer<'a> {
    schema: &'a Schema,
    config: &'a FuzzConfig,
}

impl<'a> Materializer<'a> {
    pub fn new(schema: &'a Schema, config: &'a FuzzConfig) -> Self {
        Self { schema, config }
    }

    /// Build the full request document for `id`.
    ///
    /// Fails with [`MaterializeError::UnmetHardDependency`] when an input
    /// must reference a live object and the bucket holds none of that type.
    pub fn materialize<R: Rng + ?Sized>(
        &self,
        id: &OperationId,
        bucket: &ObjectBucket,
        rng: &mut R,
    ) -> Result<Materialized, MaterializeError> {
        let operation = self
            .schema
            .operation(id)
            .ok_or_else(|| MaterializeError::UnknownOperation(id.to_string()))?;

        let mut inputs = InputRenderer {
            schema: self.schema,
            operation,
            bucket,
            max_depth: self.config.max_input_depth,
            rng,
            used_objects: BTreeMap::new(),
        };
        let arguments = inputs.render_arguments()?;
        let used_objects = inputs.used_objects;

        let mut payload = format!("{} {{\n  {}", id.kind.keyword(), operation.name);
        if !arguments.is_empty() {
            payload.push('(');
            payload.push_str(&arguments.join(", "));
            payload.push(')');
        }
        if operation.output.is_leaf() {
            payload.push('\n');
        } else {
            let mut selections = self.selections(&operation.output);
            if selections.is_empty() {
                selections.push(Selection::Leaf("__typename".to_string()));
            }
            payload.push_str(" {\n");
            render(&selections, 2, &mut payload);
            payload.push_str("  }\n");
        }
        payload.push('}');

        Ok(Materialized {
            operation: id.clone(),
            payload,
            used_objects,
        })
    }

    /// Selection set for a value of type `ty`, without the enclosing braces.
    ///
    /// Returns `""` when nothing is selectable (leaf types, unions, or objects
    /// cut off entirely by the cycle and depth bounds); otherwise the text
    /// holds at least one leaf selection.
    pub fn materialize_output(&self, ty: &TypeRef) -> String {
        let mut out = String::new();
        render(&self.selections(ty), 0, &mut out);
        out
    }

    fn selections(&self, ty: &TypeRef) -> Vec<Selection> {
        SelectionBuilder::new(
            self.schema,
            OutputBounds {
                max_depth: self.config.effective_output_depth(),
                max_cycles: self.config.max_object_cycles,
            },
        )
        .select(ty)
    }
}
