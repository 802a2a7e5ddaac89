//! Argument literals.

use super::scalar::{quote, random_scalar};
use crate::bucket::ObjectBucket;
use crate::error::MaterializeError;
use crate::schema::{DependencyTarget, Operation, Schema, TypeRef};
use rand::prelude::*;
use std::collections::BTreeMap;

/// Renders the arguments of one operation against a bucket snapshot.
pub(crate) struct InputRenderer<'a, R: ?Sized> {
    pub schema: &'a Schema,
    pub operation: &'a Operation,
    pub bucket: &'a ObjectBucket,
    pub max_depth: usize,
    pub rng: &'a mut R,
    /// Object type to the id taken from the bucket for it, hard bindings first.
    pub used_objects: BTreeMap<String, String>,
}

impl<'a, R: Rng + ?Sized> InputRenderer<'a, R> {
    /// `name: value` pairs for every argument, in declaration order.
    pub fn render_arguments(&mut self) -> Result<Vec<String>, MaterializeError> {
        let operation = self.operation;
        let mut arguments = Vec::with_capacity(operation.inputs.len());
        for (name, ty) in &operation.inputs {
            if let Some(value) = self.render_value(name, ty, 0)? {
                arguments.push(format!("{name}: {value}"));
            }
        }
        Ok(arguments)
    }

    /// `None` means the field is left out: it is nullable and lies past the
    /// input depth limit.
    fn render_value(
        &mut self,
        field: &str,
        ty: &TypeRef,
        depth: usize,
    ) -> Result<Option<String>, MaterializeError> {
        match ty {
            TypeRef::NonNull { of_type } => match self.render_value(field, of_type, depth)? {
                Some(value) => Ok(Some(value)),
                None => Err(MaterializeError::InputTooDeep {
                    field: field.to_string(),
                    limit: self.max_depth,
                }),
            },
            TypeRef::List { of_type } => Ok(self
                .render_value(field, of_type, depth)?
                .map(|value| format!("[{value}]"))),
            TypeRef::InputObject { name } => self.render_input_object(name, depth + 1),
            TypeRef::Enum { name } => self.render_enum(name).map(Some),
            TypeRef::Scalar { name } => self.render_scalar(field, name).map(Some),
            TypeRef::Object { name } | TypeRef::Interface { name } | TypeRef::Union { name } => {
                Err(MaterializeError::UnknownType(name.clone()))
            }
        }
    }

    fn render_input_object(
        &mut self,
        name: &str,
        depth: usize,
    ) -> Result<Option<String>, MaterializeError> {
        if depth > self.max_depth {
            return Ok(None);
        }
        let schema = self.schema;
        let input = schema
            .input_objects
            .get(name)
            .ok_or_else(|| MaterializeError::UnknownType(name.to_string()))?;

        let mut fields = Vec::with_capacity(input.input_fields.len());
        for (field, ty) in &input.input_fields {
            if let Some(value) = self.render_value(field, ty, depth)? {
                fields.push(format!("{field}: {value}"));
            }
        }
        Ok(Some(format!("{{{}}}", fields.join(", "))))
    }

    fn render_enum(&mut self, name: &str) -> Result<String, MaterializeError> {
        let enum_type = self
            .schema
            .enums
            .get(name)
            .ok_or_else(|| MaterializeError::UnknownType(name.to_string()))?;
        enum_type
            .values
            .iter()
            .choose(&mut *self.rng)
            .cloned()
            .ok_or_else(|| MaterializeError::EmptyEnum(name.to_string()))
    }

    fn render_scalar(&mut self, field: &str, scalar: &str) -> Result<String, MaterializeError> {
        let operation = self.operation;
        if let Some(DependencyTarget::Object(type_name)) = operation.hard_depends_on.get(field) {
            return match self.take_live_id(type_name, true) {
                Some(id) => Ok(id),
                None => Err(MaterializeError::UnmetHardDependency {
                    type_name: type_name.clone(),
                    field: field.to_string(),
                }),
            };
        }
        if let Some(DependencyTarget::Object(type_name)) = operation.soft_depends_on.get(field) {
            if let Some(id) = self.take_live_id(type_name, false) {
                return Ok(id);
            }
        }
        Ok(random_scalar(scalar, &mut *self.rng))
    }

    /// A hard binding replaces whatever is recorded for its type; a soft one
    /// only fills an empty slot, so the recorded id is the one consumed.
    fn take_live_id(&mut self, type_name: &str, hard: bool) -> Option<String> {
        let id = self.bucket.choose(type_name, &mut *self.rng)?.to_string();
        let quoted = quote(&id);
        if hard {
            self.used_objects.insert(type_name.to_string(), id);
        } else {
            self.used_objects.entry(type_name.to_string()).or_insert(id);
        }
        Some(quoted)
    }
}
