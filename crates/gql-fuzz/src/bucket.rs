//! Live object identifiers known to the fuzzer.

use crate::error::BucketError;
use crate::schema::Schema;
use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Object type name to the identifiers believed live on the server.
///
/// Keys are fixed when the bucket is created from a schema; inserting under
/// any other name is an error rather than a silent new entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectBucket {
    objects: BTreeMap<String, BTreeSet<String>>,
}

impl ObjectBucket {
    /// Empty bucket accepting the object types of `schema`.
    pub fn for_schema(schema: &Schema) -> Self {
        Self::with_types(schema.objects.keys().cloned())
    }

    pub fn with_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: types
                .into_iter()
                .map(|t| (t.into(), BTreeSet::new()))
                .collect(),
        }
    }

    /// Returns true if the id was not already present.
    pub fn insert(
        &mut self,
        type_name: &str,
        id: impl Into<String>,
    ) -> Result<bool, BucketError> {
        self.entry(type_name).map(|ids| ids.insert(id.into()))
    }

    /// Returns true if the id was present.
    pub fn remove(&mut self, type_name: &str, id: &str) -> Result<bool, BucketError> {
        self.entry(type_name).map(|ids| ids.remove(id))
    }

    pub fn contains(&self, type_name: &str, id: &str) -> bool {
        self.objects
            .get(type_name)
            .is_some_and(|ids| ids.contains(id))
    }

    pub fn ids(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.objects.get(type_name)
    }

    pub fn has_live(&self, type_name: &str) -> bool {
        self.objects
            .get(type_name)
            .is_some_and(|ids| !ids.is_empty())
    }

    /// Uniformly pick one live id of `type_name`.
    pub fn choose<R: Rng + ?Sized>(&self, type_name: &str, rng: &mut R) -> Option<&str> {
        self.objects
            .get(type_name)?
            .iter()
            .choose(rng)
            .map(String::as_str)
    }

    pub fn knows_type(&self, type_name: &str) -> bool {
        self.objects.contains_key(type_name)
    }

    /// Total number of live ids across all types.
    pub fn len(&self) -> usize {
        self.objects.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&mut self, type_name: &str) -> Result<&mut BTreeSet<String>, BucketError> {
        self.objects
            .get_mut(type_name)
            .ok_or_else(|| BucketError::UnknownObjectType(type_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_insert_and_remove() {
        let mut bucket = ObjectBucket::with_types(["User", "Post"]);
        assert!(bucket.is_empty());

        assert!(bucket.insert("User", "u1").unwrap());
        assert!(!bucket.insert("User", "u1").unwrap());
        assert!(bucket.has_live("User"));
        assert!(!bucket.has_live("Post"));
        assert_eq!(bucket.len(), 1);

        assert!(bucket.remove("User", "u1").unwrap());
        assert!(!bucket.remove("User", "u1").unwrap());
        assert!(!bucket.has_live("User"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let mut bucket = ObjectBucket::with_types(["User"]);
        assert_eq!(
            bucket.insert("Ghost", "g1"),
            Err(BucketError::UnknownObjectType("Ghost".into()))
        );
        assert!(!bucket.knows_type("Ghost"));
    }

    #[test]
    fn test_choose_only_returns_live_ids() {
        let mut bucket = ObjectBucket::with_types(["User"]);
        let mut rng = SmallRng::seed_from_u64(7);
        assert_eq!(bucket.choose("User", &mut rng), None);

        bucket.insert("User", "u1").unwrap();
        bucket.insert("User", "u2").unwrap();
        for _ in 0..20 {
            let id = bucket.choose("User", &mut rng).unwrap();
            assert!(id == "u1" || id == "u2");
        }
    }
}
