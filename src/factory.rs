//! Runtime selection of implementations by a string key.
//!
//! A [`FactoryBuilder`] collects one builder per type key at startup and is
//! then frozen into a read-only [`Factory`]. Builders receive the
//! configuration block of the instance plus a shared context `C`, and return
//! a ready instance. Registering the instance is left to the caller.
//!
//! ```ignore
//! let mut builder = FactoryBuilder::<Box<dyn Kind>>::new("quantity");
//! builder.register_builder("constant", |dict, _| Ok(Box::new(Constant::new(dict)?)))?;
//! let factory = builder.finish();
//! let kind = factory.build_from(&dict, "type", &())?;
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::dict::Dictionary;
use crate::error::{ErrorKind, ErrorRecord, LineRange, LiveResult};

/// Constructor stored under one type key.
pub type Builder<I, C> = Box<dyn Fn(&Dictionary, &C) -> LiveResult<I> + Send + Sync>;

/// Startup-time registration of builders.
pub struct FactoryBuilder<I, C = ()> {
    table: String,
    builders: BTreeMap<String, Builder<I, C>>,
}

impl<I, C> FactoryBuilder<I, C> {
    /// Empty table named `table` (used in diagnostics).
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            builders: BTreeMap::new(),
        }
    }

    /// Install the builder for `key`. A key claimed twice is fatal.
    #[track_caller]
    pub fn register_builder<F>(&mut self, key: impl Into<String>, builder: F) -> LiveResult<()>
    where
        F: Fn(&Dictionary, &C) -> LiveResult<I> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.builders.contains_key(&key) {
            return Err(ErrorRecord::fatal(
                ErrorKind::DuplicateBuilder {
                    table: self.table.clone(),
                    key: key.clone(),
                },
                format!("Duplicate entry {key} in {} constructor table", self.table),
            )
            .in_function("FactoryBuilder::register_builder"));
        }

        crate::debug_event!("factory", "builder added", "{}::{key}", self.table);
        self.builders.insert(key, Box::new(builder));
        Ok(())
    }

    /// Freeze the table.
    pub fn finish(self) -> Factory<I, C> {
        Factory {
            table: self.table,
            builders: self.builders,
        }
    }
}

/// Read-only table from type key to builder.
pub struct Factory<I, C = ()> {
    table: String,
    builders: BTreeMap<String, Builder<I, C>>,
}

impl<I, C> fmt::Debug for Factory<I, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("table", &self.table)
            .field("keys", &self.keys())
            .finish()
    }
}

impl<I, C> Factory<I, C> {
    pub fn builder(table: impl Into<String>) -> FactoryBuilder<I, C> {
        FactoryBuilder::new(table)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn contains(&self, key: &str) -> bool {
        self.builders.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Build the `key` implementation from `dict`.
    ///
    /// An unknown key is fatal; the message lists every valid key.
    #[track_caller]
    pub fn build(&self, key: &str, dict: &Dictionary, context: &C) -> LiveResult<I> {
        self.build_at(key, dict, dict.lines(), context)
    }

    /// Build the implementation named by the `type_key` entry of `dict`.
    #[track_caller]
    pub fn build_from(&self, dict: &Dictionary, type_key: &str, context: &C) -> LiveResult<I> {
        let key: String = dict.get_required(type_key)?;
        self.build_at(&key, dict, dict.line_range(type_key), context)
    }

    #[track_caller]
    fn build_at(&self, key: &str, dict: &Dictionary, lines: LineRange, context: &C) -> LiveResult<I> {
        match self.builders.get(key) {
            Some(builder) => builder(dict, context),
            None => Err(self.unknown_key(key).with_origin(dict.source(), lines)),
        }
    }

    #[track_caller]
    fn unknown_key(&self, key: &str) -> ErrorRecord {
        let valid: Vec<String> = self.builders.keys().cloned().collect();
        let listing = valid
            .iter()
            .map(|k| format!("    {k}\n"))
            .collect::<String>();

        ErrorRecord::fatal(
            ErrorKind::UnknownTypeKey {
                table: self.table.clone(),
                key: key.to_string(),
                valid: valid.clone(),
            },
            format!(
                "Unknown {table} type {key}\n\nValid {table} types :\n\n{count}\n(\n{listing})",
                table = self.table,
                count = valid.len(),
            ),
        )
        .in_function("Factory::build")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tagged {
        tag: String,
        size: i64,
    }

    fn factory() -> Factory<Tagged, i64> {
        let mut builder = Factory::<Tagged, i64>::builder("shape");
        builder
            .register_builder("b", |dict: &Dictionary, offset: &i64| {
                Ok(Tagged {
                    tag: "b".into(),
                    size: dict.get_or("size", 0i64)? + offset,
                })
            })
            .unwrap();
        builder
            .register_builder("a", |dict: &Dictionary, offset: &i64| {
                Ok(Tagged {
                    tag: "a".into(),
                    size: dict.get_required::<i64>("size")? + offset,
                })
            })
            .unwrap();
        builder.finish()
    }

    #[test]
    fn test_build_known_key() {
        let dict = Dictionary::new("cfg").with("size", 3i64);
        let built = factory().build("a", &dict, &10).unwrap();
        assert_eq!(
            built,
            Tagged {
                tag: "a".into(),
                size: 13
            }
        );
    }

    #[test]
    fn test_unknown_key_lists_sorted_valid_keys() {
        let dict = Dictionary::new("cfg");
        let err = factory().build("c", &dict, &0).unwrap_err();

        match &err.kind {
            ErrorKind::UnknownTypeKey { table, key, valid } => {
                assert_eq!(table, "shape");
                assert_eq!(key, "c");
                assert_eq!(valid, &["a", "b"]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(err.is_fatal());
        assert!(err.message.contains("2\n(\n    a\n    b\n)"));
    }

    #[test]
    fn test_duplicate_builder_is_fatal() {
        let mut builder = FactoryBuilder::<Tagged, i64>::new("shape");
        builder
            .register_builder("a", |_: &Dictionary, _: &i64| unreachable!())
            .unwrap();
        let err = builder
            .register_builder("a", |_: &Dictionary, _: &i64| unreachable!())
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateBuilder { .. }));
    }

    #[test]
    fn test_build_from_reads_type_key_and_reports_its_line() {
        let text = "name = \"x\"\ntype = \"triangle\"\n";
        let dict = Dictionary::from_toml("case.toml", text).unwrap();

        let err = factory().build_from(&dict, "type", &0).unwrap_err();
        let origin = err.origin.expect("origin");
        assert_eq!(origin.file, "case.toml");
        assert_eq!(origin.lines.start, Some(2));
    }

    #[test]
    fn test_builder_errors_pass_through() {
        let dict = Dictionary::new("cfg");
        let err = factory().build("a", &dict, &0).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConfigMissingRequiredKey { .. }));
    }

    #[test]
    fn test_keys_are_sorted() {
        assert_eq!(factory().keys(), ["a", "b"]);
        assert_eq!(factory().len(), 2);
        assert!(factory().contains("b"));
    }
}
