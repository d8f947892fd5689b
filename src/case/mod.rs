//! A small case of named quantities driven by the registry.
//!
//! ```toml
//! [objects.inlet]
//! type = "file"
//! path = "inlet.txt"
//! read = "if-modified"
//!
//! [objects.total]
//! type = "sum"
//! inputs = ["inlet", "offset"]
//!
//! [objects.offset]
//! type = "constant"
//! value = 1.5
//! ```
//!
//! Each block selects its implementation through the `type` key. Values are
//! computed on demand and cached; a cached value is reused while the
//! quantity is up to date with all its inputs.

mod kinds;

pub use kinds::{Constant, FileValue, Kind, Scale, Sum};

use std::any::Any;
use std::path::{Path, PathBuf};

use crate::dict::Dictionary;
use crate::error::{ErrorKind, ErrorRecord, LiveResult};
use crate::event::EventNumber;
use crate::factory::Factory;
use crate::registry::{LiveObject, Registry};

/// Key selecting the implementation of a quantity.
pub const TYPE_KEY: &str = "type";

/// Table of quantity kinds.
pub type KindFactory = Factory<Box<dyn Kind>, CaseContext>;

/// Shared context handed to every kind builder.
#[derive(Debug, Clone)]
pub struct CaseContext {
    root: PathBuf,
}

impl CaseContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the case directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Table with every built-in kind.
pub fn kinds() -> LiveResult<KindFactory> {
    let mut builder = KindFactory::builder("quantity");
    builder.register_builder("constant", |dict: &Dictionary, _: &CaseContext| {
        Ok(Box::new(Constant::from_dict(dict)?) as Box<dyn Kind>)
    })?;
    builder.register_builder("file", |dict: &Dictionary, context: &CaseContext| {
        Ok(Box::new(FileValue::from_dict(dict, context)?) as Box<dyn Kind>)
    })?;
    builder.register_builder("sum", |dict: &Dictionary, _: &CaseContext| {
        Ok(Box::new(Sum::from_dict(dict)?) as Box<dyn Kind>)
    })?;
    builder.register_builder("scale", |dict: &Dictionary, _: &CaseContext| {
        Ok(Box::new(Scale::from_dict(dict)?) as Box<dyn Kind>)
    })?;
    Ok(builder.finish())
}

/// Registry-owned quantity with its cached value.
pub struct Quantity {
    kind: Box<dyn Kind>,
    cached: Option<(f64, EventNumber)>,
    evaluations: u64,
}

impl Quantity {
    pub fn new(kind: Box<dyn Kind>) -> Self {
        Self {
            kind,
            cached: None,
            evaluations: 0,
        }
    }

    pub fn kind(&self) -> &dyn Kind {
        self.kind.as_ref()
    }

    /// Last computed value.
    pub fn value(&self) -> Option<f64> {
        self.cached.map(|(value, _)| value)
    }

    /// Times the value was computed.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

impl LiveObject for Quantity {
    fn type_tag(&self) -> &str {
        self.kind.type_tag()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The quantities of one case file, by name in file order.
#[derive(Debug)]
pub struct Case {
    name: String,
    context: CaseContext,
    names: Vec<String>,
}

impl Case {
    /// Read `path` and load its quantities into `registry`.
    pub fn read(path: &Path, registry: &mut Registry) -> LiveResult<Self> {
        let dict = Dictionary::read(path)?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::load(&dict, CaseContext::new(root), &kinds()?, registry)
    }

    /// Build every `[objects.<name>]` block with `factory` and store the
    /// results in `registry`. Backing files read `if-modified` are watched.
    pub fn load(
        dict: &Dictionary,
        context: CaseContext,
        factory: &KindFactory,
        registry: &mut Registry,
    ) -> LiveResult<Self> {
        let objects = dict.sub_dict("objects")?;
        let mut names = Vec::with_capacity(objects.len());

        for name in objects.keys() {
            let block = objects.sub_dict(name)?;
            let kind = factory.build_from(block, TYPE_KEY, &context)?;

            let mut entry = registry
                .new_entry(name, kind.type_tag())
                .with_read_option(kind.read_option())
                .global(kind.is_global());
            if let Some(path) = kind.backing_file() {
                entry = entry.with_file(path);
            }

            if registry.store(entry, Box::new(Quantity::new(kind)))? {
                registry.add_file_watch(name)?;
                names.push(name.to_string());
            }
        }

        for name in &names {
            let block = objects.sub_dict(name)?;
            let Some(quantity) = registry.object::<Quantity>(name) else {
                continue;
            };
            if let Some(missing) = quantity
                .kind()
                .inputs()
                .iter()
                .find(|input| !registry.contains(input))
            {
                return Err(ErrorRecord::fatal(
                    ErrorKind::ConfigMalformed {
                        key: Some("inputs".to_string()),
                    },
                    format!("Quantity {name} depends on unknown quantity {missing}"),
                )
                .in_function("Case::load")
                .with_origin(block.source(), block.line_range("inputs")));
            }
        }

        crate::log_event!("case", "loaded", "{} quantities", names.len());
        Ok(Self {
            name: dict.name().to_string(),
            context,
            names,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &CaseContext {
        &self.context
    }

    /// Quantity names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Value of `name`, recomputing it and any stale inputs.
    pub fn evaluate(&self, registry: &mut Registry, name: &str) -> LiveResult<f64> {
        let mut path = Vec::new();
        evaluate_in(registry, name, &mut path)
    }

    /// Every quantity, in file order.
    pub fn evaluate_all(&self, registry: &mut Registry) -> LiveResult<Vec<(String, f64)>> {
        self.names
            .iter()
            .map(|name| Ok((name.clone(), self.evaluate(registry, name)?)))
            .collect()
    }

    /// Pick up changed backing files. Returns the quantities whose files
    /// changed; their dependents are stale from now on.
    pub fn refresh(&self, registry: &mut Registry) -> LiveResult<Vec<String>> {
        registry.refresh_modified()
    }
}

#[track_caller]
fn missing_quantity(registry: &Registry, name: &str) -> ErrorRecord {
    ErrorRecord::fatal(
        ErrorKind::NotRegistered {
            name: name.to_string(),
        },
        format!("No quantity {name} in registry {}", registry.scope()),
    )
    .in_function("Case::evaluate")
}

/// Depth-first evaluation; `path` holds the quantities being evaluated.
fn evaluate_in(registry: &mut Registry, name: &str, path: &mut Vec<String>) -> LiveResult<f64> {
    if path.iter().any(|n| n == name) {
        path.push(name.to_string());
        return Err(ErrorRecord::fatal(
            ErrorKind::ConfigMalformed {
                key: Some("inputs".to_string()),
            },
            format!("Dependency cycle: {}", path.join(" -> ")),
        )
        .in_function("Case::evaluate"));
    }

    let Some(quantity) = registry.object::<Quantity>(name) else {
        return Err(missing_quantity(registry, name));
    };
    let inputs = quantity.kind().inputs().to_vec();
    let cached = quantity.cached;

    path.push(name.to_string());
    let mut values = Vec::with_capacity(inputs.len());
    for input in &inputs {
        values.push(evaluate_in(registry, input, path)?);
    }
    path.pop();

    let producers: Vec<&str> = inputs.iter().map(String::as_str).collect();
    if let Some((value, stamp)) = cached {
        // A refreshed backing file moves the entry's own event number.
        if registry.event_number(name)? == stamp && registry.up_to_date(name, &producers)? {
            return Ok(value);
        }
    }

    let value = match registry.object::<Quantity>(name) {
        Some(quantity) => quantity.kind().evaluate(&values)?,
        None => return Err(missing_quantity(registry, name)),
    };
    let stamp = registry.set_up_to_date(name)?;
    if let Some(quantity) = registry.object_mut::<Quantity>(name) {
        quantity.cached = Some((value, stamp));
        quantity.evaluations += 1;
    }
    crate::debug_event!("case", "evaluated", "{name} = {value} at event {stamp}");
    Ok(value)
}
