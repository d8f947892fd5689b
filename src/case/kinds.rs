//! Built-in quantity kinds.

use std::path::{Path, PathBuf};

use super::CaseContext;
use crate::dict::Dictionary;
use crate::error::{ErrorKind, ErrorRecord, LineRange, LiveResult};
use crate::registry::ReadOption;

/// How one quantity computes its value.
pub trait Kind: Send {
    fn type_tag(&self) -> &'static str;

    /// Names of the quantities this one is computed from.
    fn inputs(&self) -> &[String] {
        &[]
    }

    fn read_option(&self) -> ReadOption {
        ReadOption::NoRead
    }

    fn backing_file(&self) -> Option<&Path> {
        None
    }

    /// The same file on every rank.
    fn is_global(&self) -> bool {
        false
    }

    /// Value from the input values, in [`inputs`](Self::inputs) order.
    fn evaluate(&self, inputs: &[f64]) -> LiveResult<f64>;
}

/// `type = "constant"`, `value = <number>`.
#[derive(Debug)]
pub struct Constant {
    value: f64,
}

impl Constant {
    pub fn from_dict(dict: &Dictionary) -> LiveResult<Self> {
        Ok(Self {
            value: dict.get_required("value")?,
        })
    }
}

impl Kind for Constant {
    fn type_tag(&self) -> &'static str {
        "constant"
    }

    fn evaluate(&self, _inputs: &[f64]) -> LiveResult<f64> {
        Ok(self.value)
    }
}

/// `type = "file"`, `path = "<file>"`: a number read from a file.
///
/// `read = "if-modified"` re-reads it when the file changes.
#[derive(Debug)]
pub struct FileValue {
    path: PathBuf,
    read: ReadOption,
    global: bool,
}

impl FileValue {
    pub fn from_dict(dict: &Dictionary, context: &CaseContext) -> LiveResult<Self> {
        let path: PathBuf = dict.get_required("path")?;
        Ok(Self {
            path: context.resolve(&path),
            read: dict.get_or("read", ReadOption::MustRead)?,
            global: dict.get_or("global", false)?,
        })
    }
}

impl Kind for FileValue {
    fn type_tag(&self) -> &'static str {
        "file"
    }

    fn read_option(&self) -> ReadOption {
        self.read
    }

    fn backing_file(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn is_global(&self) -> bool {
        self.global
    }

    fn evaluate(&self, _inputs: &[f64]) -> LiveResult<f64> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if self.read == ReadOption::ReadIfPresent
                && e.kind() == std::io::ErrorKind::NotFound =>
            {
                return Ok(0.0);
            }
            Err(e) => return Err(ErrorRecord::io(&self.path, &e).in_function("FileValue::evaluate")),
        };

        text.trim().parse::<f64>().map_err(|e| {
            ErrorRecord::fatal(
                ErrorKind::ConfigMalformed {
                    key: Some("value".to_string()),
                },
                format!("cannot read a number from {}: {e}", self.path.display()),
            )
            .in_function("FileValue::evaluate")
            .with_origin(self.path.display().to_string(), LineRange::at(1))
        })
    }
}

/// `type = "sum"`, `inputs = [<names>]`.
#[derive(Debug)]
pub struct Sum {
    inputs: Vec<String>,
}

impl Sum {
    pub fn from_dict(dict: &Dictionary) -> LiveResult<Self> {
        Ok(Self {
            inputs: dict.get_required("inputs")?,
        })
    }
}

impl Kind for Sum {
    fn type_tag(&self) -> &'static str {
        "sum"
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn evaluate(&self, inputs: &[f64]) -> LiveResult<f64> {
        Ok(inputs.iter().sum())
    }
}

/// `type = "scale"`, `input = "<name>"`, `factor = <number>`.
#[derive(Debug)]
pub struct Scale {
    input: [String; 1],
    factor: f64,
}

impl Scale {
    pub fn from_dict(dict: &Dictionary) -> LiveResult<Self> {
        Ok(Self {
            input: [dict.get_required("input")?],
            factor: dict.get_or("factor", 1.0)?,
        })
    }
}

impl Kind for Scale {
    fn type_tag(&self) -> &'static str {
        "scale"
    }

    fn inputs(&self) -> &[String] {
        &self.input
    }

    fn evaluate(&self, inputs: &[f64]) -> LiveResult<f64> {
        Ok(inputs.first().copied().unwrap_or_default() * self.factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_requires_value() {
        let err = Constant::from_dict(&Dictionary::new("c")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConfigMissingRequiredKey { .. }));

        let constant = Constant::from_dict(&Dictionary::new("c").with("value", 1.5)).unwrap();
        assert_eq!(constant.evaluate(&[]).unwrap(), 1.5);
    }

    #[test]
    fn test_scale_defaults_factor() {
        let scale = Scale::from_dict(&Dictionary::new("s").with("input", "a")).unwrap();
        assert_eq!(scale.inputs(), ["a"]);
        assert_eq!(scale.evaluate(&[4.0]).unwrap(), 4.0);
    }

    #[test]
    fn test_file_value_resolves_against_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("inlet.txt"), " 3.25\n").unwrap();
        let context = CaseContext::new(dir.path());

        let dict = Dictionary::new("f")
            .with("path", "inlet.txt")
            .with("read", "if-modified");
        let file = FileValue::from_dict(&dict, &context).unwrap();

        assert_eq!(file.read_option(), ReadOption::MustReadIfModified);
        assert_eq!(file.backing_file(), Some(dir.path().join("inlet.txt").as_path()));
        assert_eq!(file.evaluate(&[]).unwrap(), 3.25);
    }

    #[test]
    fn test_file_value_garbage_is_malformed() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.txt"), "lots").unwrap();
        let dict = Dictionary::new("f").with("path", "bad.txt");
        let file = FileValue::from_dict(&dict, &CaseContext::new(dir.path())).unwrap();

        let err = file.evaluate(&[]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConfigMalformed { .. }));
    }

    #[test]
    fn test_missing_optional_file_reads_zero() {
        let dir = tempfile::TempDir::new().unwrap();
        let dict = Dictionary::new("f")
            .with("path", "absent.txt")
            .with("read", "if-present");
        let file = FileValue::from_dict(&dict, &CaseContext::new(dir.path())).unwrap();
        assert_eq!(file.evaluate(&[]).unwrap(), 0.0);

        let strict = FileValue::from_dict(
            &Dictionary::new("f").with("path", "absent.txt"),
            &CaseContext::new(dir.path()),
        )
        .unwrap();
        assert!(matches!(strict.evaluate(&[]).unwrap_err().kind, ErrorKind::Io));
    }
}
