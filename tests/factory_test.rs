use livedir::{Dictionary, ErrorKind, Factory, LiveResult};

trait Shape: Send {
    fn type_name(&self) -> &'static str;
    fn area(&self) -> f64;
}

struct Square(f64);
struct Circle(f64);

impl Shape for Square {
    fn type_name(&self) -> &'static str {
        "a"
    }
    fn area(&self) -> f64 {
        self.0 * self.0
    }
}

impl Shape for Circle {
    fn type_name(&self) -> &'static str {
        "b"
    }
    fn area(&self) -> f64 {
        std::f64::consts::PI * self.0 * self.0
    }
}

fn shapes() -> LiveResult<Factory<Box<dyn Shape>>> {
    let mut builder = Factory::<Box<dyn Shape>>::builder("shape");
    builder.register_builder("a", |dict: &Dictionary, _: &()| {
        Ok(Box::new(Square(dict.get_required("side")?)) as Box<dyn Shape>)
    })?;
    builder.register_builder("b", |dict: &Dictionary, _: &()| {
        Ok(Box::new(Circle(dict.get_or("radius", 1.0)?)) as Box<dyn Shape>)
    })?;
    Ok(builder.finish())
}

#[test]
fn test_build_returns_instance_of_requested_type() {
    let factory = shapes().unwrap();
    let cfg = Dictionary::new("cfg").with("side", 2.0);

    let shape = factory.build("a", &cfg, &()).unwrap();
    assert_eq!(shape.type_name(), "a");
    assert_eq!(shape.area(), 4.0);
}

#[test]
fn test_unknown_key_enumerates_valid_keys() {
    let factory = shapes().unwrap();
    let err = factory
        .build("c", &Dictionary::new("cfg"), &())
        .err()
        .expect("unknown key must fail");

    assert!(err.is_fatal());
    assert_eq!(
        err.kind,
        ErrorKind::UnknownTypeKey {
            table: "shape".to_string(),
            key: "c".to_string(),
            valid: vec!["a".to_string(), "b".to_string()],
        }
    );
    assert!(err.report(false).contains("Unknown shape type c"));
}

#[test]
fn test_type_key_read_from_configuration() {
    let factory = shapes().unwrap();
    let cfg = Dictionary::from_toml("shape.toml", "type = \"b\"\nradius = 2\n").unwrap();

    let shape = factory.build_from(&cfg, "type", &()).unwrap();
    assert_eq!(shape.type_name(), "b");

    let typo = Dictionary::from_toml("shape.toml", "radius = 2\ntype = \"circel\"\n").unwrap();
    let err = factory.build_from(&typo, "type", &()).err().unwrap();
    let report = err.report(false);
    assert!(report.contains("shape.toml from line 2 to line 2."), "{report}");
}

#[test]
fn test_factory_does_not_register_instances() {
    let factory = shapes().unwrap();
    let cfg = Dictionary::new("cfg").with("side", 1.0);
    let first = factory.build("a", &cfg, &()).unwrap();
    let second = factory.build("a", &cfg, &()).unwrap();
    // Two independent instances; naming them is the caller's business.
    assert_eq!(first.area(), second.area());
}
