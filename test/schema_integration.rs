//! Schema Integration Tests
//!
//! Interfaces described in TOML, built against the C fixture, and libraries
//! located through configured search paths.

use std::path::{Path, PathBuf};

use native_proxy::{
    Argument, ErrorKind, InterfaceDescriptor, PassMode, ProxyConfig, ProxyError, ProxyFactory,
    SchemaError, Value,
};

fn fixture() -> Option<&'static str> {
    let path = option_env!("NATIVE_PROXY_FIXTURE");
    if path.is_none() {
        eprintln!("skipping: native fixture library was not built");
    }
    path
}

const LIBRARY_SCHEMA: &str = r#"
name = "Library"

[[methods]]
symbol = "add"
signature = "int add(int a, int b)"

[[methods]]
symbol = "add_one"
signature = "void add_one(int* a)"

[[methods]]
name = "output_one"
symbol = "add_one"
signature = "void add_one(out int a)"

[[methods]]
symbol = "text_length"
signature = "size_t text_length(const char* s)"

[[methods]]
symbol = "sum_u16"
signature = "uint64_t sum_u16(uint16_t, uint16_t, uint16_t, uint16_t, uint16_t, uint16_t, uint16_t, uint16_t)"
"#;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("native_proxy_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_schema_descriptor() {
    let desc = InterfaceDescriptor::from_schema_str(LIBRARY_SCHEMA).unwrap();
    assert_eq!(desc.name, "Library");
    assert_eq!(desc.methods.len(), 5);
    assert!(desc.validate().is_ok());

    let output_one = &desc.methods[2];
    assert_eq!(output_one.name, "output_one");
    assert_eq!(output_one.bound_symbol(), Some("add_one"));
    assert_eq!(output_one.params[0].mode, PassMode::ByRefInOut);

    let sum = &desc.methods[4];
    assert_eq!(sum.params.len(), 8);
    assert_eq!(sum.params[7].name, "arg7");
}

#[test]
fn test_schema_errors() {
    let err = InterfaceDescriptor::from_schema_str(
        r#"
name = "Bad"
[[methods]]
symbol = "f"
signature = "quux f(int a)"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownType { ref ty, .. } if ty == "quux"));

    let err = InterfaceDescriptor::from_schema_str(
        r#"
name = "Dup"
[[methods]]
symbol = "add"
signature = "int add(int a, int b)"
[[methods]]
symbol = "add2"
signature = "int add(int x, int y)"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateMethod(_)));

    let err = InterfaceDescriptor::from_schema_str("methods = []").unwrap_err();
    assert!(matches!(err, SchemaError::Parse(_)));

    let err = InterfaceDescriptor::load_schema(Path::new("/no/such/schema.toml")).unwrap_err();
    assert!(matches!(err, SchemaError::Io(_)));
    assert_eq!(ProxyError::from(err).kind(), ErrorKind::Input);
}

#[test]
fn test_unbound_schema_method() {
    let desc = InterfaceDescriptor::from_schema_str(
        r#"
name = "Partial"
[[methods]]
signature = "void reset(void)"
"#,
    )
    .unwrap();
    let err = unsafe { native_proxy::build_dynamic(&desc, "/never/loaded.so") }.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingBinding);
}

#[test]
fn test_schema_proxy_calls() {
    let path = match fixture() {
        Some(path) => path,
        None => return,
    };

    let dir = temp_dir("schema");
    let schema_path = dir.join("library.toml");
    std::fs::write(&schema_path, LIBRARY_SCHEMA).unwrap();

    let desc = InterfaceDescriptor::load_schema(&schema_path).unwrap();
    let proxy = unsafe { native_proxy::build_dynamic(&desc, path) }.unwrap();

    let sum = proxy
        .invoke("add", &mut [Argument::value(2i32), Argument::value(2i32)])
        .unwrap();
    assert_eq!(sum, Value::I32(4));

    let mut a = 1i32;
    proxy.invoke("add_one", &mut [Argument::by_ref(&mut a)]).unwrap();
    proxy.invoke("add_one", &mut [Argument::by_ref(&mut a)]).unwrap();
    assert_eq!(a, 3);

    let mut out = 0i32;
    proxy
        .invoke("output_one", &mut [Argument::by_ref(&mut out)])
        .unwrap();
    assert_eq!(out, 1);

    let text = std::ffi::CString::new("native").unwrap();
    let len = proxy
        .invoke(
            "text_length",
            &mut [Argument::value(Value::Ptr(text.as_ptr() as usize))],
        )
        .unwrap();
    assert_eq!(len, Value::U64(6));

    let mut args: Vec<Argument> = (1..=8u16).map(Argument::value).collect();
    assert_eq!(proxy.invoke("sum_u16", &mut args).unwrap(), Value::U64(36));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_bare_name_through_config_search_path() {
    let path = match fixture() {
        Some(path) => path,
        None => return,
    };
    let fixture_dir = Path::new(path).parent().unwrap();

    let dir = temp_dir("config");
    let config_path = dir.join(native_proxy::CONFIG_FILE_NAME);
    std::fs::write(
        &config_path,
        format!(
            "[loader]\nsearch_paths = [{:?}]\ninclude_default_paths = false\n",
            fixture_dir.display().to_string()
        ),
    )
    .unwrap();

    let config = ProxyConfig::find_and_load(&dir).unwrap();
    assert_eq!(config.loader.search_paths, vec![fixture_dir.to_path_buf()]);

    let factory = ProxyFactory::from_config(&config);
    assert!(factory.loader().find_library("example").is_some());

    let desc = InterfaceDescriptor::from_schema_str(LIBRARY_SCHEMA).unwrap();
    let proxy = unsafe { factory.build_descriptor(&desc, "example") }.unwrap();
    let sum = proxy
        .invoke("add", &mut [Argument::value(40i32), Argument::value(2i32)])
        .unwrap();
    assert_eq!(sum, Value::I32(42));
    assert_eq!(factory.loader().loaded_libraries().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
