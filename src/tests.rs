//! Crate-level tests that need no native library

use std::mem::MaybeUninit;
use std::path::PathBuf;

use crate::*;

native_interface! {
    /// Test interface
    pub trait Calculator {
        /// Adds two numbers
        #[symbol = "add"]
        fn add(&self, a: i32, b: i32) -> i32;
        #[symbol = "add_one"]
        fn add_one(&self, a: &mut i32);
        #[symbol = "fill"]
        fn fill(&self, out: &mut MaybeUninit<f64>, seed: u8);
    }
}

native_interface! {
    trait Annotated {
        #[symbol = "add"]
        /// Doc comment after the binding
        fn add(&self, a: i32, b: i32) -> i32;
        /// Doc comment before the binding
        #[symbol = "add_one"]
        fn add_one(&self, a: &mut i32);
        #[must_use]
        fn unbound(&self) -> u8;
    }
}

native_interface! {
    trait Unbound {
        #[symbol = "add"]
        fn add(&self, a: i32, b: i32) -> i32;
        fn reset(&self);
    }
}

#[test]
fn test_native_type_parsing() {
    assert_eq!(NativeType::parse("int"), Some(NativeType::I32));
    assert_eq!(NativeType::parse("unsigned char"), Some(NativeType::U8));
    assert_eq!(NativeType::parse("double"), Some(NativeType::F64));
    assert_eq!(NativeType::parse("void*"), Some(NativeType::Ptr));
    assert_eq!(NativeType::parse("const char*"), Some(NativeType::CStr));
    assert_eq!(NativeType::parse("int128"), None);
}

#[test]
fn test_native_type_accepts() {
    assert!(NativeType::Ptr.accepts(NativeType::CStr));
    assert!(NativeType::CStr.accepts(NativeType::Ptr));
    assert!(NativeType::U64.accepts(NativeType::U64));
    assert!(!NativeType::I32.accepts(NativeType::I64));
    assert!(!NativeType::F32.accepts(NativeType::F64));
}

#[test]
fn test_buffer_is_not_a_type() {
    assert_eq!(NativeType::parse("buffer"), None);
    assert_eq!(NativeType::parse("bytes"), None);

    let err = InterfaceDescriptor::from_schema_str(
        r#"
name = "Blob"
[[methods]]
symbol = "fill"
signature = "void fill(buffer data)"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownType { ref ty, .. } if ty == "buffer"));
}

#[test]
fn test_value_parse() {
    assert_eq!(Value::parse("-3", NativeType::I32), Some(Value::I32(-3)));
    assert_eq!(Value::parse("0x10", NativeType::Ptr), Some(Value::Ptr(16)));
    assert_eq!(Value::parse("true", NativeType::Bool), Some(Value::Bool(true)));
    assert_eq!(Value::parse("300", NativeType::U8), None);
    assert_eq!(Value::parse("1", NativeType::Void), None);
    assert_eq!(Value::I8(-1).to_string(), "-1");
}

#[test]
fn test_macro_descriptor() {
    let desc = read::<dyn Calculator>().unwrap();
    assert_eq!(desc.name, "Calculator");
    assert_eq!(desc.methods.len(), 3);

    let add = &desc.methods[0];
    assert_eq!(add.to_string(), "i32 add(i32 a, i32 b) -> @add");

    let add_one = &desc.methods[1];
    assert_eq!(add_one.params[0].mode, PassMode::ByRefInOut);
    assert_eq!(add_one.params[0].ty, NativeType::I32);
    assert_eq!(add_one.returns, NativeType::Void);

    let fill = &desc.methods[2];
    assert_eq!(fill.params[0].mode, PassMode::ByRefInOut);
    assert_eq!(fill.params[0].ty, NativeType::F64);
    assert_eq!(fill.params[1].mode, PassMode::ByValue);
}

#[test]
fn test_macro_attribute_order() {
    let desc = <dyn Annotated as NativeInterface>::descriptor();
    assert_eq!(desc.methods.len(), 3);
    assert_eq!(desc.methods[0].bound_symbol(), Some("add"));
    assert_eq!(desc.methods[1].bound_symbol(), Some("add_one"));
    assert_eq!(desc.methods[1].params[0].mode, PassMode::ByRefInOut);
    assert_eq!(desc.methods[2].symbol, None);
    assert_eq!(desc.methods[2].returns, NativeType::U8);
}

#[test]
fn test_macro_missing_binding() {
    let desc = <dyn Unbound as NativeInterface>::descriptor();
    assert_eq!(desc.methods[1].symbol, None);
    match read::<dyn Unbound>() {
        Err(ProxyError::MissingBinding { interface, method }) => {
            assert_eq!(interface, "Unbound");
            assert_eq!(method, "reset");
        }
        other => panic!("expected MissingBinding, got {:?}", other),
    }
}

#[test]
fn test_missing_binding_checked_before_load() {
    // The library path does not exist; the binding error must win
    let factory = ProxyFactory::new();
    let result = unsafe { factory.build::<dyn Unbound>("/no/such/libexample.so") };
    assert!(matches!(result, Err(ProxyError::MissingBinding { .. })));
    assert!(factory.loader().loaded_libraries().is_empty());
}

#[test]
fn test_build_missing_library() {
    let result = unsafe { build::<dyn Calculator>("/no/such/dir/libexample.so") };
    match result {
        Err(err) => {
            assert_eq!(err.kind(), ErrorKind::LibraryLoad);
            assert!(err.is_retryable());
            assert!(err.to_string().contains("/no/such/dir/libexample.so"));
        }
        Ok(_) => panic!("build against a missing library must fail"),
    }
}

#[test]
fn test_error_kinds() {
    let missing = ProxyError::MissingBinding {
        interface: "Library".into(),
        method: "add".into(),
    };
    assert_eq!(missing.kind(), ErrorKind::MissingBinding);
    assert!(!missing.is_retryable());
    assert_eq!(
        missing.to_string(),
        "method 'Library::add' has no bound symbol name"
    );

    let symbol = ProxyError::SymbolNotFound {
        symbol: "add".into(),
        library: PathBuf::from("libexample.so"),
        reason: "undefined symbol".into(),
    };
    assert_eq!(symbol.kind(), ErrorKind::SymbolNotFound);
    assert!(symbol.is_retryable());

    let unsupported = ProxyError::UnsupportedSignature {
        method: "print".into(),
        reason: "variadic".into(),
    };
    assert!(!unsupported.is_retryable());

    assert_eq!(
        ProxyError::UnknownMethod("nope".into()).kind(),
        ErrorKind::Dispatch
    );
    assert_eq!(
        ProxyError::from(SchemaError::DuplicateMethod("f".into())).kind(),
        ErrorKind::Input
    );
}
