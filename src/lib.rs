//! Native Proxy - interfaces implemented by native library symbols
//!
//! Declare an interface once, name the exported C function behind each method,
//! and get back an object that implements the interface by calling straight
//! into a shared library. No per-function glue code is written by hand.
//!
//! # Features
//!
//! - **Typed interfaces**: `native_interface!` declares a trait and makes
//!   `Proxy<dyn Trait>` implement it
//! - **By-reference parameters**: `&mut T` arguments pass the caller's storage,
//!   so writes by the native function are visible after the call
//! - **Prepared calls**: each method's C call interface is built once, at proxy
//!   construction, and reused for every invocation
//! - **Runtime interfaces**: interface descriptors built in code or loaded from
//!   TOML schema files, invoked through a checked dynamic path
//! - **Shared loads**: building several proxies against one path loads the
//!   library once
//!
//! # Example
//!
//! ```ignore
//! use native_proxy::native_interface;
//!
//! native_interface! {
//!     pub trait Library {
//!         #[symbol = "add"]
//!         fn add(&self, a: i32, b: i32) -> i32;
//!         #[symbol = "add_one"]
//!         fn add_one(&self, a: &mut i32);
//!     }
//! }
//!
//! // Safety: the declarations above match the library's C signatures
//! let lib = unsafe { native_proxy::build::<dyn Library>("./libexample.so")? };
//! assert_eq!(lib.add(2, 3), 5);
//!
//! let mut a = 2;
//! lib.add_one(&mut a);
//! assert_eq!(a, 3);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ Interface           │  native_interface! trait, code, or TOML schema
//! └──────────┬──────────┘
//!            │ read + validate bindings
//!            ▼
//! ┌─────────────────────┐
//! │ InterfaceDescriptor │  methods, symbols, params, passing modes
//! └──────────┬──────────┘
//!            │
//!     ┌──────┴───────┐
//!     ▼              ▼
//! ┌────────┐   ┌──────────┐
//! │ Loader │   │ libffi   │  symbol lookup / prepared CIF per method
//! └────┬───┘   └────┬─────┘
//!      └─────┬──────┘
//!            ▼
//! ┌─────────────────────┐
//! │ Proxy               │  one thunk per method, native call on invoke
//! └─────────────────────┘
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

#[macro_use]
mod macros;

pub mod config;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod marshal;
pub mod proxy;
pub mod schema;
pub mod thunk;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigError, LoaderConfig, ProxyConfig, CONFIG_FILE_NAME};
pub use descriptor::{
    read, InterfaceDescriptor, MethodDescriptor, MethodKey, NativeInterface, ParameterDescriptor,
};
pub use error::{ErrorKind, ProxyError, ProxyResult};
pub use loader::{library_filename, DynamicLibrary, LibraryLoader, ResolvedSymbol};
pub use marshal::{Argument, NativeParam, NativeReturn, NativeScalar, RawArg, RefArg};
pub use proxy::{build, build_dynamic, shared, Proxy, ProxyFactory, ProxyInstance};
pub use schema::SchemaError;
pub use thunk::Thunk;
pub use types::{NativeType, PassMode, Value};

#[cfg(test)]
mod tests;
