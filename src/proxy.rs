//! Proxy Factory
//!
//! Builds proxy instances: reads the interface descriptor, loads the library,
//! resolves and synthesizes one thunk per method, and hands back a single
//! object dispatching to those thunks. A build either yields a proxy with
//! every method bound or an error; nothing partial is ever returned.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};
use once_cell::sync::Lazy;

use crate::config::ProxyConfig;
use crate::descriptor::{self, InterfaceDescriptor, MethodDescriptor, MethodKey, NativeInterface};
use crate::error::{ProxyError, ProxyResult};
use crate::loader::{DynamicLibrary, LibraryLoader, ResolvedSymbol};
use crate::marshal::Argument;
use crate::thunk::Thunk;
use crate::types::Value;

static SHARED_FACTORY: Lazy<ProxyFactory> = Lazy::new(ProxyFactory::new);

/// Process-wide factory used by [`build`] and [`build_dynamic`].
pub fn shared() -> &'static ProxyFactory {
    &SHARED_FACTORY
}

/// Build a typed proxy for an interface declared with `native_interface!`.
///
/// # Safety
///
/// Every method of `I` must match the C signature of the symbol it binds:
/// same parameter count, order and types, and the same return type. The
/// native functions must be safe to call with any argument values of those
/// types. Nothing here can check this.
pub unsafe fn build<I>(library: impl AsRef<Path>) -> ProxyResult<Proxy<I>>
where
    I: NativeInterface + ?Sized,
{
    shared().build::<I>(library)
}

/// Build an untyped proxy from a runtime descriptor.
///
/// # Safety
///
/// Same contract as [`build`], for every method of `descriptor`.
pub unsafe fn build_dynamic(
    descriptor: &InterfaceDescriptor,
    library: impl AsRef<Path>,
) -> ProxyResult<ProxyInstance> {
    shared().build_descriptor(descriptor, library)
}

/// Builds proxies against libraries loaded through one [`LibraryLoader`]
#[derive(Debug, Default)]
pub struct ProxyFactory {
    loader: LibraryLoader,
}

impl ProxyFactory {
    /// Create a factory with the default loader
    pub fn new() -> Self {
        Self {
            loader: LibraryLoader::new(),
        }
    }

    /// Create a factory using a specific loader
    pub fn with_loader(loader: LibraryLoader) -> Self {
        Self { loader }
    }

    /// Create a factory from configuration
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::with_loader(LibraryLoader::from_config(&config.loader))
    }

    pub fn loader(&self) -> &LibraryLoader {
        &self.loader
    }

    /// Build a typed proxy for `I`.
    ///
    /// # Safety
    ///
    /// See [`build`].
    pub unsafe fn build<I>(&self, library: impl AsRef<Path>) -> ProxyResult<Proxy<I>>
    where
        I: NativeInterface + ?Sized,
    {
        let descriptor = descriptor::read::<I>()?;
        let instance = self.build_descriptor(&descriptor, library)?;
        Ok(Proxy {
            instance,
            _interface: PhantomData,
        })
    }

    /// Build an untyped proxy from a descriptor.
    ///
    /// # Safety
    ///
    /// See [`build`].
    pub unsafe fn build_descriptor(
        &self,
        descriptor: &InterfaceDescriptor,
        library: impl AsRef<Path>,
    ) -> ProxyResult<ProxyInstance> {
        // Bindings are checked before anything is loaded
        descriptor.validate()?;

        let library = self.loader.load(library)?;

        let mut thunks = Vec::with_capacity(descriptor.methods.len());
        for method in &descriptor.methods {
            thunks.push(bind_method(&descriptor.name, method, &library)?);
        }

        debug!(
            "built proxy for '{}' with {} method(s) from '{}'",
            descriptor.name,
            thunks.len(),
            library.path().display()
        );
        Ok(ProxyInstance::new(descriptor.name.clone(), library, thunks))
    }
}

fn bind_method(
    interface: &str,
    method: &MethodDescriptor,
    library: &Arc<DynamicLibrary>,
) -> ProxyResult<Thunk> {
    let symbol = method
        .bound_symbol()
        .ok_or_else(|| ProxyError::MissingBinding {
            interface: interface.to_string(),
            method: method.name.clone(),
        })?;
    let resolved = ResolvedSymbol::resolve(library, symbol)?;
    Thunk::synthesize(method, resolved)
}

/// A built proxy: one thunk per interface method
pub struct ProxyInstance {
    interface: String,
    library: Arc<DynamicLibrary>,
    thunks: Vec<Thunk>,
    by_key: HashMap<MethodKey, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl ProxyInstance {
    fn new(interface: String, library: Arc<DynamicLibrary>, thunks: Vec<Thunk>) -> Self {
        let mut by_key = HashMap::with_capacity(thunks.len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, thunk) in thunks.iter().enumerate() {
            // First declaration wins for identical signatures
            by_key.entry(thunk.method().key()).or_insert(index);
            by_name
                .entry(thunk.method().name.clone())
                .or_default()
                .push(index);
        }
        Self {
            interface,
            library,
            thunks,
            by_key,
            by_name,
        }
    }

    /// Name of the interface this proxy implements
    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    /// The library the proxy's symbols live in
    pub fn library(&self) -> &Arc<DynamicLibrary> {
        &self.library
    }

    pub fn len(&self) -> usize {
        self.thunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thunks.is_empty()
    }

    /// Methods in declaration order
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.thunks.iter().map(Thunk::method)
    }

    /// Thunk by declaration index
    pub fn thunk(&self, index: usize) -> Option<&Thunk> {
        self.thunks.get(index)
    }

    /// Thunk by full signature
    pub fn find(&self, key: &MethodKey) -> Option<&Thunk> {
        self.by_key.get(key).map(|&index| &self.thunks[index])
    }

    /// Call a method by name.
    ///
    /// Overloaded names are resolved by matching the arguments' passing modes
    /// and types against each candidate's parameters.
    pub fn invoke(&self, name: &str, args: &mut [Argument<'_>]) -> ProxyResult<Value> {
        let candidates = self
            .by_name
            .get(name)
            .ok_or_else(|| ProxyError::UnknownMethod(name.to_string()))?;

        let thunk = match candidates.as_slice() {
            [only] => &self.thunks[*only],
            _ => {
                let matching: Vec<&Thunk> = candidates
                    .iter()
                    .map(|&index| &self.thunks[index])
                    .filter(|thunk| thunk.accepts(args))
                    .collect();
                match matching.as_slice() {
                    [one] => *one,
                    [] => {
                        return Err(ProxyError::ArgumentMismatch {
                            method: name.to_string(),
                            reason: format!(
                                "no overload of {} accepts these arguments",
                                candidates.len()
                            ),
                        })
                    }
                    many => {
                        return Err(ProxyError::AmbiguousMethod {
                            name: name.to_string(),
                            candidates: many.len(),
                        })
                    }
                }
            }
        };

        trace!("dispatching {}::{}", self.interface, thunk.method());
        thunk.invoke(args)
    }

    /// Call the method with exactly this signature.
    pub fn invoke_exact(&self, key: &MethodKey, args: &mut [Argument<'_>]) -> ProxyResult<Value> {
        self.find(key)
            .ok_or_else(|| ProxyError::UnknownMethod(key.to_string()))?
            .invoke(args)
    }
}

impl fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("interface", &self.interface)
            .field("library", &self.library.path())
            .field("thunks", &self.thunks)
            .finish()
    }
}

/// A proxy implementing the Rust trait `I` (used as `Proxy<dyn Trait>`)
pub struct Proxy<I: ?Sized> {
    instance: ProxyInstance,
    _interface: PhantomData<fn() -> Box<I>>,
}

impl<I: ?Sized> Proxy<I> {
    /// The untyped instance behind this proxy
    pub fn instance(&self) -> &ProxyInstance {
        &self.instance
    }

    pub fn into_instance(self) -> ProxyInstance {
        self.instance
    }

    #[doc(hidden)]
    pub fn __thunk(&self, index: usize) -> &Thunk {
        // Generated impls index in declaration order, which is how thunks are stored
        &self.instance.thunks[index]
    }
}

impl<I: ?Sized> fmt::Debug for Proxy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proxy").field(&self.instance).finish()
    }
}
