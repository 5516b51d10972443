//! Interface descriptors
//!
//! An [`InterfaceDescriptor`] is the single source of truth for how each
//! interface method maps onto a native symbol: its bound symbol name, its
//! ordered parameters with their passing modes, and its return type. Nothing
//! here is checked against the native library; the descriptor is a contract
//! the caller asserts.

use std::fmt;

use serde::Serialize;

use crate::error::{ProxyError, ProxyResult};
use crate::marshal::{NativeParam, NativeReturn};
use crate::types::{NativeType, PassMode};

/// A single parameter of an interface method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParameterDescriptor {
    /// Parameter name (diagnostics only)
    pub name: String,
    /// Declared C type; for by-reference parameters, the type of the pointee
    #[serde(rename = "type")]
    pub ty: NativeType,
    /// Passing mode
    pub mode: PassMode,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, ty: NativeType, mode: PassMode) -> Self {
        Self {
            name: name.into(),
            ty,
            mode,
        }
    }
}

impl fmt::Display for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            PassMode::ByValue => write!(f, "{} {}", self.ty, self.name),
            PassMode::ByRefInOut => write!(f, "ref {} {}", self.ty, self.name),
        }
    }
}

/// Full signature identity of a method, used to tell overloads apart
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub name: String,
    pub params: Vec<(NativeType, PassMode)>,
    pub returns: NativeType,
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.returns, self.name)?;
        for (i, (ty, mode)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match mode {
                PassMode::ByValue => write!(f, "{}", ty)?,
                PassMode::ByRefInOut => write!(f, "ref {}", ty)?,
            }
        }
        write!(f, ")")
    }
}

/// One method of an interface and the native symbol it forwards to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDescriptor {
    /// Method name on the interface
    pub name: String,
    /// Bound native symbol
    pub symbol: Option<String>,
    /// Parameters in declaration order
    pub params: Vec<ParameterDescriptor>,
    /// Return type
    pub returns: NativeType,
    /// Whether the native function is variadic
    pub variadic: bool,
}

impl MethodDescriptor {
    /// Create an unbound method with no parameters returning void
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: None,
            params: Vec::new(),
            returns: NativeType::Void,
            variadic: false,
        }
    }

    /// Bind the method to a native symbol
    pub fn bind(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Append a by-value parameter
    pub fn param(mut self, name: impl Into<String>, ty: NativeType) -> Self {
        self.params
            .push(ParameterDescriptor::new(name, ty, PassMode::ByValue));
        self
    }

    /// Append a by-reference in/out parameter
    pub fn by_ref(mut self, name: impl Into<String>, ty: NativeType) -> Self {
        self.params
            .push(ParameterDescriptor::new(name, ty, PassMode::ByRefInOut));
        self
    }

    /// Append a parameter whose type and mode come from a Rust parameter type
    pub fn param_of<P: NativeParam>(mut self, name: impl Into<String>) -> Self {
        self.params
            .push(ParameterDescriptor::new(name, P::TYPE, P::MODE));
        self
    }

    /// Set the return type
    pub fn returns(mut self, ty: NativeType) -> Self {
        self.returns = ty;
        self
    }

    /// Set the return type from a Rust return type
    pub fn returns_of<R: NativeReturn>(self) -> Self {
        self.returns(R::TYPE)
    }

    /// Mark the native function as variadic
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// The bound symbol, treating an empty name as unbound
    pub fn bound_symbol(&self) -> Option<&str> {
        self.symbol.as_deref().filter(|s| !s.is_empty())
    }

    /// Signature identity of this method
    pub fn key(&self) -> MethodKey {
        MethodKey {
            name: self.name.clone(),
            params: self.params.iter().map(|p| (p.ty, p.mode)).collect(),
            returns: self.returns,
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.returns, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")?;
        if let Some(symbol) = self.bound_symbol() {
            write!(f, " -> @{}", symbol)?;
        }
        Ok(())
    }
}

/// Description of an interface: its name and methods in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl InterfaceDescriptor {
    /// Create an interface with no methods
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method (builder style)
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a method in place
    pub fn push(&mut self, method: MethodDescriptor) {
        self.methods.push(method);
    }

    /// Check that every method carries a bound symbol.
    pub fn validate(&self) -> ProxyResult<()> {
        match self.methods.iter().find(|m| m.bound_symbol().is_none()) {
            Some(method) => Err(ProxyError::MissingBinding {
                interface: self.name.clone(),
                method: method.name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// All methods with the given name
    pub fn overloads(&self, name: &str) -> Vec<&MethodDescriptor> {
        self.methods.iter().filter(|m| m.name == name).collect()
    }
}

/// An interface type that can describe itself.
///
/// Implemented for `dyn Trait` by [`native_interface!`](crate::native_interface).
pub trait NativeInterface {
    fn descriptor() -> InterfaceDescriptor;
}

/// Read and validate the descriptor of an interface type.
pub fn read<I: NativeInterface + ?Sized>() -> ProxyResult<InterfaceDescriptor> {
    let descriptor = I::descriptor();
    descriptor.validate()?;
    Ok(descriptor)
}
