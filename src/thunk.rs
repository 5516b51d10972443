//! Thunk synthesis
//!
//! A [`Thunk`] is the forwarding routine behind one interface method: a libffi
//! call interface prepared once from the method descriptor, plus the resolved
//! symbol address. Invoking it performs exactly one native call with the
//! platform C calling convention and hands back the raw result.

use std::ffi::c_void;
use std::fmt;

use libffi::middle::{Cif, Type};
use log::{debug, trace};

use crate::descriptor::{MethodDescriptor, ParameterDescriptor};
use crate::error::{ProxyError, ProxyResult};
use crate::loader::ResolvedSymbol;
use crate::marshal::{Argument, NativeReturn, RawArg, ReturnSlot};
use crate::types::{NativeType, PassMode, Value};

/// A prepared native call for one interface method
pub struct Thunk {
    method: MethodDescriptor,
    symbol: ResolvedSymbol,
    cif: Cif,
}

// Safety: the CIF is built once in `synthesize` and only read by `ffi_call`
// afterwards; the symbol keeps its library alive and is itself immutable.
unsafe impl Send for Thunk {}
unsafe impl Sync for Thunk {}

impl Thunk {
    /// Prepare the forwarding call for `method` against a resolved symbol.
    pub fn synthesize(method: &MethodDescriptor, symbol: ResolvedSymbol) -> ProxyResult<Self> {
        let cif = prepare_cif(method)?;
        debug!(
            "synthesized thunk {} -> {}@{:#x}",
            method,
            symbol.name(),
            symbol.address()
        );
        Ok(Self {
            method: method.clone(),
            symbol,
            cif,
        })
    }

    /// Descriptor this thunk was synthesized from
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Resolved target of the call
    pub fn symbol(&self) -> &ResolvedSymbol {
        &self.symbol
    }

    /// Typed call used by interfaces declared with `native_interface!`.
    ///
    /// # Safety
    ///
    /// `args` must hold one slot per declared parameter, in order, each built
    /// from a Rust type matching the parameter, and `R` must match the declared
    /// return type. Reference slots must point at live storage.
    ///
    /// Arity and return type are only checked in debug builds, where a
    /// mismatch panics before the native call. Release builds check neither.
    pub unsafe fn call<R: NativeReturn, const N: usize>(&self, args: &mut [RawArg; N]) -> R {
        debug_assert_eq!(N, self.method.params.len());
        debug_assert_eq!(R::TYPE, self.method.returns);

        let base = args.as_mut_ptr();
        let mut values: [*mut c_void; N] = std::array::from_fn(|i| base.add(i).cast());
        let slot = self.raw_call(values.as_mut_ptr());
        R::from_return(&slot)
    }

    /// Whether `args` fit this method's parameters.
    pub fn accepts(&self, args: &[Argument<'_>]) -> bool {
        self.check_arguments(args).is_ok()
    }

    /// Dynamic call with checked arguments.
    ///
    /// By-reference arguments are passed as the address of the caller's
    /// storage; whatever the native function writes there is visible to the
    /// caller once this returns.
    pub fn invoke(&self, args: &mut [Argument<'_>]) -> ProxyResult<Value> {
        self.check_arguments(args)?;
        trace!("invoking {} with {} argument(s)", self.method.name, args.len());

        let mut raw: Vec<RawArg> = args.iter().map(Argument::to_raw).collect();
        let mut values: Vec<*mut c_void> = raw
            .iter_mut()
            .map(|slot| (slot as *mut RawArg).cast())
            .collect();

        // Safety: arity and types were checked against the descriptor above and
        // the descriptor was vouched for when the proxy was built.
        let value = unsafe {
            let slot = self.raw_call(values.as_mut_ptr());
            Value::from_slot(&slot, self.method.returns)
        };
        Ok(value)
    }

    /// Perform the native call. `args` points at one value pointer per parameter.
    unsafe fn raw_call(&self, args: *mut *mut c_void) -> ReturnSlot {
        let mut slot = ReturnSlot::zeroed();
        let fun: unsafe extern "C" fn() = std::mem::transmute(self.symbol.address());
        libffi::raw::ffi_call(
            self.cif.as_raw_ptr(),
            Some(fun),
            (&mut slot as *mut ReturnSlot).cast(),
            args,
        );
        slot
    }

    fn check_arguments(&self, args: &[Argument<'_>]) -> ProxyResult<()> {
        let params = &self.method.params;
        if args.len() != params.len() {
            return Err(self.mismatch(format!(
                "expected {} argument(s), got {}",
                params.len(),
                args.len()
            )));
        }

        for (index, (param, arg)) in params.iter().zip(args).enumerate() {
            if param.mode != arg.mode() {
                return Err(self.mismatch(format!(
                    "argument {} ('{}') must be passed by {}, not by {}",
                    index,
                    param.name,
                    param.mode,
                    arg.mode()
                )));
            }
            let fits = match param.mode {
                PassMode::ByValue => param.ty.accepts(arg.native_type()),
                PassMode::ByRefInOut => param.ty == arg.native_type(),
            };
            if !fits {
                return Err(self.mismatch(format!(
                    "argument {} ('{}') expects {}, got {}",
                    index,
                    param.name,
                    param.ty,
                    arg.native_type()
                )));
            }
        }
        Ok(())
    }

    fn mismatch(&self, reason: String) -> ProxyError {
        ProxyError::ArgumentMismatch {
            method: self.method.name.clone(),
            reason,
        }
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("method", &self.method.to_string())
            .field("symbol", &self.symbol)
            .finish()
    }
}

/// Build the libffi call interface for a method, rejecting anything that has
/// no single-slot C representation.
pub(crate) fn prepare_cif(method: &MethodDescriptor) -> ProxyResult<Cif> {
    if method.variadic {
        return Err(unsupported(method, "variadic functions are not supported".into()));
    }

    let mut params = Vec::with_capacity(method.params.len());
    for param in &method.params {
        params.push(param_type(method, param)?);
    }
    Ok(Cif::new(params, scalar_type(method.returns)))
}

fn param_type(method: &MethodDescriptor, param: &ParameterDescriptor) -> ProxyResult<Type> {
    match (param.ty, param.mode) {
        (NativeType::Void, _) => Err(unsupported(
            method,
            format!("parameter '{}' is declared void", param.name),
        )),
        (_, PassMode::ByRefInOut) => Ok(Type::pointer()),
        (ty, PassMode::ByValue) => Ok(scalar_type(ty)),
    }
}

fn scalar_type(ty: NativeType) -> Type {
    match ty {
        NativeType::Void => Type::void(),
        NativeType::Bool | NativeType::U8 => Type::u8(),
        NativeType::I8 => Type::i8(),
        NativeType::I16 => Type::i16(),
        NativeType::I32 => Type::i32(),
        NativeType::I64 => Type::i64(),
        NativeType::U16 => Type::u16(),
        NativeType::U32 => Type::u32(),
        NativeType::U64 => Type::u64(),
        NativeType::F32 => Type::f32(),
        NativeType::F64 => Type::f64(),
        NativeType::Ptr | NativeType::CStr => Type::pointer(),
    }
}

fn unsupported(method: &MethodDescriptor, reason: String) -> ProxyError {
    ProxyError::UnsupportedSignature {
        method: method.name.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_supported_signatures() {
        let method = MethodDescriptor::new("add")
            .param("a", NativeType::I32)
            .param("b", NativeType::I32)
            .returns(NativeType::I32);
        assert!(prepare_cif(&method).is_ok());

        let method = MethodDescriptor::new("add_one").by_ref("a", NativeType::I32);
        assert!(prepare_cif(&method).is_ok());

        let method = MethodDescriptor::new("nothing");
        assert!(prepare_cif(&method).is_ok());
    }

    #[test]
    fn test_reject_unsupported_signatures() {
        let cases = [
            MethodDescriptor::new("a").param("x", NativeType::Void),
            MethodDescriptor::new("b").by_ref("x", NativeType::Void),
            MethodDescriptor::new("c").param("fmt", NativeType::CStr).variadic(),
        ];
        for method in &cases {
            match prepare_cif(method) {
                Err(ProxyError::UnsupportedSignature { method: name, .. }) => {
                    assert_eq!(name, method.name)
                }
                Err(other) => panic!("unexpected error for {}: {}", method.name, other),
                Ok(_) => panic!("{} should be rejected", method.name),
            }
        }
    }
}
