//! Argument and return marshaling
//!
//! Every argument is staged in a [`RawArg`] slot whose address is handed to
//! libffi. By-value parameters store the value itself; by-reference parameters
//! store the address of the caller's storage, so the native function reads and
//! writes the caller's memory directly.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

use crate::types::{NativeType, PassMode, Value};

/// Storage for one native argument.
#[repr(C)]
#[derive(Clone, Copy)]
pub union RawArg {
    i8: i8,
    i16: i16,
    i32: i32,
    i64: i64,
    u8: u8,
    u16: u16,
    u32: u32,
    u64: u64,
    f32: f32,
    f64: f64,
    ptr: *mut c_void,
}

impl RawArg {
    fn pointer(ptr: *mut c_void) -> Self {
        RawArg { ptr }
    }
}

/// Storage for a native return value.
///
/// libffi widens integral results narrower than a register to `ffi_arg`, an
/// unsigned register-sized integer, so narrow integers are read back through
/// `word`. `usize` has the width of `ffi_arg` on every target libffi supports,
/// including Win64 where `unsigned long` is only 32 bits.
#[repr(C)]
pub union ReturnSlot {
    word: usize,
    wide: u64,
    f32: f32,
    f64: f64,
    ptr: *mut c_void,
}

impl ReturnSlot {
    pub(crate) fn zeroed() -> Self {
        ReturnSlot { wide: 0 }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust type with a direct C scalar representation
pub trait NativeScalar: Copy + sealed::Sealed {
    /// The C type this maps to
    const TYPE: NativeType;

    #[doc(hidden)]
    fn to_raw(self) -> RawArg;

    /// Read a value of this type out of a filled return slot.
    ///
    /// # Safety
    ///
    /// The slot must hold a result produced by a call whose declared return
    /// type is `Self::TYPE`.
    #[doc(hidden)]
    unsafe fn from_slot(slot: &ReturnSlot) -> Self;
}

macro_rules! native_integer {
    ($($ty:ty => $variant:ident, $field:ident;)*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl NativeScalar for $ty {
                const TYPE: NativeType = NativeType::$variant;

                fn to_raw(self) -> RawArg {
                    RawArg { $field: self }
                }

                unsafe fn from_slot(slot: &ReturnSlot) -> Self {
                    if mem::size_of::<$ty>() <= mem::size_of::<usize>() {
                        slot.word as $ty
                    } else {
                        slot.wide as $ty
                    }
                }
            }
        )*
    };
}

native_integer! {
    i8 => I8, i8;
    i16 => I16, i16;
    i32 => I32, i32;
    i64 => I64, i64;
    u8 => U8, u8;
    u16 => U16, u16;
    u32 => U32, u32;
    u64 => U64, u64;
}

impl sealed::Sealed for bool {}

impl NativeScalar for bool {
    const TYPE: NativeType = NativeType::Bool;

    fn to_raw(self) -> RawArg {
        RawArg { u8: self as u8 }
    }

    unsafe fn from_slot(slot: &ReturnSlot) -> Self {
        slot.word as u8 != 0
    }
}

impl sealed::Sealed for f32 {}

impl NativeScalar for f32 {
    const TYPE: NativeType = NativeType::F32;

    fn to_raw(self) -> RawArg {
        RawArg { f32: self }
    }

    unsafe fn from_slot(slot: &ReturnSlot) -> Self {
        slot.f32
    }
}

impl sealed::Sealed for f64 {}

impl NativeScalar for f64 {
    const TYPE: NativeType = NativeType::F64;

    fn to_raw(self) -> RawArg {
        RawArg { f64: self }
    }

    unsafe fn from_slot(slot: &ReturnSlot) -> Self {
        slot.f64
    }
}

impl<T> sealed::Sealed for *const T {}

impl<T> NativeScalar for *const T {
    const TYPE: NativeType = NativeType::Ptr;

    fn to_raw(self) -> RawArg {
        RawArg::pointer(self as *mut c_void)
    }

    unsafe fn from_slot(slot: &ReturnSlot) -> Self {
        slot.ptr as *const T
    }
}

impl<T> sealed::Sealed for *mut T {}

impl<T> NativeScalar for *mut T {
    const TYPE: NativeType = NativeType::Ptr;

    fn to_raw(self) -> RawArg {
        RawArg::pointer(self as *mut c_void)
    }

    unsafe fn from_slot(slot: &ReturnSlot) -> Self {
        slot.ptr as *mut T
    }
}

/// A Rust parameter type and the passing mode its shape implies.
///
/// Plain scalars pass by value; `&mut T` and `&mut MaybeUninit<T>` pass the
/// address of the caller's storage.
pub trait NativeParam {
    const MODE: PassMode;
    const TYPE: NativeType;

    fn into_raw(self) -> RawArg;
}

macro_rules! by_value_param {
    ($($ty:ty),*) => {
        $(
            impl NativeParam for $ty {
                const MODE: PassMode = PassMode::ByValue;
                const TYPE: NativeType = <$ty as NativeScalar>::TYPE;

                fn into_raw(self) -> RawArg {
                    self.to_raw()
                }
            }
        )*
    };
}

by_value_param!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl<T> NativeParam for *const T {
    const MODE: PassMode = PassMode::ByValue;
    const TYPE: NativeType = NativeType::Ptr;

    fn into_raw(self) -> RawArg {
        self.to_raw()
    }
}

impl<T> NativeParam for *mut T {
    const MODE: PassMode = PassMode::ByValue;
    const TYPE: NativeType = NativeType::Ptr;

    fn into_raw(self) -> RawArg {
        self.to_raw()
    }
}

impl<'a, T: NativeScalar> NativeParam for &'a mut T {
    const MODE: PassMode = PassMode::ByRefInOut;
    const TYPE: NativeType = T::TYPE;

    fn into_raw(self) -> RawArg {
        RawArg::pointer(self as *mut T as *mut c_void)
    }
}

impl<'a, T: NativeScalar> NativeParam for &'a mut MaybeUninit<T> {
    const MODE: PassMode = PassMode::ByRefInOut;
    const TYPE: NativeType = T::TYPE;

    fn into_raw(self) -> RawArg {
        RawArg::pointer(self.as_mut_ptr() as *mut c_void)
    }
}

/// A Rust return type with a C representation
pub trait NativeReturn: Sized {
    const TYPE: NativeType;

    /// # Safety
    ///
    /// See [`NativeScalar::from_slot`].
    #[doc(hidden)]
    unsafe fn from_return(slot: &ReturnSlot) -> Self;
}

impl NativeReturn for () {
    const TYPE: NativeType = NativeType::Void;

    unsafe fn from_return(_slot: &ReturnSlot) -> Self {}
}

macro_rules! scalar_return {
    ($($ty:ty),*) => {
        $(
            impl NativeReturn for $ty {
                const TYPE: NativeType = <$ty as NativeScalar>::TYPE;

                unsafe fn from_return(slot: &ReturnSlot) -> Self {
                    <$ty as NativeScalar>::from_slot(slot)
                }
            }
        )*
    };
}

scalar_return!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl<T> NativeReturn for *const T {
    const TYPE: NativeType = NativeType::Ptr;

    unsafe fn from_return(slot: &ReturnSlot) -> Self {
        <*const T as NativeScalar>::from_slot(slot)
    }
}

impl<T> NativeReturn for *mut T {
    const TYPE: NativeType = NativeType::Ptr;

    unsafe fn from_return(slot: &ReturnSlot) -> Self {
        <*mut T as NativeScalar>::from_slot(slot)
    }
}

impl Value {
    pub(crate) fn to_raw(self) -> RawArg {
        match self {
            Value::Void => RawArg { u64: 0 },
            Value::Bool(v) => v.to_raw(),
            Value::I8(v) => v.to_raw(),
            Value::I16(v) => v.to_raw(),
            Value::I32(v) => v.to_raw(),
            Value::I64(v) => v.to_raw(),
            Value::U8(v) => v.to_raw(),
            Value::U16(v) => v.to_raw(),
            Value::U32(v) => v.to_raw(),
            Value::U64(v) => v.to_raw(),
            Value::F32(v) => v.to_raw(),
            Value::F64(v) => v.to_raw(),
            Value::Ptr(v) => RawArg::pointer(v as *mut c_void),
        }
    }

    /// # Safety
    ///
    /// The slot must hold the result of a call declared to return `ty`.
    pub(crate) unsafe fn from_slot(slot: &ReturnSlot, ty: NativeType) -> Self {
        match ty {
            NativeType::Void => Value::Void,
            NativeType::Bool => Value::Bool(bool::from_slot(slot)),
            NativeType::I8 => Value::I8(i8::from_slot(slot)),
            NativeType::I16 => Value::I16(i16::from_slot(slot)),
            NativeType::I32 => Value::I32(i32::from_slot(slot)),
            NativeType::I64 => Value::I64(i64::from_slot(slot)),
            NativeType::U8 => Value::U8(u8::from_slot(slot)),
            NativeType::U16 => Value::U16(u16::from_slot(slot)),
            NativeType::U32 => Value::U32(u32::from_slot(slot)),
            NativeType::U64 => Value::U64(u64::from_slot(slot)),
            NativeType::F32 => Value::F32(f32::from_slot(slot)),
            NativeType::F64 => Value::F64(f64::from_slot(slot)),
            NativeType::Ptr | NativeType::CStr => {
                Value::Ptr(slot.ptr as usize)
            }
        }
    }
}

/// A borrowed slot of caller storage passed by reference
#[derive(Debug)]
pub struct RefArg<'a> {
    ptr: NonNull<c_void>,
    ty: NativeType,
    _storage: PhantomData<&'a mut ()>,
}

impl<'a> RefArg<'a> {
    /// Address of the caller's storage
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    /// Declared type of the storage
    pub fn native_type(&self) -> NativeType {
        self.ty
    }
}

/// One argument on the dynamic call path
#[derive(Debug)]
pub enum Argument<'a> {
    /// Passed by value
    Value(Value),
    /// Passed as a pointer to caller-owned storage
    Ref(RefArg<'a>),
}

impl<'a> Argument<'a> {
    /// Pass a value.
    pub fn value(v: impl Into<Value>) -> Self {
        Argument::Value(v.into())
    }

    /// Pass typed storage by reference.
    pub fn by_ref<T: NativeScalar>(slot: &'a mut T) -> Self {
        Argument::Ref(RefArg {
            ptr: NonNull::from(slot).cast(),
            ty: T::TYPE,
            _storage: PhantomData,
        })
    }

    /// Pass storage that the native function is expected to initialize.
    pub fn by_uninit<T: NativeScalar>(slot: &'a mut MaybeUninit<T>) -> Self {
        Argument::Ref(RefArg {
            ptr: NonNull::from(slot).cast(),
            ty: T::TYPE,
            _storage: PhantomData,
        })
    }

    /// Pass the payload of a [`Value`] by reference.
    ///
    /// The native function writes straight into the value's payload, so after
    /// the call `slot` holds what was written. Returns `None` for `Void`, which
    /// has no storage. A `Bool` payload is passed like `&mut bool`, so the
    /// callee must store only 0 or 1.
    pub fn by_value_ref(slot: &'a mut Value) -> Option<Self> {
        let ty = slot.native_type();
        let ptr: *mut c_void = match slot {
            Value::Void => return None,
            Value::Bool(v) => v as *mut bool as *mut c_void,
            Value::I8(v) => v as *mut i8 as *mut c_void,
            Value::I16(v) => v as *mut i16 as *mut c_void,
            Value::I32(v) => v as *mut i32 as *mut c_void,
            Value::I64(v) => v as *mut i64 as *mut c_void,
            Value::U8(v) => v as *mut u8 as *mut c_void,
            Value::U16(v) => v as *mut u16 as *mut c_void,
            Value::U32(v) => v as *mut u32 as *mut c_void,
            Value::U64(v) => v as *mut u64 as *mut c_void,
            Value::F32(v) => v as *mut f32 as *mut c_void,
            Value::F64(v) => v as *mut f64 as *mut c_void,
            Value::Ptr(v) => v as *mut usize as *mut c_void,
        };
        NonNull::new(ptr).map(|ptr| {
            Argument::Ref(RefArg {
                ptr,
                ty,
                _storage: PhantomData,
            })
        })
    }

    /// Passing mode this argument was built for
    pub fn mode(&self) -> PassMode {
        match self {
            Argument::Value(_) => PassMode::ByValue,
            Argument::Ref(_) => PassMode::ByRefInOut,
        }
    }

    /// Declared type of the value or referenced storage
    pub fn native_type(&self) -> NativeType {
        match self {
            Argument::Value(v) => v.native_type(),
            Argument::Ref(r) => r.ty,
        }
    }

    pub(crate) fn to_raw(&self) -> RawArg {
        match self {
            Argument::Value(v) => v.to_raw(),
            Argument::Ref(r) => RawArg::pointer(r.as_ptr()),
        }
    }
}

impl From<Value> for Argument<'_> {
    fn from(v: Value) -> Self {
        Argument::Value(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_modes_follow_shape() {
        assert_eq!(<i32 as NativeParam>::MODE, PassMode::ByValue);
        assert_eq!(<&mut i32 as NativeParam>::MODE, PassMode::ByRefInOut);
        assert_eq!(<&mut i32 as NativeParam>::TYPE, NativeType::I32);
        assert_eq!(<&mut MaybeUninit<f64> as NativeParam>::MODE, PassMode::ByRefInOut);
        assert_eq!(<&mut MaybeUninit<f64> as NativeParam>::TYPE, NativeType::F64);
        assert_eq!(<*const u8 as NativeParam>::TYPE, NativeType::Ptr);
        assert_eq!(<() as NativeReturn>::TYPE, NativeType::Void);
    }

    #[test]
    fn test_ref_arg_points_at_caller_storage() {
        let mut storage = 7i32;
        let expected = &mut storage as *mut i32 as *mut c_void;
        let arg = Argument::by_ref(&mut storage);
        assert_eq!(arg.mode(), PassMode::ByRefInOut);
        match arg {
            Argument::Ref(r) => assert_eq!(r.as_ptr(), expected),
            Argument::Value(_) => panic!("expected a reference argument"),
        }
    }

    #[test]
    fn test_value_ref_targets_payload() {
        let mut slot = Value::I64(5);
        let arg = Argument::by_value_ref(&mut slot).unwrap();
        assert_eq!(arg.native_type(), NativeType::I64);
        let ptr = match &arg {
            Argument::Ref(r) => r.as_ptr() as *mut i64,
            Argument::Value(_) => panic!("expected a reference argument"),
        };
        unsafe { *ptr = 11 };
        drop(arg);
        assert_eq!(slot, Value::I64(11));

        let mut void = Value::Void;
        assert!(Argument::by_value_ref(&mut void).is_none());
    }

    #[test]
    fn test_return_slot_narrows_integers() {
        let slot = ReturnSlot { word: 0x1_0000_00ff_u64 as usize };
        unsafe {
            assert_eq!(u8::from_slot(&slot), 0xff);
            assert_eq!(i8::from_slot(&slot), -1);
            assert!(bool::from_slot(&slot));
        }
        let slot = ReturnSlot { f64: 2.5 };
        unsafe {
            assert_eq!(Value::from_slot(&slot, NativeType::F64), Value::F64(2.5));
        }
    }

    #[test]
    fn test_return_slot_full_word() {
        let slot = ReturnSlot { word: usize::MAX };
        unsafe {
            assert_eq!(u32::from_slot(&slot), u32::MAX);
            assert_eq!(i32::from_slot(&slot), -1);
            assert_eq!(u16::from_slot(&slot), u16::MAX);
        }
    }

    #[test]
    fn test_bool_value_ref_matches_typed_ref() {
        let mut slot = Value::Bool(false);
        let arg = Argument::by_value_ref(&mut slot).unwrap();
        assert_eq!(arg.mode(), PassMode::ByRefInOut);
        assert_eq!(arg.native_type(), NativeType::Bool);
        let ptr = match &arg {
            Argument::Ref(r) => r.as_ptr() as *mut bool,
            Argument::Value(_) => panic!("expected a reference argument"),
        };
        unsafe { *ptr = true };
        drop(arg);
        assert_eq!(slot, Value::Bool(true));

        let mut flag = false;
        assert_eq!(Argument::by_ref(&mut flag).native_type(), NativeType::Bool);
    }
}
