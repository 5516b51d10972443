//! Interface declaration macro

/// Declare a trait whose methods forward to native symbols.
///
/// Each method takes `&self` followed by parameters whose Rust types fix the
/// passing mode: scalars and raw pointers pass by value, `&mut T` and
/// `&mut MaybeUninit<T>` pass the address of the caller's storage. The
/// `#[symbol = "..."]` attribute binds a method to its export; a method
/// without one fails to build with `MissingBinding`. Doc comments and other
/// attributes may appear before or after `#[symbol]` and are kept on the
/// trait method. An interface may have no methods at all.
///
/// The macro emits the trait itself, a [`NativeInterface`](crate::NativeInterface)
/// impl for `dyn Trait`, and an impl of the trait for `Proxy<dyn Trait>`.
///
/// ```ignore
/// native_interface! {
///     pub trait Library {
///         #[symbol = "add"]
///         fn add(&self, a: i32, b: i32) -> i32;
///         #[symbol = "add_one"]
///         fn add_one(&self, a: &mut i32);
///     }
/// }
///
/// let lib = unsafe { native_proxy::build::<dyn Library>("libexample.so")? };
/// let mut a = 2;
/// lib.add_one(&mut a);
/// assert_eq!(lib.add(a, 4), 7);
/// ```
#[macro_export]
macro_rules! native_interface {
    (
        $(#[$attr:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$($mattr:tt)*])*
                fn $method:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$attr])*
        $vis trait $name {
            $(
                $crate::__native_trait_method! {
                    [$(#[$($mattr)*])*] []
                    fn $method(&self $(, $arg: $ty)*) $(-> $ret)?;
                }
            )*
        }

        const _: () = {
            #[allow(dead_code, non_camel_case_types)]
            enum __Slot {
                $($method,)*
            }

            impl $crate::NativeInterface for dyn $name {
                fn descriptor() -> $crate::InterfaceDescriptor {
                    #[allow(unused_mut)]
                    let mut descriptor = $crate::InterfaceDescriptor::new(stringify!($name));
                    $(
                        let mut method = $crate::MethodDescriptor::new(stringify!($method))
                            $(.param_of::<$ty>(stringify!($arg)))*
                            .returns_of::<$crate::__native_return!($($ret)?)>();
                        method.symbol = $crate::__native_symbol!($(#[$($mattr)*])*);
                        descriptor.push(method);
                    )*
                    descriptor
                }
            }

            impl $name for $crate::Proxy<dyn $name> {
                $(
                    fn $method(&self $(, $arg: $ty)*) $(-> $ret)? {
                        let mut args = [$($crate::NativeParam::into_raw($arg)),*];
                        // Safety: the proxy was built from this trait's descriptor,
                        // so slot order, arity and types line up.
                        unsafe { self.__thunk(__Slot::$method as usize).call(&mut args) }
                    }
                )*
            }
        };
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __native_return {
    () => { () };
    ($ret:ty) => { $ret };
}

/// Re-emit a trait method without its `#[symbol]` attribute
#[doc(hidden)]
#[macro_export]
macro_rules! __native_trait_method {
    ([] [$($kept:tt)*] $($sig:tt)*) => {
        $($kept)*
        $($sig)*
    };
    ([#[symbol = $symbol:expr] $($rest:tt)*] [$($kept:tt)*] $($sig:tt)*) => {
        $crate::__native_trait_method! { [$($rest)*] [$($kept)*] $($sig)* }
    };
    ([#[$($attr:tt)*] $($rest:tt)*] [$($kept:tt)*] $($sig:tt)*) => {
        $crate::__native_trait_method! { [$($rest)*] [$($kept)* #[$($attr)*]] $($sig)* }
    };
}

/// The first `#[symbol]` among a method's attributes
#[doc(hidden)]
#[macro_export]
macro_rules! __native_symbol {
    () => {
        ::std::option::Option::None
    };
    (#[symbol = $symbol:expr] $($rest:tt)*) => {
        ::std::option::Option::Some(::std::string::String::from($symbol))
    };
    (#[$($attr:tt)*] $($rest:tt)*) => {
        $crate::__native_symbol!($($rest)*)
    };
}
