//! Runtime binding of shared-library exports.
//!
//! A binding is a typed descriptor (library, export, calling convention,
//! string policy, parameter and return types) that is resolved against the
//! library the first time it is invoked.
//!
//! # Supported signatures
//!
//! - up to 8 integer-class parameters (`Bool`, integers, `Pointer`, `Str`),
//!   or up to 4 `F64` parameters
//! - integer-class, `Pointer`, `F32`, `F64` or void returns
//! - `Cdecl`, `StdCall` and `Winapi` conventions on 64-bit targets
//!
//! # Example
//!
//! ```no_run
//! use outcall::native::{CallingConvention, CharSet, NativeBinder, NativeType, NativeValue};
//!
//! # fn example() -> Result<(), outcall::native::NativeResolutionError> {
//! let binder = NativeBinder::new();
//! let libm = binder.library("libm.so.6");
//! let pow = binder.bind::<f64>(
//!     &libm,
//!     "pow",
//!     CallingConvention::Cdecl,
//!     CharSet::Auto,
//!     &[NativeType::F64, NativeType::F64],
//! )?;
//! // SAFETY: `pow` is `double pow(double, double)`.
//! let value = unsafe { pow.invoke(&[NativeValue::F64(2.0), NativeValue::F64(8.0)])? };
//! assert_eq!(value, 256.0);
//! # Ok(())
//! # }
//! ```

mod binder;
mod error;
mod invoke;
mod marshal;
mod types;

pub use binder::{FunctionBinding, NativeBinder, NativeLibrary, VoidBinding};
pub use error::NativeResolutionError;
pub use types::{CallingConvention, CharSet, NativeReturn, NativeType, NativeValue, RawReturn};
