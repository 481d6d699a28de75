//! Calls through a resolved export address.
//!
//! The address is reinterpreted as a function pointer whose arity, argument
//! register class, return class and ABI match the declared signature. Every
//! integer-class argument occupies one 64-bit slot.

use super::marshal::Slots;
use super::types::{Abi, RawReturn, TypeClass};

macro_rules! slot {
    ($_index:tt, $t:ty) => {
        $t
    };
}

macro_rules! dispatch {
    ($abi:expr, $address:expr, $arg:ty, $ret:ty, $args:expr, $($index:tt)*) => {
        match $abi {
            Abi::C => {
                // SAFETY: caller guarantees the export has this signature.
                let f: unsafe extern "C" fn($(slot!($index, $arg)),*) -> $ret =
                    unsafe { std::mem::transmute($address) };
                unsafe { f($($args[$index]),*) }
            }
            Abi::System => {
                // SAFETY: caller guarantees the export has this signature.
                let f: unsafe extern "system" fn($(slot!($index, $arg)),*) -> $ret =
                    unsafe { std::mem::transmute($address) };
                unsafe { f($($args[$index]),*) }
            }
        }
    };
}

/// # Safety
///
/// `address` must point at a function taking `args.len()` integer-class
/// arguments and returning `R` under `abi`.
unsafe fn call_words<R>(abi: Abi, address: usize, args: &[u64]) -> Option<R> {
    Some(match args.len() {
        0 => dispatch!(abi, address, u64, R, args,),
        1 => dispatch!(abi, address, u64, R, args, 0),
        2 => dispatch!(abi, address, u64, R, args, 0 1),
        3 => dispatch!(abi, address, u64, R, args, 0 1 2),
        4 => dispatch!(abi, address, u64, R, args, 0 1 2 3),
        5 => dispatch!(abi, address, u64, R, args, 0 1 2 3 4),
        6 => dispatch!(abi, address, u64, R, args, 0 1 2 3 4 5),
        7 => dispatch!(abi, address, u64, R, args, 0 1 2 3 4 5 6),
        8 => dispatch!(abi, address, u64, R, args, 0 1 2 3 4 5 6 7),
        _ => return None,
    })
}

/// # Safety
///
/// `address` must point at a function taking `args.len()` `f64` arguments
/// and returning `R` under `abi`.
unsafe fn call_floats<R>(abi: Abi, address: usize, args: &[f64]) -> Option<R> {
    Some(match args.len() {
        1 => dispatch!(abi, address, f64, R, args, 0),
        2 => dispatch!(abi, address, f64, R, args, 0 1),
        3 => dispatch!(abi, address, f64, R, args, 0 1 2),
        4 => dispatch!(abi, address, f64, R, args, 0 1 2 3),
        _ => return None,
    })
}

/// Calls the export at `address`. `ret` is the declared return class;
/// `None` (void) reads the integer return register and discards it.
///
/// Returns `None` when the arity is outside the supported range.
///
/// # Safety
///
/// `address` must be a live function whose signature matches `slots` and
/// `ret` under `abi`, and any pointers in `slots` must be valid for the call.
pub(crate) unsafe fn call(
    abi: Abi,
    address: usize,
    slots: &Slots,
    ret: Option<TypeClass>,
) -> Option<RawReturn> {
    // SAFETY: forwarded from the caller.
    unsafe {
        match (slots, ret) {
            (Slots::Words(w), None | Some(TypeClass::Integer)) => {
                call_words::<u64>(abi, address, w).map(RawReturn::Word)
            }
            (Slots::Words(w), Some(TypeClass::Float32)) => {
                call_words::<f32>(abi, address, w).map(RawReturn::F32)
            }
            (Slots::Words(w), Some(TypeClass::Float64)) => {
                call_words::<f64>(abi, address, w).map(RawReturn::F64)
            }
            (Slots::Floats(f), None | Some(TypeClass::Integer)) => {
                call_floats::<u64>(abi, address, f).map(RawReturn::Word)
            }
            (Slots::Floats(f), Some(TypeClass::Float32)) => {
                call_floats::<f32>(abi, address, f).map(RawReturn::F32)
            }
            (Slots::Floats(f), Some(TypeClass::Float64)) => {
                call_floats::<f64>(abi, address, f).map(RawReturn::F64)
            }
        }
    }
}
