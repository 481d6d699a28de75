//! Argument marshaling from [`NativeValue`]s to call slots.
//!
//! Integer-class arguments become 64-bit words (signed values sign-extended,
//! unsigned zero-extended). Strings are copied into NUL-terminated buffers
//! owned by [`MarshaledArgs`], which must outlive the call.

use std::ffi::CString;

use super::error::NativeResolutionError;
use super::types::{CharSet, NativeType, NativeValue, TypeClass};

/// Maximum integer-class parameters a binding can declare.
pub(crate) const MAX_WORD_ARGS: usize = 8;

/// Maximum `F64` parameters a binding can declare.
pub(crate) const MAX_FLOAT_ARGS: usize = 4;

#[derive(Debug)]
pub(crate) enum Slots {
    Words(Vec<u64>),
    Floats(Vec<f64>),
}

#[derive(Debug)]
enum StringBuffer {
    Narrow(CString),
    Wide(Vec<u16>),
}

/// Marshaled arguments plus the buffers their pointers refer to.
#[derive(Debug)]
pub(crate) struct MarshaledArgs {
    pub(crate) slots: Slots,
    // Only held so string pointers in `slots` stay valid.
    #[allow(dead_code)]
    buffers: Vec<StringBuffer>,
}

/// Checks a declared parameter list for a callable shape.
pub(crate) fn check_shape(
    export: &str,
    params: &[NativeType],
) -> Result<(), NativeResolutionError> {
    let floats = params
        .iter()
        .filter(|p| p.class() == TypeClass::Float64)
        .count();

    if params.iter().any(|p| p.class() == TypeClass::Float32) {
        return Err(NativeResolutionError::signature_mismatch(
            export,
            "f32 parameters are not supported",
        ));
    }
    if floats > 0 && floats != params.len() {
        return Err(NativeResolutionError::signature_mismatch(
            export,
            "mixed integer and floating-point parameters are not supported",
        ));
    }
    if floats > MAX_FLOAT_ARGS {
        return Err(NativeResolutionError::signature_mismatch(
            export,
            format!("at most {MAX_FLOAT_ARGS} f64 parameters are supported, got {floats}"),
        ));
    }
    if floats == 0 && params.len() > MAX_WORD_ARGS {
        return Err(NativeResolutionError::signature_mismatch(
            export,
            format!(
                "at most {MAX_WORD_ARGS} integer parameters are supported, got {}",
                params.len()
            ),
        ));
    }
    Ok(())
}

/// Validates `args` against `params` and converts them to call slots.
pub(crate) fn marshal(
    export: &str,
    params: &[NativeType],
    args: &[NativeValue],
    charset: CharSet,
) -> Result<MarshaledArgs, NativeResolutionError> {
    check_shape(export, params)?;
    if args.len() != params.len() {
        return Err(NativeResolutionError::signature_mismatch(
            export,
            format!("expected {} arguments, got {}", params.len(), args.len()),
        ));
    }
    for (index, (param, arg)) in params.iter().zip(args).enumerate() {
        if !arg.matches(*param) {
            return Err(NativeResolutionError::signature_mismatch(
                export,
                format!("argument {index}: expected {param}, got {arg:?}"),
            ));
        }
    }

    let all_floats = !params.is_empty() && params.iter().all(|p| *p == NativeType::F64);
    if all_floats {
        let floats = args
            .iter()
            .map(|arg| match arg {
                NativeValue::F64(v) => *v,
                _ => 0.0,
            })
            .collect();
        return Ok(MarshaledArgs {
            slots: Slots::Floats(floats),
            buffers: Vec::new(),
        });
    }

    let mut buffers = Vec::new();
    let mut words = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        words.push(to_word(export, index, arg, charset, &mut buffers)?);
    }
    Ok(MarshaledArgs {
        slots: Slots::Words(words),
        buffers,
    })
}

#[allow(clippy::cast_sign_loss)]
fn to_word(
    export: &str,
    index: usize,
    arg: &NativeValue,
    charset: CharSet,
    buffers: &mut Vec<StringBuffer>,
) -> Result<u64, NativeResolutionError> {
    Ok(match arg {
        NativeValue::Bool(v) => u64::from(*v),
        NativeValue::I8(v) => i64::from(*v) as u64,
        NativeValue::U8(v) => u64::from(*v),
        NativeValue::I16(v) => i64::from(*v) as u64,
        NativeValue::U16(v) => u64::from(*v),
        NativeValue::I32(v) => i64::from(*v) as u64,
        NativeValue::U32(v) => u64::from(*v),
        NativeValue::I64(v) => *v as u64,
        NativeValue::U64(v) => *v,
        NativeValue::ISize(v) => *v as i64 as u64,
        NativeValue::USize(v) | NativeValue::Pointer(v) => *v as u64,
        NativeValue::Null => 0,
        NativeValue::Str(text) => {
            let buffer = string_buffer(export, index, text, charset)?;
            let address = match &buffer {
                StringBuffer::Narrow(c) => c.as_ptr() as usize,
                StringBuffer::Wide(w) => w.as_ptr() as usize,
            };
            // Moving the buffer keeps its heap allocation in place.
            buffers.push(buffer);
            address as u64
        }
        NativeValue::F32(_) | NativeValue::F64(_) => {
            return Err(NativeResolutionError::signature_mismatch(
                export,
                format!("argument {index}: floating-point value in integer call"),
            ));
        }
    })
}

fn string_buffer(
    export: &str,
    index: usize,
    text: &str,
    charset: CharSet,
) -> Result<StringBuffer, NativeResolutionError> {
    let interior_nul = || NativeResolutionError::StringMarshal {
        export: export.to_string(),
        index,
    };
    if charset.is_wide() {
        let mut wide: Vec<u16> = text.encode_utf16().collect();
        if wide.contains(&0) {
            return Err(interior_nul());
        }
        wide.push(0);
        Ok(StringBuffer::Wide(wide))
    } else {
        CString::new(text)
            .map(StringBuffer::Narrow)
            .map_err(|_| interior_nul())
    }
}

impl MarshaledArgs {
    #[cfg(test)]
    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn words(args: &MarshaledArgs) -> &[u64] {
        match &args.slots {
            Slots::Words(w) => w,
            Slots::Floats(_) => panic!("expected integer slots"),
        }
    }

    #[test]
    fn test_signed_values_are_sign_extended() {
        let params = [
            NativeType::I8,
            NativeType::I32,
            NativeType::U32,
            NativeType::Bool,
        ];
        let args = [
            NativeValue::I8(-1),
            NativeValue::I32(-2),
            NativeValue::U32(u32::MAX),
            NativeValue::Bool(true),
        ];
        let marshaled = marshal("f", &params, &args, CharSet::Ansi).unwrap();
        assert_eq!(
            words(&marshaled),
            &[u64::MAX, u64::MAX - 1, u64::from(u32::MAX), 1]
        );
    }

    #[test]
    fn test_narrow_string_is_nul_terminated_buffer() {
        let marshaled = marshal(
            "strlen",
            &[NativeType::Str],
            &[NativeValue::from("abc")],
            CharSet::Ansi,
        )
        .unwrap();
        assert_eq!(marshaled.buffer_count(), 1);
        let address = words(&marshaled)[0] as usize as *const std::ffi::c_char;
        // SAFETY: the buffer is owned by `marshaled`, alive for this scope.
        let text = unsafe { std::ffi::CStr::from_ptr(address) };
        assert_eq!(text.to_str().unwrap(), "abc");
    }

    #[test]
    fn test_wide_string_is_utf16_nul_terminated() {
        let marshaled = marshal(
            "lstrlenW",
            &[NativeType::Str],
            &[NativeValue::from("hé")],
            CharSet::Unicode,
        )
        .unwrap();
        let address = words(&marshaled)[0] as usize as *const u16;
        // SAFETY: three u16 units ("h", "é", NUL) live in the owned buffer.
        let units = unsafe { std::slice::from_raw_parts(address, 3) };
        assert_eq!(units, &[u16::from(b'h'), 0x00e9, 0]);
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let err = marshal(
            "puts",
            &[NativeType::Str],
            &[NativeValue::from("a\0b")],
            CharSet::Ansi,
        )
        .unwrap_err();
        assert_eq!(
            err,
            NativeResolutionError::StringMarshal {
                export: "puts".to_string(),
                index: 0
            }
        );
    }

    #[test]
    fn test_null_string_marshals_to_zero() {
        let marshaled =
            marshal("f", &[NativeType::Str], &[NativeValue::Null], CharSet::Ansi).unwrap();
        assert_eq!(words(&marshaled), &[0]);
        assert_eq!(marshaled.buffer_count(), 0);
    }

    #[test]
    fn test_float_parameters_use_float_slots() {
        let marshaled = marshal(
            "pow",
            &[NativeType::F64, NativeType::F64],
            &[NativeValue::F64(2.0), NativeValue::F64(10.0)],
            CharSet::Ansi,
        )
        .unwrap();
        match marshaled.slots {
            Slots::Floats(f) => assert_eq!(f, vec![2.0, 10.0]),
            Slots::Words(_) => panic!("expected float slots"),
        }
    }

    #[test]
    fn test_argument_count_and_type_mismatch() {
        let err = marshal("abs", &[NativeType::I32], &[], CharSet::Ansi).unwrap_err();
        assert!(err.to_string().contains("expected 1 arguments, got 0"));

        let err = marshal(
            "abs",
            &[NativeType::I32],
            &[NativeValue::I64(1)],
            CharSet::Ansi,
        )
        .unwrap_err();
        assert!(matches!(err, NativeResolutionError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_unsupported_shapes() {
        let mixed = [NativeType::I32, NativeType::F64];
        assert!(check_shape("f", &mixed).is_err());
        assert!(check_shape("f", &[NativeType::F32]).is_err());
        assert!(check_shape("f", &[NativeType::F64; 5]).is_err());
        assert!(check_shape("f", &[NativeType::U64; 9]).is_err());
        assert!(check_shape("f", &[NativeType::U64; 8]).is_ok());
        assert!(check_shape("f", &[]).is_ok());
    }
}
