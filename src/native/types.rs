//! Signature vocabulary for native bindings.
//!
//! [`NativeType`] describes declared parameter and return types,
//! [`NativeValue`] carries runtime arguments, and [`NativeReturn`] maps a
//! Rust return type onto the declared native return type.

use std::ffi::c_void;
use std::fmt;
use std::str::FromStr;

/// ABI-level calling convention of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// C calling convention.
    #[default]
    Cdecl,
    /// Windows `__stdcall`; same as the platform system ABI.
    StdCall,
    /// Platform default for system APIs (`stdcall` on 32-bit Windows, C elsewhere).
    Winapi,
    /// C++ member-function convention.
    ThisCall,
    /// `__fastcall`.
    FastCall,
}

/// Rust ABI a binding is called through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abi {
    C,
    System,
}

impl CallingConvention {
    pub(crate) fn abi(self) -> Option<Abi> {
        match self {
            Self::Cdecl => Some(Abi::C),
            Self::StdCall | Self::Winapi => Some(Abi::System),
            Self::ThisCall | Self::FastCall => None,
        }
    }
}

/// String marshaling policy for `Str` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CharSet {
    /// NUL-terminated narrow (UTF-8) strings.
    Ansi,
    /// NUL-terminated wide (UTF-16) strings.
    Unicode,
    /// Wide on Windows, narrow elsewhere.
    #[default]
    Auto,
}

impl CharSet {
    /// Whether strings are marshaled as UTF-16.
    #[must_use]
    pub fn is_wide(self) -> bool {
        match self {
            Self::Ansi => false,
            Self::Unicode => true,
            Self::Auto => cfg!(windows),
        }
    }
}

/// Declared native type of a parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// C `bool`, passed as 0 or 1.
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer (C `int`).
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// Pointer-sized signed integer.
    ISize,
    /// Pointer-sized unsigned integer (C `size_t`).
    USize,
    /// Untyped address.
    Pointer,
    /// Single-precision float.
    F32,
    /// Double-precision float.
    F64,
    /// String marshaled per the binding's [`CharSet`]; parameters only.
    Str,
}

/// Register class a native type travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeClass {
    Integer,
    Float32,
    Float64,
}

impl NativeType {
    pub(crate) fn class(self) -> TypeClass {
        match self {
            Self::F32 => TypeClass::Float32,
            Self::F64 => TypeClass::Float64,
            _ => TypeClass::Integer,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::ISize => "isize",
            Self::USize => "usize",
            Self::Pointer => "ptr",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "str",
        };
        f.write_str(name)
    }
}

impl FromStr for NativeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "bool" => Self::Bool,
            "i8" => Self::I8,
            "u8" => Self::U8,
            "i16" => Self::I16,
            "u16" => Self::U16,
            "i32" | "int" => Self::I32,
            "u32" => Self::U32,
            "i64" | "long" => Self::I64,
            "u64" => Self::U64,
            "isize" => Self::ISize,
            "usize" | "size_t" => Self::USize,
            "ptr" | "pointer" => Self::Pointer,
            "f32" | "float" => Self::F32,
            "f64" | "double" => Self::F64,
            "str" | "string" => Self::Str,
            other => return Err(format!("unknown native type: {other}")),
        })
    }
}

impl FromStr for CallingConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "cdecl" | "c" => Self::Cdecl,
            "stdcall" => Self::StdCall,
            "winapi" | "system" => Self::Winapi,
            "thiscall" => Self::ThisCall,
            "fastcall" => Self::FastCall,
            other => return Err(format!("unknown calling convention: {other}")),
        })
    }
}

impl FromStr for CharSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "ansi" | "narrow" => Self::Ansi,
            "unicode" | "wide" => Self::Unicode,
            "auto" => Self::Auto,
            other => return Err(format!("unknown charset: {other}")),
        })
    }
}

/// A runtime argument for a native call.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Argument for a `Bool` parameter.
    Bool(bool),
    /// Argument for an `I8` parameter.
    I8(i8),
    /// Argument for a `U8` parameter.
    U8(u8),
    /// Argument for an `I16` parameter.
    I16(i16),
    /// Argument for a `U16` parameter.
    U16(u16),
    /// Argument for an `I32` parameter.
    I32(i32),
    /// Argument for a `U32` parameter.
    U32(u32),
    /// Argument for an `I64` parameter.
    I64(i64),
    /// Argument for a `U64` parameter.
    U64(u64),
    /// Argument for an `ISize` parameter.
    ISize(isize),
    /// Argument for a `USize` parameter.
    USize(usize),
    /// Address passed as-is.
    Pointer(usize),
    /// Argument for an `F32` parameter.
    F32(f32),
    /// Argument for an `F64` parameter.
    F64(f64),
    /// Text marshaled to a temporary NUL-terminated buffer for the call.
    Str(String),
    /// Null pointer; accepted for `Pointer` and `Str` parameters.
    Null,
}

impl NativeValue {
    /// Wraps a raw pointer argument.
    #[must_use]
    pub fn pointer<T>(ptr: *const T) -> Self {
        Self::Pointer(ptr as usize)
    }

    /// The native type this value was built for; `None` for [`NativeValue::Null`].
    #[must_use]
    pub fn native_type(&self) -> Option<NativeType> {
        Some(match self {
            Self::Bool(_) => NativeType::Bool,
            Self::I8(_) => NativeType::I8,
            Self::U8(_) => NativeType::U8,
            Self::I16(_) => NativeType::I16,
            Self::U16(_) => NativeType::U16,
            Self::I32(_) => NativeType::I32,
            Self::U32(_) => NativeType::U32,
            Self::I64(_) => NativeType::I64,
            Self::U64(_) => NativeType::U64,
            Self::ISize(_) => NativeType::ISize,
            Self::USize(_) => NativeType::USize,
            Self::Pointer(_) => NativeType::Pointer,
            Self::F32(_) => NativeType::F32,
            Self::F64(_) => NativeType::F64,
            Self::Str(_) => NativeType::Str,
            Self::Null => return None,
        })
    }

    /// Whether this value can be passed for a parameter of type `ty`.
    #[must_use]
    pub fn matches(&self, ty: NativeType) -> bool {
        match self {
            Self::Null => matches!(ty, NativeType::Pointer | NativeType::Str),
            other => other.native_type() == Some(ty),
        }
    }

    /// Parses a value of the given type from its textual form.
    ///
    /// Booleans accept `true`/`false` and `1`/`0`. Pointers are decimal unless
    /// prefixed with `0x`, and `null` gives [`NativeValue::Null`].
    ///
    /// # Errors
    ///
    /// Returns a description of the parse failure.
    pub fn parse_as(ty: NativeType, text: &str) -> Result<Self, String> {
        fn invalid(text: &str, ty: NativeType) -> String {
            format!("cannot parse {text:?} as {ty}")
        }
        fn num<T: FromStr>(text: &str, ty: NativeType) -> Result<T, String> {
            text.parse::<T>().map_err(|_| invalid(text, ty))
        }
        Ok(match ty {
            NativeType::Bool => Self::Bool(match text.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(invalid(text, ty)),
            }),
            NativeType::I8 => Self::I8(num(text, ty)?),
            NativeType::U8 => Self::U8(num(text, ty)?),
            NativeType::I16 => Self::I16(num(text, ty)?),
            NativeType::U16 => Self::U16(num(text, ty)?),
            NativeType::I32 => Self::I32(num(text, ty)?),
            NativeType::U32 => Self::U32(num(text, ty)?),
            NativeType::I64 => Self::I64(num(text, ty)?),
            NativeType::U64 => Self::U64(num(text, ty)?),
            NativeType::ISize => Self::ISize(num(text, ty)?),
            NativeType::USize => Self::USize(num(text, ty)?),
            NativeType::Pointer if text.eq_ignore_ascii_case("null") => Self::Null,
            NativeType::Pointer => {
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => usize::from_str_radix(hex, 16),
                    None => text.parse::<usize>(),
                };
                Self::Pointer(parsed.map_err(|_| invalid(text, ty))?)
            }
            NativeType::F32 => Self::F32(num(text, ty)?),
            NativeType::F64 => Self::F64(num(text, ty)?),
            NativeType::Str => Self::Str(text.to_string()),
        })
    }
}

macro_rules! impl_from_for_value {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for NativeValue {
            fn from(value: $t) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

impl_from_for_value!(
    bool => Bool, i8 => I8, u8 => U8, i16 => I16, u16 => U16, i32 => I32, u32 => U32,
    i64 => I64, u64 => U64, isize => ISize, usize => USize, f32 => F32, f64 => F64,
    String => Str,
);

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Raw value produced by a native call before conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawReturn {
    /// Integer-class return register.
    Word(u64),
    /// Single-precision float return register.
    F32(f32),
    /// Double-precision float return register.
    F64(f64),
}

impl RawReturn {
    fn word(self) -> u64 {
        match self {
            Self::Word(w) => w,
            Self::F32(_) | Self::F64(_) => 0,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust types a binding can return. `()` is the void return.
pub trait NativeReturn: sealed::Sealed + Sized {
    /// Declared native return type; `None` for void.
    const RETURN_TYPE: Option<NativeType>;

    /// Converts the raw call result.
    fn from_raw(raw: RawReturn) -> Self;
}

impl sealed::Sealed for () {}

impl NativeReturn for () {
    const RETURN_TYPE: Option<NativeType> = None;

    fn from_raw(_raw: RawReturn) -> Self {}
}

// Integer returns arrive in a full register; only the low bits are defined.
macro_rules! impl_integer_return {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl NativeReturn for $t {
                const RETURN_TYPE: Option<NativeType> = Some(NativeType::$variant);

                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                fn from_raw(raw: RawReturn) -> Self {
                    raw.word() as $t
                }
            }
        )*
    };
}

impl_integer_return!(
    i8 => I8, u8 => U8, i16 => I16, u16 => U16, i32 => I32, u32 => U32,
    i64 => I64, u64 => U64, isize => ISize, usize => USize,
);

impl sealed::Sealed for bool {}

impl NativeReturn for bool {
    const RETURN_TYPE: Option<NativeType> = Some(NativeType::Bool);

    fn from_raw(raw: RawReturn) -> Self {
        raw.word() & 0xff != 0
    }
}

impl sealed::Sealed for *mut c_void {}

impl NativeReturn for *mut c_void {
    const RETURN_TYPE: Option<NativeType> = Some(NativeType::Pointer);

    #[allow(clippy::cast_possible_truncation)]
    fn from_raw(raw: RawReturn) -> Self {
        raw.word() as usize as *mut c_void
    }
}

impl sealed::Sealed for f32 {}

impl NativeReturn for f32 {
    const RETURN_TYPE: Option<NativeType> = Some(NativeType::F32);

    fn from_raw(raw: RawReturn) -> Self {
        match raw {
            RawReturn::F32(v) => v,
            RawReturn::Word(_) | RawReturn::F64(_) => 0.0,
        }
    }
}

impl sealed::Sealed for f64 {}

impl NativeReturn for f64 {
    const RETURN_TYPE: Option<NativeType> = Some(NativeType::F64);

    fn from_raw(raw: RawReturn) -> Self {
        match raw {
            RawReturn::F64(v) => v,
            RawReturn::Word(_) | RawReturn::F32(_) => 0.0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_abi_mapping() {
        assert_eq!(CallingConvention::Cdecl.abi(), Some(Abi::C));
        assert_eq!(CallingConvention::StdCall.abi(), Some(Abi::System));
        assert_eq!(CallingConvention::Winapi.abi(), Some(Abi::System));
        assert_eq!(CallingConvention::ThisCall.abi(), None);
        assert_eq!(CallingConvention::FastCall.abi(), None);
    }

    #[test]
    fn test_charset_width() {
        assert!(!CharSet::Ansi.is_wide());
        assert!(CharSet::Unicode.is_wide());
        assert_eq!(CharSet::Auto.is_wide(), cfg!(windows));
    }

    #[test]
    fn test_null_matches_pointer_and_str_only() {
        assert!(NativeValue::Null.matches(NativeType::Pointer));
        assert!(NativeValue::Null.matches(NativeType::Str));
        assert!(!NativeValue::Null.matches(NativeType::I32));
        assert!(NativeValue::from(5i32).matches(NativeType::I32));
        assert!(!NativeValue::from(5i32).matches(NativeType::I64));
    }

    #[test]
    fn test_integer_return_truncates_register() {
        let raw = RawReturn::Word(0xdead_beef_ffff_fffe);
        assert_eq!(i32::from_raw(raw), -2);
        assert_eq!(u16::from_raw(raw), 0xfffe);
        assert_eq!(u64::from_raw(raw), 0xdead_beef_ffff_fffe);
        assert!(bool::from_raw(RawReturn::Word(0x100 | 1)));
        assert!(!bool::from_raw(RawReturn::Word(0x100)));
    }

    #[test]
    fn test_return_type_declarations() {
        assert_eq!(<() as NativeReturn>::RETURN_TYPE, None);
        assert_eq!(<f64 as NativeReturn>::RETURN_TYPE, Some(NativeType::F64));
        assert_eq!(
            <*mut c_void as NativeReturn>::RETURN_TYPE,
            Some(NativeType::Pointer)
        );
    }

    #[test]
    fn test_parse_type_names_and_values() {
        assert_eq!("int".parse::<NativeType>().unwrap(), NativeType::I32);
        assert_eq!("Double".parse::<NativeType>().unwrap(), NativeType::F64);
        assert!("quad".parse::<NativeType>().is_err());
        assert_eq!(
            "stdcall".parse::<CallingConvention>().unwrap(),
            CallingConvention::StdCall
        );
        assert_eq!("wide".parse::<CharSet>().unwrap(), CharSet::Unicode);

        assert_eq!(
            NativeValue::parse_as(NativeType::I32, "-7").unwrap(),
            NativeValue::I32(-7)
        );
        assert_eq!(
            NativeValue::parse_as(NativeType::Pointer, "0x10").unwrap(),
            NativeValue::Pointer(16)
        );
        assert_eq!(
            NativeValue::parse_as(NativeType::Pointer, "null").unwrap(),
            NativeValue::Null
        );
        assert!(NativeValue::parse_as(NativeType::U8, "300").is_err());
    }

    #[test]
    fn test_parse_pointer_is_decimal_unless_hex_prefixed() {
        let parse = |text| NativeValue::parse_as(NativeType::Pointer, text);
        assert_eq!(parse("16").unwrap(), NativeValue::Pointer(16));
        assert_eq!(parse("0x16").unwrap(), NativeValue::Pointer(0x16));
        assert_eq!(parse("0XfF").unwrap(), NativeValue::Pointer(255));
        assert_eq!(parse("NULL").unwrap(), NativeValue::Null);
        assert!(parse("ff").is_err());
        assert!(parse("0x").is_err());
        assert!(parse("-1").is_err());
    }

    #[test]
    fn test_parse_bool_accepts_words_and_digits() {
        let parse = |text| NativeValue::parse_as(NativeType::Bool, text);
        assert_eq!(parse("1").unwrap(), NativeValue::Bool(true));
        assert_eq!(parse("0").unwrap(), NativeValue::Bool(false));
        assert_eq!(parse("TRUE").unwrap(), NativeValue::Bool(true));
        assert_eq!(parse("false").unwrap(), NativeValue::Bool(false));
        let err = parse("yes").unwrap_err();
        assert_eq!(err, "cannot parse \"yes\" as bool");
    }

    #[test]
    fn test_pointer_value_records_address() {
        let byte = 7u8;
        let value = NativeValue::pointer(&raw const byte);
        assert_eq!(value, NativeValue::Pointer(&raw const byte as usize));
        assert!(value.matches(NativeType::Pointer));
    }
}
