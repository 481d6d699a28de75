//! Binder, library handles and function bindings.
//!
//! A [`NativeBinder`] owns two caches:
//! - loaded libraries, keyed by path and shared by every binding into them
//! - binding slots, keyed by library, export and full signature
//!
//! A slot resolves its export lazily on first invocation and memoises the
//! outcome, so a missing library or export surfaces on the first call and
//! stays fatal for that binding.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use libloading::Library;
use tracing::{debug, instrument, trace, warn};

use super::error::NativeResolutionError;
use super::invoke;
use super::marshal;
use super::types::{CallingConvention, CharSet, NativeReturn, NativeType, NativeValue};

/// A shared library identified by its path.
///
/// Constructing a handle never touches the file system; the library is
/// loaded the first time a binding into it is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeLibrary {
    path: String,
    namespace: String,
}

impl NativeLibrary {
    /// Creates a handle for the library at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let namespace = namespace_token(&path);
        Self { path, namespace }
    }

    /// Path as given (a bare file name is searched by the platform loader).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Identifier derived from the file stem, used to qualify binding names.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Lower-cased file stem with non-alphanumerics replaced by `_`.
fn namespace_token(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let token: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if token.is_empty() {
        "native".to_string()
    } else {
        token
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BindingKey {
    library: String,
    export: String,
    convention: CallingConvention,
    charset: CharSet,
    params: Vec<NativeType>,
    ret: Option<NativeType>,
}

#[derive(Debug, Default)]
struct LibraryCache {
    libraries: DashMap<String, Arc<Library>>,
}

impl LibraryCache {
    fn load(&self, path: &str) -> Result<Arc<Library>, NativeResolutionError> {
        if let Some(library) = self.libraries.get(path) {
            return Ok(Arc::clone(&library));
        }

        // SAFETY: loading runs the library's initialisers; callers opt into
        // that by binding exports of the library.
        let library = unsafe { Library::new(path) }
            .map_err(|e| NativeResolutionError::library_not_found(path, e))?;
        debug!(library = %path, "loaded native library");

        let entry = self
            .libraries
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(library));
        Ok(Arc::clone(entry.value()))
    }
}

#[derive(Debug)]
struct ResolvedSymbol {
    // Keeps the code behind `address` mapped.
    _library: Arc<Library>,
    address: usize,
}

#[derive(Debug)]
struct BindingSlot {
    key: BindingKey,
    qualified_name: String,
    libraries: Arc<LibraryCache>,
    resolved: OnceLock<Result<ResolvedSymbol, NativeResolutionError>>,
}

impl BindingSlot {
    fn resolve(&self) -> Result<&ResolvedSymbol, NativeResolutionError> {
        self.resolved
            .get_or_init(|| {
                let outcome = self.load_symbol();
                match &outcome {
                    Ok(symbol) => debug!(
                        binding = %self.qualified_name,
                        address = format_args!("{:#x}", symbol.address),
                        "resolved native export"
                    ),
                    Err(error) => warn!(
                        binding = %self.qualified_name,
                        error = %error,
                        "native export resolution failed"
                    ),
                }
                outcome
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn load_symbol(&self) -> Result<ResolvedSymbol, NativeResolutionError> {
        let library = self.libraries.load(&self.key.library)?;
        let export = self.key.export.as_bytes();
        // SAFETY: the symbol is only read as an address here; calls go
        // through `FunctionBinding::invoke`, whose caller vouches for the
        // signature.
        let address = unsafe { library.get::<unsafe extern "C" fn()>(export) }
            .map(|symbol| *symbol as usize)
            .map_err(|e| {
                NativeResolutionError::export_not_found(&self.key.library, &self.key.export, e)
            })?;
        Ok(ResolvedSymbol {
            _library: library,
            address,
        })
    }
}

/// Creates and caches [`FunctionBinding`]s.
///
/// Cheap to clone; clones share both caches.
///
/// # Example
///
/// ```no_run
/// use outcall::native::{CallingConvention, CharSet, NativeBinder, NativeType, NativeValue};
///
/// # fn example() -> Result<(), outcall::native::NativeResolutionError> {
/// let binder = NativeBinder::new();
/// let libc = binder.library("libc.so.6");
/// let abs = binder.bind::<i32>(
///     &libc,
///     "abs",
///     CallingConvention::Cdecl,
///     CharSet::Ansi,
///     &[NativeType::I32],
/// )?;
/// // SAFETY: `abs` takes and returns a C int.
/// let value = unsafe { abs.invoke(&[NativeValue::I32(-3)])? };
/// assert_eq!(value, 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct NativeBinder {
    libraries: Arc<LibraryCache>,
    bindings: Arc<DashMap<BindingKey, Arc<BindingSlot>>>,
}

impl NativeBinder {
    /// Creates a binder with empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a library handle; nothing is loaded yet.
    #[must_use]
    pub fn library(&self, path: impl Into<String>) -> NativeLibrary {
        NativeLibrary::new(path)
    }

    /// Binds `export` of `library` with the given signature; `R` is the
    /// return type (`()` for void).
    ///
    /// Binding the same library, export and signature again returns a
    /// binding that shares the first one's resolution.
    ///
    /// # Errors
    ///
    /// Returns [`NativeResolutionError::EmptyExportName`] for an empty export.
    /// Load and lookup failures are reported by the first
    /// [`invoke`](FunctionBinding::invoke).
    #[instrument(level = "debug", skip(self, library, params), fields(
        library = %library.path(),
        params = params.len(),
    ))]
    pub fn bind<R: NativeReturn>(
        &self,
        library: &NativeLibrary,
        export: &str,
        convention: CallingConvention,
        charset: CharSet,
        params: &[NativeType],
    ) -> Result<FunctionBinding<R>, NativeResolutionError> {
        if export.is_empty() {
            return Err(NativeResolutionError::EmptyExportName);
        }

        let key = BindingKey {
            library: library.path().to_string(),
            export: export.to_string(),
            convention,
            charset,
            params: params.to_vec(),
            ret: R::RETURN_TYPE,
        };
        let slot = self
            .bindings
            .entry(key.clone())
            .or_insert_with(|| {
                trace!("creating binding slot");
                Arc::new(BindingSlot {
                    qualified_name: format!("{}::{export}", library.namespace()),
                    key,
                    libraries: Arc::clone(&self.libraries),
                    resolved: OnceLock::new(),
                })
            })
            .value()
            .clone();

        Ok(FunctionBinding {
            slot,
            _ret: PhantomData,
        })
    }

    /// Binds a void-returning export. Same as `bind::<()>`.
    ///
    /// # Errors
    ///
    /// See [`bind`](Self::bind).
    pub fn bind_void(
        &self,
        library: &NativeLibrary,
        export: &str,
        convention: CallingConvention,
        charset: CharSet,
        params: &[NativeType],
    ) -> Result<VoidBinding, NativeResolutionError> {
        self.bind::<()>(library, export, convention, charset, params)
    }

    /// Number of distinct bindings created so far.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of libraries loaded so far.
    #[must_use]
    pub fn loaded_library_count(&self) -> usize {
        self.libraries.libraries.len()
    }
}

/// A callable handle to a native export returning `R`.
pub struct FunctionBinding<R> {
    slot: Arc<BindingSlot>,
    _ret: PhantomData<fn() -> R>,
}

/// Binding of a void-returning export.
pub type VoidBinding = FunctionBinding<()>;

impl<R> Clone for FunctionBinding<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            _ret: PhantomData,
        }
    }
}

impl<R> fmt::Debug for FunctionBinding<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("name", &self.slot.qualified_name)
            .field("library", &self.slot.key.library)
            .field("convention", &self.slot.key.convention)
            .field("charset", &self.slot.key.charset)
            .field("params", &self.slot.key.params)
            .field("ret", &self.slot.key.ret)
            .field("resolved", &self.slot.resolved.get().map(Result::is_ok))
            .finish()
    }
}

impl<R> FunctionBinding<R> {
    /// Export name.
    #[must_use]
    pub fn export(&self) -> &str {
        &self.slot.key.export
    }

    /// `namespace::export`.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.slot.qualified_name
    }

    /// Declared parameter types.
    #[must_use]
    pub fn params(&self) -> &[NativeType] {
        &self.slot.key.params
    }

    /// Declared calling convention.
    #[must_use]
    pub fn convention(&self) -> CallingConvention {
        self.slot.key.convention
    }

    /// Declared string policy.
    #[must_use]
    pub fn charset(&self) -> CharSet {
        self.slot.key.charset
    }

    /// Whether `self` and `other` share one resolution slot.
    #[must_use]
    pub fn shares_slot_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Resolves the export now instead of on first invocation.
    ///
    /// # Errors
    ///
    /// Returns the (memoised) load or lookup failure.
    pub fn resolve(&self) -> Result<(), NativeResolutionError> {
        self.slot.resolve().map(|_| ())
    }
}

impl<R: NativeReturn> FunctionBinding<R> {
    /// Calls the export with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`NativeResolutionError`] if the library or export cannot be
    /// resolved, if `args` do not match the declared parameters, or if the
    /// convention or platform is unsupported.
    ///
    /// # Safety
    ///
    /// The declared parameter types, return type and calling convention must
    /// match the export's real signature, and pointer arguments must be valid
    /// for whatever the native code does with them.
    pub unsafe fn invoke(&self, args: &[NativeValue]) -> Result<R, NativeResolutionError> {
        let symbol = self.slot.resolve()?;
        let key = &self.slot.key;

        let abi = key
            .convention
            .abi()
            .ok_or_else(|| NativeResolutionError::UnsupportedConvention {
                export: key.export.clone(),
                convention: key.convention,
            })?;
        if cfg!(not(target_pointer_width = "64")) {
            return Err(NativeResolutionError::UnsupportedPlatform);
        }

        let marshaled = marshal::marshal(&key.export, &key.params, args, key.charset)?;
        let ret = key.ret.map(NativeType::class);

        // SAFETY: signature validity is the caller's contract; `marshaled`
        // owns every buffer its slots point into until after the call.
        let raw = unsafe { invoke::call(abi, symbol.address, &marshaled.slots, ret) }
            .ok_or_else(|| {
                NativeResolutionError::signature_mismatch(&key.export, "unsupported arity")
            })?;
        trace!(binding = %self.slot.qualified_name, ?raw, "native call returned");

        Ok(R::from_raw(raw))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_token_from_file_stem() {
        assert_eq!(namespace_token("/usr/lib/libSSL.so"), "libssl");
        assert_eq!(
            namespace_token("C:\\Windows\\System32\\User32.dll"),
            namespace_token_for_platform()
        );
        assert_eq!(namespace_token("libc.so.6"), "libc_so");
        assert_eq!(namespace_token("My-Lib.dll"), "my_lib");
        assert_eq!(namespace_token(""), "native");
    }

    // Backslashes only separate paths on Windows.
    fn namespace_token_for_platform() -> &'static str {
        if cfg!(windows) {
            "user32"
        } else {
            "c__windows_system32_user32"
        }
    }

    #[test]
    fn test_library_handle_is_lazy() {
        let binder = NativeBinder::new();
        let library = binder.library("/definitely/not/here/libnothing.so");
        assert_eq!(library.namespace(), "libnothing");
        let binding = binder
            .bind::<i32>(&library, "f", CallingConvention::Cdecl, CharSet::Ansi, &[])
            .unwrap();
        assert_eq!(binder.loaded_library_count(), 0);
        assert_eq!(binding.qualified_name(), "libnothing::f");
    }

    #[test]
    fn test_empty_export_rejected_at_bind() {
        let binder = NativeBinder::new();
        let library = binder.library("libc.so.6");
        let err = binder
            .bind_void(&library, "", CallingConvention::Cdecl, CharSet::Ansi, &[])
            .unwrap_err();
        assert_eq!(err, NativeResolutionError::EmptyExportName);
    }

    #[test]
    fn test_same_signature_shares_slot() {
        let binder = NativeBinder::new();
        let library = binder.library("libm.so.6");
        let params = [NativeType::F64];
        let bind = |convention| {
            binder
                .bind::<f64>(&library, "floor", convention, CharSet::Ansi, &params)
                .unwrap()
        };
        let a = bind(CallingConvention::Cdecl);
        let b = bind(CallingConvention::Cdecl);
        let c = bind(CallingConvention::StdCall);
        assert!(a.shares_slot_with(&b));
        assert!(!a.shares_slot_with(&c));
        assert_eq!(binder.binding_count(), 2);
    }

    #[test]
    fn test_binding_reports_declared_signature() {
        let binder = NativeBinder::new();
        let library = binder.library("libc.so.6");
        let params = [NativeType::Str, NativeType::I32];
        let (convention, charset) = (CallingConvention::Winapi, CharSet::Unicode);
        let binding = binder
            .bind::<i32>(&library, "puts", convention, charset, &params)
            .unwrap();
        assert_eq!(binding.export(), "puts");
        assert_eq!(binding.qualified_name(), "libc_so::puts");
        assert_eq!(binding.params(), &params);
        assert_eq!(binding.convention(), CallingConvention::Winapi);
        assert_eq!(binding.charset(), CharSet::Unicode);
    }

    #[test]
    fn test_missing_library_fails_on_invoke_and_is_memoised() {
        let binder = NativeBinder::new();
        let library = binder.library("/definitely/not/here/libnothing.so");
        let binding = binder
            .bind::<i32>(&library, "f", CallingConvention::Cdecl, CharSet::Ansi, &[])
            .unwrap();

        // SAFETY: resolution fails before any call is made.
        let first = unsafe { binding.invoke(&[]) }.unwrap_err();
        assert!(matches!(first, NativeResolutionError::LibraryNotFound { .. }));

        // SAFETY: as above.
        let second = unsafe { binding.clone().invoke(&[]) }.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(binding.resolve().unwrap_err(), first);
    }
}
