//! Kernels served from a compiled `kiln-ffi` shared library.
//!
//! Every `kiln_*` symbol is resolved once in [`DynamicKernels::load`] and the
//! ABI version is checked there, so a bad artifact fails at startup rather
//! than at the first kernel call. Calls go through the same argument
//! validation as [`NativeKernels`](crate::NativeKernels); callers only ever
//! pass slices.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::Result;
use crate::provider::{check_reduction, check_same_len, check_square, KernelLibrary};
use crate::quantize::QuantScale;
use crate::strategy::Strategy;
use crate::ABI_VERSION;

// ---------------------------------------------------------------------------
// C ABI function signatures (see crates/kiln-ffi/include/kiln.h)
// ---------------------------------------------------------------------------

type FnAbiVersion = unsafe extern "C" fn() -> u32;
type FnInPlace = unsafe extern "C" fn(*mut f32, usize, u32);
type FnSoftmax = unsafe extern "C" fn(*const f32, *mut f32, usize, u32);
type FnMatmulF32 = unsafe extern "C" fn(*const f32, *const f32, *mut f32, usize, u32);
type FnQuantize = unsafe extern "C" fn(*const f32, *mut i8, usize, f32, u32);
type FnMatmulInt8 = unsafe extern "C" fn(*const i8, *const i8, *mut i32, usize, u32);

/// Errors raised while loading or unloading a kernel library.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("kernel library {path} could not be loaded: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("symbol '{symbol}' not found in kernel library {path}")]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("kernel library {path} has ABI version {found}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("kernel library {path} could not be unloaded: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

/// A loaded `kiln-ffi` shared library.
///
/// Lifecycle: [`load`](Self::load) opens the library and resolves all
/// symbols; [`close`](Self::close) unloads it and reports failures. Dropping
/// without `close` also unloads, silently.
pub struct DynamicKernels {
    _lib: Library,
    path: PathBuf,
    relu: FnInPlace,
    gelu: FnInPlace,
    softmax: FnSoftmax,
    matmul_f32: FnMatmulF32,
    quantize: FnQuantize,
    matmul_int8: FnMatmulInt8,
}

impl std::fmt::Debug for DynamicKernels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicKernels").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Resolve `name` from `lib` as a function pointer of type `T`.
///
/// # Safety
/// `T` must match the actual signature of the exported symbol.
unsafe fn symbol<T: Copy>(lib: &Library, path: &Path, name: &'static str) -> std::result::Result<T, LoadError> {
    lib.get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|source| LoadError::MissingSymbol { path: path.to_path_buf(), symbol: name, source })
}

impl DynamicKernels {
    /// Platform file name of the kernel library (`libkiln_ffi.so`,
    /// `libkiln_ffi.dylib`, `kiln_ffi.dll`).
    pub fn file_name() -> OsString {
        libloading::library_filename("kiln_ffi")
    }

    /// Open the library at `path` and resolve every kernel symbol.
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        tracing::debug!(path = %path.display(), "loading kernel library");

        // Safety: loading runs the library's initializers; kiln-ffi has none.
        let lib = unsafe { Library::new(&path) }
            .map_err(|source| LoadError::Open { path: path.clone(), source })?;

        // Safety: the signatures mirror the `extern "C"` definitions in kiln-ffi.
        unsafe {
            let abi_version: FnAbiVersion = symbol(&lib, &path, "kiln_abi_version")?;
            let found = abi_version();
            if found != ABI_VERSION {
                return Err(LoadError::AbiMismatch { path, found, expected: ABI_VERSION });
            }

            let kernels = DynamicKernels {
                relu: symbol(&lib, &path, "kiln_relu")?,
                gelu: symbol(&lib, &path, "kiln_gelu")?,
                softmax: symbol(&lib, &path, "kiln_softmax")?,
                matmul_f32: symbol(&lib, &path, "kiln_matmul_f32")?,
                quantize: symbol(&lib, &path, "kiln_quantize")?,
                matmul_int8: symbol(&lib, &path, "kiln_matmul_int8")?,
                _lib: lib,
                path,
            };
            tracing::info!(path = %kernels.path.display(), abi = found, "kernel library loaded");
            Ok(kernels)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unload the library.
    pub fn close(self) -> std::result::Result<(), LoadError> {
        let DynamicKernels { _lib: lib, path, .. } = self;
        lib.close().map_err(|source| LoadError::Close { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), "kernel library unloaded");
        Ok(())
    }
}

impl KernelLibrary for DynamicKernels {
    fn name(&self) -> &str {
        "dynamic"
    }

    fn relu(&self, data: &mut [f32], strategy: Strategy) -> Result<()> {
        // Safety: pointer and length come from one live slice.
        unsafe { (self.relu)(data.as_mut_ptr(), data.len(), strategy.code()) };
        Ok(())
    }

    fn gelu(&self, data: &mut [f32], strategy: Strategy) -> Result<()> {
        unsafe { (self.gelu)(data.as_mut_ptr(), data.len(), strategy.code()) };
        Ok(())
    }

    fn softmax(&self, input: &[f32], output: &mut [f32], strategy: Strategy) -> Result<()> {
        check_same_len("softmax", input.len(), output.len())?;
        unsafe { (self.softmax)(input.as_ptr(), output.as_mut_ptr(), input.len(), strategy.code()) };
        Ok(())
    }

    fn matmul_f32(&self, a: &[f32], b: &[f32], c: &mut [f32], n: usize, strategy: Strategy) -> Result<()> {
        check_square("matmul_f32", n, &[a.len(), b.len(), c.len()])?;
        unsafe { (self.matmul_f32)(a.as_ptr(), b.as_ptr(), c.as_mut_ptr(), n, strategy.code()) };
        Ok(())
    }

    fn quantize(&self, input: &[f32], output: &mut [i8], scale: QuantScale, strategy: Strategy) -> Result<()> {
        check_same_len("quantize", input.len(), output.len())?;
        unsafe {
            (self.quantize)(input.as_ptr(), output.as_mut_ptr(), input.len(), scale.get(), strategy.code())
        };
        Ok(())
    }

    fn matmul_int8(&self, a: &[i8], b: &[i8], c: &mut [i32], n: usize, strategy: Strategy) -> Result<()> {
        check_reduction(n)?;
        check_square("matmul_int8", n, &[a.len(), b.len(), c.len()])?;
        unsafe { (self.matmul_int8)(a.as_ptr(), b.as_ptr(), c.as_mut_ptr(), n, strategy.code()) };
        Ok(())
    }
}
