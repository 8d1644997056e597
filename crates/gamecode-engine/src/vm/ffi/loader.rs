//! Dynamic library loading.
//!
//! Gamecode imports resolve against the host operating system's loader:
//! `dlopen`/`dlsym` on unix, `LoadLibraryW`/`GetProcAddress` on Windows.
//! There is no portable fallback; a missing library or symbol is fatal to
//! the run that needed it.

use std::ffi::{c_void, CString};

use thiserror::Error;

#[cfg(unix)]
use std::ffi::CStr;

/// Errors that can occur during library loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded.
    #[error("library not found: {path}")]
    NotFound {
        /// Path or name that was attempted.
        path: String,
    },

    /// Symbol not found in the library.
    #[error("symbol not found: {symbol} in {library}")]
    SymbolNotFound {
        /// Symbol name that was not found.
        symbol: String,
        /// Library the lookup ran against.
        library: String,
    },

    /// Platform-specific failure.
    #[error("platform error: {0}")]
    PlatformError(String),
}

/// Cross-platform dynamic library handle. Symbols stay valid while the
/// handle lives; the VM keeps every opened library for its own lifetime.
pub struct Library {
    handle: LibraryHandle,
    name: String,
}

impl Library {
    /// Load a dynamic library by name or path.
    pub fn open(name: &str) -> Result<Self, LoadError> {
        let handle = LibraryHandle::load(name)?;
        Ok(Library { handle, name: name.to_string() })
    }

    /// Resolve a symbol to a raw pointer.
    pub fn symbol(&self, name: &str) -> Result<*const c_void, LoadError> {
        self.handle.symbol(name, &self.name)
    }

    /// Name the library was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        let c_path = CString::new(path)
            .map_err(|e| LoadError::PlatformError(format!("invalid path: {e}")))?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            let error = unsafe {
                let err_ptr = libc::dlerror();
                if err_ptr.is_null() {
                    "unknown error".to_string()
                } else {
                    CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
                }
            };
            return Err(LoadError::NotFound { path: format!("{path}: {error}") });
        }
        Ok(UnixLibrary { handle })
    }

    fn symbol(&self, name: &str, lib_name: &str) -> Result<*const c_void, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("invalid symbol name: {e}")))?;

        unsafe {
            libc::dlerror(); // clear any previous error
            let symbol = libc::dlsym(self.handle, c_name.as_ptr());
            let err_ptr = libc::dlerror();
            if !err_ptr.is_null() || symbol.is_null() {
                return Err(LoadError::SymbolNotFound {
                    symbol: name.to_string(),
                    library: lib_name.to_string(),
                });
            }
            Ok(symbol as *const c_void)
        }
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}

// ============================================================================
// Windows implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(std::iter::once(0)).collect();
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LoadError::NotFound { path: format!("{path} (error code: {error})") });
        }
        Ok(WindowsLibrary { handle })
    }

    fn symbol(&self, name: &str, lib_name: &str) -> Result<*const c_void, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("invalid symbol name: {e}")))?;

        let symbol = unsafe { GetProcAddress(self.handle, c_name.as_ptr()) };
        if symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: lib_name.to_string(),
            });
        }
        Ok(symbol as *const c_void)
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}

#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut c_void;
    fn GetProcAddress(module: *mut c_void, procname: *const i8) -> *mut c_void;
    fn FreeLibrary(module: *mut c_void) -> i32;
    fn GetLastError() -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_an_error() {
        let result = Library::open("/nonexistent/library.so");
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
    }
}
