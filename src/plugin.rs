//! External mutation plugins loaded from a shared library.
//!
//! A plugin exports two C symbols:
//!
//! ```c
//! char *custom_mutate(const char *row, const char *header, const char *profile_json);
//! void  custom_mutate_free(char *rows);
//! ```
//!
//! `custom_mutate` returns newline-separated output rows (or null for none) and
//! is called from several worker threads at once, so it must be reentrant.
//! Every returned buffer is handed back to `custom_mutate_free`.

use std::ffi::{c_char, CStr, CString};
use std::path::Path;

use libloading::Library;

use crate::chaos::ChaosGenerator;
use crate::dataset::join_fields;
use crate::error::{Error, Result};
use crate::mutate::{DefaultMutator, RowMutator};
use crate::profile::InjectionProfile;

pub const MUTATE_SYMBOL: &[u8] = b"custom_mutate\0";
pub const FREE_SYMBOL: &[u8] = b"custom_mutate_free\0";

type MutateFn = unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> *mut c_char;
type FreeFn = unsafe extern "C" fn(*mut c_char);

pub struct ExternalMutator {
    name: String,
    mutate_fn: MutateFn,
    free_fn: FreeFn,
    profile_json: CString,
    // Keeps the symbols above valid; must outlive every call.
    _lib: Library,
}

impl ExternalMutator {
    pub fn load(path: &Path, profile: &InjectionProfile) -> Result<Self> {
        let name = path.to_string_lossy().to_string();
        // SAFETY: loading runs the library's initialisers. The path is
        // supplied by the operator, who vouches for the library.
        let lib = unsafe { Library::new(path) }
            .map_err(|e| Error::PluginLoad(format!("'{name}': {e}")))?;
        // SAFETY: the symbol types are the documented plugin ABI.
        let mutate_fn: MutateFn = unsafe {
            *lib.get::<MutateFn>(MUTATE_SYMBOL)
                .map_err(|e| Error::PluginLoad(format!("'{name}': custom_mutate: {e}")))?
        };
        let free_fn: FreeFn = unsafe {
            *lib.get::<FreeFn>(FREE_SYMBOL)
                .map_err(|e| Error::PluginLoad(format!("'{name}': custom_mutate_free: {e}")))?
        };
        let profile_json = CString::new(profile.to_json()?)
            .map_err(|_| Error::PluginLoad("profile contains a NUL byte".to_string()))?;
        Ok(Self {
            name,
            mutate_fn,
            free_fn,
            profile_json,
            _lib: lib,
        })
    }
}

fn c_string(what: &str, s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::MutationOutput(format!("{what} contains a NUL byte")))
}

impl RowMutator for ExternalMutator {
    fn name(&self) -> &str {
        &self.name
    }

    /// The profile was serialised at load time; `profile` and `rng` are unused.
    fn mutate(
        &self,
        row: &str,
        header: &[String],
        _profile: &InjectionProfile,
        _rng: &mut ChaosGenerator,
    ) -> Result<Vec<String>> {
        let row = c_string("row", row)?;
        let header = c_string("header", &join_fields(header))?;
        // SAFETY: all three arguments are valid NUL-terminated strings that
        // outlive the call; the library is held open by `self._lib`.
        let out = unsafe { (self.mutate_fn)(row.as_ptr(), header.as_ptr(), self.profile_json.as_ptr()) };
        if out.is_null() {
            return Ok(Vec::new());
        }
        // SAFETY: non-null results are NUL-terminated buffers owned by the
        // plugin until passed to `custom_mutate_free`.
        let text = unsafe { CStr::from_ptr(out) }.to_str().map(str::to_owned);
        unsafe { (self.free_fn)(out) };
        let text = text.map_err(|_| Error::MutationOutput("plugin returned invalid UTF-8".to_string()))?;
        Ok(text.lines().map(str::to_string).collect())
    }
}

/// Resolves the mutator for the run. A plugin that fails to load is logged
/// and replaced by [`DefaultMutator`].
pub fn resolve_mutator(plugin: Option<&Path>, profile: &InjectionProfile) -> Box<dyn RowMutator> {
    let Some(path) = plugin else {
        return Box::new(DefaultMutator);
    };
    match ExternalMutator::load(path, profile) {
        Ok(m) => {
            log::info!("using external mutator '{}'", m.name());
            Box::new(m)
        }
        Err(e) => {
            log::warn!("{e}; falling back to built-in mutation logic");
            Box::new(DefaultMutator)
        }
    }
}
