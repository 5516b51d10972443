//! Dynamic Library Loader
//!
//! Safe wrapper around libloading for loading shared libraries and resolving
//! exported symbols, with per-library symbol caching and path-keyed sharing of
//! loaded images.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use libloading::{Library, Symbol};
use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::config::LoaderConfig;
use crate::error::{ProxyError, ProxyResult};

/// A dynamically loaded library
pub struct DynamicLibrary {
    /// Path to the library
    path: PathBuf,
    /// The loaded library handle
    library: Library,
    /// Cached function symbols
    symbols: Mutex<HashMap<String, usize>>,
}

impl DynamicLibrary {
    /// Load a library from the given path
    pub fn load(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading runs the library's initializers. We trust that the
        // caller has provided a library it is willing to execute.
        let library = unsafe {
            Library::new(&path).map_err(|source| ProxyError::LibraryLoad {
                path: path.clone(),
                source,
            })?
        };

        debug!("loaded native library '{}'", path.display());
        Ok(Self {
            path,
            library,
            symbols: Mutex::new(HashMap::new()),
        })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the address of an exported symbol
    pub fn symbol_address(&self, name: &str) -> ProxyResult<usize> {
        let mut symbols = self.symbols.lock();

        // Check cache first
        if let Some(&addr) = symbols.get(name) {
            trace!("symbol '{}' served from cache", name);
            return Ok(addr);
        }

        // Safety: the address is only reinterpreted as a function pointer by a
        // thunk whose descriptor the caller vouched for.
        let symbol: Symbol<*const ()> = unsafe {
            self.library
                .get(name.as_bytes())
                .map_err(|e| self.symbol_error(name, e.to_string()))?
        };

        let addr = *symbol as usize;
        if addr == 0 {
            return Err(self.symbol_error(name, "symbol resolved to a null address".into()));
        }

        debug!(
            "resolved '{}' in '{}' at {:#x}",
            name,
            self.path.display(),
            addr
        );
        symbols.insert(name.to_string(), addr);
        Ok(addr)
    }

    /// Number of symbols resolved so far
    pub fn cached_symbols(&self) -> usize {
        self.symbols.lock().len()
    }

    fn symbol_error(&self, name: &str, reason: String) -> ProxyError {
        ProxyError::SymbolNotFound {
            symbol: name.to_string(),
            library: self.path.clone(),
            reason,
        }
    }
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .field("cached_symbols", &self.cached_symbols())
            .finish()
    }
}

/// An exported address together with the library that keeps it valid
#[derive(Clone)]
pub struct ResolvedSymbol {
    library: Arc<DynamicLibrary>,
    name: String,
    address: usize,
}

impl ResolvedSymbol {
    /// Resolve `name` in `library`, reusing the library's cache
    pub fn resolve(library: &Arc<DynamicLibrary>, name: &str) -> ProxyResult<Self> {
        let address = library.symbol_address(name)?;
        Ok(Self {
            library: Arc::clone(library),
            name: name.to_string(),
            address,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn library(&self) -> &Arc<DynamicLibrary> {
        &self.library
    }
}

impl fmt::Debug for ResolvedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{:#x} ({})",
            self.name,
            self.address,
            self.library.path().display()
        )
    }
}

/// Library loader with search paths
pub struct LibraryLoader {
    /// Search paths for libraries
    search_paths: Vec<PathBuf>,
    /// Whether loads of the same path share one handle
    share_libraries: bool,
    /// Live libraries by resolved path
    libraries: Mutex<HashMap<PathBuf, Weak<DynamicLibrary>>>,
}

impl LibraryLoader {
    /// Create a new library loader
    pub fn new() -> Self {
        Self {
            search_paths: default_search_paths(),
            share_libraries: true,
            libraries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a loader from configuration
    pub fn from_config(config: &LoaderConfig) -> Self {
        let mut loader = Self {
            search_paths: Vec::new(),
            share_libraries: config.share_libraries,
            libraries: Mutex::new(HashMap::new()),
        };
        for path in &config.search_paths {
            loader.add_search_path(path);
        }
        if config.include_default_paths {
            loader.search_paths.extend(default_search_paths());
        }
        loader
    }

    /// Add a search path
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !path.is_dir() {
            warn!("library search path '{}' is not a directory", path.display());
        }
        self.search_paths.push(path.to_path_buf());
    }

    /// Configured search paths in lookup order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find a library by name
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        // If it's already a path, check if it exists
        let path = Path::new(name);
        if path.exists() {
            return Some(path.to_path_buf());
        }

        // Construct library filename based on platform
        let lib_name = library_filename(name);

        self.search_paths
            .iter()
            .map(|dir| dir.join(&lib_name))
            .find(|candidate| candidate.exists())
    }

    /// Load a library by path or bare name.
    ///
    /// Anything that looks like a path is loaded as given. A bare name is
    /// looked up in the search paths and otherwise handed to the system loader.
    pub fn load(&self, name: impl AsRef<Path>) -> ProxyResult<Arc<DynamicLibrary>> {
        let requested = name.as_ref();
        let path = self.locate(requested);

        if !self.share_libraries {
            return DynamicLibrary::load(&path).map(Arc::new);
        }

        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        let mut libraries = self.libraries.lock();

        // Check if already loaded
        if let Some(lib) = libraries.get(&key).and_then(Weak::upgrade) {
            trace!("reusing loaded library '{}'", key.display());
            return Ok(lib);
        }

        let lib = Arc::new(DynamicLibrary::load(&path)?);
        libraries.retain(|_, weak| weak.strong_count() > 0);
        libraries.insert(key, Arc::downgrade(&lib));
        Ok(lib)
    }

    /// Paths of libraries that are currently loaded through this loader
    pub fn loaded_libraries(&self) -> Vec<PathBuf> {
        self.libraries
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn locate(&self, requested: &Path) -> PathBuf {
        let is_bare = requested.components().count() == 1 && !requested.exists();
        if !is_bare {
            return requested.to_path_buf();
        }
        let name = requested.to_string_lossy();
        self.find_library(&name)
            .unwrap_or_else(|| requested.to_path_buf())
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LibraryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryLoader")
            .field("search_paths", &self.search_paths)
            .field("share_libraries", &self.share_libraries)
            .finish()
    }
}

/// Get the default library search paths for this platform
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // Current directory
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    // Standard system paths
    #[cfg(target_os = "linux")]
    {
        // LD_LIBRARY_PATH
        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            paths.extend(std::env::split_paths(&ld_path));
        }

        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/lib"));
        paths.push(PathBuf::from("/usr/lib64"));
        paths.push(PathBuf::from("/lib64"));
    }

    #[cfg(target_os = "macos")]
    {
        // DYLD_LIBRARY_PATH
        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            paths.extend(std::env::split_paths(&dyld_path));
        }

        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));
        paths.push(PathBuf::from("/usr/lib"));
    }

    #[cfg(target_os = "windows")]
    {
        // PATH
        if let Ok(path) = std::env::var("PATH") {
            paths.extend(std::env::split_paths(&path));
        }
    }

    paths
}

/// Construct the platform-specific library filename
pub fn library_filename(name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{}.dll", name)
        }
    }

    #[cfg(target_os = "macos")]
    {
        if name.starts_with("lib") && name.ends_with(".dylib") {
            name.to_string()
        } else {
            format!("lib{}.dylib", name)
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if name.starts_with("lib") && name.contains(".so") {
            name.to_string()
        } else {
            format!("lib{}.so", name)
        }
    }
}
