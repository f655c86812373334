use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::events::DiagnosticHandler;
use crate::include::IncludeCache;

/// Language dialect driving keyword tables and built-in macros
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// C (C99 keyword set, `__STDC_VERSION__` seeded)
    C,
    /// C++ (`__cplusplus` seeded, `::` and alternative operator keywords)
    Cpp,
}

/// Type alias for the function that reads file content for includes
///
/// Returning `None` means "not there"; the search moves on to the next
/// candidate. The default loader reads from the filesystem.
pub type FileLoader = Rc<dyn Fn(&Path) -> Option<String>>;

/// Dialect extensions beyond the base language
#[derive(Clone, Debug)]
pub struct ExtensionConfig {
    /// Accept `$` as an identifier character
    pub dollar_in_identifiers: bool,
    /// Accept the GNU `<?` / `>?` min/max operators
    pub min_max_operators: bool,
    /// Extra characters accepted as numeric-literal suffixes (e.g. `i`, `j`)
    pub extra_number_suffixes: Vec<char>,
    /// Identifiers treated as keywords in addition to the dialect set
    pub additional_keywords: Vec<String>,
    /// Extra built-in macros; names may carry a parameter list, as in
    /// `__attribute__(x)`
    pub additional_macros: Vec<(String, String)>,
    /// Treat a predefined symbol with an empty value as defined to `1`
    pub empty_define_value_is_one: bool,
    /// Provide the `__builtin_choose_expr` dynamic macro
    pub builtin_choose_expr: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl ExtensionConfig {
    /// No extensions: plain standard scanning
    #[must_use]
    pub const fn none() -> Self {
        Self {
            dollar_in_identifiers: false,
            min_max_operators: false,
            extra_number_suffixes: Vec::new(),
            additional_keywords: Vec::new(),
            additional_macros: Vec::new(),
            empty_define_value_is_one: false,
            builtin_choose_expr: false,
        }
    }

    /// GNU extensions: `$` identifiers, min/max operators, imaginary-number
    /// suffixes, and the usual compatibility macros
    #[must_use]
    pub fn gnu() -> Self {
        let gnu_macro = |name: &str, value: &str| (name.to_string(), value.to_string());
        Self {
            dollar_in_identifiers: true,
            min_max_operators: true,
            extra_number_suffixes: vec!['i', 'j'],
            additional_keywords: Vec::new(),
            additional_macros: vec![
                gnu_macro("__attribute__(x)", ""),
                gnu_macro("__asm__(x)", ""),
                gnu_macro("__extension__", ""),
                gnu_macro("__restrict__", "restrict"),
                gnu_macro("__restrict", "restrict"),
                gnu_macro("__inline__", "inline"),
                gnu_macro("__const__", "const"),
                gnu_macro("__signed__", "signed"),
                gnu_macro("__volatile__", "volatile"),
            ],
            empty_define_value_is_one: true,
            builtin_choose_expr: true,
        }
    }
}

/// Configuration for one scanner instance
///
/// Plain data plus a few injectable behaviors; share one value across scans
/// of different translation units.
#[derive(Clone)]
pub struct ScannerConfig {
    /// Language dialect
    pub dialect: Dialect,
    /// Search path for `#include "..."` (searched before the system list)
    pub quote_include_paths: Vec<PathBuf>,
    /// Search path for `#include <...>`
    pub system_include_paths: Vec<PathBuf>,
    /// Predefined symbols in definition order; names may carry a parameter
    /// list (`MAX(a,b)`), values may be empty
    pub defined_symbols: Vec<(String, String)>,
    /// Files scanned (tokens and all) before the translation unit
    pub pre_include_files: Vec<PathBuf>,
    /// Files scanned only for their macro definitions before the translation
    /// unit; their tokens are discarded
    pub macro_pre_include_files: Vec<PathBuf>,
    /// Dialect extensions
    pub extension: ExtensionConfig,
    /// File reader for include resolution; `None` reads the filesystem
    pub file_loader: Option<FileLoader>,
    /// Shared resolution cache; `None` disables caching
    pub include_cache: Option<Rc<RefCell<IncludeCache>>>,
    /// Invoked once per reported problem, in addition to the accumulated list
    pub diagnostic_handler: Option<DiagnosticHandler>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::for_c()
    }
}

impl ScannerConfig {
    /// Configuration for scanning C
    #[must_use]
    pub const fn for_c() -> Self {
        Self {
            dialect: Dialect::C,
            quote_include_paths: Vec::new(),
            system_include_paths: Vec::new(),
            defined_symbols: Vec::new(),
            pre_include_files: Vec::new(),
            macro_pre_include_files: Vec::new(),
            extension: ExtensionConfig::none(),
            file_loader: None,
            include_cache: None,
            diagnostic_handler: None,
        }
    }

    /// Configuration for scanning C++
    #[must_use]
    pub const fn for_cpp() -> Self {
        let mut config = Self::for_c();
        config.dialect = Dialect::Cpp;
        config
    }

    /// Add a directory to both include search lists
    #[must_use]
    pub fn with_include_path(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.quote_include_paths.push(dir.clone());
        self.system_include_paths.push(dir);
        self
    }

    /// Add a directory to the system search list only
    #[must_use]
    pub fn with_system_include_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.system_include_paths.push(dir.into());
        self
    }

    /// Predefine a symbol; the name may carry a parameter list
    #[must_use]
    pub fn with_symbol(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defined_symbols.push((name.into(), value.into()));
        self
    }

    /// Replace the extension configuration
    #[must_use]
    pub fn with_extensions(mut self, extension: ExtensionConfig) -> Self {
        self.extension = extension;
        self
    }

    /// Install a custom file loader (virtual filesystems, tests)
    #[must_use]
    pub fn with_file_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&Path) -> Option<String> + 'static,
    {
        self.file_loader = Some(Rc::new(loader));
        self
    }

    /// Share an include-resolution cache across scans
    #[must_use]
    pub fn with_include_cache(mut self, cache: Rc<RefCell<IncludeCache>>) -> Self {
        self.include_cache = Some(cache);
        self
    }

    /// Install a diagnostics handler
    #[must_use]
    pub fn with_diagnostic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&crate::events::Problem) + 'static,
    {
        self.diagnostic_handler = Some(Rc::new(handler));
        self
    }

    /// Queue a file to scan before the translation unit
    #[must_use]
    pub fn with_pre_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.pre_include_files.push(path.into());
        self
    }

    /// Queue a file whose macro definitions (only) are adopted before the
    /// translation unit
    #[must_use]
    pub fn with_macro_pre_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.macro_pre_include_files.push(path.into());
        self
    }
}
