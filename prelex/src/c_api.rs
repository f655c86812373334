use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use crate::config::{ExtensionConfig, ScannerConfig};
use crate::scanner::{ScanOutcome, Scanner};
use crate::token::TokenKind;
use crate::tokens_to_text;

/// C-friendly configuration struct for the scanner
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct prelex_config {
    /// Dialect: 0=C, 1=C++
    pub dialect: c_int,
    /// Nonzero enables the GNU extension set ($-identifiers, `<?`/`>?`,
    /// `i`/`j` literal suffixes, compiler builtins)
    pub gnu_extensions: c_int,
    /// Problem handler callback (optional, can be null); receives one
    /// formatted message per recorded problem
    pub problem_handler: Option<extern "C" fn(*const c_char)>,
}

/// Typedef for prelex_config
#[allow(non_camel_case_types)]
pub type prelex_config_t = prelex_config;

/// Convert C config to Rust config with validation
fn scanner_config_from_c(config: &prelex_config_t) -> Result<ScannerConfig, &'static str> {
    let mut rust_config = match config.dialect {
        0 => ScannerConfig::for_c(),
        1 => ScannerConfig::for_cpp(),
        _ => return Err("Invalid dialect value"),
    };
    if config.gnu_extensions != 0 {
        rust_config = rust_config.with_extensions(ExtensionConfig::gnu());
    }
    if let Some(handler) = config.problem_handler {
        rust_config = rust_config.with_diagnostic_handler(move |problem| {
            let message = match CString::new(problem.to_string()) {
                Ok(s) => s,
                Err(_) => return,
            };
            handler(message.as_ptr());
        });
    }
    Ok(rust_config)
}

const fn token_kind_code(kind: TokenKind) -> c_int {
    match kind {
        TokenKind::Identifier => 0,
        TokenKind::Keyword => 1,
        TokenKind::Operator => 2,
        TokenKind::IntegerLiteral => 3,
        TokenKind::FloatingLiteral => 4,
        TokenKind::StringLiteral => 5,
        TokenKind::WideStringLiteral => 6,
        TokenKind::CharLiteral => 7,
        TokenKind::WideCharLiteral => 8,
        TokenKind::Completion => 9,
        TokenKind::EndOfCompletion => 10,
    }
}

/// Create a new scanner over a source buffer for the C API
///
/// # Safety
/// - `source` must point to a valid null-terminated C string
/// - `name` may be null, in which case a placeholder file name is used
/// - If `config` is null, the default C configuration is used
/// - The returned pointer must be freed with `prelex_scanner_free`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn prelex_scanner_new(
    source: *const c_char,
    name: *const c_char,
    config: *const prelex_config_t,
) -> *mut Scanner {
    if source.is_null() {
        return std::ptr::null_mut();
    }
    let source_str = unsafe { CStr::from_ptr(source).to_str().unwrap_or("") };
    let name_str = if name.is_null() {
        "<buffer>"
    } else {
        unsafe { CStr::from_ptr(name).to_str().unwrap_or("<buffer>") }
    };
    let rust_config = if config.is_null() {
        ScannerConfig::for_c()
    } else {
        let c_config = unsafe { &*config };
        match scanner_config_from_c(c_config) {
            Ok(rust_config) => rust_config,
            Err(_) => return std::ptr::null_mut(), // Invalid config
        }
    };
    Box::into_raw(Box::new(Scanner::new(source_str, name_str, &rust_config)))
}

/// Free a scanner instance created by the C API
///
/// # Safety
/// The pointer must have been created by `prelex_scanner_new` and not
/// already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn prelex_scanner_free(scanner: *mut Scanner) {
    if !scanner.is_null() {
        unsafe {
            drop(Box::from_raw(scanner));
        }
    }
}

/// Produce the next token (C API)
///
/// Writes the token's kind code to `out_kind` (0=identifier, 1=keyword,
/// 2=operator, 3=integer, 4=float, 5=string, 6=wide string, 7=char,
/// 8=wide char, 9=completion, 10=end-of-completion) and returns its text
/// image. Returns null once the scan is over, whether it ran to the end,
/// hit a configured boundary, or was cancelled.
///
/// # Safety
/// - The `scanner` pointer must be valid and created by `prelex_scanner_new`
/// - `out_kind` may be null if the caller does not need the kind
/// - The returned string must be freed with `prelex_free_result`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn prelex_scanner_next(
    scanner: *mut Scanner,
    out_kind: *mut c_int,
) -> *mut c_char {
    if scanner.is_null() {
        return std::ptr::null_mut();
    }
    let scanner = unsafe { &mut *scanner };
    match scanner.next_token() {
        ScanOutcome::Token(token) => {
            if !out_kind.is_null() {
                unsafe {
                    *out_kind = token_kind_code(token.kind);
                }
            }
            match CString::new(token.text()) {
                Ok(cstr) => cstr.into_raw(),
                Err(_) => std::ptr::null_mut(),
            }
        }
        ScanOutcome::EndOfInput
        | ScanOutcome::OffsetLimitReached(_)
        | ScanOutcome::Cancelled => std::ptr::null_mut(),
    }
}

/// Scan a whole buffer and return the surviving tokens as one line of
/// text (C API)
///
/// # Safety
/// - `source` must point to a valid null-terminated C string
/// - If `config` is null, the default C configuration is used
/// - The returned string must be freed with `prelex_free_result`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn prelex_scan_to_text(
    source: *const c_char,
    config: *const prelex_config_t,
) -> *mut c_char {
    let scanner = unsafe { prelex_scanner_new(source, std::ptr::null(), config) };
    if scanner.is_null() {
        return std::ptr::null_mut();
    }
    let mut tokens = Vec::new();
    {
        let scanner = unsafe { &mut *scanner };
        while let ScanOutcome::Token(token) = scanner.next_token() {
            tokens.push(token);
        }
    }
    unsafe {
        prelex_scanner_free(scanner);
    }
    match CString::new(tokens_to_text(&tokens)) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a string returned by the C API
///
/// # Safety
/// The pointer must have been returned by `prelex_scanner_next` or
/// `prelex_scan_to_text` and not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn prelex_free_result(result: *mut c_char) {
    if !result.is_null() {
        unsafe {
            drop(CString::from_raw(result));
        }
    }
}
