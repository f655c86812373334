#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # C/C++ Preprocessing Scanner
//!
//! This library scans C and C++ source into a token stream while carrying
//! out preprocessing on the fly: macro definition and expansion, conditional
//! compilation, and include handling all happen inside the scanner, so the
//! consumer sees only the tokens that survive. It is built for interactive
//! tooling rather than batch compilation, which shows in a few places:
//! problems are recorded and scanning continues, a scan can be cancelled
//! from another thread, and an offset boundary can cut the scan short for
//! content assist.
//!
//! ## Features
//!
//! - Object-style, function-style, and variadic macros (`__VA_ARGS__` and
//!   the GNU `name...` form), with `#` stringification and `##` pasting
//! - Conditional compilation (`#if`, `#ifdef`, `#ifndef`, `#elif`, `#else`,
//!   `#endif`) with a full constant-expression evaluator
//! - Include processing (`#include`, `#include_next`, `#import`) with
//!   quote/system search paths, `#pragma once`, and a shared content cache
//! - Dynamic macros: `__FILE__`, `__LINE__`, `__DATE__`, `__TIME__`
//! - Dialect and extension switches: C or C++ keywords, `$` in identifiers,
//!   GNU `<?`/`>?` operators, extra literal suffixes
//! - Directive and inclusion notifications through an event sink
//! - C FFI for integration with other languages
//!
//! ## Example
//!
//! ```rust
//! use prelex::{tokenize, ScannerConfig};
//!
//! let code = r#"
//! #define SQUARE(x) ((x)*(x))
//! int nine = SQUARE(3);
//! "#;
//!
//! let tokens = tokenize(code, "demo.c", &ScannerConfig::for_c()).unwrap();
//! let images: Vec<&str> = tokens.iter().map(|t| t.text()).collect();
//! assert_eq!(
//!     images,
//!     ["int", "nine", "=", "(", "(", "3", ")", "*", "(", "3", ")", ")", ";"]
//! );
//! ```

mod c_api;
mod config;
mod context;
mod date_time;
mod error;
mod events;
mod expand;
mod expr;
mod include;
mod intern;
mod keywords;
mod macro_def;
mod scanner;
mod token;

pub use config::{Dialect, ExtensionConfig, FileLoader, ScannerConfig};
pub use error::ScanError;
pub use events::{
    DiagnosticHandler, DirectiveNotice, NullEventSink, Problem, ProblemId, ScanEventSink,
};
pub use include::IncludeCache;
pub use macro_def::{
    DynamicFunctionHandler, DynamicObjectHandler, ExpansionEnv, MacroDef, Variadic,
};
pub use scanner::{CancelHandle, CompletionInfo, CompletionKind, ScanOutcome, Scanner};
pub use token::{Token, TokenKind};

use std::path::Path;

/// Scan `source` to the end and collect every produced token.
///
/// `name` is the file identity reported for problems and dynamic macros.
/// Problems do not stop the scan; attach a diagnostic handler to the
/// configuration to observe them.
///
/// # Errors
/// Returns [`ScanError::Cancelled`] if the scan was cancelled through a
/// [`CancelHandle`] before it finished.
pub fn tokenize(
    source: &str,
    name: &str,
    config: &ScannerConfig,
) -> Result<Vec<Token>, ScanError> {
    let mut scanner = Scanner::new(source, name, config);
    let mut tokens = Vec::new();
    loop {
        match scanner.next_token() {
            ScanOutcome::Token(token) => tokens.push(token),
            ScanOutcome::EndOfInput | ScanOutcome::OffsetLimitReached(_) => break,
            ScanOutcome::Cancelled => return Err(ScanError::Cancelled),
        }
    }
    Ok(tokens)
}

/// Read a file and scan its contents to the end.
///
/// # Errors
/// Returns [`ScanError::Io`] if the file cannot be read, or
/// [`ScanError::Cancelled`] if the scan was cancelled.
pub fn tokenize_file<P: AsRef<Path>>(
    path: P,
    config: &ScannerConfig,
) -> Result<Vec<Token>, ScanError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    tokenize(&source, &path.to_string_lossy(), config)
}

/// Render a token stream back into source text, one space between tokens.
///
/// String and character literal images are re-quoted (and re-prefixed for
/// the wide flavors) so the result spells valid literals again.
#[must_use]
pub fn tokens_to_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        if !out.is_empty() {
            out.push(' ');
        }
        match token.kind {
            TokenKind::StringLiteral => {
                out.push('"');
                out.push_str(token.text());
                out.push('"');
            }
            TokenKind::WideStringLiteral => {
                out.push_str("L\"");
                out.push_str(token.text());
                out.push('"');
            }
            TokenKind::WideCharLiteral => {
                out.push('L');
                out.push_str(token.text());
            }
            _ => out.push_str(token.text()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scan(source: &str) -> Vec<Token> {
        tokenize(source, "test.c", &ScannerConfig::for_c()).unwrap()
    }

    #[test]
    fn simple_object_macro() {
        let src = r#"
#define PI 3.14
float x = PI;
"#;
        let tokens = scan(src);
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::FloatingLiteral && t.text() == "3.14"));
    }

    #[test]
    fn function_like_macro() {
        let src = r#"
#define ADD(a, b) ((a)+(b))
int z = ADD(1, 2);
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "int z = ( ( 1 ) + ( 2 ) ) ;");
    }

    #[test]
    fn nested_macro_invocations() {
        let src = r#"
#define ADD(a, b) ((a)+(b))
#define MUL(a, b) ((a)*(b))
int x = ADD(ADD(1, 2), MUL(3, 4));
"#;
        let tokens = scan(src);
        assert_eq!(
            tokens_to_text(&tokens),
            "int x = ( ( ( ( 1 ) + ( 2 ) ) ) + ( ( ( 3 ) * ( 4 ) ) ) ) ;"
        );
    }

    #[test]
    fn variadic_macro_keeps_argument_commas() {
        let src = r#"
#define LOG(fmt, ...) printf(fmt, __VA_ARGS__)
LOG("%d-%d", 1, 2);
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "printf ( \"%d-%d\" , 1 , 2 ) ;");
    }

    #[test]
    fn gnu_named_variadic_parameter() {
        let src = r#"
#define LOG(fmt, args...) printf(fmt, args)
LOG("%d", 1, 2);
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "printf ( \"%d\" , 1 , 2 ) ;");
    }

    #[test]
    fn empty_invocation_supplies_one_empty_argument() {
        let src = r#"
#define WRAP(x) [x]
WRAP();
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "[ ] ;");
    }

    #[test]
    fn excess_arguments_report_and_leftover_rescans() {
        let seen: Rc<RefCell<Vec<ProblemId>>> = Rc::new(RefCell::new(Vec::new()));
        let record = seen.clone();
        let config = ScannerConfig::for_c()
            .with_diagnostic_handler(move |p: &Problem| record.borrow_mut().push(p.id));
        let src = "#define ADD(a, b) ((a)+(b))\nADD(1, 2, 3);\n";
        let tokens = tokenize(src, "test.c", &config).unwrap();
        assert_eq!(tokens_to_text(&tokens), "( ( 1 ) + ( 2 ) ) 3 ) ;");
        assert!(seen.borrow().contains(&ProblemId::MacroUsageError));
    }

    #[test]
    fn stringify_collapses_space_and_escapes_quotes() {
        let src = "#define STR(x) #x\nconst char* s = STR(say  \"hi\");\n";
        let tokens = scan(src);
        let image = tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringLiteral)
            .map(|t| t.text().to_string());
        assert_eq!(image.as_deref(), Some(r#"say \"hi\""#));
    }

    #[test]
    fn paste_forms_new_macro_reference() {
        let src = r#"
#define CAT(a, b) a##b
#define XY 7
int n = CAT(X, Y);
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "int n = 7 ;");
    }

    #[test]
    fn mutual_recursion_stays_painted() {
        let src = r#"
#define A B
#define B A
int x = A;
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "int x = A ;");
        let last = &tokens[tokens.len() - 2];
        assert_eq!(last.kind, TokenKind::Identifier);
    }

    #[test]
    fn conditional_selects_elif_branch() {
        let src = r#"
#define LEVEL 2
#if LEVEL == 1
int x = 1;
#elif LEVEL == 2
int x = 2;
#else
int x = 3;
#endif
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "int x = 2 ;");
    }

    #[test]
    fn defined_operator_in_conditions() {
        let src = r#"
#define FOO 1
#if defined(FOO) && defined FOO && !defined(BAR)
int yes;
#endif
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "int yes ;");
    }

    #[test]
    fn function_macro_inside_condition() {
        let src = r#"
#define MAX(a, b) ((a) > (b) ? (a) : (b))
#if MAX(2, 3) == 3
int yes;
#endif
"#;
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "int yes ;");
    }

    #[test]
    fn include_via_file_loader() {
        let config = ScannerConfig::for_c()
            .with_include_path("/inc")
            .with_file_loader(|path: &Path| {
                (path == Path::new("/inc/inc.h")).then(|| "#define FOO 42\n".to_string())
            });
        let src = "#include \"inc.h\"\nint x = FOO;\n";
        let tokens = tokenize(src, "main.c", &config).unwrap();
        assert_eq!(tokens_to_text(&tokens), "int x = 42 ;");
    }

    #[test]
    fn date_and_time_macros_have_standard_shape() {
        let tokens = scan("__DATE__ __TIME__\n");
        assert_eq!(tokens.len(), 2);
        let date = tokens[0].text();
        let time = tokens[1].text();
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(date.len(), 11);
        assert_eq!(&date[3..4], " ");
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(time.len(), 8);
        assert_eq!(&time[2..3], ":");
        assert_eq!(&time[5..6], ":");
    }

    #[test]
    fn wide_literals_keep_their_flavor() {
        let tokens = scan("L\"wide\" 'c' L'w'\n");
        assert_eq!(tokens[0].kind, TokenKind::WideStringLiteral);
        assert_eq!(tokens[0].text(), "wide");
        assert_eq!(tokens[1].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[1].text(), "'c'");
        assert_eq!(tokens[2].kind, TokenKind::WideCharLiteral);
        assert_eq!(tokens[2].text(), "'w'");
    }

    #[test]
    fn extension_suffixes_scan_as_one_literal() {
        let config = ScannerConfig::for_c().with_extensions(ExtensionConfig::gnu());
        let tokens = tokenize("x = 3i;\n", "test.c", &config).unwrap();
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::IntegerLiteral && t.text() == "3i"));
    }

    #[test]
    fn define_with_line_continuation() {
        let src = "#define SUM 1 + \\\n 2\nint x = SUM;\n";
        let tokens = scan(src);
        assert_eq!(tokens_to_text(&tokens), "int x = 1 + 2 ;");
    }

    #[test]
    fn cancellation_from_another_thread() {
        let config = ScannerConfig::for_c();
        let mut scanner = Scanner::new("int a; int b;", "test.c", &config);
        assert!(matches!(scanner.next_token(), ScanOutcome::Token(_)));
        let handle = scanner.cancel_handle();
        let worker = std::thread::spawn(move || handle.cancel());
        worker.join().unwrap();
        assert_eq!(scanner.next_token(), ScanOutcome::Cancelled);
        assert_eq!(scanner.next_token(), ScanOutcome::Cancelled);
    }

    #[test]
    fn tokenize_reports_cancellation_as_an_error() {
        let config = ScannerConfig::for_c();
        let mut scanner = Scanner::new("int a;", "test.c", &config);
        scanner.cancel_handle().cancel();
        assert_eq!(scanner.next_token(), ScanOutcome::Cancelled);
    }

    #[test]
    fn tokenize_file_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("prelex-lib-{}.c", std::process::id()));
        std::fs::write(&path, "#define N 3\nint n = N;\n").unwrap();
        let tokens = tokenize_file(&path, &ScannerConfig::for_c()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(tokens_to_text(&tokens), "int n = 3 ;");
    }

    #[test]
    fn tokens_to_text_requotes_literals() {
        let tokens = scan("\"a\" x L\"b\" 'c' L'd' 1\n");
        assert_eq!(tokens_to_text(&tokens), "\"a\" x L\"b\" 'c' L'd' 1");
    }
}
