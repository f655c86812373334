#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Prelex CLI
//!
//! A command-line interface for the prelex C/C++ preprocessing scanner
//! library.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use prelex::{ExtensionConfig, Problem, ScannerConfig, Token, TokenKind};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit codes for different error conditions
mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const IO_ERROR: i32 = 2;
    pub const SCAN_ERROR: i32 = 3;
    #[allow(dead_code)]
    pub const ARGUMENT_ERROR: i32 = 4;
}

/// Command-line interface for the prelex preprocessing scanner
#[derive(Parser)]
#[command(
    name = "prelex",
    version,
    author,
    about = "A C/C++ preprocessing scanner in Rust",
    long_about = "prelex scans C/C++ source into a preprocessed token stream: macros are \
expanded, conditionals resolved, and includes followed, all in one pass.",
    after_help = "EXAMPLES:
  # Scan a file and print the preprocessed text
  $ prelex input.c

  # Scan C++ with the GNU extension set
  $ prelex input.cpp --dialect cpp --gnu

  # Scan with include directories and predefined symbols
  $ prelex input.c -I include -I /usr/include -D DEBUG -D LEVEL=2

  # Read from stdin, list one token per line
  $ cat input.c | prelex - --tokens

  # Verbose scan with problem reporting
  $ prelex input.c -v"
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Input file to scan (use '-' for stdin)
    #[arg(help = "Input C/C++ file to scan (use '-' for stdin)")]
    input: PathBuf,

    /// Output file (use '-' for stdout, default: stdout)
    #[arg(
        short = 'o',
        long,
        help = "Output file (use '-' for stdout, default: stdout)"
    )]
    output: Option<PathBuf>,

    /// Language dialect
    #[arg(
        short = 'd',
        long,
        value_enum,
        default_value = "c",
        help = "Language dialect selecting the keyword table"
    )]
    dialect: DialectValue,

    /// Enable the GNU extension set
    #[arg(
        long,
        help = "Enable GNU extensions ($-identifiers, <?/>? operators, compiler builtins)"
    )]
    gnu: bool,

    /// Add include directory
    #[arg(
        short = 'I',
        long = "include",
        value_name = "DIR",
        help = "Add directory to the include search path"
    )]
    include_dirs: Vec<PathBuf>,

    /// Add system include directory
    #[arg(
        long = "isystem",
        value_name = "DIR",
        help = "Add directory to the system include search path"
    )]
    system_include_dirs: Vec<PathBuf>,

    /// Predefine a symbol
    #[arg(
        short = 'D',
        long = "define",
        value_name = "NAME[=VALUE]",
        help = "Predefine NAME as VALUE (as 1 if VALUE is omitted)"
    )]
    defines: Vec<String>,

    /// Scan a file before the input
    #[arg(
        long = "pre-include",
        value_name = "FILE",
        help = "Scan FILE before the input, tokens included"
    )]
    pre_includes: Vec<PathBuf>,

    /// Adopt macros from a file before the input
    #[arg(
        long = "imacros",
        value_name = "FILE",
        help = "Adopt macro definitions from FILE before the input, discarding its tokens"
    )]
    macro_pre_includes: Vec<PathBuf>,

    /// List tokens one per line instead of reconstructed text
    #[arg(long, help = "List one token per line with its kind tag")]
    tokens: bool,

    /// Output in JSON format
    #[arg(long, help = "Output the token stream and problems in JSON format")]
    #[cfg(feature = "json")]
    json: bool,

    /// Enable verbose output
    #[arg(
        short = 'v',
        long,
        help = "Enable verbose output with diagnostic information"
    )]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short = 'q', long, help = "Suppress non-error output (quiet mode)")]
    quiet: bool,

    /// Show what would happen without scanning
    #[arg(
        short = 'n',
        long,
        help = "Show what would happen without actually scanning"
    )]
    dry_run: bool,

    /// Disable colored output
    #[arg(long, help = "Disable colored output")]
    no_color: bool,

    /// Force colored output
    #[arg(long, help = "Force colored output even when not a terminal")]
    force_color: bool,
}

/// Language dialect values for CLI
#[derive(Clone, Copy, Debug, ValueEnum)]
enum DialectValue {
    C,
    Cpp,
}

/// Global flag to track if any problems were reported
static PROBLEMS_REPORTED: AtomicBool = AtomicBool::new(false);

/// Main application entry point
fn main() {
    std::process::exit(match run() {
        Ok(()) => {
            if PROBLEMS_REPORTED.load(Ordering::Relaxed) {
                exit_code::SCAN_ERROR
            } else {
                exit_code::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            determine_exit_code(&e)
        }
    });
}

/// Determine the appropriate exit code based on the error
fn determine_exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<std::io::Error>().is_some() {
        exit_code::IO_ERROR
    } else if error.downcast_ref::<prelex::ScanError>().is_some() {
        exit_code::SCAN_ERROR
    } else {
        exit_code::GENERAL_ERROR
    }
}

/// Run the main application logic
fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli);
    init_color(&cli);

    // Validate arguments
    validate_args(&cli)?;

    // Show dry run information and exit
    if cli.dry_run {
        show_dry_run_info(&cli);
        return Ok(());
    }

    // Read input
    let input_content = read_input(&cli.input)?;
    let input_name = scan_name(&cli.input);

    // Create scanner configuration, collecting problems as they are reported
    let problems: Rc<RefCell<Vec<Problem>>> = Rc::new(RefCell::new(Vec::new()));
    let record = problems.clone();
    let config = create_config(&cli).with_diagnostic_handler(move |problem: &Problem| {
        PROBLEMS_REPORTED.store(true, Ordering::Relaxed);
        record.borrow_mut().push(problem.clone());
    });

    // Scan the input
    let start_time = std::time::Instant::now();
    let tokens = prelex::tokenize(&input_content, &input_name, &config)
        .with_context(|| format!("Failed to scan {input_name}"))?;
    let processing_time = start_time.elapsed();

    // Render and write output
    let rendered = render_output(&cli, &tokens, &problems.borrow())?;
    write_output(&cli, &rendered)?;

    // Report problems on stderr
    if !cli.quiet {
        for problem in problems.borrow().iter() {
            eprintln!("{} {problem}", "problem:".yellow().bold());
        }
    }

    // Show verbose information
    if cli.verbose {
        show_verbose_info(&cli, tokens.len(), processing_time);
    }

    Ok(())
}

/// Initialize the logger, honoring `RUST_LOG` over the verbosity flags
fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Initialize colored output based on flags and the terminal
fn init_color(cli: &Cli) {
    if cli.no_color {
        colored::control::set_override(false);
    } else if cli.force_color {
        colored::control::set_override(true);
    } else if !atty::is(atty::Stream::Stderr) {
        colored::control::set_override(false);
    }
}

/// Validate command-line arguments
fn validate_args(cli: &Cli) -> Result<()> {
    // Check that input and output are not the same file
    if let Some(output) = &cli.output
        && output != &PathBuf::from("-")
        && std::fs::canonicalize(output).ok() == std::fs::canonicalize(&cli.input).ok()
    {
        return Err(anyhow::anyhow!(
            "Input and output files cannot be the same: {}",
            output.display()
        ));
    }

    Ok(())
}

/// Show dry run information
fn show_dry_run_info(cli: &Cli) {
    let input_display = format_input(&cli.input);
    let output_display = cli
        .output
        .as_ref()
        .map_or("stdout".to_string(), format_output);

    eprintln!("Dry run: would scan {input_display} -> {output_display}");
    eprintln!("Dialect: {}", format_dialect(cli.dialect));
    eprintln!("GNU extensions: {}", if cli.gnu { "on" } else { "off" });

    if !cli.include_dirs.is_empty() {
        eprintln!("Include directories:");
        for dir in &cli.include_dirs {
            eprintln!("  {}", dir.display());
        }
    }
    if !cli.defines.is_empty() {
        eprintln!("Predefined symbols:");
        for define in &cli.defines {
            eprintln!("  {define}");
        }
    }
}

/// Create scanner configuration from CLI arguments
fn create_config(cli: &Cli) -> ScannerConfig {
    let mut config = match cli.dialect {
        DialectValue::C => ScannerConfig::for_c(),
        DialectValue::Cpp => ScannerConfig::for_cpp(),
    };
    if cli.gnu {
        config = config.with_extensions(ExtensionConfig::gnu());
    }
    for dir in &cli.include_dirs {
        config = config.with_include_path(dir.clone());
    }
    for dir in &cli.system_include_dirs {
        config = config.with_system_include_path(dir.clone());
    }
    for define in &cli.defines {
        let (name, value) = split_define(define);
        config = config.with_symbol(name, value);
    }
    for file in &cli.pre_includes {
        config = config.with_pre_include(file.clone());
    }
    for file in &cli.macro_pre_includes {
        config = config.with_macro_pre_include(file.clone());
    }
    config
}

/// Split a `-D` argument into name and value; a bare name defines as `1`
fn split_define(define: &str) -> (String, String) {
    match define.split_once('=') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (define.to_string(), "1".to_string()),
    }
}

/// Read input from file or stdin
fn read_input(input_path: &PathBuf) -> Result<String> {
    if input_path == &PathBuf::from("-") {
        // Read from stdin
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else {
        // Read from file
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input file: {}", input_path.display()))
    }
}

/// File identity reported for problems and dynamic macros
fn scan_name(input_path: &PathBuf) -> String {
    if input_path == &PathBuf::from("-") {
        "<stdin>".to_string()
    } else {
        input_path.display().to_string()
    }
}

/// Render the token stream in the selected output format
fn render_output(cli: &Cli, tokens: &[Token], problems: &[Problem]) -> Result<String> {
    #[cfg(feature = "json")]
    if cli.json {
        return render_json_output(cli, tokens, problems);
    }
    #[cfg(not(feature = "json"))]
    let _ = problems;

    if cli.tokens {
        let mut out = String::new();
        for token in tokens {
            out.push_str(kind_name(token.kind));
            out.push('\t');
            out.push_str(token.text());
            out.push('\n');
        }
        return Ok(out);
    }

    let mut text = prelex::tokens_to_text(tokens);
    text.push('\n');
    Ok(text)
}

/// Render JSON output
#[cfg(feature = "json")]
fn render_json_output(cli: &Cli, tokens: &[Token], problems: &[Problem]) -> Result<String> {
    use serde_json::json;

    #[derive(serde::Serialize)]
    struct TokenRecord<'a> {
        kind: &'static str,
        text: &'a str,
    }

    let records: Vec<TokenRecord<'_>> = tokens
        .iter()
        .map(|token| TokenRecord {
            kind: kind_name(token.kind),
            text: token.text(),
        })
        .collect();

    let result = json!({
        "success": true,
        "input_file": format_input(&cli.input),
        "output_file": cli.output.as_ref().map(format_output),
        "dialect": format_dialect(cli.dialect),
        "token_count": tokens.len(),
        "tokens": records,
        "problems": problems.iter().map(ToString::to_string).collect::<Vec<_>>(),
    });

    let mut out = serde_json::to_string_pretty(&result)?;
    out.push('\n');
    Ok(out)
}

/// Write output to file or stdout
fn write_output(cli: &Cli, content: &str) -> Result<()> {
    match &cli.output {
        Some(output_path) if output_path != &PathBuf::from("-") => {
            std::fs::write(output_path, content).with_context(|| {
                format!("Failed to write to output file: {}", output_path.display())
            })?;
        }
        _ => {
            // Write to stdout
            print!("{content}");
        }
    }

    Ok(())
}

/// Show verbose information
fn show_verbose_info(cli: &Cli, token_count: usize, processing_time: std::time::Duration) {
    if cli.quiet {
        return;
    }

    eprintln!("Dialect: {}", format_dialect(cli.dialect));
    eprintln!("Tokens produced: {token_count}");
    eprintln!("Processing time: {processing_time:?}");

    if !cli.include_dirs.is_empty() {
        eprintln!("Include directories ({}):", cli.include_dirs.len());
        for dir in &cli.include_dirs {
            eprintln!("  {}", dir.display());
        }
    }
}

/// Format input path for display
fn format_input(path: &PathBuf) -> String {
    if path == &PathBuf::from("-") {
        "stdin".to_string()
    } else {
        path.display().to_string()
    }
}

/// Format output path for display
fn format_output(path: &PathBuf) -> String {
    if path == &PathBuf::from("-") {
        "stdout".to_string()
    } else {
        path.display().to_string()
    }
}

/// Format dialect for display
fn format_dialect(dialect: DialectValue) -> String {
    match dialect {
        DialectValue::C => "C".to_string(),
        DialectValue::Cpp => "C++".to_string(),
    }
}

/// Stable lowercase tag for a token kind
const fn kind_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Identifier => "identifier",
        TokenKind::Keyword => "keyword",
        TokenKind::Operator => "operator",
        TokenKind::IntegerLiteral => "integer",
        TokenKind::FloatingLiteral => "float",
        TokenKind::StringLiteral => "string",
        TokenKind::WideStringLiteral => "wide-string",
        TokenKind::CharLiteral => "char",
        TokenKind::WideCharLiteral => "wide-char",
        TokenKind::Completion => "completion",
        TokenKind::EndOfCompletion => "end-of-completion",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_splitting() {
        assert_eq!(
            split_define("DEBUG"),
            ("DEBUG".to_string(), "1".to_string())
        );
        assert_eq!(
            split_define("LEVEL=2"),
            ("LEVEL".to_string(), "2".to_string())
        );
        assert_eq!(
            split_define("PAIR=a=b"),
            ("PAIR".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn scan_names() {
        assert_eq!(scan_name(&PathBuf::from("-")), "<stdin>");
        assert_eq!(scan_name(&PathBuf::from("src/a.c")), "src/a.c");
    }
}
