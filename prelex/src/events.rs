use std::fmt;
use std::rc::Rc;

/// Identifier of a recoverable problem reported during scanning
///
/// Problems never abort a scan; the engine recovers and keeps producing
/// tokens. Each carries the offset where it was detected and, where useful,
/// an argument span (the bad character, the missing file, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemId {
    /// Byte that cannot start any token
    BadCharacter,
    /// String or character literal ended by a newline or end of buffer
    UnterminatedString,
    /// Malformed floating-point literal (two dots, bad exponent)
    BadFloatingLiteral,
    /// `0x` with no hex digits following
    BadHexLiteral,
    /// Octal-looking literal containing `8` or `9`
    BadOctalLiteral,
    /// Lone `=` in a conditional expression
    AssignmentInCondition,
    /// Constant expression that does not parse
    ExpressionSyntaxError,
    /// Division or modulo by zero in a constant expression
    DivisionByZero,
    /// Unknown or malformed directive keyword
    InvalidDirective,
    /// `#define` without a valid macro name or parameter list
    InvalidMacroDefinition,
    /// Parameter list not closed before end of line
    MissingClosingParen,
    /// `__VA_ARGS__` in the body of a non-variadic macro
    InvalidVaArgs,
    /// `#` in a function-like macro body not followed by a parameter
    MacroPastingError,
    /// `#elif`/`#else`/`#endif` without a matching `#if`
    UnbalancedConditional,
    /// `#error` directive reached
    PoundError,
    /// `#warning` directive reached
    PoundWarning,
    /// Include file not found on any search path
    InclusionNotFound,
    /// Macro invoked with the wrong number of arguments
    MacroUsageError,
}

impl ProblemId {
    /// Short human-readable description
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            ProblemId::BadCharacter => "bad character",
            ProblemId::UnterminatedString => "unterminated literal",
            ProblemId::BadFloatingLiteral => "malformed floating-point literal",
            ProblemId::BadHexLiteral => "malformed hex literal",
            ProblemId::BadOctalLiteral => "malformed octal literal",
            ProblemId::AssignmentInCondition => "assignment not allowed in constant expression",
            ProblemId::ExpressionSyntaxError => "constant expression syntax error",
            ProblemId::DivisionByZero => "division by zero in constant expression",
            ProblemId::InvalidDirective => "invalid preprocessor directive",
            ProblemId::InvalidMacroDefinition => "invalid macro definition",
            ProblemId::MissingClosingParen => "missing ')' in macro parameter list",
            ProblemId::InvalidVaArgs => "__VA_ARGS__ outside a variadic macro",
            ProblemId::MacroPastingError => "'#' is not followed by a macro parameter",
            ProblemId::UnbalancedConditional => "unbalanced conditional directive",
            ProblemId::PoundError => "#error",
            ProblemId::PoundWarning => "#warning",
            ProblemId::InclusionNotFound => "inclusion not found",
            ProblemId::MacroUsageError => "macro invoked with wrong number of arguments",
        }
    }
}

/// One recoverable problem: id, offset in the buffer that was being scanned,
/// optional argument text, and the file the buffer came from
#[derive(Clone, Debug)]
pub struct Problem {
    /// What went wrong
    pub id: ProblemId,
    /// Character offset within the enclosing file buffer
    pub offset: usize,
    /// Argument span, e.g. the offending character or filename
    pub argument: Option<String>,
    /// File identity of the buffer being scanned
    pub file: Rc<str>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.offset, self.id.describe())?;
        if let Some(arg) = &self.argument {
            write!(f, ": {arg}")?;
        }
        Ok(())
    }
}

/// Type alias for a diagnostics handler invoked once per problem
pub type DiagnosticHandler = Rc<dyn Fn(&Problem)>;

/// One notification per processed preprocessor directive
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectiveNotice<'a> {
    /// `#if`, with the evaluated outcome
    If {
        /// Whether the branch was taken
        taken: bool,
        /// Offset of the directive
        offset: usize,
    },
    /// `#ifdef`
    Ifdef {
        /// Tested macro name
        name: &'a str,
        /// Whether the branch was taken
        taken: bool,
        /// Offset of the directive
        offset: usize,
    },
    /// `#ifndef`
    Ifndef {
        /// Tested macro name
        name: &'a str,
        /// Whether the branch was taken
        taken: bool,
        /// Offset of the directive
        offset: usize,
    },
    /// `#elif`, with the evaluated outcome
    Elif {
        /// Whether the branch was taken
        taken: bool,
        /// Offset of the directive
        offset: usize,
    },
    /// `#else`
    Else {
        /// Whether the branch was taken
        taken: bool,
        /// Offset of the directive
        offset: usize,
    },
    /// `#endif`
    Endif {
        /// Offset of the directive
        offset: usize,
    },
    /// `#define`
    Define {
        /// Defined macro name
        name: &'a str,
        /// Offset of the directive
        offset: usize,
    },
    /// `#undef`
    Undef {
        /// Undefined macro name
        name: &'a str,
        /// Whether a definition was actually removed
        removed: bool,
        /// Offset of the directive
        offset: usize,
    },
    /// `#pragma`; the body is passed through uninterpreted
    Pragma {
        /// Rest of the line
        body: &'a str,
        /// Offset of the directive
        offset: usize,
    },
    /// `#error`
    Error {
        /// Rest of the line
        message: &'a str,
        /// Offset of the directive
        offset: usize,
    },
    /// `#warning`
    Warning {
        /// Rest of the line
        message: &'a str,
        /// Offset of the directive
        offset: usize,
    },
    /// `#line` or a GNU numeric line marker; parsed but not applied
    Line {
        /// Rest of the line
        body: &'a str,
        /// Offset of the directive
        offset: usize,
    },
}

/// Location-tracking collaborator
///
/// Receives ordered notifications as the scan proceeds so a client can
/// reconstruct source mapping after the fact. All methods default to no-ops;
/// implement only what you need.
pub trait ScanEventSink {
    /// The outermost buffer was installed
    fn translation_unit_start(&mut self, _name: &str) {}
    /// The scan reached end of input
    fn translation_unit_end(&mut self) {}
    /// An include was resolved and its buffer pushed
    fn inclusion_start(&mut self, _path: &str, _system: bool, _offset: usize) {}
    /// An included buffer was exhausted and popped
    fn inclusion_end(&mut self, _path: &str) {}
    /// An `#include` inside a skipped conditional branch (not followed)
    fn inactive_inclusion(&mut self, _spelled: &str, _offset: usize) {}
    /// A macro expansion buffer was pushed; `parameters` is set for
    /// function-style macros
    fn expansion_start(
        &mut self,
        _name: &str,
        _parameters: Option<&[String]>,
        _start: usize,
        _end: usize,
    ) {
    }
    /// A macro expansion buffer was exhausted and popped
    fn expansion_end(&mut self, _name: &str) {}
    /// One directive was processed
    fn directive(&mut self, _notice: &DirectiveNotice<'_>) {}
}

/// Sink that ignores every event
pub struct NullEventSink;

impl ScanEventSink for NullEventSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_display() {
        let p = Problem {
            id: ProblemId::InclusionNotFound,
            offset: 12,
            argument: Some("missing.h".to_string()),
            file: Rc::from("main.c"),
        };
        assert_eq!(p.to_string(), "main.c:12: inclusion not found: missing.h");
    }
}
