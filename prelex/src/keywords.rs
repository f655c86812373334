use std::collections::HashSet;
use std::sync::LazyLock;

use crate::config::Dialect;

/// C keywords (C99, `inline` and `restrict` included).
const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary",
];

/// C++ keywords, alternative operator spellings included.
const CPP_KEYWORDS: &[&str] = &[
    "asm", "auto", "bool", "break", "case", "catch", "char", "class", "const", "const_cast",
    "continue", "default", "delete", "do", "double", "dynamic_cast", "else", "enum", "explicit",
    "export", "extern", "false", "float", "for", "friend", "goto", "if", "inline", "int", "long",
    "mutable", "namespace", "new", "operator", "private", "protected", "public", "register",
    "reinterpret_cast", "restrict", "return", "short", "signed", "sizeof", "static",
    "static_cast", "struct", "switch", "template", "this", "throw", "true", "try", "typedef",
    "typeid", "typename", "union", "unsigned", "using", "virtual", "void", "volatile", "wchar_t",
    "while", "and", "and_eq", "bitand", "bitor", "compl", "not", "not_eq", "or", "or_eq", "xor",
    "xor_eq",
];

/// Directive keywords recognized after a line-leading `#`.
const DIRECTIVES: &[&str] = &[
    "define", "undef", "if", "ifdef", "ifndef", "elif", "else", "endif", "include",
    "include_next", "import", "error", "warning", "pragma", "line",
];

static C_KEYWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| C_KEYWORDS.iter().copied().collect());

static CPP_KEYWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| CPP_KEYWORDS.iter().copied().collect());

/// Whether `name` is a keyword of the given dialect.
pub(crate) fn is_keyword(name: &str, dialect: Dialect) -> bool {
    match dialect {
        Dialect::C => C_KEYWORD_SET.contains(name),
        Dialect::Cpp => CPP_KEYWORD_SET.contains(name),
    }
}

/// All directive keywords, for directive-prefix completion.
pub(crate) fn directive_names() -> &'static [&'static str] {
    DIRECTIVES
}

/// All keywords of a dialect, for completion suggestions.
pub(crate) fn keyword_names(dialect: Dialect) -> &'static [&'static str] {
    match dialect {
        Dialect::C => C_KEYWORDS,
        Dialect::Cpp => CPP_KEYWORDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_separation() {
        assert!(is_keyword("restrict", Dialect::C));
        assert!(is_keyword("class", Dialect::Cpp));
        assert!(!is_keyword("class", Dialect::C));
        assert!(!is_keyword("_Bool", Dialect::Cpp));
    }

    #[test]
    fn alternative_operator_spellings_are_cpp_keywords() {
        for alt in ["and", "or", "not_eq", "xor_eq", "compl"] {
            assert!(is_keyword(alt, Dialect::Cpp), "{alt}");
            assert!(!is_keyword(alt, Dialect::C), "{alt}");
        }
    }

    #[test]
    fn directive_table() {
        for d in ["include", "include_next", "import", "pragma", "line"] {
            assert!(directive_names().contains(&d), "{d}");
        }
        assert!(!directive_names().contains(&"includ"));
    }
}
