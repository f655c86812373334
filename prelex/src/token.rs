use std::rc::Rc;

/// Check if a character can start an identifier (letter, underscore, or a
/// non-ASCII identifier character)
pub fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (!c.is_ascii() && c.is_alphabetic())
}

/// Check if a character can continue an identifier (letter, digit, underscore,
/// or a non-ASCII identifier character)
pub fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || (!c.is_ascii() && c.is_alphanumeric())
}

/// Classification tag carried by every token
///
/// Tokens carry a tag and a text image only; source locations are reported
/// out of band through the [`ScanEventSink`](crate::ScanEventSink).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Plain identifier (not a keyword, not an expanded macro)
    Identifier,
    /// Keyword of the configured dialect
    Keyword,
    /// Operator or punctuator, `##` and lone `#` included
    Operator,
    /// Integer literal, suffixes included in the image
    IntegerLiteral,
    /// Floating-point literal, suffixes included in the image
    FloatingLiteral,
    /// String literal; the image excludes the delimiting quotes
    StringLiteral,
    /// Wide string literal (`L"..."`); the image excludes `L` and the quotes
    WideStringLiteral,
    /// Character literal; the image includes the delimiting quotes
    CharLiteral,
    /// Wide character literal (`L'...'`); the image includes the quotes
    WideCharLiteral,
    /// Identifier prefix cut off at the content-assist boundary
    Completion,
    /// Marker token delivered once after a completion point
    EndOfCompletion,
}

/// One token produced by the scanner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Classification tag
    pub kind: TokenKind,
    /// Text image; shared so identical identifiers reuse one allocation
    pub text: Rc<str>,
}

impl Token {
    /// Create a token from a kind and an image
    pub fn new(kind: TokenKind, text: impl Into<Rc<str>>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }

    /// The token's text image
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this is a narrow or wide string literal
    #[must_use]
    pub fn is_string_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::StringLiteral | TokenKind::WideStringLiteral
        )
    }

    pub(crate) fn is_paste_operator(&self) -> bool {
        self.kind == TokenKind::Operator && &*self.text == "##"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_character_classes() {
        assert!(is_identifier_start('a'));
        assert!(is_identifier_start('_'));
        assert!(!is_identifier_start('1'));
        assert!(is_identifier_continue('1'));
        assert!(!is_identifier_continue('-'));
        assert!(is_identifier_start('é'));
        assert!(is_identifier_continue('é'));
    }

    #[test]
    fn paste_operator_detection() {
        assert!(Token::new(TokenKind::Operator, "##").is_paste_operator());
        assert!(!Token::new(TokenKind::Operator, "#").is_paste_operator());
        assert!(!Token::new(TokenKind::Identifier, "##").is_paste_operator());
    }
}
