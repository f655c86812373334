//! Evaluation of `#if` and `#elif` controlling expressions.
//!
//! The condition text is lexed into a token list first, with macro
//! references expanded on the fly through the evaluator's own small frame
//! stack, and then folded by recursive descent over the full C operator
//! precedence ladder. `defined` is resolved during lexing so its operand is
//! never expanded. Every failure mode falsifies the condition; nothing here
//! aborts the scan.

use std::rc::Rc;

use crate::events::ProblemId;
use crate::expand::{collect_arguments, index_of_next_non_blank, Expander};
use crate::macro_def::{ExpansionEnv, MacroDef, MacroTable};
use crate::token::{is_identifier_continue, is_identifier_start};

#[derive(Clone, Debug, PartialEq)]
enum EToken {
    Number(i64),
    Ident(String),
    Op(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EvalError {
    Syntax,
    DivisionByZero,
}

/// One buffer of condition text. Frames above the base hold macro
/// replacement text, painted with the macro's name so it cannot expand
/// within itself.
struct EvalFrame {
    text: Vec<char>,
    pos: usize,
    name: Option<Rc<str>>,
}

/// Evaluates conditional expressions against a macro table.
///
/// Problems are collected rather than reported directly; the scanner
/// attaches the directive's offset and file before forwarding them.
pub(crate) struct CondEvaluator<'a> {
    macros: &'a MacroTable,
    env: &'a ExpansionEnv,
    dollar_identifiers: bool,
    frames: Vec<EvalFrame>,
    pub problems: Vec<(ProblemId, Option<String>)>,
}

impl<'a> CondEvaluator<'a> {
    pub fn new(macros: &'a MacroTable, env: &'a ExpansionEnv, dollar_identifiers: bool) -> Self {
        CondEvaluator { macros, env, dollar_identifiers, frames: Vec::new(), problems: Vec::new() }
    }

    /// Evaluates `expression`, treating every error as false.
    pub fn evaluate(&mut self, expression: &str) -> bool {
        let tokens = match self.read_all(expression) {
            Ok(tokens) => tokens,
            Err(error) => {
                self.report(error, expression);
                return false;
            }
        };
        if tokens.is_empty() {
            self.report(EvalError::Syntax, expression);
            return false;
        }
        if tokens.iter().any(|t| matches!(t, EToken::Op("="))) {
            self.problems
                .push((ProblemId::AssignmentInCondition, Some(expression.trim().to_string())));
            return false;
        }
        let mut pos = 0;
        match parse_conditional(&tokens, &mut pos) {
            Ok(value) if pos == tokens.len() => value != 0,
            Ok(_) => {
                self.report(EvalError::Syntax, expression);
                false
            }
            Err(error) => {
                self.report(error, expression);
                false
            }
        }
    }

    fn report(&mut self, error: EvalError, expression: &str) {
        let id = match error {
            EvalError::Syntax => ProblemId::ExpressionSyntaxError,
            EvalError::DivisionByZero => ProblemId::DivisionByZero,
        };
        self.problems.push((id, Some(expression.trim().to_string())));
    }

    fn read_all(&mut self, expression: &str) -> Result<Vec<EToken>, EvalError> {
        self.frames.clear();
        self.frames
            .push(EvalFrame { text: expression.chars().collect(), pos: 0, name: None });
        let mut tokens = Vec::new();
        while let Some(token) = self.next_expr_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn is_identifier_start(&self, c: char) -> bool {
        is_identifier_start(c) || (self.dollar_identifiers && c == '$')
    }

    fn is_identifier_continue(&self, c: char) -> bool {
        is_identifier_continue(c) || (self.dollar_identifiers && c == '$')
    }

    fn painted(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f.name.as_deref() == Some(name))
    }

    fn next_expr_token(&mut self) -> Result<Option<EToken>, EvalError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };
            frame.pos = index_of_next_non_blank(&frame.text, frame.pos);
            if frame.pos >= frame.text.len() {
                self.frames.pop();
                continue;
            }
            let c = frame.text[frame.pos];
            if c == 'L' && frame.text.get(frame.pos + 1) == Some(&'\'') {
                frame.pos += 1;
                let (value, end) = scan_char_literal(&frame.text, frame.pos)?;
                frame.pos = end;
                return Ok(Some(EToken::Number(value)));
            }
            if c == '\'' {
                let (value, end) = scan_char_literal(&frame.text, frame.pos)?;
                frame.pos = end;
                return Ok(Some(EToken::Number(value)));
            }
            if c.is_ascii_digit() {
                let (value, end) = scan_number(&frame.text, frame.pos)?;
                frame.pos = end;
                return Ok(Some(EToken::Number(value)));
            }
            if is_identifier_start(c) || (self.dollar_identifiers && c == '$') {
                let start = frame.pos;
                let mut end = start;
                while end < frame.text.len()
                    && (is_identifier_continue(frame.text[end])
                        || (self.dollar_identifiers && frame.text[end] == '$'))
                {
                    end += 1;
                }
                frame.pos = end;
                let name: String = frame.text[start..end].iter().collect();
                if name == "defined" {
                    return self.read_defined().map(Some);
                }
                if self.painted(&name) {
                    return Ok(Some(EToken::Ident(name)));
                }
                let Some(def) = self.macros.get(name.as_str()) else {
                    return Ok(Some(EToken::Ident(name)));
                };
                let def = def.clone();
                match &def {
                    MacroDef::Object { replacement } => {
                        let text = replacement.to_string();
                        self.push_expansion(&name, &text);
                    }
                    MacroDef::DynamicObject { compute } => {
                        let text = compute(self.env);
                        self.push_expansion(&name, &text);
                    }
                    MacroDef::Function { .. } | MacroDef::DynamicFunction { .. } => {
                        if !self.find_call_paren() {
                            return Ok(Some(EToken::Ident(name)));
                        }
                        let text = self.invoke_function(&name, &def);
                        self.push_expansion(&name, &text);
                    }
                }
                continue;
            }
            let (op, len) = scan_operator(&frame.text, frame.pos)?;
            frame.pos += len;
            return Ok(Some(EToken::Op(op)));
        }
    }

    fn push_expansion(&mut self, name: &str, text: &str) {
        self.frames.push(EvalFrame {
            text: text.chars().collect(),
            pos: 0,
            name: Some(Rc::from(name)),
        });
    }

    /// Resolves a `defined X` or `defined(X)` operator without expanding
    /// its operand.
    fn read_defined(&mut self) -> Result<EToken, EvalError> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(EvalError::Syntax);
        };
        let mut i = index_of_next_non_blank(&frame.text, frame.pos);
        let parenthesized = frame.text.get(i) == Some(&'(');
        if parenthesized {
            i = index_of_next_non_blank(&frame.text, i + 1);
        }
        let start = i;
        if i < frame.text.len() && is_identifier_start(frame.text[i]) {
            while i < frame.text.len() && is_identifier_continue(frame.text[i]) {
                i += 1;
            }
        }
        if i == start {
            return Err(EvalError::Syntax);
        }
        let name: String = frame.text[start..i].iter().collect();
        if parenthesized {
            i = index_of_next_non_blank(&frame.text, i);
            if frame.text.get(i) != Some(&')') {
                return Err(EvalError::Syntax);
            }
            i += 1;
        }
        frame.pos = i;
        Ok(EToken::Number(i64::from(self.macros.contains_key(name.as_str()))))
    }

    /// Looks for the `(` of a function-style invocation, possibly below
    /// exhausted expansion frames. Commits by popping those frames and
    /// stepping past the parenthesis.
    fn find_call_paren(&mut self) -> bool {
        let mut level = self.frames.len();
        while level > 0 {
            let frame = &self.frames[level - 1];
            let i = index_of_next_non_blank(&frame.text, frame.pos);
            if i < frame.text.len() {
                if frame.text[i] != '(' {
                    return false;
                }
                self.frames.truncate(level);
                if let Some(frame) = self.frames.last_mut() {
                    frame.pos = i + 1;
                }
                return true;
            }
            level -= 1;
        }
        false
    }

    fn invoke_function(&mut self, name: &str, def: &MacroDef) -> String {
        let collection = match self.frames.last_mut() {
            Some(frame) => {
                let mut cursor = frame.pos;
                let collection = collect_arguments(
                    &frame.text,
                    &mut cursor,
                    def.parameters().map_or(0, <[String]>::len),
                    def.variadic(),
                );
                frame.pos = cursor;
                collection
            }
            None => return String::new(),
        };
        let active: Vec<Rc<str>> = self.frames.iter().filter_map(|f| f.name.clone()).collect();
        let mut expander = Expander::new(self.macros, self.env, self.dollar_identifiers);
        let text = expander.invoke(name, def, &collection, &active);
        self.problems.append(&mut expander.problems);
        text
    }
}

/// Evaluates an expression with no macros in scope. Used for built-ins
/// whose arguments were already expanded; problems are discarded and any
/// failure yields false.
pub(crate) fn evaluate_detached(expression: &str, env: &ExpansionEnv) -> bool {
    let empty = MacroTable::new();
    let mut evaluator = CondEvaluator::new(&empty, env, false);
    evaluator.evaluate(expression)
}

fn scan_number(text: &[char], start: usize) -> Result<(i64, usize), EvalError> {
    let mut i = start;
    let mut value: i64 = 0;
    if text[i] == '0' && matches!(text.get(i + 1), Some(&('x' | 'X'))) {
        i += 2;
        let digits = i;
        while let Some(d) = text.get(i).and_then(|c| c.to_digit(16)) {
            value = value.wrapping_mul(16).wrapping_add(i64::from(d));
            i += 1;
        }
        if i == digits {
            return Err(EvalError::Syntax);
        }
    } else if text[i] == '0' {
        i += 1;
        while let Some(d) = text.get(i).and_then(|c| c.to_digit(8)) {
            value = value.wrapping_mul(8).wrapping_add(i64::from(d));
            i += 1;
        }
        if matches!(text.get(i), Some(&('8'..='9'))) {
            return Err(EvalError::Syntax);
        }
    } else {
        while let Some(d) = text.get(i).and_then(|c| c.to_digit(10)) {
            value = value.wrapping_mul(10).wrapping_add(i64::from(d));
            i += 1;
        }
    }
    while matches!(text.get(i), Some(&('u' | 'U' | 'l' | 'L'))) {
        i += 1;
    }
    if text.get(i) == Some(&'.') {
        // Floating constants have no place in a controlling expression.
        return Err(EvalError::Syntax);
    }
    Ok((value, i))
}

/// Reads a character constant starting at the opening quote and folds it to
/// its numeric value. Multi-character constants accumulate bytewise.
fn scan_char_literal(text: &[char], start: usize) -> Result<(i64, usize), EvalError> {
    let mut i = start + 1;
    let mut value: i64 = 0;
    let mut seen = false;
    while i < text.len() && text[i] != '\'' {
        let unit: i64;
        if text[i] == '\\' {
            i += 1;
            match text.get(i) {
                Some(&'n') => {
                    unit = 10;
                    i += 1;
                }
                Some(&'t') => {
                    unit = 9;
                    i += 1;
                }
                Some(&'r') => {
                    unit = 13;
                    i += 1;
                }
                Some(&'a') => {
                    unit = 7;
                    i += 1;
                }
                Some(&'b') => {
                    unit = 8;
                    i += 1;
                }
                Some(&'f') => {
                    unit = 12;
                    i += 1;
                }
                Some(&'v') => {
                    unit = 11;
                    i += 1;
                }
                Some(&'x') => {
                    i += 1;
                    let mut hex: i64 = 0;
                    let digits = i;
                    while let Some(d) = text.get(i).and_then(|c| c.to_digit(16)) {
                        hex = hex.wrapping_mul(16).wrapping_add(i64::from(d));
                        i += 1;
                    }
                    if i == digits {
                        return Err(EvalError::Syntax);
                    }
                    unit = hex;
                }
                Some(&(c @ '0'..='7')) => {
                    let mut oct = i64::from(c.to_digit(8).unwrap_or(0));
                    i += 1;
                    let mut count = 1;
                    while count < 3 {
                        let Some(d) = text.get(i).and_then(|c| c.to_digit(8)) else {
                            break;
                        };
                        oct = oct * 8 + i64::from(d);
                        i += 1;
                        count += 1;
                    }
                    unit = oct;
                }
                Some(c) => {
                    unit = *c as i64;
                    i += 1;
                }
                None => return Err(EvalError::Syntax),
            }
        } else {
            unit = text[i] as i64;
            i += 1;
        }
        value = value.wrapping_shl(8).wrapping_add(unit);
        seen = true;
    }
    if i >= text.len() || !seen {
        return Err(EvalError::Syntax);
    }
    Ok((value, i + 1))
}

fn scan_operator(text: &[char], at: usize) -> Result<(&'static str, usize), EvalError> {
    let next = text.get(at + 1);
    let op = match text[at] {
        '|' if next == Some(&'|') => ("||", 2),
        '|' => ("|", 1),
        '&' if next == Some(&'&') => ("&&", 2),
        '&' => ("&", 1),
        '=' if next == Some(&'=') => ("==", 2),
        '=' => ("=", 1),
        '!' if next == Some(&'=') => ("!=", 2),
        '!' => ("!", 1),
        '<' if next == Some(&'<') => ("<<", 2),
        '<' if next == Some(&'=') => ("<=", 2),
        '<' => ("<", 1),
        '>' if next == Some(&'>') => (">>", 2),
        '>' if next == Some(&'=') => (">=", 2),
        '>' => (">", 1),
        '+' => ("+", 1),
        '-' => ("-", 1),
        '*' => ("*", 1),
        '/' => ("/", 1),
        '%' => ("%", 1),
        '^' => ("^", 1),
        '~' => ("~", 1),
        '(' => ("(", 1),
        ')' => (")", 1),
        '?' => ("?", 1),
        ':' => (":", 1),
        _ => return Err(EvalError::Syntax),
    };
    Ok(op)
}

fn op_at(tokens: &[EToken], pos: usize) -> Option<&'static str> {
    match tokens.get(pos) {
        Some(EToken::Op(op)) => Some(op),
        _ => None,
    }
}

fn parse_conditional(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let condition = parse_logical_or(tokens, pos)?;
    if op_at(tokens, *pos) != Some("?") {
        return Ok(condition);
    }
    *pos += 1;
    let then_value = parse_conditional(tokens, pos)?;
    if op_at(tokens, *pos) != Some(":") {
        return Err(EvalError::Syntax);
    }
    *pos += 1;
    let else_value = parse_conditional(tokens, pos)?;
    Ok(if condition != 0 { then_value } else { else_value })
}

fn parse_logical_or(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_logical_and(tokens, pos)?;
    while op_at(tokens, *pos) == Some("||") {
        *pos += 1;
        let rhs = parse_logical_and(tokens, pos)?;
        value = i64::from(value != 0 || rhs != 0);
    }
    Ok(value)
}

fn parse_logical_and(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_bit_or(tokens, pos)?;
    while op_at(tokens, *pos) == Some("&&") {
        *pos += 1;
        let rhs = parse_bit_or(tokens, pos)?;
        value = i64::from(value != 0 && rhs != 0);
    }
    Ok(value)
}

fn parse_bit_or(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_bit_xor(tokens, pos)?;
    while op_at(tokens, *pos) == Some("|") {
        *pos += 1;
        value |= parse_bit_xor(tokens, pos)?;
    }
    Ok(value)
}

fn parse_bit_xor(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_bit_and(tokens, pos)?;
    while op_at(tokens, *pos) == Some("^") {
        *pos += 1;
        value ^= parse_bit_and(tokens, pos)?;
    }
    Ok(value)
}

fn parse_bit_and(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_equality(tokens, pos)?;
    while op_at(tokens, *pos) == Some("&") {
        *pos += 1;
        value &= parse_equality(tokens, pos)?;
    }
    Ok(value)
}

fn parse_equality(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_relational(tokens, pos)?;
    loop {
        let op = op_at(tokens, *pos);
        match op {
            Some("==") => {
                *pos += 1;
                let rhs = parse_relational(tokens, pos)?;
                value = i64::from(value == rhs);
            }
            Some("!=") => {
                *pos += 1;
                let rhs = parse_relational(tokens, pos)?;
                value = i64::from(value != rhs);
            }
            _ => return Ok(value),
        }
    }
}

fn parse_relational(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_shift(tokens, pos)?;
    loop {
        let op = op_at(tokens, *pos);
        match op {
            Some("<") => {
                *pos += 1;
                value = i64::from(value < parse_shift(tokens, pos)?);
            }
            Some(">") => {
                *pos += 1;
                value = i64::from(value > parse_shift(tokens, pos)?);
            }
            Some("<=") => {
                *pos += 1;
                value = i64::from(value <= parse_shift(tokens, pos)?);
            }
            Some(">=") => {
                *pos += 1;
                value = i64::from(value >= parse_shift(tokens, pos)?);
            }
            _ => return Ok(value),
        }
    }
}

fn parse_shift(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_additive(tokens, pos)?;
    loop {
        let op = op_at(tokens, *pos);
        match op {
            Some("<<") => {
                *pos += 1;
                let rhs = parse_additive(tokens, pos)?;
                value = value.wrapping_shl(rhs as u32);
            }
            Some(">>") => {
                *pos += 1;
                let rhs = parse_additive(tokens, pos)?;
                value = value.wrapping_shr(rhs as u32);
            }
            _ => return Ok(value),
        }
    }
}

fn parse_additive(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_multiplicative(tokens, pos)?;
    loop {
        let op = op_at(tokens, *pos);
        match op {
            Some("+") => {
                *pos += 1;
                value = value.wrapping_add(parse_multiplicative(tokens, pos)?);
            }
            Some("-") => {
                *pos += 1;
                value = value.wrapping_sub(parse_multiplicative(tokens, pos)?);
            }
            _ => return Ok(value),
        }
    }
}

fn parse_multiplicative(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    let mut value = parse_unary(tokens, pos)?;
    loop {
        let op = op_at(tokens, *pos);
        match op {
            Some("*") => {
                *pos += 1;
                value = value.wrapping_mul(parse_unary(tokens, pos)?);
            }
            Some("/") => {
                *pos += 1;
                let rhs = parse_unary(tokens, pos)?;
                if rhs == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                value = value.wrapping_div(rhs);
            }
            Some("%") => {
                *pos += 1;
                let rhs = parse_unary(tokens, pos)?;
                if rhs == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                value = value.wrapping_rem(rhs);
            }
            _ => return Ok(value),
        }
    }
}

fn parse_unary(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    match op_at(tokens, *pos) {
        Some("+") => {
            *pos += 1;
            parse_unary(tokens, pos)
        }
        Some("-") => {
            *pos += 1;
            Ok(parse_unary(tokens, pos)?.wrapping_neg())
        }
        Some("!") => {
            *pos += 1;
            Ok(i64::from(parse_unary(tokens, pos)? == 0))
        }
        Some("~") => {
            *pos += 1;
            Ok(!parse_unary(tokens, pos)?)
        }
        _ => parse_primary(tokens, pos),
    }
}

fn parse_primary(tokens: &[EToken], pos: &mut usize) -> Result<i64, EvalError> {
    match tokens.get(*pos) {
        Some(EToken::Number(value)) => {
            *pos += 1;
            Ok(*value)
        }
        // Surviving identifiers evaluate to zero.
        Some(EToken::Ident(_)) => {
            *pos += 1;
            Ok(0)
        }
        Some(EToken::Op("(")) => {
            *pos += 1;
            let value = parse_conditional(tokens, pos)?;
            if op_at(tokens, *pos) != Some(")") {
                return Err(EvalError::Syntax);
            }
            *pos += 1;
            Ok(value)
        }
        _ => Err(EvalError::Syntax),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macro_def::Variadic;

    fn env() -> ExpansionEnv {
        ExpansionEnv { file: Rc::from("cond.c"), line: 7 }
    }

    fn table(defs: &[(&str, &str)]) -> MacroTable {
        let mut table = MacroTable::new();
        for (name, replacement) in defs {
            table.insert(
                Rc::from(*name),
                MacroDef::Object { replacement: Rc::from(*replacement) },
            );
        }
        table
    }

    fn eval(expression: &str, table: &MacroTable) -> (bool, Vec<ProblemId>) {
        let env = env();
        let mut evaluator = CondEvaluator::new(table, &env, false);
        let value = evaluator.evaluate(expression);
        (value, evaluator.problems.into_iter().map(|(id, _)| id).collect())
    }

    #[test]
    fn precedence_and_arithmetic() {
        let empty = MacroTable::new();
        assert!(eval("1 + 2 * 3 == 7", &empty).0);
        assert!(eval("(1 | 2) == 3", &empty).0);
        assert!(eval("1 << 4 == 16", &empty).0);
        assert!(eval("10 % 4 == 2 && 10 / 4 == 2", &empty).0);
        assert!(eval("-1 < 0", &empty).0);
        assert!(eval("~0 == -1", &empty).0);
    }

    #[test]
    fn ternary_selects_a_branch() {
        let empty = MacroTable::new();
        assert!(eval("0 ? 1 : 2", &empty).0);
        assert!(!eval("1 ? 0 : 2", &empty).0);
    }

    #[test]
    fn number_bases_and_suffixes() {
        let empty = MacroTable::new();
        assert!(eval("0x10 == 16", &empty).0);
        assert!(eval("010 == 8", &empty).0);
        assert!(eval("1L + 1U == 2", &empty).0);
        assert!(eval("'A' == 65", &empty).0);
        assert!(eval("L'\\n' == 10", &empty).0);
    }

    #[test]
    fn defined_checks_the_table_without_expanding() {
        let table = table(&[("FOO", "0")]);
        assert!(eval("defined FOO", &table).0);
        assert!(eval("defined(FOO)", &table).0);
        assert!(eval("!defined BAR", &table).0);
        // The operand is not expanded, or FOO's zero replacement would make
        // this `defined 0`.
        assert!(eval("defined ( FOO )", &table).0);
    }

    #[test]
    fn macros_expand_within_conditions() {
        let table = table(&[("VERSION", "3")]);
        assert!(eval("VERSION >= 2", &table).0);
        assert!(!eval("VERSION < 3", &table).0);
    }

    #[test]
    fn function_macro_in_condition() {
        let mut table = MacroTable::new();
        table.insert(
            Rc::from("MAX"),
            MacroDef::Function {
                parameters: vec!["a".to_string(), "b".to_string()].into(),
                replacement: Rc::from("((a) > (b) ? (a) : (b))"),
                variadic: Variadic::None,
            },
        );
        assert!(eval("MAX(2, 3) == 3", &table).0);
    }

    #[test]
    fn chained_object_macros() {
        let table = table(&[("A", "B"), ("B", "2")]);
        assert!(eval("A == 2", &table).0);
    }

    #[test]
    fn self_reference_evaluates_to_zero() {
        let table = table(&[("X", "X")]);
        let (value, problems) = eval("X", &table);
        assert!(!value);
        assert!(problems.is_empty());
    }

    #[test]
    fn unknown_identifier_is_zero() {
        let empty = MacroTable::new();
        assert!(!eval("UNKNOWN", &empty).0);
        assert!(eval("UNKNOWN == 0", &empty).0);
    }

    #[test]
    fn division_by_zero_falsifies() {
        let empty = MacroTable::new();
        let (value, problems) = eval("1 / 0", &empty);
        assert!(!value);
        assert_eq!(problems, vec![ProblemId::DivisionByZero]);
        let (value, problems) = eval("1 % 0", &empty);
        assert!(!value);
        assert_eq!(problems, vec![ProblemId::DivisionByZero]);
    }

    #[test]
    fn assignment_is_rejected() {
        let empty = MacroTable::new();
        let (value, problems) = eval("x = 1", &empty);
        assert!(!value);
        assert_eq!(problems, vec![ProblemId::AssignmentInCondition]);
    }

    #[test]
    fn malformed_expressions_are_false() {
        let empty = MacroTable::new();
        let (value, problems) = eval("", &empty);
        assert!(!value);
        assert_eq!(problems, vec![ProblemId::ExpressionSyntaxError]);
        assert!(!eval("1 +", &empty).0);
        assert!(!eval("defined(FOO", &empty).0);
        assert!(!eval("(1", &empty).0);
    }

    #[test]
    fn detached_evaluation_sees_no_macros() {
        let env = env();
        assert!(evaluate_detached("1 + 1 == 2", &env));
        assert!(!evaluate_detached("FOO", &env));
    }
}
