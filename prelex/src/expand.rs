//! Macro replacement on flat text.
//!
//! The scanner pushes replacement text onto its buffer stack and rescans it,
//! so most expansion happens token by token in [`crate::scanner`]. This
//! module covers the places where a complete textual result is needed up
//! front: argument pre-expansion, re-examined `#include` lines, conditional
//! expressions, and the argument substitution step of a function-style
//! invocation (parameter replacement, `#` stringification, `##` pasting).

use std::rc::Rc;

use crate::events::ProblemId;
use crate::macro_def::{ExpansionEnv, MacroDef, MacroTable, Variadic};
use crate::token::{is_identifier_continue, is_identifier_start};

/// Raw arguments collected from a function-style invocation.
#[derive(Debug)]
pub(crate) struct ArgCollection {
    /// Argument texts with surrounding whitespace trimmed. For a variadic
    /// macro the trailing arguments are joined into the final entry, commas
    /// included.
    pub args: Vec<String>,
    /// Whether the closing `)` was found before the text ran out.
    pub complete: bool,
    /// Whether more arguments were supplied than the definition accepts.
    pub excess: bool,
}

impl ArgCollection {
    /// True when the argument count does not match the definition. Missing
    /// arguments still bind as empty text, so the expansion is best-effort
    /// either way.
    pub fn arity_mismatch(&self, param_count: usize, variadic: Variadic) -> bool {
        if self.excess || !self.complete {
            return true;
        }
        let required = match variadic {
            Variadic::None => param_count,
            _ => param_count.saturating_sub(1),
        };
        self.args.len() < required
    }
}

/// Collects the arguments of a function-style invocation from `text`.
///
/// `pos` must point just past the opening parenthesis and is left just past
/// the closing one (or at the end of `text` when unterminated). Parentheses
/// nest, and commas inside nested parentheses or inside string and character
/// literals do not separate arguments. Once the variadic position is
/// reached, everything up to the closing parenthesis is captured verbatim
/// as one argument.
pub(crate) fn collect_arguments(
    text: &[char],
    pos: &mut usize,
    param_count: usize,
    variadic: Variadic,
) -> ArgCollection {
    let mut args: Vec<String> = Vec::new();
    let mut complete = false;
    let mut excess = false;

    *pos = index_of_next_non_blank(text, *pos);
    if text.get(*pos) == Some(&')') {
        *pos += 1;
        if param_count > 0 {
            // An empty pair of parentheses supplies one empty argument.
            args.push(String::new());
        }
        return ArgCollection { args, complete: true, excess };
    }

    let last_fixed = match variadic {
        Variadic::None => param_count,
        _ => param_count.saturating_sub(1),
    };
    loop {
        let at_variadic = variadic != Variadic::None && args.len() == last_fixed;
        let (arg, terminator) = scan_argument(text, pos, at_variadic);
        args.push(arg);
        match terminator {
            Some(')') => {
                complete = true;
                break;
            }
            Some(_) => {
                if variadic == Variadic::None && args.len() >= param_count {
                    // Leave the rest of the invocation in place; the caller
                    // reports the mismatch and the scanner picks the leftover
                    // text back up as ordinary input.
                    excess = true;
                    break;
                }
            }
            None => break,
        }
    }
    ArgCollection { args, complete, excess }
}

/// Scans one argument starting at `pos`. Returns the trimmed text and the
/// separator that ended it (`,` or `)`), leaving `pos` just past it. A
/// `None` terminator means the text ran out first.
fn scan_argument(text: &[char], pos: &mut usize, variadic_tail: bool) -> (String, Option<char>) {
    let mut out = String::new();
    let mut depth = 0usize;
    while *pos < text.len() {
        let c = text[*pos];
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => {
                *pos += 1;
                return (trim_blank(&out), Some(')'));
            }
            ')' => depth -= 1,
            ',' if depth == 0 && !variadic_tail => {
                *pos += 1;
                return (trim_blank(&out), Some(','));
            }
            '"' | '\'' => {
                let end = skip_literal(text, *pos);
                out.extend(&text[*pos..end]);
                *pos = end;
                continue;
            }
            _ => {}
        }
        out.push(c);
        *pos += 1;
    }
    (trim_blank(&out), None)
}

fn trim_blank(s: &str) -> String {
    s.trim_matches(|c: char| c.is_ascii_whitespace()).to_string()
}

/// Returns the index just past a string or character literal starting at
/// `at` (which must hold the opening quote). Backslash escapes are honored;
/// an unterminated literal runs to the end of the text.
pub(crate) fn skip_literal(text: &[char], at: usize) -> usize {
    let quote = text[at];
    let mut i = at + 1;
    while i < text.len() {
        match text[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            '\n' => return i,
            _ => i += 1,
        }
    }
    text.len()
}

/// Finds the next index at or after `at` holding something other than
/// whitespace, an escaped newline, or a comment. Newlines count as blank,
/// so this lookahead crosses lines. Returns `text.len()` when nothing is
/// left.
pub(crate) fn index_of_next_non_blank(text: &[char], mut at: usize) -> usize {
    while at < text.len() {
        match text[at] {
            ' ' | '\t' | '\r' | '\n' => at += 1,
            '\\' if text.get(at + 1) == Some(&'\n') => at += 2,
            '\\' if text.get(at + 1) == Some(&'\r') && text.get(at + 2) == Some(&'\n') => {
                at += 3;
            }
            '/' if text.get(at + 1) == Some(&'/') => {
                while at < text.len() && text[at] != '\n' {
                    at += 1;
                }
            }
            '/' if text.get(at + 1) == Some(&'*') => {
                at += 2;
                while at < text.len() && !(text[at] == '*' && text.get(at + 1) == Some(&'/')) {
                    at += 1;
                }
                at = (at + 2).min(text.len());
            }
            _ => break,
        }
    }
    at
}

/// Prepares captured `#define` replacement text: escaped newlines are
/// elided, a line comment cuts the rest off, block comments become a single
/// space, and the ends are trimmed. String and character literals pass
/// through untouched.
pub(crate) fn normalize_replacement(raw: &str) -> String {
    let text: Vec<char> = raw.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < text.len() {
        match text[i] {
            '\\' if text.get(i + 1) == Some(&'\n') => i += 2,
            '\\' if text.get(i + 1) == Some(&'\r') && text.get(i + 2) == Some(&'\n') => {
                i += 3;
            }
            '/' if text.get(i + 1) == Some(&'/') => break,
            '/' if text.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < text.len() && !(text[i] == '*' && text.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(text.len());
                out.push(' ');
            }
            '"' | '\'' => {
                let end = skip_literal(&text, i);
                out.extend(&text[i..end]);
                i = end;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.trim_matches(|c: char| c.is_ascii_whitespace()).to_string()
}

/// Produces the string literal for a `#` operand: surrounding whitespace is
/// dropped, interior whitespace runs collapse to one space, and every `"`
/// or `\` gains a backslash. The returned text includes the delimiting
/// quotes.
pub(crate) fn stringify(raw: &str) -> String {
    let mut out = String::from("\"");
    let mut pending_space = false;
    for c in raw.trim_matches(|c: char| c.is_ascii_whitespace()).chars() {
        if c.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// A name that must not expand again, painted over a span of the work
/// buffer. Inherited entries cover the whole buffer.
struct Paint {
    name: Rc<str>,
    end: usize,
}

/// Performs complete macro replacement on flat text.
///
/// Used for argument pre-expansion, for `#include` lines that need a second
/// look, and for conditional expressions. Expanded spans are spliced into a
/// work buffer and rescanned in place, with the invoked name painted over
/// the spliced span so it cannot expand inside its own replacement.
pub(crate) struct Expander<'a> {
    macros: &'a MacroTable,
    env: &'a ExpansionEnv,
    dollar_identifiers: bool,
    /// Problems discovered while expanding. The caller attaches the source
    /// offset and file before reporting them.
    pub problems: Vec<(ProblemId, Option<String>)>,
}

impl<'a> Expander<'a> {
    pub fn new(macros: &'a MacroTable, env: &'a ExpansionEnv, dollar_identifiers: bool) -> Self {
        Expander { macros, env, dollar_identifiers, problems: Vec::new() }
    }

    fn is_identifier_start(&self, c: char) -> bool {
        is_identifier_start(c) || (self.dollar_identifiers && c == '$')
    }

    fn is_identifier_continue(&self, c: char) -> bool {
        is_identifier_continue(c) || (self.dollar_identifiers && c == '$')
    }

    /// Expands every macro reference in `text`. Names listed in `active`
    /// stay unexpanded, as do names already being rescanned at an enclosing
    /// level.
    pub fn expand_text(&mut self, text: &str, active: &[Rc<str>]) -> String {
        let mut buf: Vec<char> = text.chars().collect();
        let mut paint: Vec<Paint> =
            active.iter().map(|n| Paint { name: n.clone(), end: usize::MAX }).collect();
        let mut pos = 0;
        while pos < buf.len() {
            let c = buf[pos];
            if c == '"' || c == '\'' {
                pos = skip_literal(&buf, pos);
                continue;
            }
            if c == '/' && buf.get(pos + 1) == Some(&'/') {
                while pos < buf.len() && buf[pos] != '\n' {
                    pos += 1;
                }
                continue;
            }
            if c == '/' && buf.get(pos + 1) == Some(&'*') {
                pos += 2;
                while pos < buf.len() && !(buf[pos] == '*' && buf.get(pos + 1) == Some(&'/')) {
                    pos += 1;
                }
                pos = (pos + 2).min(buf.len());
                continue;
            }
            if !self.is_identifier_start(c) {
                pos += 1;
                continue;
            }
            let start = pos;
            while pos < buf.len() && self.is_identifier_continue(buf[pos]) {
                pos += 1;
            }
            paint.retain(|p| p.end == usize::MAX || p.end > start);
            let name: String = buf[start..pos].iter().collect();
            if paint.iter().any(|p| *p.name == *name) {
                continue;
            }
            let Some(def) = self.macros.get(name.as_str()) else {
                continue;
            };
            let def = def.clone();
            let replacement: Vec<char> = match &def {
                MacroDef::Object { replacement } => replacement.chars().collect(),
                MacroDef::DynamicObject { compute } => compute(self.env).chars().collect(),
                MacroDef::Function { .. } | MacroDef::DynamicFunction { .. } => {
                    let lp = index_of_next_non_blank(&buf, pos);
                    if buf.get(lp) != Some(&'(') {
                        // No argument list, so the name stays as ordinary text.
                        continue;
                    }
                    let mut cursor = lp + 1;
                    let collection = collect_arguments(
                        &buf,
                        &mut cursor,
                        def.parameters().map_or(0, <[String]>::len),
                        def.variadic(),
                    );
                    pos = cursor;
                    let painted: Vec<Rc<str>> = paint.iter().map(|p| p.name.clone()).collect();
                    self.invoke(&name, &def, &collection, &painted).chars().collect()
                }
            };
            splice(&mut buf, start, pos, &replacement, &mut paint);
            paint.push(Paint { name: Rc::from(name), end: start + replacement.len() });
            pos = start;
        }
        buf.into_iter().collect()
    }

    /// Performs the substitution step for one function-style invocation and
    /// returns the replacement text, ready to be rescanned by the caller.
    /// Arity mismatches are recorded as problems and the expansion proceeds
    /// best-effort with missing arguments bound to empty text.
    pub fn invoke(
        &mut self,
        name: &str,
        def: &MacroDef,
        collection: &ArgCollection,
        active: &[Rc<str>],
    ) -> String {
        let param_count = def.parameters().map_or(0, <[String]>::len);
        if collection.arity_mismatch(param_count, def.variadic()) {
            self.problems.push((ProblemId::MacroUsageError, Some(name.to_string())));
        }
        match def {
            MacroDef::Function { parameters, replacement, .. } => {
                self.substitute(parameters, replacement, &collection.args, active)
            }
            MacroDef::DynamicFunction { compute, .. } => {
                let expanded: Vec<String> =
                    collection.args.iter().map(|a| self.expand_text(a, active)).collect();
                compute(self.env, &expanded)
            }
            // Object-style definitions never reach here.
            MacroDef::Object { replacement } => replacement.to_string(),
            MacroDef::DynamicObject { compute } => compute(self.env),
        }
    }

    /// Walks a function-style replacement and substitutes parameters.
    ///
    /// A parameter that is the operand of `#` or adjacent to `##` receives
    /// the raw argument text; anywhere else the argument is macro-expanded
    /// first (once, the result being reused). Text inside string and
    /// character literals is copied untouched, a line comment cuts the
    /// replacement short, and block comments become a single space.
    fn substitute(
        &mut self,
        parameters: &[String],
        replacement: &str,
        args: &[String],
        active: &[Rc<str>],
    ) -> String {
        let text: Vec<char> = replacement.chars().collect();
        let mut expanded: Vec<Option<String>> = vec![None; parameters.len()];
        let mut out = String::new();
        let mut pending_paste = false;
        let mut i = 0;
        while i < text.len() {
            let c = text[i];
            if c.is_ascii_whitespace() {
                if !pending_paste {
                    out.push(c);
                }
                i += 1;
                continue;
            }
            match c {
                '"' | '\'' => {
                    let end = skip_literal(&text, i);
                    out.extend(&text[i..end]);
                    i = end;
                    pending_paste = false;
                }
                '/' if text.get(i + 1) == Some(&'/') => break,
                '/' if text.get(i + 1) == Some(&'*') => {
                    i += 2;
                    while i < text.len() && !(text[i] == '*' && text.get(i + 1) == Some(&'/')) {
                        i += 1;
                    }
                    i = (i + 2).min(text.len());
                    if !pending_paste {
                        out.push(' ');
                    }
                }
                '#' if text.get(i + 1) == Some(&'#') => {
                    while out.ends_with(|c: char| c.is_ascii_whitespace()) {
                        out.pop();
                    }
                    pending_paste = true;
                    i += 2;
                }
                '#' => {
                    let after = index_of_next_non_blank(&text, i + 1);
                    let (operand, end) = self.read_identifier(&text, after);
                    match parameters.iter().position(|p| *p == operand) {
                        Some(index) if !operand.is_empty() => {
                            out.push_str(&stringify(args.get(index).map_or("", String::as_str)));
                            i = end;
                        }
                        _ => {
                            // Not a parameter; definition-time validation
                            // normally rejects this, so keep the text as-is.
                            out.push('#');
                            i += 1;
                        }
                    }
                    pending_paste = false;
                }
                _ if self.is_identifier_start(c) => {
                    let (word, end) = self.read_identifier(&text, i);
                    match parameters.iter().position(|p| *p == word) {
                        Some(index) => {
                            let raw = pending_paste || self.paste_follows(&text, end);
                            if raw {
                                out.push_str(args.get(index).map_or("", String::as_str));
                            } else {
                                if expanded[index].is_none() {
                                    let arg = args.get(index).map_or("", String::as_str);
                                    expanded[index] = Some(self.expand_text(arg, active));
                                }
                                if let Some(text) = &expanded[index] {
                                    out.push_str(text);
                                }
                            }
                        }
                        None => out.push_str(&word),
                    }
                    i = end;
                    pending_paste = false;
                }
                _ => {
                    out.push(c);
                    i += 1;
                    pending_paste = false;
                }
            }
        }
        out
    }

    fn read_identifier(&self, text: &[char], at: usize) -> (String, usize) {
        let mut end = at;
        if end < text.len() && self.is_identifier_start(text[end]) {
            while end < text.len() && self.is_identifier_continue(text[end]) {
                end += 1;
            }
        }
        (text[at..end].iter().collect(), end)
    }

    fn paste_follows(&self, text: &[char], at: usize) -> bool {
        let next = index_of_next_non_blank(text, at);
        text.get(next) == Some(&'#') && text.get(next + 1) == Some(&'#')
    }
}

/// Replaces `buf[start..end)` with `with` and shifts paint span ends to
/// match. Spans ending inside the replaced range are stretched to cover the
/// new text.
fn splice(buf: &mut Vec<char>, start: usize, end: usize, with: &[char], paint: &mut [Paint]) {
    let removed = end - start;
    buf.splice(start..end, with.iter().copied());
    for p in paint.iter_mut() {
        if p.end == usize::MAX {
            continue;
        }
        if p.end >= end {
            p.end = p.end - removed + with.len();
        } else if p.end > start {
            p.end = start + with.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macro_def::ExpansionEnv;

    fn env() -> ExpansionEnv {
        ExpansionEnv { file: Rc::from("test.c"), line: 1 }
    }

    fn object(table: &mut MacroTable, name: &str, replacement: &str) {
        table.insert(Rc::from(name), MacroDef::Object { replacement: Rc::from(replacement) });
    }

    fn function(table: &mut MacroTable, name: &str, params: &[&str], replacement: &str) {
        table.insert(
            Rc::from(name),
            MacroDef::Function {
                parameters: params.iter().map(|p| (*p).to_string()).collect(),
                replacement: Rc::from(replacement),
                variadic: Variadic::None,
            },
        );
    }

    fn collect(text: &str, params: usize, variadic: Variadic) -> ArgCollection {
        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0;
        collect_arguments(&chars, &mut pos, params, variadic)
    }

    #[test]
    fn arguments_respect_nesting_and_literals() {
        let c = collect("f(a, b), \"x,)\" )", 2, Variadic::None);
        assert!(c.complete);
        assert_eq!(c.args, vec!["f(a, b)", "\"x,)\""]);
    }

    #[test]
    fn variadic_tail_keeps_commas() {
        let c = collect("\"%d\", x, y)", 2, Variadic::Standard);
        assert!(c.complete);
        assert_eq!(c.args, vec!["\"%d\"", "x, y"]);
    }

    #[test]
    fn empty_invocation_yields_no_arguments() {
        let c = collect("  )", 0, Variadic::None);
        assert!(c.complete);
        assert!(c.args.is_empty());
    }

    #[test]
    fn empty_parentheses_supply_one_empty_argument() {
        let c = collect(")", 1, Variadic::None);
        assert!(c.complete);
        assert_eq!(c.args, vec![String::new()]);
        assert!(!c.arity_mismatch(1, Variadic::None));
    }

    #[test]
    fn excess_arguments_stop_collection() {
        let c = collect("1, 2, 3)", 2, Variadic::None);
        assert!(c.excess);
        assert_eq!(c.args, vec!["1", "2"]);
    }

    #[test]
    fn stringify_escapes_and_collapses() {
        assert_eq!(stringify("a + b"), "\"a + b\"");
        assert_eq!(stringify("  \"hi\\n\"  "), "\"\\\"hi\\\\n\\\"\"");
        assert_eq!(stringify("x\n\t y"), "\"x y\"");
    }

    #[test]
    fn normalize_strips_comments_and_continuations() {
        assert_eq!(normalize_replacement("a /* gap */ b"), "a   b");
        assert_eq!(normalize_replacement("a \\\n b"), "a  b");
        assert_eq!(normalize_replacement("value // trailing"), "value");
        assert_eq!(normalize_replacement("\"/* not a comment */\""), "\"/* not a comment */\"");
    }

    #[test]
    fn self_reference_stays_painted() {
        let mut table = MacroTable::new();
        object(&mut table, "A", "A");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        assert_eq!(ex.expand_text("A", &[]), "A");
    }

    #[test]
    fn mutual_recursion_terminates() {
        let mut table = MacroTable::new();
        object(&mut table, "X", "Y");
        object(&mut table, "Y", "X");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        // X -> Y -> X, where the inner X is painted by the enclosing span.
        assert_eq!(ex.expand_text("X", &[]), "X");
    }

    #[test]
    fn arguments_are_pre_expanded() {
        let mut table = MacroTable::new();
        object(&mut table, "ONE", "1");
        function(&mut table, "ID", &["x"], "x");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        assert_eq!(ex.expand_text("ID(ONE)", &[]), "1");
    }

    #[test]
    fn paste_uses_raw_arguments() {
        let mut table = MacroTable::new();
        object(&mut table, "foo", "oops");
        function(&mut table, "CAT", &["a", "b"], "a ## b");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        assert_eq!(ex.expand_text("CAT(foo, bar)", &[]), "foobar");
    }

    #[test]
    fn stringify_uses_raw_arguments() {
        let mut table = MacroTable::new();
        object(&mut table, "a", "1");
        function(&mut table, "STR", &["x"], "#x");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        assert_eq!(ex.expand_text("STR(a + b)", &[]), "\"a + b\"");
    }

    #[test]
    fn name_without_parentheses_is_left_alone() {
        let mut table = MacroTable::new();
        function(&mut table, "F", &["x"], "x");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        assert_eq!(ex.expand_text("F + 1", &[]), "F + 1");
    }

    #[test]
    fn missing_argument_records_problem() {
        let mut table = MacroTable::new();
        function(&mut table, "ADD", &["a", "b"], "a + b");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        assert_eq!(ex.expand_text("ADD(1)", &[]), "1 + ");
        assert!(ex.problems.iter().any(|(id, _)| *id == ProblemId::MacroUsageError));
    }

    #[test]
    fn active_names_do_not_expand() {
        let mut table = MacroTable::new();
        object(&mut table, "N", "3");
        let env = env();
        let mut ex = Expander::new(&table, &env, false);
        assert_eq!(ex.expand_text("N", &[Rc::from("N")]), "N");
    }
}
