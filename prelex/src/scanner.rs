//! The scanning engine: a lexer and a macro preprocessor driving one
//! stack of character buffers.
//!
//! [`Scanner`] owns the buffer stack. The outermost frame holds the
//! translation unit; `#include` pushes file frames on top of it and macro
//! expansion pushes replacement-text frames. [`Scanner::next_token`] always
//! reads from the top frame and pops exhausted frames transparently, so a
//! caller sees one flat token stream.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::config::{Dialect, ExtensionConfig, ScannerConfig};
use crate::context::{BranchEvent, BranchStack, ContextStack, Frame, FrameKind, IncludedFile, MacroFrame};
use crate::date_time;
use crate::events::{DiagnosticHandler, DirectiveNotice, NullEventSink, Problem, ProblemId, ScanEventSink};
use crate::expand::{
    ArgCollection, Expander, collect_arguments, index_of_next_non_blank, normalize_replacement,
    skip_literal,
};
use crate::expr::{CondEvaluator, evaluate_detached};
use crate::include::IncludeSearch;
use crate::intern::Interner;
use crate::keywords::{directive_names, is_keyword, keyword_names};
use crate::macro_def::{ExpansionEnv, MacroDef, MacroTable, Variadic};
use crate::token::{Token, TokenKind, is_identifier_continue, is_identifier_start};

/// What one call to [`Scanner::next_token`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The next preprocessed token.
    Token(Token),
    /// The translation unit is exhausted.
    EndOfInput,
    /// The configured offset boundary on the outermost buffer was reached.
    OffsetLimitReached(CompletionInfo),
    /// The scan was cancelled through a [`CancelHandle`]. Sticky: every
    /// later call reports the same.
    Cancelled,
}

/// Where the offset boundary fell, for content-assist clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionKind {
    /// Inside an identifier in live code; macro names and keywords apply.
    MacroReference,
    /// Inside the directive keyword right after `#`.
    DirectivePrefix,
    /// Inside a conditionally skipped region.
    UnreachableCode,
    /// None of the above, e.g. between tokens.
    NoSuchKind,
}

/// Payload of [`ScanOutcome::OffsetLimitReached`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionInfo {
    /// Completion context at the boundary.
    pub kind: CompletionKind,
    /// The partial identifier under the boundary, if any.
    pub prefix: String,
    /// Candidate keywords for this context: directive names after `#`,
    /// dialect keywords otherwise.
    pub keywords: Vec<String>,
}

/// Cheap cloneable handle that cancels a running scan from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cancellation. The scanner observes the flag between tokens.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The preprocessing scanner.
///
/// Construct one per translation unit, then pull tokens with
/// [`next_token`](Scanner::next_token) until [`ScanOutcome::EndOfInput`].
pub struct Scanner {
    stack: ContextStack,
    branches: BranchStack,
    macros: MacroTable,
    interner: Interner,
    includes: IncludeSearch,
    /// Every file pushed so far, for `#import` semantics.
    included_files: HashSet<Rc<str>>,
    /// Files that executed `#pragma once`.
    once_files: HashSet<Rc<str>>,
    dialect: Dialect,
    extension: ExtensionConfig,
    sink: Box<dyn ScanEventSink>,
    diagnostic_handler: Option<DiagnosticHandler>,
    problems: Vec<Problem>,
    cancel: Arc<AtomicBool>,
    cancelled: bool,
    finished: bool,
    lookahead: Option<Token>,
    assist: bool,
    pending_completion: Option<CompletionInfo>,
    end_of_completion_sent: bool,
}

impl Scanner {
    /// Create a scanner over `source`, reported as file `name`.
    #[must_use]
    pub fn new(source: &str, name: &str, config: &ScannerConfig) -> Self {
        Self::with_event_sink(source, name, config, Box::new(NullEventSink))
    }

    /// Like [`new`](Scanner::new), with an event sink installed before the
    /// first buffer is pushed so that it sees the whole context lifecycle.
    #[must_use]
    pub fn with_event_sink(
        source: &str,
        name: &str,
        config: &ScannerConfig,
        sink: Box<dyn ScanEventSink>,
    ) -> Self {
        let mut scanner = Scanner {
            stack: ContextStack::default(),
            branches: BranchStack::default(),
            macros: MacroTable::new(),
            interner: Interner::default(),
            includes: IncludeSearch::new(config),
            included_files: HashSet::new(),
            once_files: HashSet::new(),
            dialect: config.dialect,
            extension: config.extension.clone(),
            sink,
            diagnostic_handler: config.diagnostic_handler.clone(),
            problems: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            cancelled: false,
            finished: false,
            lookahead: None,
            assist: false,
            pending_completion: None,
            end_of_completion_sent: false,
        };
        scanner.seed_builtin_macros();
        let additional = scanner.extension.additional_macros.clone();
        for (spec, value) in &additional {
            scanner.install_symbol(spec, value, false);
        }
        for (spec, value) in &config.defined_symbols {
            scanner.install_symbol(spec, value, scanner.extension.empty_define_value_is_one);
        }
        scanner.adopt_macro_pre_includes(config);
        scanner.sink.translation_unit_start(name);
        scanner.stack.push(Frame::from_str(
            source,
            FrameKind::TranslationUnit { name: Rc::from(name) },
        ));
        scanner.push_pre_includes(config);
        scanner
    }

    /// A handle that cancels this scan; safe to move to another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { flag: self.cancel.clone() }
    }

    /// Stop producing tokens once the outermost buffer reaches `offset`.
    pub fn set_offset_boundary(&mut self, offset: usize) {
        self.lower_boundary(offset);
        self.assist = false;
    }

    /// Like [`set_offset_boundary`](Scanner::set_offset_boundary), and
    /// additionally report the identifier cut by the boundary as a
    /// [`TokenKind::Completion`] token followed by one
    /// [`TokenKind::EndOfCompletion`].
    pub fn set_content_assist_offset(&mut self, offset: usize) {
        self.lower_boundary(offset);
        self.assist = true;
    }

    fn lower_boundary(&mut self, offset: usize) {
        let frame = self.stack.frame_mut(0);
        frame.limit = offset.min(frame.text.len());
    }

    /// Problems recorded so far.
    #[must_use]
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Whether `name` is currently defined as a macro.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Produce the next token, after directive handling, macro expansion,
    /// `##` pasting and adjacent string-literal concatenation.
    pub fn next_token(&mut self) -> ScanOutcome {
        if self.cancelled {
            return ScanOutcome::Cancelled;
        }
        if let Some(outcome) = self.boundary_outcome() {
            return outcome;
        }
        if self.finished {
            return ScanOutcome::EndOfInput;
        }
        match self.produce() {
            Some(token) => ScanOutcome::Token(token),
            None => {
                if self.cancelled {
                    ScanOutcome::Cancelled
                } else if let Some(outcome) = self.boundary_outcome() {
                    outcome
                } else {
                    if self.branches.depth() > 0 {
                        let offset = self.stack.current_file().map_or(0, |(_, pos)| pos);
                        self.report(ProblemId::UnbalancedConditional, offset, None);
                    }
                    self.finished = true;
                    self.sink.translation_unit_end();
                    ScanOutcome::EndOfInput
                }
            }
        }
    }

    fn boundary_outcome(&mut self) -> Option<ScanOutcome> {
        let info = self.pending_completion.clone()?;
        // a completion token discovered during lookahead is still queued
        if let Some(token) = self.lookahead.take_if(|t| t.kind == TokenKind::Completion) {
            return Some(ScanOutcome::Token(token));
        }
        if self.assist && !self.end_of_completion_sent {
            self.end_of_completion_sent = true;
            let text = self.interner.intern("");
            return Some(ScanOutcome::Token(Token::new(TokenKind::EndOfCompletion, text)));
        }
        Some(ScanOutcome::OffsetLimitReached(info))
    }

    /// One-token-lookahead layer over [`fetch_token`](Scanner::fetch_token):
    /// pastes around `##` by rescanning the joined spelling, and merges
    /// adjacent string literals.
    fn produce(&mut self) -> Option<Token> {
        let mut token = match self.lookahead.take() {
            Some(token) => token,
            None => self.fetch_token()?,
        };
        if token.kind == TokenKind::Completion {
            return Some(token);
        }
        loop {
            let Some(next) = self.fetch_token() else {
                return Some(token);
            };
            if next.is_paste_operator() {
                let Some(operand) = self.fetch_token() else {
                    self.lookahead = Some(next);
                    return Some(token);
                };
                let joined = format!("{}{}", token.text(), operand.text());
                self.stack.push(Frame::from_str(&joined, FrameKind::Synthetic));
                token = match self.fetch_token() {
                    Some(rescanned) => rescanned,
                    None => return Some(token),
                };
            } else if token.is_string_literal() && next.is_string_literal() {
                let wide = token.kind == TokenKind::WideStringLiteral
                    || next.kind == TokenKind::WideStringLiteral;
                let kind = if wide { TokenKind::WideStringLiteral } else { TokenKind::StringLiteral };
                token = Token::new(kind, format!("{}{}", token.text(), next.text()));
            } else {
                self.lookahead = Some(next);
                return Some(token);
            }
        }
    }

    /// Scan one token from the top buffer, processing directives and macro
    /// expansions on the way. `None` means the scan stopped: end of input,
    /// the offset boundary, or cancellation; the caller inspects which.
    fn fetch_token(&mut self) -> Option<Token> {
        loop {
            if self.check_cancel() {
                return None;
            }
            if self.stack.is_empty() {
                return None;
            }
            if self.stack.top().at_end() {
                if self.stack.on_outermost() {
                    let boundary = {
                        let frame = self.stack.top();
                        frame.limit < frame.text.len()
                    };
                    if boundary && self.pending_completion.is_none() {
                        self.pending_completion =
                            Some(self.boundary_info(CompletionKind::NoSuchKind, ""));
                    }
                    return None;
                }
                self.pop_frame_with_event();
                continue;
            }
            if self.skip_blank() {
                continue;
            }
            let (c, c1) = {
                let frame = self.stack.top();
                (frame.peek(), frame.peek_at(1))
            };
            let Some(c) = c else { continue };
            match c {
                '#' => {
                    let directive_position = {
                        let frame = self.stack.top();
                        file_frame(frame) && at_line_start(frame)
                    };
                    if directive_position {
                        if let Some(token) = self.handle_directive() {
                            return Some(token);
                        }
                        continue;
                    }
                    let width = if c1 == Some('#') { 2 } else { 1 };
                    self.stack.top_mut().pos += width;
                    let text = self.interner.intern(if width == 2 { "##" } else { "#" });
                    return Some(Token::new(TokenKind::Operator, text));
                }
                '"' => return Some(self.scan_string(false)),
                '\'' => return Some(self.scan_char(false)),
                'L' if c1 == Some('"') => {
                    self.stack.top_mut().pos += 1;
                    return Some(self.scan_string(true));
                }
                'L' if c1 == Some('\'') => {
                    self.stack.top_mut().pos += 1;
                    return Some(self.scan_char(true));
                }
                d if d.is_ascii_digit() => return Some(self.scan_number()),
                '.' if matches!(c1, Some(d) if d.is_ascii_digit()) => {
                    return Some(self.scan_number());
                }
                d if is_identifier_start(d)
                    || (self.extension.dollar_in_identifiers && d == '$')
                    || (d == '\\' && matches!(c1, Some('u' | 'U'))) =>
                {
                    if let Some(token) = self.handle_identifier() {
                        return Some(token);
                    }
                }
                _ => {
                    if let Some(token) = self.scan_operator() {
                        return Some(token);
                    }
                }
            }
        }
    }

    fn check_cancel(&mut self) -> bool {
        if self.cancelled {
            return true;
        }
        if self.cancel.load(Ordering::Relaxed) {
            self.cancelled = true;
            if !self.stack.is_empty() {
                let top = self.stack.top_mut();
                top.pos = top.limit;
            }
            debug!("scan cancelled");
            return true;
        }
        false
    }

    fn pop_frame_with_event(&mut self) {
        let frame = self.stack.pop();
        match &frame.kind {
            FrameKind::Inclusion(file) => self.sink.inclusion_end(&file.path),
            FrameKind::Expansion(frame) => self.sink.expansion_end(&frame.name),
            FrameKind::TranslationUnit { .. } | FrameKind::Synthetic => {}
        }
    }

    /// Skip whitespace, newlines, escaped newlines and comments on the top
    /// frame. Returns whether anything was consumed.
    fn skip_blank(&mut self) -> bool {
        let frame = self.stack.top_mut();
        let start = frame.pos;
        loop {
            match frame.peek() {
                Some(' ' | '\t' | '\r' | '\n') => frame.pos += 1,
                Some('\\') if frame.peek_at(1) == Some('\n') => frame.pos += 2,
                Some('\\') if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') => {
                    frame.pos += 3;
                }
                Some('/') if frame.peek_at(1) == Some('/') => {
                    while !matches!(frame.peek(), None | Some('\n')) {
                        frame.pos += 1;
                    }
                }
                Some('/') if frame.peek_at(1) == Some('*') => {
                    frame.pos += 2;
                    while let Some(c) = frame.peek() {
                        if c == '*' && frame.peek_at(1) == Some('/') {
                            frame.pos += 2;
                            break;
                        }
                        frame.pos += 1;
                    }
                }
                _ => break,
            }
        }
        frame.pos != start
    }

    /// Skip spaces, tabs, escaped newlines and block comments without
    /// crossing a bare newline. Used within directive lines.
    fn skip_line_blanks(&mut self) {
        let frame = self.stack.top_mut();
        loop {
            match frame.peek() {
                Some(' ' | '\t') => frame.pos += 1,
                Some('\r') if frame.peek_at(1) == Some('\n') => break,
                Some('\r') => frame.pos += 1,
                Some('\\') if frame.peek_at(1) == Some('\n') => frame.pos += 2,
                Some('\\') if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') => {
                    frame.pos += 3;
                }
                Some('/') if frame.peek_at(1) == Some('*') => {
                    frame.pos += 2;
                    while let Some(c) = frame.peek() {
                        if c == '*' && frame.peek_at(1) == Some('/') {
                            frame.pos += 2;
                            break;
                        }
                        frame.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    /// Scan a plain identifier on the top frame; empty when the cursor is
    /// not at one. Used for directive keywords, macro names and parameters.
    fn scan_word(&mut self) -> String {
        let dollar = self.extension.dollar_in_identifiers;
        let frame = self.stack.top_mut();
        let mut word = String::new();
        if !matches!(frame.peek(), Some(c) if is_identifier_start(c) || (dollar && c == '$')) {
            return word;
        }
        loop {
            match frame.peek() {
                Some(c) if is_identifier_continue(c) || (dollar && c == '$') => {
                    word.push(c);
                    frame.pos += 1;
                }
                Some('\\') if frame.peek_at(1) == Some('\n') => frame.pos += 2,
                Some('\\') if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') => {
                    frame.pos += 3;
                }
                _ => break,
            }
        }
        word
    }

    /// Scan an identifier in ordinary code, keeping universal character
    /// names (`\uXXXX`, `\UXXXXXXXX`) in the spelling.
    fn scan_identifier_text(&mut self) -> String {
        let dollar = self.extension.dollar_in_identifiers;
        let frame = self.stack.top_mut();
        let mut name = String::new();
        loop {
            match frame.peek() {
                Some(c) if is_identifier_continue(c) || (dollar && c == '$') => {
                    name.push(c);
                    frame.pos += 1;
                }
                Some('\\') if matches!(frame.peek_at(1), Some('u' | 'U')) => {
                    let digits = if frame.peek_at(1) == Some('u') { 4 } else { 8 };
                    name.push('\\');
                    frame.pos += 1;
                    if let Some(marker) = frame.peek() {
                        name.push(marker);
                        frame.pos += 1;
                    }
                    for _ in 0..digits {
                        match frame.peek() {
                            Some(h) if h.is_ascii_hexdigit() => {
                                name.push(h);
                                frame.pos += 1;
                            }
                            _ => break,
                        }
                    }
                }
                Some('\\') if frame.peek_at(1) == Some('\n') => frame.pos += 2,
                Some('\\') if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') => {
                    frame.pos += 3;
                }
                _ => break,
            }
        }
        name
    }

    /// An identifier was reached in ordinary code: expand it as a macro, or
    /// classify it as keyword or identifier. `None` means a macro frame was
    /// pushed and scanning continues there.
    fn handle_identifier(&mut self) -> Option<Token> {
        let start = self.stack.top().pos;
        let name = self.scan_identifier_text();
        if self.assist && self.boundary_cut() {
            let info = self.boundary_info(CompletionKind::MacroReference, &name);
            self.pending_completion = Some(info);
            let text = self.interner.intern(&name);
            return Some(Token::new(TokenKind::Completion, text));
        }
        if !self.stack.macro_active(&name) {
            if let Some(def) = self.macros.get(name.as_str()).cloned() {
                if self.try_expand(&name, &def, start) {
                    return None;
                }
            }
        }
        let keyword = is_keyword(&name, self.dialect)
            || self.extension.additional_keywords.iter().any(|k| k == &name);
        let kind = if keyword { TokenKind::Keyword } else { TokenKind::Identifier };
        let text = self.interner.intern(&name);
        Some(Token::new(kind, text))
    }

    /// Push an expansion frame for `name` if it can be invoked here.
    /// A function-style macro without a following `(` is left alone.
    fn try_expand(&mut self, name: &str, def: &MacroDef, start: usize) -> bool {
        let name_end = self.stack.top().pos;
        match def {
            MacroDef::Object { replacement } => {
                let text = replacement.clone();
                self.push_expansion(name, &text, None, start, name_end);
                true
            }
            MacroDef::DynamicObject { compute } => {
                let env = self.expansion_env();
                let text = compute(&env);
                self.push_expansion(name, &text, None, start, name_end);
                true
            }
            MacroDef::Function { .. } | MacroDef::DynamicFunction { .. } => {
                if !self.find_invocation_paren() {
                    return false;
                }
                let collection = self.collect_invocation_arguments(def);
                let env = self.expansion_env();
                let active = self.active_macro_names();
                let dollar = self.extension.dollar_in_identifiers;
                let mut expander = Expander::new(&self.macros, &env, dollar);
                let text = expander.invoke(name, def, &collection, &active);
                let problems = std::mem::take(&mut expander.problems);
                drop(expander);
                for (id, argument) in problems {
                    self.report(id, start, argument);
                }
                let end = self.stack.top().pos;
                self.push_expansion(name, &text, def.parameters(), start, end);
                true
            }
        }
    }

    /// Look for the `(` that begins an argument list. The walk descends
    /// past exhausted frames without consuming anything; only when the
    /// paren is found are those frames popped and the cursor moved past it.
    fn find_invocation_paren(&mut self) -> bool {
        for level in (0..self.stack.depth()).rev() {
            let probe = {
                let frame = self.stack.frame(level);
                let i = index_of_next_non_blank(&frame.text[..frame.limit], frame.pos);
                if i < frame.limit { Some((i, frame.text[i] == '(')) } else { None }
            };
            match probe {
                Some((i, true)) => {
                    while self.stack.depth() > level + 1 {
                        self.pop_frame_with_event();
                    }
                    self.stack.top_mut().pos = i + 1;
                    return true;
                }
                Some((_, false)) => return false,
                None => {}
            }
        }
        false
    }

    fn collect_invocation_arguments(&mut self, def: &MacroDef) -> ArgCollection {
        let param_count = def.parameters().map_or(0, <[String]>::len);
        let variadic = def.variadic();
        let frame = self.stack.top_mut();
        let text = frame.text.clone();
        let limit = frame.limit;
        let mut cursor = frame.pos;
        let collection = collect_arguments(&text[..limit], &mut cursor, param_count, variadic);
        frame.pos = cursor;
        collection
    }

    fn push_expansion(
        &mut self,
        name: &str,
        text: &str,
        parameters: Option<&[String]>,
        start: usize,
        end: usize,
    ) {
        let interned = self.interner.intern(name);
        self.sink.expansion_start(name, parameters, start, end);
        self.stack.push(Frame::from_str(
            text,
            FrameKind::Expansion(MacroFrame { name: interned }),
        ));
    }

    fn active_macro_names(&self) -> Vec<Rc<str>> {
        (0..self.stack.depth())
            .filter_map(|i| match &self.stack.frame(i).kind {
                FrameKind::Expansion(frame) => Some(frame.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// File and line of the nearest enclosing file frame, for dynamic
    /// macros and diagnostics.
    fn expansion_env(&mut self) -> ExpansionEnv {
        match self.stack.current_file_index() {
            Some(index) => {
                let pos = self.stack.frame(index).pos;
                let line = self.stack.frame_mut(index).line_number_at(pos);
                let file = match &self.stack.frame(index).kind {
                    FrameKind::TranslationUnit { name } => name.clone(),
                    FrameKind::Inclusion(file) => file.path.clone(),
                    _ => Rc::from("<command-line>"),
                };
                ExpansionEnv { file, line }
            }
            None => ExpansionEnv { file: Rc::from("<command-line>"), line: 1 },
        }
    }

    fn report(&mut self, id: ProblemId, offset: usize, argument: Option<String>) {
        let file = self
            .stack
            .current_file()
            .map_or_else(|| Rc::from("<command-line>"), |(file, _)| file);
        let problem = Problem { id, offset, argument, file };
        debug!("{problem}");
        if let Some(handler) = &self.diagnostic_handler {
            handler(&problem);
        }
        self.problems.push(problem);
    }

    fn boundary_cut(&self) -> bool {
        if !self.stack.on_outermost() {
            return false;
        }
        let frame = self.stack.top();
        frame.pos >= frame.limit && frame.limit < frame.text.len()
    }

    fn boundary_info(&self, kind: CompletionKind, prefix: &str) -> CompletionInfo {
        let keywords = match kind {
            CompletionKind::DirectivePrefix => {
                directive_names().iter().map(ToString::to_string).collect()
            }
            CompletionKind::MacroReference => {
                let mut keywords: Vec<String> =
                    keyword_names(self.dialect).iter().map(ToString::to_string).collect();
                keywords.extend(self.extension.additional_keywords.iter().cloned());
                keywords
            }
            CompletionKind::UnreachableCode | CompletionKind::NoSuchKind => Vec::new(),
        };
        CompletionInfo { kind, prefix: prefix.to_string(), keywords }
    }

    // ---- directives ----------------------------------------------------

    /// The cursor is on a `#` that opens a directive line. Returns a token
    /// only when the content-assist boundary cuts the directive keyword.
    fn handle_directive(&mut self) -> Option<Token> {
        let offset = self.stack.top().pos;
        self.stack.top_mut().pos += 1;
        self.skip_line_blanks();
        let word = self.scan_word();
        if self.assist && self.boundary_cut() {
            let info = self.boundary_info(CompletionKind::DirectivePrefix, &word);
            self.pending_completion = Some(info);
            let text = self.interner.intern(&word);
            return Some(Token::new(TokenKind::Completion, text));
        }
        match word.as_str() {
            "define" => self.handle_define(offset),
            "undef" => self.handle_undef(offset),
            "if" => self.handle_if(offset),
            "ifdef" => self.handle_ifdef(offset, false),
            "ifndef" => self.handle_ifdef(offset, true),
            "elif" => self.handle_elif(offset),
            "else" => self.handle_else(offset),
            "endif" => self.handle_endif(offset),
            "include" => self.handle_include(offset, false, false),
            "include_next" => self.handle_include(offset, true, false),
            "import" => self.handle_include(offset, false, true),
            "error" => self.handle_message(offset, true),
            "warning" => self.handle_message(offset, false),
            "pragma" => self.handle_pragma(offset),
            "line" => self.handle_line(offset),
            "" => {
                // a null directive, or a line marker such as `# 10 "f.c"`
                if matches!(self.stack.top().peek(), Some(d) if d.is_ascii_digit()) {
                    self.handle_line(offset);
                }
            }
            _ => {
                self.report(ProblemId::InvalidDirective, offset, Some(word));
                self.discard_line();
            }
        }
        None
    }

    fn handle_define(&mut self, offset: usize) {
        self.skip_line_blanks();
        let name = self.scan_word();
        if name.is_empty() {
            self.report(ProblemId::InvalidMacroDefinition, offset, None);
            self.discard_line();
            return;
        }
        // a parameter list exists only when `(` follows the name directly
        let function_style = self.stack.top().peek() == Some('(');
        let mut parameters: Vec<String> = Vec::new();
        let mut variadic = Variadic::None;
        if function_style {
            self.stack.top_mut().pos += 1;
            if let Err(id) = self.parse_parameter_list(&mut parameters, &mut variadic) {
                self.report(id, offset, Some(name));
                self.discard_line();
                return;
            }
        }
        let raw = self.capture_logical_line();
        let replacement = normalize_replacement(&raw);
        if misuses_va_args(&replacement, variadic) {
            self.report(ProblemId::InvalidVaArgs, offset, Some(name));
            return;
        }
        if function_style {
            if let Some(culprit) = stray_stringify_operand(&replacement, &parameters) {
                self.report(ProblemId::MacroPastingError, offset, Some(culprit));
                return;
            }
        }
        debug!("#define {name} -> {replacement:?}");
        let interned = self.interner.intern(&name);
        let def = if function_style {
            MacroDef::Function {
                parameters: parameters.into(),
                replacement: Rc::from(replacement),
                variadic,
            }
        } else {
            MacroDef::Object { replacement: Rc::from(replacement) }
        };
        self.macros.insert(interned, def);
        self.sink.directive(&DirectiveNotice::Define { name: &name, offset });
    }

    fn parse_parameter_list(
        &mut self,
        parameters: &mut Vec<String>,
        variadic: &mut Variadic,
    ) -> Result<(), ProblemId> {
        loop {
            self.skip_line_blanks();
            match self.stack.top().peek() {
                Some(')') => {
                    self.stack.top_mut().pos += 1;
                    return Ok(());
                }
                Some('.') => {
                    let ellipsis = {
                        let frame = self.stack.top();
                        frame.peek_at(1) == Some('.') && frame.peek_at(2) == Some('.')
                    };
                    if !ellipsis {
                        return Err(ProblemId::InvalidMacroDefinition);
                    }
                    self.stack.top_mut().pos += 3;
                    *variadic = Variadic::Standard;
                    parameters.push("__VA_ARGS__".to_string());
                    return self.expect_close_paren();
                }
                Some(c)
                    if is_identifier_start(c)
                        || (self.extension.dollar_in_identifiers && c == '$') =>
                {
                    let param = self.scan_word();
                    self.skip_line_blanks();
                    let gnu_ellipsis = {
                        let frame = self.stack.top();
                        frame.peek() == Some('.')
                            && frame.peek_at(1) == Some('.')
                            && frame.peek_at(2) == Some('.')
                    };
                    if gnu_ellipsis {
                        self.stack.top_mut().pos += 3;
                        *variadic = Variadic::Gnu;
                        parameters.push(param);
                        return self.expect_close_paren();
                    }
                    parameters.push(param);
                    match self.stack.top().peek() {
                        Some(',') => self.stack.top_mut().pos += 1,
                        Some(')') => {
                            self.stack.top_mut().pos += 1;
                            return Ok(());
                        }
                        _ => return Err(ProblemId::MissingClosingParen),
                    }
                }
                None | Some('\n') => return Err(ProblemId::MissingClosingParen),
                _ => return Err(ProblemId::InvalidMacroDefinition),
            }
        }
    }

    fn expect_close_paren(&mut self) -> Result<(), ProblemId> {
        self.skip_line_blanks();
        if self.stack.top().peek() == Some(')') {
            self.stack.top_mut().pos += 1;
            Ok(())
        } else {
            Err(ProblemId::MissingClosingParen)
        }
    }

    fn handle_undef(&mut self, offset: usize) {
        self.skip_line_blanks();
        let name = self.scan_word();
        self.discard_line();
        if name.is_empty() {
            self.report(ProblemId::InvalidDirective, offset, Some("undef".to_string()));
            return;
        }
        let removed = self.macros.remove(name.as_str()).is_some();
        debug!("#undef {name} (removed: {removed})");
        self.sink.directive(&DirectiveNotice::Undef { name: &name, removed, offset });
    }

    fn handle_if(&mut self, offset: usize) {
        let condition = self.capture_logical_line();
        let taken = self.evaluate_condition(&condition, offset);
        self.branches.transition(BranchEvent::If);
        self.sink.directive(&DirectiveNotice::If { taken, offset });
        if !taken {
            self.skip_conditional_group(true);
        }
    }

    fn handle_ifdef(&mut self, offset: usize, negate: bool) {
        self.skip_line_blanks();
        let name = self.scan_word();
        self.discard_line();
        self.branches.transition(BranchEvent::If);
        if name.is_empty() {
            let directive = if negate { "ifndef" } else { "ifdef" };
            self.report(ProblemId::InvalidDirective, offset, Some(directive.to_string()));
            return;
        }
        let defined = self.macros.contains_key(name.as_str());
        let taken = defined != negate;
        if negate {
            self.sink.directive(&DirectiveNotice::Ifndef { name: &name, taken, offset });
        } else {
            self.sink.directive(&DirectiveNotice::Ifdef { name: &name, taken, offset });
        }
        if !taken {
            self.skip_conditional_group(true);
        }
    }

    fn handle_elif(&mut self, offset: usize) {
        // the previous group was taken, so this one is skipped unevaluated
        self.discard_line();
        if !self.branches.transition(BranchEvent::Elif) {
            self.report(ProblemId::UnbalancedConditional, offset, Some("elif".to_string()));
            return;
        }
        self.sink.directive(&DirectiveNotice::Elif { taken: false, offset });
        self.skip_conditional_group(false);
    }

    fn handle_else(&mut self, offset: usize) {
        self.discard_line();
        if !self.branches.transition(BranchEvent::Else) {
            self.report(ProblemId::UnbalancedConditional, offset, Some("else".to_string()));
            return;
        }
        self.sink.directive(&DirectiveNotice::Else { taken: false, offset });
        self.skip_conditional_group(false);
    }

    fn handle_endif(&mut self, offset: usize) {
        self.discard_line();
        if !self.branches.transition(BranchEvent::End) {
            self.report(ProblemId::UnbalancedConditional, offset, Some("endif".to_string()));
            return;
        }
        self.sink.directive(&DirectiveNotice::Endif { offset });
    }

    fn evaluate_condition(&mut self, condition: &str, offset: usize) -> bool {
        let env = self.expansion_env();
        let dollar = self.extension.dollar_in_identifiers;
        let mut evaluator = CondEvaluator::new(&self.macros, &env, dollar);
        let taken = evaluator.evaluate(condition);
        let problems = evaluator.problems;
        for (id, argument) in problems {
            self.report(id, offset, argument);
        }
        taken
    }

    fn handle_include(&mut self, offset: usize, include_next: bool, import: bool) {
        let raw = self.capture_logical_line();
        let spelling = match parse_include_spelling(&raw) {
            Some(spelling) => Some(spelling),
            None => {
                // not a literal form; macro-expand the line and retry
                let env = self.expansion_env();
                let active = self.active_macro_names();
                let dollar = self.extension.dollar_in_identifiers;
                let mut expander = Expander::new(&self.macros, &env, dollar);
                let expanded = expander.expand_text(&raw, &active);
                let problems = std::mem::take(&mut expander.problems);
                drop(expander);
                for (id, argument) in problems {
                    self.report(id, offset, argument);
                }
                parse_include_spelling(&expanded)
            }
        };
        let Some((name, system)) = spelling else {
            self.report(ProblemId::InvalidDirective, offset, Some(raw.trim().to_string()));
            return;
        };
        let current_dir = if system { None } else { self.stack.current_dir() };
        let resume_after = if include_next { self.stack.current_path_index() } else { None };
        let resolved = self.includes.resolve(
            &name,
            system,
            include_next,
            current_dir.as_deref(),
            resume_after,
        );
        let Some(resolved) = resolved else {
            self.report(ProblemId::InclusionNotFound, offset, Some(name));
            return;
        };
        if self.stack.is_circular_inclusion(&resolved.path) {
            debug!("circular inclusion of {} refused", resolved.path);
            return;
        }
        if self.once_files.contains(&resolved.path) {
            debug!("{} guarded by #pragma once", resolved.path);
            return;
        }
        if import && self.included_files.contains(&resolved.path) {
            debug!("{} already imported", resolved.path);
            return;
        }
        self.included_files.insert(resolved.path.clone());
        self.sink.inclusion_start(&resolved.path, system, offset);
        self.stack.push(Frame::new(
            resolved.text,
            FrameKind::Inclusion(IncludedFile {
                path: resolved.path,
                path_index: resolved.path_index,
            }),
        ));
    }

    fn handle_message(&mut self, offset: usize, error: bool) {
        let message = self.capture_logical_line().trim().to_string();
        if error {
            self.report(ProblemId::PoundError, offset, Some(message.clone()));
            self.sink.directive(&DirectiveNotice::Error { message: &message, offset });
        } else {
            warn!("#warning {message}");
            self.report(ProblemId::PoundWarning, offset, Some(message.clone()));
            self.sink.directive(&DirectiveNotice::Warning { message: &message, offset });
        }
    }

    fn handle_pragma(&mut self, offset: usize) {
        let body = self.capture_logical_line().trim().to_string();
        if body == "once" {
            if let Some((file, _)) = self.stack.current_file() {
                debug!("#pragma once in {file}");
                self.once_files.insert(file);
            }
        }
        self.sink.directive(&DirectiveNotice::Pragma { body: &body, offset });
    }

    fn handle_line(&mut self, offset: usize) {
        let body = self.capture_logical_line().trim().to_string();
        self.sink.directive(&DirectiveNotice::Line { body: &body, offset });
    }

    /// Capture the rest of the logical line without consuming the final
    /// newline. Escaped newlines continue the line; block comments and
    /// literals are carried over intact, so a block comment may drag the
    /// capture across physical lines.
    fn capture_logical_line(&mut self) -> String {
        let frame = self.stack.top_mut();
        let mut out = String::new();
        loop {
            match frame.peek() {
                None | Some('\n') => break,
                Some('\\') if frame.peek_at(1) == Some('\n') => {
                    out.push_str("\\\n");
                    frame.pos += 2;
                }
                Some('\\') if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') => {
                    out.push_str("\\\n");
                    frame.pos += 3;
                }
                Some('/') if frame.peek_at(1) == Some('*') => {
                    out.push_str("/*");
                    frame.pos += 2;
                    loop {
                        match frame.peek() {
                            None => break,
                            Some('*') if frame.peek_at(1) == Some('/') => {
                                out.push_str("*/");
                                frame.pos += 2;
                                break;
                            }
                            Some(c) => {
                                out.push(c);
                                frame.pos += 1;
                            }
                        }
                    }
                }
                Some(q @ ('"' | '\'')) => {
                    out.push(q);
                    frame.pos += 1;
                    loop {
                        match frame.peek() {
                            None | Some('\n') => break,
                            Some('\\') => {
                                out.push('\\');
                                frame.pos += 1;
                                if let Some(c) = frame.peek() {
                                    out.push(c);
                                    frame.pos += 1;
                                }
                            }
                            Some(c) => {
                                out.push(c);
                                frame.pos += 1;
                                if c == q {
                                    break;
                                }
                            }
                        }
                    }
                }
                Some(c) => {
                    out.push(c);
                    frame.pos += 1;
                }
            }
        }
        out
    }

    fn discard_line(&mut self) {
        let _ = self.capture_logical_line();
    }

    /// Skip a conditional group that was not taken. Nested conditionals
    /// are counted without interpretation; at nesting depth zero, `#elif`
    /// is evaluated and `#else` resumes scanning when `check_else` holds.
    fn skip_conditional_group(&mut self, check_else: bool) {
        let mut depth = 0usize;
        loop {
            if self.check_cancel() {
                return;
            }
            let (at_end, boundary) = {
                let frame = self.stack.top();
                (frame.at_end(), frame.limit < frame.text.len())
            };
            if at_end {
                if self.stack.on_outermost() && boundary {
                    let kind = if self.assist {
                        CompletionKind::UnreachableCode
                    } else {
                        CompletionKind::NoSuchKind
                    };
                    self.pending_completion = Some(self.boundary_info(kind, ""));
                    return;
                }
                // the group never closed inside this buffer
                let offset = self.stack.top().pos;
                self.report(ProblemId::UnbalancedConditional, offset, None);
                self.branches.transition(BranchEvent::End);
                return;
            }
            let directive_position = {
                let frame = self.stack.top();
                frame.peek() == Some('#') && file_frame(frame) && at_line_start(frame)
            };
            if directive_position {
                let offset = self.stack.top().pos;
                self.stack.top_mut().pos += 1;
                self.skip_line_blanks();
                let word = self.scan_word();
                if self.assist && self.boundary_cut() {
                    self.pending_completion =
                        Some(self.boundary_info(CompletionKind::UnreachableCode, &word));
                    return;
                }
                match word.as_str() {
                    "if" | "ifdef" | "ifndef" => {
                        depth += 1;
                        self.discard_line();
                    }
                    "elif" => {
                        let condition = self.capture_logical_line();
                        if depth == 0 {
                            if !self.branches.transition(BranchEvent::Elif) {
                                self.report(
                                    ProblemId::UnbalancedConditional,
                                    offset,
                                    Some("elif".to_string()),
                                );
                            } else if check_else {
                                let taken = self.evaluate_condition(&condition, offset);
                                self.sink.directive(&DirectiveNotice::Elif { taken, offset });
                                if taken {
                                    return;
                                }
                            } else {
                                self.sink.directive(&DirectiveNotice::Elif { taken: false, offset });
                            }
                        }
                    }
                    "else" => {
                        self.discard_line();
                        if depth == 0 {
                            if !self.branches.transition(BranchEvent::Else) {
                                self.report(
                                    ProblemId::UnbalancedConditional,
                                    offset,
                                    Some("else".to_string()),
                                );
                            } else {
                                self.sink
                                    .directive(&DirectiveNotice::Else { taken: check_else, offset });
                                if check_else {
                                    return;
                                }
                            }
                        }
                    }
                    "endif" => {
                        self.discard_line();
                        if depth == 0 {
                            self.branches.transition(BranchEvent::End);
                            self.sink.directive(&DirectiveNotice::Endif { offset });
                            return;
                        }
                        depth -= 1;
                    }
                    "include" | "include_next" | "import" => {
                        let spelled = self.capture_logical_line();
                        self.sink.inactive_inclusion(spelled.trim(), offset);
                    }
                    _ => self.discard_line(),
                }
                continue;
            }
            let frame = self.stack.top_mut();
            match frame.peek() {
                Some('/') if frame.peek_at(1) == Some('/') => {
                    while !matches!(frame.peek(), None | Some('\n')) {
                        frame.pos += 1;
                    }
                }
                Some('/') if frame.peek_at(1) == Some('*') => {
                    frame.pos += 2;
                    while let Some(c) = frame.peek() {
                        if c == '*' && frame.peek_at(1) == Some('/') {
                            frame.pos += 2;
                            break;
                        }
                        frame.pos += 1;
                    }
                }
                Some('"' | '\'') => {
                    let text = frame.text.clone();
                    let limit = frame.limit;
                    frame.pos = skip_literal(&text[..limit], frame.pos);
                }
                _ => frame.pos += 1,
            }
        }
    }

    // ---- literal scanning ----------------------------------------------

    fn scan_number(&mut self) -> Token {
        let extra = self.extension.extra_number_suffixes.clone();
        let (start, image, kind, bad) = {
            let frame = self.stack.top_mut();
            let start = frame.pos;
            let mut image = String::new();
            let mut floating = false;
            let mut hex = false;
            let mut bad: Option<ProblemId> = None;

            if frame.peek() == Some('0') && matches!(frame.peek_at(1), Some('x' | 'X')) {
                hex = true;
                image.push('0');
                if let Some(x) = frame.peek_at(1) {
                    image.push(x);
                }
                frame.pos += 2;
                if !matches!(frame.peek(), Some(h) if h.is_ascii_hexdigit()) {
                    bad = Some(ProblemId::BadHexLiteral);
                }
            }
            loop {
                match frame.peek() {
                    Some(c) if c.is_ascii_digit() => {
                        image.push(c);
                        frame.pos += 1;
                    }
                    Some(c) if hex && c.is_ascii_hexdigit() => {
                        image.push(c);
                        frame.pos += 1;
                    }
                    Some('.') => {
                        if floating && bad.is_none() {
                            bad = Some(ProblemId::BadFloatingLiteral);
                        }
                        floating = true;
                        image.push('.');
                        frame.pos += 1;
                    }
                    Some(e @ ('e' | 'E')) if !hex => {
                        floating = true;
                        image.push(e);
                        frame.pos += 1;
                        if let Some(sign @ ('+' | '-')) = frame.peek() {
                            image.push(sign);
                            frame.pos += 1;
                        }
                        if bad.is_none() && !matches!(frame.peek(), Some(d) if d.is_ascii_digit()) {
                            bad = Some(ProblemId::BadFloatingLiteral);
                        }
                    }
                    Some(p @ ('p' | 'P')) if hex => {
                        floating = true;
                        image.push(p);
                        frame.pos += 1;
                        if let Some(sign @ ('+' | '-')) = frame.peek() {
                            image.push(sign);
                            frame.pos += 1;
                        }
                        if bad.is_none() && !matches!(frame.peek(), Some(d) if d.is_ascii_digit()) {
                            bad = Some(ProblemId::BadFloatingLiteral);
                        }
                    }
                    Some('\\') if frame.peek_at(1) == Some('\n') => frame.pos += 2,
                    Some('\\')
                        if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') =>
                    {
                        frame.pos += 3;
                    }
                    _ => break,
                }
            }
            loop {
                match frame.peek() {
                    Some(s @ ('u' | 'U' | 'l' | 'L')) => {
                        image.push(s);
                        frame.pos += 1;
                    }
                    Some(s @ ('f' | 'F')) if !hex => {
                        floating = true;
                        image.push(s);
                        frame.pos += 1;
                    }
                    Some(s) if extra.contains(&s) => {
                        image.push(s);
                        frame.pos += 1;
                    }
                    _ => break,
                }
            }
            if !hex
                && !floating
                && bad.is_none()
                && image.starts_with('0')
                && image.contains(['8', '9'])
            {
                bad = Some(ProblemId::BadOctalLiteral);
            }
            let kind = if floating { TokenKind::FloatingLiteral } else { TokenKind::IntegerLiteral };
            (start, image, kind, bad)
        };
        if let Some(id) = bad {
            self.report(id, start, Some(image.clone()));
        }
        Token::new(kind, image)
    }

    /// Scan a string literal; the returned image excludes the quotes.
    fn scan_string(&mut self, wide: bool) -> Token {
        let (start, image, terminated) = {
            let frame = self.stack.top_mut();
            let start = frame.pos;
            frame.pos += 1;
            let mut image = String::new();
            let mut terminated = false;
            loop {
                match frame.peek() {
                    None | Some('\n') => break,
                    Some('"') => {
                        frame.pos += 1;
                        terminated = true;
                        break;
                    }
                    Some('\\') if frame.peek_at(1) == Some('\n') => frame.pos += 2,
                    Some('\\')
                        if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') =>
                    {
                        frame.pos += 3;
                    }
                    Some('\\') => {
                        image.push('\\');
                        frame.pos += 1;
                        if let Some(c) = frame.peek() {
                            image.push(c);
                            frame.pos += 1;
                        }
                    }
                    Some(c) => {
                        image.push(c);
                        frame.pos += 1;
                    }
                }
            }
            (start, image, terminated)
        };
        if !terminated {
            self.report(ProblemId::UnterminatedString, start, Some(image.clone()));
        }
        let kind = if wide { TokenKind::WideStringLiteral } else { TokenKind::StringLiteral };
        Token::new(kind, image)
    }

    /// Scan a character literal; the returned image includes the quotes.
    fn scan_char(&mut self, wide: bool) -> Token {
        let (start, image, terminated) = {
            let frame = self.stack.top_mut();
            let start = frame.pos;
            frame.pos += 1;
            let mut image = String::from("'");
            let mut terminated = false;
            loop {
                match frame.peek() {
                    None | Some('\n') => break,
                    Some('\'') => {
                        image.push('\'');
                        frame.pos += 1;
                        terminated = true;
                        break;
                    }
                    Some('\\') if frame.peek_at(1) == Some('\n') => frame.pos += 2,
                    Some('\\')
                        if frame.peek_at(1) == Some('\r') && frame.peek_at(2) == Some('\n') =>
                    {
                        frame.pos += 3;
                    }
                    Some('\\') => {
                        image.push('\\');
                        frame.pos += 1;
                        if let Some(c) = frame.peek() {
                            image.push(c);
                            frame.pos += 1;
                        }
                    }
                    Some(c) => {
                        image.push(c);
                        frame.pos += 1;
                    }
                }
            }
            (start, image, terminated)
        };
        if !terminated {
            self.report(ProblemId::UnterminatedString, start, Some(image.clone()));
        }
        let kind = if wide { TokenKind::WideCharLiteral } else { TokenKind::CharLiteral };
        Token::new(kind, image)
    }

    /// Maximal-munch operator scan. `None` means the character was invalid
    /// and a problem was recorded.
    fn scan_operator(&mut self) -> Option<Token> {
        let cpp = self.dialect == Dialect::Cpp;
        let min_max = self.extension.min_max_operators;
        let (c0, c1, c2) = {
            let frame = self.stack.top();
            (frame.peek(), frame.peek_at(1), frame.peek_at(2))
        };
        let c0 = c0?;
        let op: Option<&'static str> = match (c0, c1, c2) {
            ('<', Some('<'), Some('=')) => Some("<<="),
            ('>', Some('>'), Some('=')) => Some(">>="),
            ('-', Some('>'), Some('*')) if cpp => Some("->*"),
            ('.', Some('.'), Some('.')) => Some("..."),
            ('<', Some('?'), Some('=')) if min_max => Some("<?="),
            ('>', Some('?'), Some('=')) if min_max => Some(">?="),
            ('<', Some('<'), _) => Some("<<"),
            ('<', Some('='), _) => Some("<="),
            ('<', Some('?'), _) if min_max => Some("<?"),
            ('>', Some('>'), _) => Some(">>"),
            ('>', Some('='), _) => Some(">="),
            ('>', Some('?'), _) if min_max => Some(">?"),
            ('=', Some('='), _) => Some("=="),
            ('!', Some('='), _) => Some("!="),
            ('&', Some('&'), _) => Some("&&"),
            ('&', Some('='), _) => Some("&="),
            ('|', Some('|'), _) => Some("||"),
            ('|', Some('='), _) => Some("|="),
            ('+', Some('+'), _) => Some("++"),
            ('+', Some('='), _) => Some("+="),
            ('-', Some('-'), _) => Some("--"),
            ('-', Some('='), _) => Some("-="),
            ('-', Some('>'), _) => Some("->"),
            ('*', Some('='), _) => Some("*="),
            ('/', Some('='), _) => Some("/="),
            ('%', Some('='), _) => Some("%="),
            ('^', Some('='), _) => Some("^="),
            (':', Some(':'), _) if cpp => Some("::"),
            ('.', Some('*'), _) if cpp => Some(".*"),
            ('<', _, _) => Some("<"),
            ('>', _, _) => Some(">"),
            ('=', _, _) => Some("="),
            ('!', _, _) => Some("!"),
            ('&', _, _) => Some("&"),
            ('|', _, _) => Some("|"),
            ('+', _, _) => Some("+"),
            ('-', _, _) => Some("-"),
            ('*', _, _) => Some("*"),
            ('/', _, _) => Some("/"),
            ('%', _, _) => Some("%"),
            ('^', _, _) => Some("^"),
            ('~', _, _) => Some("~"),
            ('.', _, _) => Some("."),
            (':', _, _) => Some(":"),
            ('(', _, _) => Some("("),
            (')', _, _) => Some(")"),
            ('[', _, _) => Some("["),
            (']', _, _) => Some("]"),
            ('{', _, _) => Some("{"),
            ('}', _, _) => Some("}"),
            (',', _, _) => Some(","),
            (';', _, _) => Some(";"),
            ('?', _, _) => Some("?"),
            _ => None,
        };
        match op {
            Some(op) => {
                self.stack.top_mut().pos += op.len();
                let text = self.interner.intern(op);
                Some(Token::new(TokenKind::Operator, text))
            }
            None => {
                let offset = self.stack.top().pos;
                self.stack.top_mut().pos += 1;
                self.report(ProblemId::BadCharacter, offset, Some(c0.to_string()));
                None
            }
        }
    }

    // ---- predefined macros ---------------------------------------------

    fn seed_builtin_macros(&mut self) {
        self.install_object("__STDC__", "1");
        match self.dialect {
            Dialect::C => {
                self.install_object("__STDC_HOSTED__", "1");
                self.install_object("__STDC_VERSION__", "199901L");
            }
            Dialect::Cpp => self.install_object("__cplusplus", "1"),
        }
        self.install_dynamic("__FILE__", Rc::new(|env: &ExpansionEnv| format!("\"{}\"", env.file)));
        self.install_dynamic("__LINE__", Rc::new(|env: &ExpansionEnv| env.line.to_string()));
        self.install_dynamic("__DATE__", Rc::new(|_: &ExpansionEnv| {
            format!("\"{}\"", date_time::today())
        }));
        self.install_dynamic("__TIME__", Rc::new(|_: &ExpansionEnv| {
            format!("\"{}\"", date_time::now())
        }));
        if self.extension.builtin_choose_expr {
            let name = self.interner.intern("__builtin_choose_expr");
            let parameters: Vec<String> =
                ["condition", "if_true", "if_false"].iter().map(ToString::to_string).collect();
            self.macros.insert(
                name,
                MacroDef::DynamicFunction {
                    parameters: parameters.into(),
                    variadic: Variadic::None,
                    compute: Rc::new(|env: &ExpansionEnv, args: &[String]| {
                        let chosen = args.first().is_some_and(|c| evaluate_detached(c, env));
                        let index = if chosen { 1 } else { 2 };
                        args.get(index).cloned().unwrap_or_default()
                    }),
                },
            );
        }
    }

    fn install_object(&mut self, name: &str, replacement: &str) {
        let interned = self.interner.intern(name);
        self.macros.insert(interned, MacroDef::Object { replacement: Rc::from(replacement) });
    }

    fn install_dynamic(&mut self, name: &str, compute: Rc<dyn Fn(&ExpansionEnv) -> String>) {
        let interned = self.interner.intern(name);
        self.macros.insert(interned, MacroDef::DynamicObject { compute });
    }

    /// Install a predefined symbol by running the real `#define` parser
    /// over `spec value`, so `NAME(params)=value` works unchanged.
    fn install_symbol(&mut self, spec: &str, value: &str, empty_is_one: bool) {
        let value = if value.is_empty() && empty_is_one { "1" } else { value };
        let text = format!("{spec} {value}");
        self.stack.push(Frame::from_str(&text, FrameKind::Synthetic));
        self.handle_define(0);
        self.stack.pop();
    }

    fn push_pre_includes(&mut self, config: &ScannerConfig) {
        // pushed in reverse so the first listed file is scanned first
        for path in config.pre_include_files.iter().rev() {
            match self.includes.load_direct(path) {
                Some(resolved) => {
                    self.included_files.insert(resolved.path.clone());
                    self.sink.inclusion_start(&resolved.path, false, 0);
                    self.stack.push(Frame::new(
                        resolved.text,
                        FrameKind::Inclusion(IncludedFile {
                            path: resolved.path,
                            path_index: None,
                        }),
                    ));
                }
                None => {
                    self.report(
                        ProblemId::InclusionNotFound,
                        0,
                        Some(path.display().to_string()),
                    );
                }
            }
        }
    }

    /// Scan each macro pre-include with a throwaway scanner and adopt the
    /// macro table it ends up with; tokens and problems are discarded.
    fn adopt_macro_pre_includes(&mut self, config: &ScannerConfig) {
        for path in &config.macro_pre_include_files {
            let Some(resolved) = self.includes.load_direct(path) else {
                self.report(ProblemId::InclusionNotFound, 0, Some(path.display().to_string()));
                continue;
            };
            let mut nested_config = config.clone();
            nested_config.pre_include_files = Vec::new();
            nested_config.macro_pre_include_files = Vec::new();
            nested_config.diagnostic_handler = None;
            let source: String = resolved.text.iter().collect();
            let mut nested = Scanner::new(&source, &resolved.path, &nested_config);
            while let ScanOutcome::Token(_) = nested.next_token() {}
            debug!("adopted {} macros from {}", nested.macros.len(), resolved.path);
            self.macros.extend(nested.macros);
        }
    }
}

fn file_frame(frame: &Frame) -> bool {
    matches!(frame.kind, FrameKind::TranslationUnit { .. } | FrameKind::Inclusion(_))
}

/// Whether only spaces and tabs separate `frame.pos` from the start of its
/// line. Directives are recognized only at such positions.
fn at_line_start(frame: &Frame) -> bool {
    let mut i = frame.pos;
    while i > 0 {
        match frame.text[i - 1] {
            ' ' | '\t' => i -= 1,
            '\n' => return true,
            _ => return false,
        }
    }
    true
}

/// Split an include spelling into the file name and whether it used the
/// `<...>` system form.
fn parse_include_spelling(text: &str) -> Option<(String, bool)> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('"') {
        rest.find('"').map(|i| (rest[..i].to_string(), false))
    } else if let Some(rest) = text.strip_prefix('<') {
        rest.find('>').map(|i| (rest[..i].to_string(), true))
    } else {
        None
    }
}

/// `__VA_ARGS__` is only meaningful in the body of a `...` macro.
fn misuses_va_args(replacement: &str, variadic: Variadic) -> bool {
    if variadic == Variadic::Standard {
        return false;
    }
    contains_identifier(replacement, "__VA_ARGS__")
}

fn contains_identifier(text: &str, needle: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            i = skip_literal(&chars, i);
            continue;
        }
        if is_identifier_start(c) {
            let start = i;
            while i < chars.len() && is_identifier_continue(chars[i]) {
                i += 1;
            }
            if chars[start..i].iter().collect::<String>() == needle {
                return true;
            }
            continue;
        }
        i += 1;
    }
    false
}

/// In a function-style replacement every `#` must be followed by a macro
/// parameter. Returns the offending spelling when one is not.
fn stray_stringify_operand(replacement: &str, parameters: &[String]) -> Option<String> {
    let chars: Vec<char> = replacement.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '"' | '\'' => i = skip_literal(&chars, i),
            '#' if chars.get(i + 1) == Some(&'#') => i += 2,
            '#' => {
                let mut j = index_of_next_non_blank(&chars, i + 1);
                let start = j;
                while j < chars.len() && is_identifier_continue(chars[j]) {
                    j += 1;
                }
                let word: String = chars[start..j].iter().collect();
                if word.is_empty() || !parameters.iter().any(|p| p == &word) {
                    return Some(if word.is_empty() { "#".to_string() } else { word });
                }
                i = j;
            }
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::Path;

    fn scan(source: &str) -> Vec<Token> {
        scan_with(source, &ScannerConfig::for_c())
    }

    fn scan_with(source: &str, config: &ScannerConfig) -> Vec<Token> {
        let mut scanner = Scanner::new(source, "test.c", config);
        drain(&mut scanner)
    }

    fn drain(scanner: &mut Scanner) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            match scanner.next_token() {
                ScanOutcome::Token(token) => tokens.push(token),
                ScanOutcome::EndOfInput => break,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        tokens
    }

    fn images(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(|t| t.text().to_string()).collect()
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl ScanEventSink for RecordingSink {
        fn translation_unit_start(&mut self, name: &str) {
            self.events.borrow_mut().push(format!("tu-start {name}"));
        }
        fn translation_unit_end(&mut self) {
            self.events.borrow_mut().push("tu-end".to_string());
        }
        fn inclusion_start(&mut self, path: &str, system: bool, _offset: usize) {
            self.events.borrow_mut().push(format!("inc-start {path} {system}"));
        }
        fn inclusion_end(&mut self, path: &str) {
            self.events.borrow_mut().push(format!("inc-end {path}"));
        }
        fn inactive_inclusion(&mut self, spelled: &str, _offset: usize) {
            self.events.borrow_mut().push(format!("inactive {spelled}"));
        }
        fn expansion_start(&mut self, name: &str, _parameters: Option<&[String]>, _start: usize, _end: usize) {
            self.events.borrow_mut().push(format!("exp-start {name}"));
        }
        fn expansion_end(&mut self, name: &str) {
            self.events.borrow_mut().push(format!("exp-end {name}"));
        }
    }

    fn loader_for(files: Vec<(&str, &str)>) -> impl Fn(&Path) -> Option<String> {
        let files: Vec<(String, String)> =
            files.into_iter().map(|(p, t)| (p.to_string(), t.to_string())).collect();
        move |path: &Path| {
            let wanted = path.to_string_lossy();
            files.iter().find(|(p, _)| *p == wanted).map(|(_, t)| t.clone())
        }
    }

    #[test]
    fn plain_token_stream() {
        let tokens = scan("int x = 42;");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::IntegerLiteral,
                TokenKind::Operator,
            ]
        );
        assert_eq!(images(&tokens), vec!["int", "x", "=", "42", ";"]);
    }

    #[test]
    fn hash_is_an_operator_away_from_line_start() {
        let tokens = scan("a # b");
        assert_eq!(images(&tokens), vec!["a", "#", "b"]);
        assert_eq!(tokens[1].kind, TokenKind::Operator);
    }

    #[test]
    fn directive_allows_leading_blanks() {
        let tokens = scan("   #define ANSWER 42\nANSWER");
        assert_eq!(images(&tokens), vec!["42"]);
    }

    #[test]
    fn object_macro_chain_expands() {
        let tokens = scan("#define A B\n#define B 7\nA");
        assert_eq!(images(&tokens), vec!["7"]);
    }

    #[test]
    fn self_reference_stays_painted() {
        let tokens = scan("#define A A\nA");
        assert_eq!(images(&tokens), vec!["A"]);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
    }

    #[test]
    fn function_macro_expands_arguments() {
        let tokens = scan("#define ADD(a, b) a + b\nADD(1, 2)");
        assert_eq!(images(&tokens), vec!["1", "+", "2"]);
    }

    #[test]
    fn function_macro_name_without_paren_is_plain() {
        let tokens = scan("#define F(x) x\nF;");
        assert_eq!(images(&tokens), vec!["F", ";"]);
    }

    #[test]
    fn invocation_paren_found_across_expansion_boundary() {
        let tokens = scan("#define CALL ADD\n#define ADD(a, b) a + b\nCALL(3, 4)");
        assert_eq!(images(&tokens), vec!["3", "+", "4"]);
    }

    #[test]
    fn paste_joins_identifiers_into_one_token() {
        let tokens = scan("#define GLUE x ## y\nGLUE");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text(), "xy");
    }

    #[test]
    fn adjacent_strings_concatenate_wide_wins() {
        let tokens = scan("L\"one\" \"two\"");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::WideStringLiteral);
        assert_eq!(tokens[0].text(), "onetwo");
    }

    #[test]
    fn string_image_excludes_quotes_char_keeps_them() {
        let tokens = scan("\"hi\" 'c'");
        assert_eq!(tokens[0].text(), "hi");
        assert_eq!(tokens[1].text(), "'c'");
        assert_eq!(tokens[1].kind, TokenKind::CharLiteral);
    }

    #[test]
    fn unterminated_string_reports_problem() {
        let mut scanner = Scanner::new("\"never closed\nint", "test.c", &ScannerConfig::for_c());
        let _ = drain(&mut scanner);
        assert!(
            scanner.problems().iter().any(|p| p.id == ProblemId::UnterminatedString),
            "problems: {:?}",
            scanner.problems()
        );
    }

    #[test]
    fn bad_number_literals_report_problems() {
        let mut scanner = Scanner::new("0x 089 1.2.3", "test.c", &ScannerConfig::for_c());
        let _ = drain(&mut scanner);
        let ids: Vec<ProblemId> = scanner.problems().iter().map(|p| p.id).collect();
        assert!(ids.contains(&ProblemId::BadHexLiteral));
        assert!(ids.contains(&ProblemId::BadOctalLiteral));
        assert!(ids.contains(&ProblemId::BadFloatingLiteral));
    }

    #[test]
    fn cpp_scope_operator_only_in_cpp() {
        let cpp = scan_with("a::b", &ScannerConfig::for_cpp());
        assert_eq!(images(&cpp), vec!["a", "::", "b"]);
        let c = scan("a::b");
        assert_eq!(images(&c), vec!["a", ":", ":", "b"]);
    }

    #[test]
    fn conditional_skips_inactive_branch() {
        let tokens = scan("#if 0\nhidden\n#else\nvisible\n#endif\n");
        assert_eq!(images(&tokens), vec!["visible"]);
    }

    #[test]
    fn elif_chain_picks_first_true_branch() {
        let source = "#define PICK 2\n#if PICK == 1\na\n#elif PICK == 2\nb\n#elif PICK == 3\nc\n#else\nd\n#endif\n";
        assert_eq!(images(&scan(source)), vec!["b"]);
    }

    #[test]
    fn nested_conditionals_skip_as_a_block() {
        let source = "#if 0\n#if 1\nx\n#endif\ny\n#else\nz\n#endif\n";
        assert_eq!(images(&scan(source)), vec!["z"]);
    }

    #[test]
    fn taken_branch_skips_later_groups_without_evaluating() {
        let source = "#if 1\na\n#elif (\nb\n#else\nc\n#endif\n";
        let mut scanner = Scanner::new(source, "test.c", &ScannerConfig::for_c());
        let tokens = drain(&mut scanner);
        assert_eq!(images(&tokens), vec!["a"]);
        // the malformed #elif condition was never evaluated
        assert!(scanner.problems().is_empty(), "problems: {:?}", scanner.problems());
    }

    #[test]
    fn unbalanced_endif_reports_problem() {
        let mut scanner = Scanner::new("#endif\nx", "test.c", &ScannerConfig::for_c());
        let tokens = drain(&mut scanner);
        assert_eq!(images(&tokens), vec!["x"]);
        assert!(scanner.problems().iter().any(|p| p.id == ProblemId::UnbalancedConditional));
    }

    #[test]
    fn unterminated_conditional_reports_problem() {
        let mut scanner = Scanner::new("#if 0\nnever\n", "test.c", &ScannerConfig::for_c());
        let tokens = drain(&mut scanner);
        assert!(tokens.is_empty());
        assert!(scanner.problems().iter().any(|p| p.id == ProblemId::UnbalancedConditional));
    }

    #[test]
    fn open_taken_conditional_reports_at_end_of_input() {
        let mut scanner = Scanner::new("#if 1\nkeep\n", "test.c", &ScannerConfig::for_c());
        let tokens = drain(&mut scanner);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text(), "keep");
        let problems = scanner.problems();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].id, ProblemId::UnbalancedConditional);
    }

    #[test]
    fn inactive_include_is_reported_not_followed() {
        let sink = RecordingSink::default();
        let events = sink.events.clone();
        let config = ScannerConfig::for_c().with_file_loader(|_: &Path| None);
        let source = "#if 0\n#include <missing.h>\n#endif\n";
        let mut scanner = Scanner::with_event_sink(source, "test.c", &config, Box::new(sink));
        let _ = drain(&mut scanner);
        assert!(scanner.problems().is_empty());
        assert!(events.borrow().iter().any(|e| e == "inactive <missing.h>"));
    }

    #[test]
    fn include_pushes_and_pops_with_events() {
        let sink = RecordingSink::default();
        let events = sink.events.clone();
        let config = ScannerConfig::for_c()
            .with_include_path("/inc")
            .with_file_loader(loader_for(vec![("/inc/lib.h", "int lib;\n")]));
        let source = "#include <lib.h>\nint after;\n";
        let mut scanner = Scanner::with_event_sink(source, "main.c", &config, Box::new(sink));
        let tokens = drain(&mut scanner);
        assert_eq!(images(&tokens), vec!["int", "lib", ";", "int", "after", ";"]);
        let log = events.borrow();
        assert_eq!(
            *log,
            vec![
                "tu-start main.c",
                "inc-start /inc/lib.h true",
                "inc-end /inc/lib.h",
                "tu-end",
            ]
        );
    }

    #[test]
    fn circular_inclusion_refused_silently() {
        let config = ScannerConfig::for_c()
            .with_include_path("/inc")
            .with_file_loader(loader_for(vec![("/inc/self.h", "#include <self.h>\nint once;\n")]));
        let mut scanner = Scanner::new("#include <self.h>\n", "main.c", &config);
        let tokens = drain(&mut scanner);
        assert_eq!(images(&tokens), vec!["int", "once", ";"]);
        assert!(scanner.problems().is_empty());
    }

    #[test]
    fn pragma_once_skips_reinclusion() {
        let config = ScannerConfig::for_c()
            .with_include_path("/inc")
            .with_file_loader(loader_for(vec![(
                "/inc/guard.h",
                "#pragma once\nint guarded;\n",
            )]));
        let source = "#include <guard.h>\n#include <guard.h>\n";
        let tokens = scan_with(source, &config);
        assert_eq!(images(&tokens), vec!["int", "guarded", ";"]);
    }

    #[test]
    fn include_next_resumes_search_after_current_hit() {
        let config = ScannerConfig::for_c()
            .with_include_path("/a")
            .with_include_path("/b")
            .with_file_loader(loader_for(vec![
                ("/a/over.h", "int first;\n#include_next <over.h>\n"),
                ("/b/over.h", "int second;\n"),
            ]));
        let tokens = scan_with("#include <over.h>\n", &config);
        assert_eq!(images(&tokens), vec!["int", "first", ";", "int", "second", ";"]);
    }

    #[test]
    fn missing_include_reports_problem() {
        let config = ScannerConfig::for_c().with_file_loader(|_: &Path| None);
        let mut scanner = Scanner::new("#include \"gone.h\"\n", "main.c", &config);
        let _ = drain(&mut scanner);
        assert!(scanner.problems().iter().any(|p| {
            p.id == ProblemId::InclusionNotFound && p.argument.as_deref() == Some("gone.h")
        }));
    }

    #[test]
    fn computed_include_goes_through_expansion() {
        let config = ScannerConfig::for_c()
            .with_include_path("/inc")
            .with_file_loader(loader_for(vec![("/inc/pick.h", "int picked;\n")]));
        let source = "#define HEADER <pick.h>\n#include HEADER\n";
        let tokens = scan_with(source, &config);
        assert_eq!(images(&tokens), vec!["int", "picked", ";"]);
    }

    #[test]
    fn error_and_warning_directives_become_problems() {
        let mut scanner = Scanner::new(
            "#error bad platform\n#warning legacy path\n",
            "test.c",
            &ScannerConfig::for_c(),
        );
        let _ = drain(&mut scanner);
        let problems = scanner.problems();
        assert!(problems.iter().any(|p| {
            p.id == ProblemId::PoundError && p.argument.as_deref() == Some("bad platform")
        }));
        assert!(problems.iter().any(|p| {
            p.id == ProblemId::PoundWarning && p.argument.as_deref() == Some("legacy path")
        }));
    }

    #[test]
    fn undef_removes_definition() {
        let tokens = scan("#define GONE 1\n#undef GONE\nGONE");
        assert_eq!(images(&tokens), vec!["GONE"]);
    }

    #[test]
    fn bad_stringify_operand_rejects_definition() {
        let mut scanner = Scanner::new(
            "#define BAD(x) # y\nBAD(1)",
            "test.c",
            &ScannerConfig::for_c(),
        );
        let tokens = drain(&mut scanner);
        assert!(scanner.problems().iter().any(|p| p.id == ProblemId::MacroPastingError));
        // the definition was not installed, so the use scans literally
        assert_eq!(images(&tokens), vec!["BAD", "(", "1", ")"]);
    }

    #[test]
    fn va_args_outside_variadic_rejects_definition() {
        let mut scanner = Scanner::new(
            "#define M(a) __VA_ARGS__\n",
            "test.c",
            &ScannerConfig::for_c(),
        );
        let _ = drain(&mut scanner);
        assert!(scanner.problems().iter().any(|p| p.id == ProblemId::InvalidVaArgs));
    }

    #[test]
    fn defined_symbols_feed_conditionals() {
        let config = ScannerConfig::for_c().with_symbol("FEATURE", "2");
        let tokens = scan_with("#if FEATURE == 2\nyes\n#endif\n", &config);
        assert_eq!(images(&tokens), vec!["yes"]);
    }

    #[test]
    fn function_style_symbol_from_config() {
        let config = ScannerConfig::for_c().with_symbol("MAX(a, b)", "((a) > (b) ? (a) : (b))");
        let tokens = scan_with("MAX(1, 2)", &config);
        assert_eq!(
            images(&tokens),
            vec!["(", "(", "1", ")", ">", "(", "2", ")", "?", "(", "1", ")", ":", "(", "2", ")", ")"]
        );
    }

    #[test]
    fn line_macro_tracks_file_position() {
        let tokens = scan("__LINE__\n__LINE__");
        assert_eq!(images(&tokens), vec!["1", "2"]);
    }

    #[test]
    fn file_macro_is_a_string_literal() {
        let tokens = scan("__FILE__");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text(), "test.c");
    }

    #[test]
    fn builtin_choose_expr_picks_by_condition() {
        let config = ScannerConfig::for_c().with_extensions(ExtensionConfig::gnu());
        let tokens = scan_with("__builtin_choose_expr(1 > 0, yes, no)", &config);
        assert_eq!(images(&tokens), vec!["yes"]);
    }

    #[test]
    fn gnu_min_max_operators_scan_when_enabled() {
        let config = ScannerConfig::for_c().with_extensions(ExtensionConfig::gnu());
        let tokens = scan_with("a <? b >? c", &config);
        assert_eq!(images(&tokens), vec!["a", "<?", "b", ">?", "c"]);
    }

    #[test]
    fn pre_include_scans_before_translation_unit() {
        let mut config = ScannerConfig::for_c()
            .with_file_loader(loader_for(vec![("/pre/defs.h", "#define FROM_PRE 5\nint pre;\n")]));
        config = config.with_pre_include("/pre/defs.h");
        let tokens = scan_with("FROM_PRE", &config);
        assert_eq!(images(&tokens), vec!["int", "pre", ";", "5"]);
    }

    #[test]
    fn macro_pre_include_adopts_table_without_tokens() {
        let mut config = ScannerConfig::for_c()
            .with_file_loader(loader_for(vec![("/pre/macros.h", "#define ONLY_MACROS 9\nint dropped;\n")]));
        config = config.with_macro_pre_include("/pre/macros.h");
        let tokens = scan_with("ONLY_MACROS", &config);
        assert_eq!(images(&tokens), vec!["9"]);
    }

    #[test]
    fn offset_boundary_stops_the_scan() {
        let mut scanner = Scanner::new("alpha beta gamma", "test.c", &ScannerConfig::for_c());
        scanner.set_offset_boundary(10);
        let mut tokens = Vec::new();
        let info = loop {
            match scanner.next_token() {
                ScanOutcome::Token(token) => tokens.push(token),
                ScanOutcome::OffsetLimitReached(info) => break info,
                other => panic!("unexpected outcome: {other:?}"),
            }
        };
        assert_eq!(images(&tokens), vec!["alpha", "beta"]);
        assert_eq!(info.kind, CompletionKind::NoSuchKind);
        // the outcome repeats
        assert!(matches!(scanner.next_token(), ScanOutcome::OffsetLimitReached(_)));
    }

    #[test]
    fn content_assist_cuts_identifier_into_completion() {
        let mut scanner = Scanner::new("hello wor ld", "test.c", &ScannerConfig::for_c());
        scanner.set_content_assist_offset(9);
        let first = scanner.next_token();
        assert!(matches!(first, ScanOutcome::Token(ref t) if t.text() == "hello"));
        let second = scanner.next_token();
        match second {
            ScanOutcome::Token(token) => {
                assert_eq!(token.kind, TokenKind::Completion);
                assert_eq!(token.text(), "wor");
            }
            other => panic!("expected completion token, got {other:?}"),
        }
        let third = scanner.next_token();
        assert!(matches!(third, ScanOutcome::Token(ref t) if t.kind == TokenKind::EndOfCompletion));
        match scanner.next_token() {
            ScanOutcome::OffsetLimitReached(info) => {
                assert_eq!(info.kind, CompletionKind::MacroReference);
                assert_eq!(info.prefix, "wor");
                assert!(info.keywords.iter().any(|k| k == "int"));
            }
            other => panic!("expected boundary, got {other:?}"),
        }
    }

    #[test]
    fn content_assist_in_directive_keyword() {
        let source = "#inc lude";
        let mut scanner = Scanner::new(source, "test.c", &ScannerConfig::for_c());
        scanner.set_content_assist_offset(4);
        match scanner.next_token() {
            ScanOutcome::Token(token) => {
                assert_eq!(token.kind, TokenKind::Completion);
                assert_eq!(token.text(), "inc");
            }
            other => panic!("expected completion token, got {other:?}"),
        }
        let _ = scanner.next_token(); // end-of-completion
        match scanner.next_token() {
            ScanOutcome::OffsetLimitReached(info) => {
                assert_eq!(info.kind, CompletionKind::DirectivePrefix);
                assert!(info.keywords.iter().any(|k| k == "include"));
            }
            other => panic!("expected boundary, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_is_sticky() {
        let mut scanner = Scanner::new("a b c", "test.c", &ScannerConfig::for_c());
        let handle = scanner.cancel_handle();
        assert!(matches!(scanner.next_token(), ScanOutcome::Token(_)));
        handle.cancel();
        assert_eq!(scanner.next_token(), ScanOutcome::Cancelled);
        assert_eq!(scanner.next_token(), ScanOutcome::Cancelled);
    }

    #[test]
    fn cancellation_observed_inside_skipped_region() {
        let mut scanner = Scanner::new("#if 0\nx\n#endif\ny", "test.c", &ScannerConfig::for_c());
        scanner.cancel_handle().cancel();
        assert_eq!(scanner.next_token(), ScanOutcome::Cancelled);
    }

    #[test]
    fn dollar_identifiers_only_with_extension() {
        let config = ScannerConfig::for_c().with_extensions(ExtensionConfig::gnu());
        let tokens = scan_with("a$b", &config);
        assert_eq!(images(&tokens), vec!["a$b"]);
        let plain = scan("a$b");
        assert_eq!(images(&plain), vec!["a", "b"]);
    }

    #[test]
    fn line_marker_is_noticed_not_scanned() {
        let tokens = scan("# 10 \"other.c\"\nint x;");
        assert_eq!(images(&tokens), vec!["int", "x", ";"]);
    }

    #[test]
    fn escaped_newline_splices_tokens() {
        let tokens = scan("con\\\ntinued");
        assert_eq!(images(&tokens), vec!["continued"]);
    }

    #[test]
    fn macro_before_keyword_tie_break() {
        let tokens = scan("#define int long\nint");
        assert_eq!(images(&tokens), vec!["long"]);
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
    }
}
