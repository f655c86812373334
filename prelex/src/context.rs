use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::trace;

/// Payload of an included-file frame
#[derive(Clone, Debug)]
pub(crate) struct IncludedFile {
    /// Resolved path, the file's identity for circular/once checks
    pub path: Rc<str>,
    /// Index of the search-path entry that produced the file; `None` when it
    /// was found via the current directory or an absolute path. `#include_next`
    /// resumes after this entry.
    pub path_index: Option<usize>,
}

/// Payload of a macro-expansion frame
#[derive(Clone, Debug)]
pub(crate) struct MacroFrame {
    /// Macro name; the blue-paint guard walks these
    pub name: Rc<str>,
}

/// What a stack frame represents
#[derive(Clone, Debug)]
pub(crate) enum FrameKind {
    /// The outermost source buffer
    TranslationUnit { name: Rc<str> },
    /// An included file
    Inclusion(IncludedFile),
    /// An in-progress macro expansion
    Expansion(MacroFrame),
    /// Throwaway text: pasted tokens, re-scanned expansion results
    Synthetic,
}

/// One entry of the buffer stack: a character span with a cursor, a limit,
/// a lazy line anchor, and a kind tag
pub(crate) struct Frame {
    pub text: Rc<[char]>,
    /// Index of the next unread character
    pub pos: usize,
    /// Exclusive upper bound; lowered below `text.len()` by the offset
    /// boundary on frame 0
    pub limit: usize,
    /// Line number holding at `line_offset`
    pub line: u32,
    pub line_offset: usize,
    pub kind: FrameKind,
}

impl Frame {
    pub(crate) fn new(text: Rc<[char]>, kind: FrameKind) -> Self {
        let limit = text.len();
        Frame {
            text,
            pos: 0,
            limit,
            line: 1,
            line_offset: 0,
            kind,
        }
    }

    pub(crate) fn from_str(text: &str, kind: FrameKind) -> Self {
        let chars: Vec<char> = text.chars().collect();
        Frame::new(Rc::from(chars), kind)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.limit
    }

    /// Character at the cursor, `None` at the limit
    pub(crate) fn peek(&self) -> Option<char> {
        if self.pos < self.limit {
            Some(self.text[self.pos])
        } else {
            None
        }
    }

    /// Character `n` positions past the cursor
    pub(crate) fn peek_at(&self, n: usize) -> Option<char> {
        let at = self.pos + n;
        if at < self.limit { Some(self.text[at]) } else { None }
    }

    /// Line number holding at `offset`, counted incrementally from the last
    /// anchor; a backward query restarts from the top of the buffer
    pub(crate) fn line_number_at(&mut self, offset: usize) -> u32 {
        if offset < self.line_offset {
            self.line = 1;
            self.line_offset = 0;
        }
        let upto = offset.min(self.text.len());
        let newlines = self.text[self.line_offset..upto]
            .iter()
            .filter(|&&c| c == '\n')
            .count();
        self.line += newlines as u32;
        self.line_offset = upto;
        self.line
    }

    fn file_identity(&self) -> Option<&Rc<str>> {
        match &self.kind {
            FrameKind::TranslationUnit { name } => Some(name),
            FrameKind::Inclusion(file) => Some(&file.path),
            _ => None,
        }
    }
}

/// The buffer/context stack
///
/// Scanning always operates on the top frame; exhausting it pops back to the
/// outer context. Frame 0 is the translation unit for the whole scan.
#[derive(Default)]
pub(crate) struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    pub(crate) fn push(&mut self, frame: Frame) {
        trace!(
            "push context: {:?} ({} chars)",
            frame.kind,
            frame.limit
        );
        self.frames.push(frame);
    }

    /// Pop the top frame. Popping an empty stack violates the engine's
    /// "loop while non-empty" invariant and fails loudly.
    pub(crate) fn pop(&mut self) -> Frame {
        match self.frames.pop() {
            Some(frame) => {
                trace!("pop context: {:?}", frame.kind);
                frame
            }
            None => panic!("buffer stack underflow"),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn top(&self) -> &Frame {
        match self.frames.last() {
            Some(frame) => frame,
            None => panic!("buffer stack is empty"),
        }
    }

    pub(crate) fn top_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => panic!("buffer stack is empty"),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub(crate) fn frame_mut(&mut self, index: usize) -> &mut Frame {
        &mut self.frames[index]
    }

    /// Whether the top frame is frame 0 (where the offset boundary applies)
    pub(crate) fn on_outermost(&self) -> bool {
        self.frames.len() == 1
    }

    /// Identity of the nearest enclosing file buffer, walking down from the
    /// top, together with the cursor position within it
    pub(crate) fn current_file(&self) -> Option<(Rc<str>, usize)> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.file_identity().map(|id| (id.clone(), f.pos)))
    }

    /// Index of the nearest enclosing file frame
    pub(crate) fn current_file_index(&self) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|f| f.file_identity().is_some())
    }

    /// Directory of the nearest enclosing file, for quote-form resolution
    pub(crate) fn current_dir(&self) -> Option<PathBuf> {
        let (path, _) = self.current_file()?;
        Path::new(&*path).parent().map(Path::to_path_buf)
    }

    /// Search-list index that produced the nearest enclosing file, if any
    pub(crate) fn current_path_index(&self) -> Option<usize> {
        self.frames.iter().rev().find_map(|f| match &f.kind {
            FrameKind::Inclusion(file) => Some(file.path_index),
            FrameKind::TranslationUnit { .. } => Some(None),
            _ => None,
        })?
    }

    /// Whether a file is already open somewhere on the inclusion chain
    pub(crate) fn is_circular_inclusion(&self, path: &str) -> bool {
        self.frames
            .iter()
            .any(|f| f.file_identity().is_some_and(|id| &**id == path))
    }

    /// Blue paint: whether a macro expansion with this name is active
    pub(crate) fn macro_active(&self, name: &str) -> bool {
        self.frames.iter().any(|f| match &f.kind {
            FrameKind::Expansion(m) => &*m.name == name,
            _ => false,
        })
    }
}

/// Conditional-inclusion branch state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Branch {
    If,
    Elif,
    Else,
}

/// Transition requested by a directive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BranchEvent {
    If,
    Elif,
    Else,
    End,
}

/// Stack of branch states: pushed on `#if`/`#ifdef`/`#ifndef`, mutated in
/// place on `#elif`/`#else`, popped on `#endif`
#[derive(Default)]
pub(crate) struct BranchStack {
    states: Vec<Branch>,
}

impl BranchStack {
    /// Apply a transition; `false` means the directive is unbalanced and the
    /// stack is left untouched
    pub(crate) fn transition(&mut self, event: BranchEvent) -> bool {
        match event {
            BranchEvent::If => {
                self.states.push(Branch::If);
                true
            }
            BranchEvent::Elif => match self.states.last_mut() {
                Some(state @ (Branch::If | Branch::Elif)) => {
                    *state = Branch::Elif;
                    true
                }
                _ => false,
            },
            BranchEvent::Else => match self.states.last_mut() {
                Some(state @ (Branch::If | Branch::Elif)) => {
                    *state = Branch::Else;
                    true
                }
                _ => false,
            },
            BranchEvent::End => self.states.pop().is_some(),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_frame(path: &str, text: &str) -> Frame {
        Frame::from_str(
            text,
            FrameKind::Inclusion(IncludedFile {
                path: Rc::from(path),
                path_index: None,
            }),
        )
    }

    #[test]
    fn push_pop_and_file_walk() {
        let mut stack = ContextStack::default();
        stack.push(Frame::from_str(
            "int x;",
            FrameKind::TranslationUnit { name: Rc::from("main.c") },
        ));
        stack.push(file_frame("a.h", "A"));
        stack.push(Frame::from_str(
            "1",
            FrameKind::Expansion(MacroFrame { name: Rc::from("ONE") }),
        ));

        let (file, _) = stack.current_file().unwrap();
        assert_eq!(&*file, "a.h");
        assert!(stack.macro_active("ONE"));
        assert!(!stack.macro_active("TWO"));
        assert!(stack.is_circular_inclusion("main.c"));
        assert!(stack.is_circular_inclusion("a.h"));
        assert!(!stack.is_circular_inclusion("b.h"));

        stack.pop();
        stack.pop();
        stack.pop();
        assert!(stack.is_empty());
    }

    #[test]
    #[should_panic(expected = "buffer stack underflow")]
    fn pop_of_empty_stack_panics() {
        let mut stack = ContextStack::default();
        stack.pop();
    }

    #[test]
    fn lazy_line_counting() {
        let mut frame = Frame::from_str(
            "a\nbb\nccc\n",
            FrameKind::TranslationUnit { name: Rc::from("x.c") },
        );
        assert_eq!(frame.line_number_at(0), 1);
        assert_eq!(frame.line_number_at(2), 2);
        assert_eq!(frame.line_number_at(8), 3);
        // backward query restarts from the anchor at the top
        assert_eq!(frame.line_number_at(1), 1);
    }

    #[test]
    fn branch_transitions() {
        let mut branches = BranchStack::default();
        assert!(!branches.transition(BranchEvent::Elif));
        assert!(!branches.transition(BranchEvent::Else));
        assert!(!branches.transition(BranchEvent::End));

        assert!(branches.transition(BranchEvent::If));
        assert!(branches.transition(BranchEvent::Elif));
        assert!(branches.transition(BranchEvent::Else));
        // no #elif after #else
        assert!(!branches.transition(BranchEvent::Elif));
        assert!(branches.transition(BranchEvent::End));
        assert_eq!(branches.depth(), 0);
    }
}
