use std::collections::HashSet;
use std::rc::Rc;

/// Identifier pool: repeated spellings share one allocation
///
/// Keyword and identifier tokens are produced for the same names over and
/// over in a translation unit; interning keeps one `Rc<str>` per spelling.
#[derive(Default)]
pub(crate) struct Interner {
    pool: HashSet<Rc<str>>,
}

impl Interner {
    pub(crate) fn intern(&mut self, name: &str) -> Rc<str> {
        if let Some(existing) = self.pool.get(name) {
            return existing.clone();
        }
        let entry: Rc<str> = Rc::from(name);
        self.pool.insert(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_spellings_share_storage() {
        let mut interner = Interner::default();
        let a = interner.intern("counter");
        let b = interner.intern("counter");
        assert!(Rc::ptr_eq(&a, &b));
        let c = interner.intern("other");
        assert!(!Rc::ptr_eq(&a, &c));
    }
}
