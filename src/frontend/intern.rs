use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use once_cell::sync::Lazy;

/// Process-wide string interning table. Interned strings are leaked on
/// purpose so that an [`InternedSymbol`] can hand out `&'static str` values
/// for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InterningTable {
    inner: RwLock<InterningTableInner>,
}

#[derive(Debug, Default)]
struct InterningTableInner {
    strings: Vec<&'static str>,
    indices: HashMap<&'static str, u32>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&'static str> {
        let inner = self.inner.read().unwrap();

        inner.strings.get(index as usize).copied()
    }

    pub fn insert_if_absent(&self, string: &str) -> u32 {
        if let Some(index) = self.index_of(string) {
            return index;
        }

        let mut inner = self.inner.write().unwrap();

        // A racing writer may have inserted between our read and write locks
        if let Some(index) = inner.indices.get(string) {
            return *index;
        }

        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let index = inner.strings.len() as u32;

        inner.strings.push(leaked);
        inner.indices.insert(leaked, index);

        index
    }

    pub fn index_of(&self, string: &str) -> Option<u32> {
        let inner = self.inner.read().unwrap();

        inner.indices.get(string).copied()
    }
}

/// An index into the string interning table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        Self(INTERNING_TABLE.insert_if_absent(value))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE.get(self.0).expect(
            "Once an interned symbol is created, the string it references should never be removed from the table",
        )
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}
