//! Small identifier types shared across the function table and the value representation.
//!
//! A full interner deduplicating strings, bytes, and big-integer literals across an entire
//! module is overkill here: this core has no literal pool to deduplicate (string constants
//! are allocated directly onto the heap by `SCONST`), so only the function identifier
//! survives.

/// Index into the runtime's function table (§4.2).
///
/// Stable for the lifetime of the runtime once a function is registered (§3.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct FunctionId(u32);

impl FunctionId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).expect("function table index exceeds u32"))
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}
