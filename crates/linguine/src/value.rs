use crate::intern::FunctionId;

/// Identifier for a heap-allocated string object.
///
/// Back-reference used by [`Value::String`]. Indexes into whichever arena
/// (a frame's nursery or the runtime's tenured set) currently owns the object;
/// see [`crate::heap`] for how that ownership is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StringId(pub(crate) u32);

/// Identifier for a heap-allocated array object. See [`StringId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ArrayId(pub(crate) u32);

/// Identifier for a heap-allocated dict object. See [`StringId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DictId(pub(crate) u32);

macro_rules! arena_id {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub(crate) fn from_index(index: usize) -> Self {
                Self(u32::try_from(index).expect("arena index exceeds u32"))
            }
        }
    };
}

arena_id!(StringId);
arena_id!(ArrayId);
arena_id!(DictId);

/// A value is a tagged union of exactly six variants (§3.1).
///
/// Deliberately `Copy`: unlike a reference-counted design, lifetime here is
/// decided entirely by the garbage collector in [`crate::heap`], so a `Value`
/// can be freely duplicated without any bookkeeping. Heap-backed variants are
/// just arena indices — the data they name lives in the frame's nursery lists
/// or the runtime's tenured lists, never in the `Value` itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value {
    Int(i32),
    Float(f32),
    String(StringId),
    Array(ArrayId),
    Dict(DictId),
    Func(FunctionId),
}

impl Default for Value {
    /// A zero-initialized value is `Int(0)` (§3.1).
    fn default() -> Self {
        Self::Int(0)
    }
}

impl Value {
    /// Short, lowercase type name used in `TypeError` messages.
    pub(crate) fn type_name(self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Func(_) => "func",
        }
    }

    pub(crate) fn is_heap_backed(self) -> bool {
        matches!(self, Self::String(_) | Self::Array(_) | Self::Dict(_))
    }

    /// Whether this value is a `String`, i.e. eligible to drive `ADD`'s string-concatenation
    /// arm (§4.4.3) rather than the numeric-promotion path.
    pub(crate) fn is_string_operand(self) -> bool {
        matches!(self, Self::String(_))
    }
}

/// Owned, host-facing mirror of [`Value`] that does not borrow from the heap.
///
/// The embedding API (§6.1) hands these across the host/core boundary: building a
/// `make_string` call, reading back an array element, etc. Converting a `Value` into a
/// `HostValue` copies any heap-backed payload out of the arena; converting back allocates
/// a fresh heap object via [`crate::heap::Heap`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Int(i32),
    Float(f32),
    String(String),
    Array(Vec<HostValue>),
    Dict(Vec<(String, HostValue)>),
    /// A function value, identified by its registered name.
    Func(String),
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for HostValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
