//! Heap layout for the boxed value types and the two-tier mark-and-sweep collector
//! (§3.2-§3.4, §4.1, §4.5).
//!
//! # Design note
//!
//! Each heap object conceptually carries intrusive prev/next list pointers and
//! an `is_deep` flag (§9). We model that with arena indices instead: each kind (`String`/`Array`/`Dict`) lives in its own slab (`Arena<T>`),
//! and list membership — "which frame's nursery, or the tenured set" — is tracked as an
//! `Owner` field on the object header plus a plain `Vec<Id>` on the owning [`crate::frame::Frame`]
//! or on this `Heap`. This sidesteps unsafe intrusive linked lists entirely while preserving
//! every invariant in §3.8: an object is reachable from exactly one such list at a time.

use crate::{
    error::{ErrorKind, RunResult},
    frame::Frame,
    value::{ArrayId, DictId, StringId, Value},
};

/// Where a heap object currently lives.
///
/// `Nursery(depth)` names a frame by its position in the runtime's call stack
/// (`Runtime::frames[depth]`). That index stays valid for as long as the object remains
/// un-promoted, because a frame can only be popped after everything it could still
/// reach has either been promoted or become unreachable garbage (§4.3 `leave_frame`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Tenured,
    Nursery(u32),
}

/// A minimal slab allocator: a vector of optional slots plus a free list of holes to
/// reuse, split one-per-kind rather than a single arena shared across all object types.
#[derive(Debug, Default)]
struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Arena<T> {
    fn insert(&mut self, value: T) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(value);
            index
        } else {
            let index = u32::try_from(self.slots.len()).expect("arena exhausted u32 indices");
            self.slots.push(Some(value));
            index
        }
    }

    fn get(&self, index: u32) -> &T {
        self.slots[index as usize].as_ref().expect("dangling arena id")
    }

    fn get_mut(&mut self, index: u32) -> &mut T {
        self.slots[index as usize].as_mut().expect("dangling arena id")
    }

    fn free(&mut self, index: u32) -> T {
        let value = self.slots[index as usize].take().expect("double free of arena slot");
        self.free.push(index);
        value
    }

    fn live_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|_| u32::try_from(i).unwrap()))
    }
}

pub(crate) struct StringObj {
    bytes: Box<[u8]>,
    owner: Owner,
    marked: bool,
}

impl StringObj {
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub(crate) struct ArrayObj {
    /// `table.len()` is always the current `alloc_size`; entries beyond `size` are
    /// logically unused but kept zeroed so growth never has to distinguish "allocated but
    /// unused" from "never touched".
    table: Vec<Value>,
    size: usize,
    owner: Owner,
    marked: bool,
}

impl ArrayObj {
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn alloc_size(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn as_slice(&self) -> &[Value] {
        &self.table[..self.size]
    }
}

pub(crate) struct DictObj {
    keys: Vec<Box<str>>,
    values: Vec<Value>,
    owner: Owner,
    marked: bool,
}

impl DictObj {
    pub(crate) fn size(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn alloc_size(&self) -> usize {
        self.keys.capacity()
    }

    fn find(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k.as_ref() == key)
    }

    pub(crate) fn key_at(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(|k| k.as_ref())
    }

    pub(crate) fn value_at(&self, index: usize) -> Option<Value> {
        self.values.get(index).copied()
    }
}

const ARRAY_INITIAL_CAPACITY: usize = 16;
const DICT_INITIAL_CAPACITY: usize = 16;

/// The runtime's heap: three arenas (one per boxed kind), each split into a tenured set and
/// a garbage set. Nursery membership lives on the frames themselves (§3.6).
pub(crate) struct Heap {
    strings: Arena<StringObj>,
    arrays: Arena<ArrayObj>,
    dicts: Arena<DictObj>,

    tenured_strings: Vec<StringId>,
    tenured_arrays: Vec<ArrayId>,
    tenured_dicts: Vec<DictId>,

    garbage_strings: Vec<StringId>,
    garbage_arrays: Vec<ArrayId>,
    garbage_dicts: Vec<DictId>,

    /// Approximate heap usage in bytes (§3.7).
    bytes_used: usize,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self {
            strings: Arena::default(),
            arrays: Arena::default(),
            dicts: Arena::default(),
            tenured_strings: Vec::new(),
            tenured_arrays: Vec::new(),
            tenured_dicts: Vec::new(),
            garbage_strings: Vec::new(),
            garbage_arrays: Vec::new(),
            garbage_dicts: Vec::new(),
            bytes_used: 0,
        }
    }

    pub(crate) fn heap_usage(&self) -> usize {
        self.bytes_used
    }

    fn owner_for(frames: &[Frame]) -> Owner {
        match frames.len().checked_sub(1) {
            Some(depth) => Owner::Nursery(u32::try_from(depth).expect("call stack deeper than u32")),
            None => Owner::Tenured,
        }
    }

    // ---- allocation (§4.1) ----

    pub(crate) fn make_string(&mut self, frames: &mut [Frame], bytes: &[u8]) -> Value {
        let owner = Self::owner_for(frames);
        let id = StringId::from_index(
            self.strings.insert(StringObj { bytes: bytes.into(), owner, marked: owner == Owner::Tenured }) as usize,
        );
        self.bytes_used += bytes.len();
        match owner {
            Owner::Tenured => self.tenured_strings.push(id),
            Owner::Nursery(depth) => frames[depth as usize].nursery_strings.push(id),
        }
        Value::String(id)
    }

    pub(crate) fn make_empty_array(&mut self, frames: &mut [Frame]) -> Value {
        let owner = Self::owner_for(frames);
        let id = ArrayId::from_index(self.arrays.insert(ArrayObj {
            table: vec![Value::default(); ARRAY_INITIAL_CAPACITY],
            size: 0,
            owner,
            marked: owner == Owner::Tenured,
        }) as usize);
        self.bytes_used += array_footprint(ARRAY_INITIAL_CAPACITY);
        match owner {
            Owner::Tenured => self.tenured_arrays.push(id),
            Owner::Nursery(depth) => frames[depth as usize].nursery_arrays.push(id),
        }
        Value::Array(id)
    }

    pub(crate) fn make_empty_dict(&mut self, frames: &mut [Frame]) -> Value {
        let owner = Self::owner_for(frames);
        let id = DictId::from_index(self.dicts.insert(DictObj {
            keys: Vec::with_capacity(DICT_INITIAL_CAPACITY),
            values: Vec::with_capacity(DICT_INITIAL_CAPACITY),
            owner,
            marked: owner == Owner::Tenured,
        }) as usize);
        self.bytes_used += dict_footprint(DICT_INITIAL_CAPACITY);
        match owner {
            Owner::Tenured => self.tenured_dicts.push(id),
            Owner::Nursery(depth) => frames[depth as usize].nursery_dicts.push(id),
        }
        Value::Dict(id)
    }

    // ---- accessors ----

    pub(crate) fn string(&self, id: StringId) -> &StringObj {
        self.strings.get(id.0)
    }

    pub(crate) fn array(&self, id: ArrayId) -> &ArrayObj {
        self.arrays.get(id.0)
    }

    pub(crate) fn dict(&self, id: DictId) -> &DictObj {
        self.dicts.get(id.0)
    }

    // ---- array operations (§4.1) ----

    pub(crate) fn array_get(&self, id: ArrayId, index: i32, file: &str, line: u32) -> RunResult<Value> {
        let obj = self.arrays.get(id.0);
        if index < 0 || (index as usize) >= obj.size {
            return Err(crate::error::RunError::new(
                ErrorKind::IndexOutOfRange,
                file,
                line,
                format!("array index {index} out of range (size {})", obj.size),
            ));
        }
        Ok(obj.table[index as usize])
    }

    pub(crate) fn array_set(
        &mut self,
        frames: &mut [Frame],
        id: ArrayId,
        index: i32,
        value: Value,
        file: &str,
        line: u32,
    ) -> RunResult<()> {
        if index < 0 {
            return Err(crate::error::RunError::new(
                ErrorKind::IndexOutOfRange,
                file,
                line,
                format!("negative array index {index}"),
            ));
        }
        let index = index as usize;
        let need = index + 1;
        {
            let obj = self.arrays.get_mut(id.0);
            if need > obj.table.len() {
                let new_alloc = need.max(obj.table.len() * 2);
                self.bytes_used += array_footprint(new_alloc) - array_footprint(obj.table.len());
                obj.table.resize(new_alloc, Value::default());
            }
            obj.table[index] = value;
            if need > obj.size {
                obj.size = need;
            }
        }
        // Writing into an already-tenured array makes the stored value reachable from a
        // tenured container, so it promotes with it (§3.9). The array itself only becomes
        // tenured by being stored into a global or another tenured container elsewhere —
        // being written to does not tenure it, or a loop building up a local array would
        // never be reclaimable by a shallow GC.
        if self.arrays.get(id.0).owner == Owner::Tenured && value.is_heap_backed() {
            self.promote(frames, value);
        }
        Ok(())
    }

    /// Resize never needs to promote anything: the trailing slots it fills are zeroed
    /// `Int(0)`, not heap-backed, and resize never changes which list the array itself
    /// belongs to (§4.1).
    pub(crate) fn array_resize(&mut self, id: ArrayId, new_size: usize) {
        let obj = self.arrays.get_mut(id.0);
        if new_size > obj.table.len() {
            let new_alloc = new_size.max(obj.table.len() * 2);
            self.bytes_used += array_footprint(new_alloc) - array_footprint(obj.table.len());
            obj.table.resize(new_alloc, Value::default());
        }
        if new_size < obj.size {
            for slot in &mut obj.table[new_size..obj.size] {
                *slot = Value::default();
            }
        }
        obj.size = new_size;
    }

    pub(crate) fn array_len(&self, id: ArrayId) -> usize {
        self.arrays.get(id.0).size
    }

    // ---- dict operations (§4.1) ----

    pub(crate) fn dict_get(&self, id: DictId, key: &str, file: &str, line: u32) -> RunResult<Value> {
        let obj = self.dicts.get(id.0);
        match obj.find(key) {
            Some(idx) => Ok(obj.values[idx]),
            None => Err(crate::error::RunError::new(
                ErrorKind::KeyNotFound,
                file,
                line,
                format!("key '{key}' not found"),
            )),
        }
    }

    pub(crate) fn dict_set(&mut self, frames: &mut [Frame], id: DictId, key: &str, value: Value) {
        {
            let obj = self.dicts.get_mut(id.0);
            match obj.find(key) {
                Some(idx) => obj.values[idx] = value,
                None => {
                    let before = obj.keys.capacity();
                    obj.keys.push(key.into());
                    obj.values.push(value);
                    let after = obj.keys.capacity();
                    if after != before {
                        self.bytes_used += dict_footprint(after) - dict_footprint(before);
                    }
                    self.bytes_used += key.len();
                }
            }
        }
        // See the matching note on `array_set`: only cascade the promotion onto `value`,
        // and only when `id` is itself already tenured.
        if self.dicts.get(id.0).owner == Owner::Tenured && value.is_heap_backed() {
            self.promote(frames, value);
        }
    }

    pub(crate) fn dict_remove(&mut self, id: DictId, key: &str, file: &str, line: u32) -> RunResult<()> {
        let obj = self.dicts.get_mut(id.0);
        match obj.find(key) {
            Some(idx) => {
                let removed = obj.keys.remove(idx);
                obj.values.remove(idx);
                self.bytes_used = self.bytes_used.saturating_sub(removed.len());
                Ok(())
            }
            None => Err(crate::error::RunError::new(
                ErrorKind::KeyNotFound,
                file,
                line,
                format!("key '{key}' not found"),
            )),
        }
    }

    pub(crate) fn dict_len(&self, id: DictId) -> usize {
        self.dicts.get(id.0).keys.len()
    }

    // ---- promotion and re-homing (§4.1 "make deep", §3.9, §4.3) ----

    /// Promotes the object a heap-backed value refers to, if any, to the tenured set. A thin
    /// wrapper over [`Heap::relocate`] — see it for the cascading rules.
    pub(crate) fn promote(&mut self, frames: &mut [Frame], value: Value) {
        self.relocate(frames, value, Owner::Tenured);
    }

    /// Re-homes a function's return value so it survives its own frame's retirement.
    ///
    /// Must run before the callee's frame is popped: with a caller frame still on the stack
    /// the value (and anything it still nursery-owns) moves into that frame's nursery;
    /// with none left — a call from the host itself — it is promoted to tenured instead,
    /// matching `owner_for`'s own "no frame ⇒ tenured" rule for fresh allocations. Without
    /// this, a freshly built string or array returned from a call would still be sitting on
    /// the callee's nursery list when that frame retires, and the next shallow GC would free
    /// it out from under whoever just received it (§4.3, §8 property 7).
    pub(crate) fn reown_return_value(&mut self, frames: &mut [Frame], value: Value, caller_depth: Option<u32>) {
        let target = match caller_depth {
            Some(depth) => Owner::Nursery(depth),
            None => Owner::Tenured,
        };
        self.relocate(frames, value, target);
    }

    /// Moves the object a heap-backed value refers to onto `target`'s list, if any.
    ///
    /// A no-op for `Int`/`Float`/`Func`, for objects already on `target`, and — crucially —
    /// for objects already tenured: once tenured, an object is reachable from the globals
    /// for good and must never be handed back to a nursery list, or a later shallow GC could
    /// free it while a global still points at it. Otherwise the object is unlinked from
    /// whichever list currently owns it (found via its `Owner`, not necessarily the top of
    /// the call stack — see `Owner::Nursery`'s docs) and linked onto `target` instead.
    ///
    /// Relocation cascades to every heap-backed value the object *already* contains: an array
    /// or dict that was built up while nursery-owned may hold elements still on that same
    /// frame's nursery lists. If only the container moved, those elements would be freed out
    /// from under it the moment their owning frame exits, leaving the container referencing
    /// garbage — a direct violation of §3.8's "must not reference a garbage-listed object".
    /// So relocating a container relocates its current contents too.
    fn relocate(&mut self, frames: &mut [Frame], value: Value, target: Owner) {
        match value {
            Value::String(id) => {
                let obj = self.strings.get_mut(id.0);
                if obj.owner == target || obj.owner == Owner::Tenured {
                    return;
                }
                let Owner::Nursery(depth) = obj.owner else { unreachable!() };
                obj.owner = target;
                if target == Owner::Tenured {
                    obj.marked = false;
                }
                let list = &mut frames[depth as usize].nursery_strings;
                if let Some(pos) = list.iter().position(|x| *x == id) {
                    list.swap_remove(pos);
                }
                match target {
                    Owner::Tenured => self.tenured_strings.push(id),
                    Owner::Nursery(d) => frames[d as usize].nursery_strings.push(id),
                }
            }
            Value::Array(id) => {
                let obj = self.arrays.get_mut(id.0);
                if obj.owner == target || obj.owner == Owner::Tenured {
                    return;
                }
                let Owner::Nursery(depth) = obj.owner else { unreachable!() };
                obj.owner = target;
                if target == Owner::Tenured {
                    obj.marked = false;
                }
                let list = &mut frames[depth as usize].nursery_arrays;
                if let Some(pos) = list.iter().position(|x| *x == id) {
                    list.swap_remove(pos);
                }
                match target {
                    Owner::Tenured => self.tenured_arrays.push(id),
                    Owner::Nursery(d) => frames[d as usize].nursery_arrays.push(id),
                }
                let elements: Vec<Value> = self.arrays.get(id.0).as_slice().to_vec();
                for element in elements {
                    if element.is_heap_backed() {
                        self.relocate(frames, element, target);
                    }
                }
            }
            Value::Dict(id) => {
                let obj = self.dicts.get_mut(id.0);
                if obj.owner == target || obj.owner == Owner::Tenured {
                    return;
                }
                let Owner::Nursery(depth) = obj.owner else { unreachable!() };
                obj.owner = target;
                if target == Owner::Tenured {
                    obj.marked = false;
                }
                let list = &mut frames[depth as usize].nursery_dicts;
                if let Some(pos) = list.iter().position(|x| *x == id) {
                    list.swap_remove(pos);
                }
                match target {
                    Owner::Tenured => self.tenured_dicts.push(id),
                    Owner::Nursery(d) => frames[d as usize].nursery_dicts.push(id),
                }
                let values = self.dicts.get(id.0).values.clone();
                for value in values {
                    if value.is_heap_backed() {
                        self.relocate(frames, value, target);
                    }
                }
            }
            Value::Int(_) | Value::Float(_) | Value::Func(_) => {}
        }
    }

    // ---- garbage collection (§4.5) ----

    /// Moves a frame's three nursery lists to the runtime's garbage lists. Called from
    /// `leave_frame` (§4.3); does not free anything by itself.
    pub(crate) fn retire_frame(&mut self, frame: &mut Frame) {
        self.garbage_strings.append(&mut frame.nursery_strings);
        self.garbage_arrays.append(&mut frame.nursery_arrays);
        self.garbage_dicts.append(&mut frame.nursery_dicts);
    }

    /// Frees everything on the garbage lists.
    pub(crate) fn shallow_gc(&mut self) {
        for id in self.garbage_strings.drain(..) {
            let obj = self.strings.free(id.0);
            self.bytes_used = self.bytes_used.saturating_sub(obj.bytes.len());
        }
        for id in self.garbage_arrays.drain(..) {
            let obj = self.arrays.free(id.0);
            self.bytes_used = self.bytes_used.saturating_sub(array_footprint(obj.alloc_size()));
        }
        for id in self.garbage_dicts.drain(..) {
            let obj = self.dicts.free(id.0);
            let key_bytes: usize = obj.keys.iter().map(|k| k.len()).sum();
            self.bytes_used = self.bytes_used.saturating_sub(dict_footprint(obj.alloc_size()) + key_bytes);
        }
    }

    /// Shallow GC, then mark-and-sweep over the tenured sets rooted in `roots` (typically the
    /// runtime's globals). Frames are not roots here (§4.5): only reachability from
    /// globals keeps a tenured object alive.
    pub(crate) fn deep_gc(&mut self, roots: Vec<Value>) {
        self.shallow_gc();

        for id in self.tenured_strings.iter().copied().collect::<Vec<_>>() {
            self.strings.get_mut(id.0).marked = false;
        }
        for id in self.tenured_arrays.iter().copied().collect::<Vec<_>>() {
            self.arrays.get_mut(id.0).marked = false;
        }
        for id in self.tenured_dicts.iter().copied().collect::<Vec<_>>() {
            self.dicts.get_mut(id.0).marked = false;
        }

        let mut work: Vec<Value> = roots;
        while let Some(value) = work.pop() {
            match value {
                Value::String(id) => {
                    let obj = self.strings.get_mut(id.0);
                    if obj.marked {
                        continue;
                    }
                    obj.marked = true;
                }
                Value::Array(id) => {
                    let obj = self.arrays.get_mut(id.0);
                    if obj.marked {
                        continue;
                    }
                    obj.marked = true;
                    work.extend_from_slice(obj.as_slice());
                }
                Value::Dict(id) => {
                    let obj = self.dicts.get_mut(id.0);
                    if obj.marked {
                        continue;
                    }
                    obj.marked = true;
                    work.extend(obj.values.iter().copied());
                }
                Value::Int(_) | Value::Float(_) | Value::Func(_) => {}
            }
        }

        self.tenured_strings.retain(|id| {
            let marked = self.strings.get(id.0).marked;
            if !marked {
                let obj = self.strings.free(id.0);
                self.bytes_used = self.bytes_used.saturating_sub(obj.bytes.len());
            }
            marked
        });
        self.tenured_arrays.retain(|id| {
            let marked = self.arrays.get(id.0).marked;
            if !marked {
                let obj = self.arrays.free(id.0);
                self.bytes_used = self.bytes_used.saturating_sub(array_footprint(obj.alloc_size()));
            }
            marked
        });
        self.tenured_dicts.retain(|id| {
            let marked = self.dicts.get(id.0).marked;
            if !marked {
                let obj = self.dicts.free(id.0);
                let key_bytes: usize = obj.keys.iter().map(|k| k.len()).sum();
                self.bytes_used = self.bytes_used.saturating_sub(dict_footprint(obj.alloc_size()) + key_bytes);
            }
            marked
        });
    }

    #[cfg(test)]
    pub(crate) fn live_object_count(&self) -> usize {
        self.strings.live_indices().count() + self.arrays.live_indices().count() + self.dicts.live_indices().count()
    }
}

fn array_footprint(alloc_size: usize) -> usize {
    32 + alloc_size * std::mem::size_of::<Value>()
}

fn dict_footprint(alloc_size: usize) -> usize {
    32 + alloc_size * (std::mem::size_of::<Value>() + std::mem::size_of::<Box<str>>())
}
