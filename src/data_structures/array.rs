//! Growable, type-parameterized array.
//!
//! [`GrowableArray`] backs every list in this crate: vertices, indices,
//! texture references and meshes. It behaves like a `Vec<T>` but keeps its own
//! logical capacity so growth is a predictable doubling sequence that callers
//! (and tests) can reason about.

use std::ops::Index;

/// An owned, contiguous buffer of `T` that doubles its capacity on overflow.
///
/// Invariant: `len() <= capacity()`. References handed out by [`get`](Self::get)
/// or indexing cannot outlive a [`push`](Self::push), so the relocation that
/// growth may cause never leaves a dangling element reference behind.
///
/// Allocation failure is not recoverable here; it aborts through the global
/// allocator just like any other `Vec` allocation.
#[derive(Clone, Debug)]
pub struct GrowableArray<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> GrowableArray<T> {
    /// Create an empty array with room for `initial_capacity` elements.
    pub fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(initial_capacity),
            capacity: initial_capacity,
        }
    }

    /// Append `item`, doubling the capacity first if the array is full.
    ///
    /// A zero capacity grows to one.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            let new_capacity = (self.capacity * 2).max(1);
            self.items.reserve_exact(new_capacity - self.items.len());
            self.capacity = new_capacity;
        }
        self.items.push(item);
    }

    /// Append clones of every element in `items`, growing one element at a time.
    pub fn extend_from_slice(&mut self, items: &[T])
    where
        T: Clone,
    {
        for item in items {
            self.push(item.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Logical capacity, following the doubling sequence from the initial hint.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Element access without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be smaller than [`len`](Self::len).
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        // SAFETY: the caller guarantees `index < len`.
        unsafe { self.items.get_unchecked(index) }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Free the buffer. The array is empty afterwards and regrows from zero.
    pub fn release(&mut self) {
        self.items = Vec::new();
        self.capacity = 0;
    }
}

impl<T> Default for GrowableArray<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T> Index<usize> for GrowableArray<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a GrowableArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for GrowableArray<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T> FromIterator<T> for GrowableArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut array = Self::with_capacity(iter.size_hint().0);
        for item in iter {
            array.push(item);
        }
        array
    }
}
