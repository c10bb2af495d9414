//! Bounded, insertion-ordered storage shared by the population and the match set.
//!
//! [`ClassifierSet`] is a thin wrapper around a `Vec` with a hard capacity fixed at
//! construction. Removals compact the survivors leftward and keep their relative order,
//! so slot indices stay meaningful between removals and callers can remap indices they
//! hold with [`shifted_index`].
//!
//! The population stores [`Classifier`](crate::classifier::Classifier)s; the match set
//! stores slot indices into the population.
//!
//! Out-of-range indices and exceeding the capacity are contract violations and panic.

use std::slice;

#[derive(Debug, Clone)]
pub struct ClassifierSet<T> {
    elements: Vec<T>,
    capacity: usize,
}

impl<T> ClassifierSet<T> {
    /// Creates an empty set that preallocates room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.elements.len() >= self.capacity
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> &T {
        &self.elements[index]
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.elements[index]
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.elements
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.elements.iter_mut()
    }

    /// Appends `element` and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if the set is full.
    pub fn add(&mut self, element: T) -> usize {
        assert!(
            !self.is_full(),
            "classifier set capacity of {} exceeded",
            self.capacity
        );
        self.elements.push(element);
        self.elements.len() - 1
    }

    /// Removes the element at `index`, shifting the tail left.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove(&mut self, index: usize) -> T {
        self.elements.remove(index)
    }

    /// Removes the elements at `indices` in a single compacting pass.
    ///
    /// # Panics
    ///
    /// Panics if `indices` is not strictly ascending or contains an index out of range.
    pub fn remove_many(&mut self, indices: &[usize]) {
        assert!(
            indices.windows(2).all(|w| w[0] < w[1]),
            "indices must be strictly ascending"
        );
        if let Some(&last) = indices.last() {
            assert!(
                last < self.elements.len(),
                "index {last} out of range for length {}",
                self.elements.len()
            );
        }
        let mut pending = indices.iter().copied().peekable();
        let mut index = 0;
        self.elements.retain(|_| {
            let removed = pending.next_if_eq(&index).is_some();
            index += 1;
            !removed
        });
    }

    /// Keeps the elements for which `keep` returns `true`, preserving their order.
    pub fn retain_mut<F>(&mut self, keep: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        self.elements.retain_mut(keep);
    }

    /// Stable sort.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> std::cmp::Ordering,
    {
        self.elements.sort_by(compare);
    }

    /// Removes every element but keeps the allocation.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Backing storage, lent to the matching workers for a parallel build.
    pub(crate) fn storage_mut(&mut self) -> &mut Vec<T> {
        &mut self.elements
    }
}

impl<'a, T> IntoIterator for &'a ClassifierSet<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut ClassifierSet<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Index of slot `index` after the slots in `removed` were removed, or `None` if it was
/// one of them. `removed` must be sorted ascending.
#[must_use]
pub fn shifted_index(index: usize, removed: &[usize]) -> Option<usize> {
    match removed.binary_search(&index) {
        Ok(_) => None,
        Err(shift) => Some(index - shift),
    }
}
