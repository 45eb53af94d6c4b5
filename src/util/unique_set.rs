use std::fmt;

/// An insertion-ordered collection that rejects elements considered equal by
/// a predicate supplied at construction.
///
/// Unlike `HashSet`, the notion of identity belongs to the set rather than to
/// the element type, so the same element type can be collected under
/// different rules (tags compare by name, for instance, while other fields
/// are ignored).
///
/// # Examples
///
/// ```
/// use reaper::util::UniqueSet;
///
/// let mut words = UniqueSet::new(|a: &String, b: &String| a.eq_ignore_ascii_case(b));
/// assert!(words.insert("Rust".to_string()));
/// assert!(!words.insert("rust".to_string()));
/// assert_eq!(words.len(), 1);
/// ```
#[derive(Clone)]
pub struct UniqueSet<T> {
    items: Vec<T>,
    same: fn(&T, &T) -> bool,
}

impl<T> UniqueSet<T> {
    pub fn new(same: fn(&T, &T) -> bool) -> Self {
        Self {
            items: Vec::new(),
            same,
        }
    }

    /// Adds `item` unless an equal element is already present.
    ///
    /// Returns `true` when the item was added.
    pub fn insert(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.iter().any(|existing| (self.same)(existing, item))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> Extend<T> for UniqueSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a UniqueSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for UniqueSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}
