//! Fixed-size chunking for upstream batch ceilings.

/// Split `items` into consecutive slices of at most `size` elements.
///
/// Order and total count are preserved; only the final slice may be shorter.
/// A `size` of zero is treated as one so the iterator always makes progress.
pub fn chunks<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size.max(1))
}
