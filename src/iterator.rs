use crate::error::Result;

/// A forward-only cursor over sorted key/value pairs.
///
/// Unlike [`std::iter::Iterator`] the cursor is positioned explicitly and
/// exposes borrowed keys and values, so sources backed by a reused buffer
/// (blocks, tables) never allocate per entry. `key` and `value` may only be
/// called while `valid` returns true.
pub trait KvIterator {
    fn valid(&self) -> bool;

    /// Positions at the first entry, if any.
    fn seek_to_first(&mut self);

    /// Positions at the first entry with a key at or past `target`.
    fn seek(&mut self, target: &[u8]);

    /// Advances to the next entry. Requires `valid()`.
    fn next(&mut self);

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    /// The first error this cursor ran into, if any. An error also makes
    /// the cursor invalid.
    fn status(&self) -> Result<()>;
}

impl<I: KvIterator + ?Sized> KvIterator for Box<I> {
    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn seek_to_first(&mut self) {
        (**self).seek_to_first()
    }

    fn seek(&mut self, target: &[u8]) {
        (**self).seek(target)
    }

    fn next(&mut self) {
        (**self).next()
    }

    fn key(&self) -> &[u8] {
        (**self).key()
    }

    fn value(&self) -> &[u8] {
        (**self).value()
    }

    fn status(&self) -> Result<()> {
        (**self).status()
    }
}

/// Drains `iter` from its first entry into owned pairs. Mostly useful for
/// tests and diagnostics.
pub fn collect_entries<I: KvIterator + ?Sized>(iter: &mut I) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut entries = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        entries.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    iter.status()?;
    Ok(entries)
}
