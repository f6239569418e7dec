use crate::error::Result;

/// A deferred release of an acquired device, context or channel.
pub type Release = Box<dyn FnOnce() -> Result<()>>;

struct Entry {
    id: &'static str,
    release: Release,
}

/// Tracks acquired resources and releases each one exactly once.
///
/// Entries are kept in acquisition order. `release_all` walks them in
/// reverse, logging failures instead of propagating them, so every exit
/// path (explicit stop, remote close, remote error, drop) ends with the
/// same fully torn-down state.
#[derive(Default)]
pub struct ResourceGuard {
    entries: Vec<Entry>,
}

impl ResourceGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release for `id`.
    ///
    /// If `id` is still pending, its previous release runs first so a
    /// re-acquired resource never leaks the old handle.
    pub fn guard(&mut self, id: &'static str, release: Release) {
        if self.is_pending(id) {
            tracing::debug!("resource '{id}' re-registered, releasing previous handle");
            self.release(id);
        }
        self.entries.push(Entry { id, release });
    }

    /// Run the release for `id` if it is still pending. Returns whether a
    /// release function was invoked.
    pub fn release(&mut self, id: &'static str) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = self.entries.remove(pos);
        run_release(entry);
        true
    }

    /// Release every pending resource in reverse acquisition order.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        while let Some(entry) = self.entries.pop() {
            run_release(entry);
            released += 1;
        }
        released
    }

    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Ids still awaiting release, in acquisition order.
    #[must_use]
    pub fn pending(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.id).collect()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!("releasing {} resource(s) on drop", self.entries.len());
            self.release_all();
        }
    }
}

fn run_release(entry: Entry) {
    match (entry.release)() {
        Ok(()) => tracing::debug!("released '{}'", entry.id),
        Err(e) => tracing::warn!("failed to release '{}': {e}", entry.id),
    }
}
