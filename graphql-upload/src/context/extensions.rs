use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;

/// You can use `Extensions` to pass data to the engine that is not serializable.
///
/// Extensions are thread safe, and must be locked for mutation.
///
/// For example:
/// `context.extensions().with_lock(|mut lock| lock.insert::<MyData>(data));`
#[derive(Default, Clone, Debug)]
pub struct ExtensionsMutex {
    extensions: Arc<parking_lot::Mutex<http::Extensions>>,
}

impl ExtensionsMutex {
    /// Locks the extensions for interaction.
    ///
    /// The lock will be dropped once the closure completes.
    pub fn with_lock<'a, T, F: FnOnce(ExtensionsGuard<'a>) -> T>(&'a self, func: F) -> T {
        let locked = ExtensionsGuard::new(&self.extensions);
        func(locked)
    }
}

pub struct ExtensionsGuard<'a> {
    guard: parking_lot::MutexGuard<'a, http::Extensions>,
}

impl<'a> ExtensionsGuard<'a> {
    fn new(guard: &'a parking_lot::Mutex<http::Extensions>) -> Self {
        Self {
            guard: guard.lock(),
        }
    }
}

impl Deref for ExtensionsGuard<'_> {
    type Target = http::Extensions;

    fn deref(&self) -> &http::Extensions {
        &self.guard
    }
}

impl DerefMut for ExtensionsGuard<'_> {
    fn deref_mut(&mut self) -> &mut http::Extensions {
        &mut self.guard
    }
}
