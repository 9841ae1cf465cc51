//! Owner/view split for records that several plugins read but one writes.

use std::sync::Arc;

use tokio::sync::RwLock;

/// The writable backing object of a shared record.
///
/// Held only by the plugin whose hook chain produces the record.
#[derive(Debug)]
pub struct SharedRecord<T> {
    inner: Arc<RwLock<T>>,
}

impl<T: Clone> SharedRecord<T> {
    /// Wraps an initial value.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Replaces the whole record.
    pub async fn replace(&self, value: T) {
        *self.inner.write().await = value;
    }

    /// Mutates the record in place.
    pub async fn update<F: FnOnce(&mut T)>(&self, f: F) {
        let mut guard = self.inner.write().await;
        f(&mut guard);
    }

    /// A clone of the current value.
    pub async fn snapshot(&self) -> T {
        self.inner.read().await.clone()
    }

    /// A read-only view over the same backing object.
    pub fn view(&self) -> RecordView<T> {
        RecordView {
            inner: self.inner.clone(),
        }
    }
}

/// Read-only view of a [`SharedRecord`]. Observes every later write.
#[derive(Debug)]
pub struct RecordView<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for RecordView<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> RecordView<T> {
    /// A clone of the current value.
    pub async fn get(&self) -> T {
        self.inner.read().await.clone()
    }

    /// Reads the record without cloning it.
    pub async fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_view_observes_writes() {
        let record = SharedRecord::new(vec![1]);
        let view = record.view();

        record.update(|v| v.push(2)).await;
        assert_eq!(view.get().await, vec![1, 2]);

        record.replace(vec![7]).await;
        assert_eq!(view.with(|v| v.len()).await, 1);
        assert_eq!(record.snapshot().await, vec![7]);
    }
}
