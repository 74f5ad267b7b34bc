use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed pool of import slots. Admission never waits: a request either gets
/// a slot now or is turned away.
#[derive(Debug, Clone)]
pub struct ImportGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// A held import slot; dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct ImportSlot {
    _permit: OwnedSemaphorePermit,
}

impl ImportGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn try_acquire(&self) -> Option<ImportSlot> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => Some(ImportSlot { _permit: permit }),
            Err(_) => {
                tracing::debug!(capacity = self.capacity, "All import slots are busy");
                None
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_when_full() {
        let gate = ImportGate::new(2);
        let first = gate.try_acquire();
        let second = gate.try_acquire();

        assert!(first.is_some());
        assert!(second.is_some());
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.available(), 0);
    }

    #[test]
    fn test_release_admits_exactly_one() {
        let gate = ImportGate::new(3);
        let mut held: Vec<ImportSlot> = (0..3).filter_map(|_| gate.try_acquire()).collect();
        assert_eq!(held.len(), 3);
        assert!(gate.try_acquire().is_none());

        held.pop();

        let retried = gate.try_acquire();
        assert!(retried.is_some());
        assert!(gate.try_acquire().is_none());

        drop(retried);
        drop(held);
        assert_eq!(gate.available(), gate.capacity());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_release_does_not_leak() {
        let gate = ImportGate::new(4);
        let mut handles = Vec::new();

        for _ in 0..64 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                if let Some(slot) = gate.try_acquire() {
                    tokio::task::yield_now().await;
                    drop(slot);
                    true
                } else {
                    false
                }
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert!(admitted >= 1);
        assert_eq!(gate.available(), 4);
    }

    #[test]
    fn test_slot_released_on_panic() {
        let gate = ImportGate::new(1);
        let worker_gate = gate.clone();

        let result = std::thread::spawn(move || {
            let _slot = worker_gate.try_acquire().unwrap();
            panic!("import crashed");
        })
        .join();

        assert!(result.is_err());
        assert!(gate.try_acquire().is_some());
    }
}
