use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::device::{DeviceDescriptor, DeviceId};

/// Invoked with the filtered `(inputs, outputs)` after every topology change.
pub type DeviceChangeCallback = Arc<dyn Fn(&[DeviceDescriptor], &[DeviceDescriptor]) + Send + Sync + 'static>;

/// Lists usable endpoints and reports topology changes.
///
/// Implementations return empty lists (never an error) when the platform is
/// unavailable. Lifecycle decisions belong to the subscriber, not here.
pub trait DeviceEnumerator: Send + Sync {
    fn list_input_devices(&self) -> Vec<DeviceDescriptor>;

    fn list_output_devices(&self) -> Vec<DeviceDescriptor>;

    /// Register for change events, delivered in emission order.
    /// Dropping the returned handle unsubscribes.
    fn subscribe(&self, callback: DeviceChangeCallback) -> Subscription;

    fn find_input(&self, id: DeviceId) -> Option<DeviceDescriptor> {
        self.list_input_devices().into_iter().find(|d| d.id == id)
    }

    fn find_output(&self, id: DeviceId) -> Option<DeviceDescriptor> {
        self.list_output_devices().into_iter().find(|d| d.id == id)
    }
}

/// Keeps a subscription alive; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that was never registered anywhere.
    pub fn detached() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Subscriber registry shared by enumerator implementations.
#[derive(Default)]
pub struct SubscriberList {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, DeviceChangeCallback)>>,
}

impl SubscriberList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(self: &Arc<Self>, callback: DeviceChangeCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, callback));

        let list: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.subscribers.lock().retain(|(sid, _)| *sid != id);
            }
        })
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one change to every subscriber, in registration order.
    pub fn notify(&self, inputs: &[DeviceDescriptor], outputs: &[DeviceDescriptor]) {
        // Snapshot so a callback may unsubscribe without deadlocking.
        let callbacks: Vec<DeviceChangeCallback> = self.subscribers.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(inputs, outputs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::{DeviceClass, DeviceDirection};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notify_reaches_subscribers_until_dropped() {
        let list = SubscriberList::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = list.add(Arc::new(move |_: &[DeviceDescriptor], outputs: &[DeviceDescriptor]| {
            counter.fetch_add(outputs.len(), Ordering::SeqCst);
        }));

        let outputs = vec![DeviceDescriptor::new(1, DeviceDirection::Output, DeviceClass::WiredHeadphones, "")];
        list.notify(&[], &outputs);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(sub);
        assert!(list.is_empty());
        list.notify(&[], &outputs);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_outliving_list_is_harmless() {
        let list = SubscriberList::new();
        let sub = list.add(Arc::new(|_: &[DeviceDescriptor], _: &[DeviceDescriptor]| {}));
        drop(list);
        drop(sub);
    }
}
