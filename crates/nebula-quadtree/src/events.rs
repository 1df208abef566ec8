//! Tile-load progress notification.

/// Called with the number of tiles still waiting to load.
pub type ProgressListener = Box<dyn FnMut(usize)>;

/// Registration token returned by [`TileLoadProgressEvent::add_listener`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle makes the listener impossible to remove"]
pub struct ListenerHandle(u64);

/// Observer list raised once per frame, at the end of the frame.
#[derive(Default)]
pub struct TileLoadProgressEvent {
    listeners: Vec<(u64, ProgressListener)>,
    next_id: u64,
}

impl TileLoadProgressEvent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: ProgressListener) -> ListenerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, listener));
        ListenerHandle(id)
    }

    /// Returns false if the listener was already removed.
    pub fn remove_listener(&mut self, handle: ListenerHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != handle.0);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Invoke every listener, in registration order.
    pub fn raise(&mut self, queue_length: usize) {
        for (_, listener) in &mut self.listeners {
            listener(queue_length);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_raise_reaches_all_listeners_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut event = TileLoadProgressEvent::new();
        for tag in ["a", "b"] {
            let log = Rc::clone(&log);
            let _handle = event.add_listener(Box::new(move |n| log.borrow_mut().push((tag, n))));
        }
        event.raise(3);
        assert_eq!(*log.borrow(), vec![("a", 3), ("b", 3)]);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let calls = Rc::new(RefCell::new(0));
        let mut event = TileLoadProgressEvent::new();
        let counter = Rc::clone(&calls);
        let handle = event.add_listener(Box::new(move |_| *counter.borrow_mut() += 1));
        event.raise(1);
        assert!(event.remove_listener(handle));
        event.raise(1);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(event.listener_count(), 0);
    }
}
