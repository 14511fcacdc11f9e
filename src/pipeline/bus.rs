use crate::error::TransportError;

use super::event::ProgressEvent;

/// Receives every event published on an [`EventBus`].
pub trait Observer: Send {
    fn on_event(&mut self, event: &ProgressEvent) -> Result<(), TransportError>;
}

/// Ordered event log plus the list of registered observers.
///
/// Events are delivered synchronously in publish order. An observer that
/// fails is logged and skipped; the remaining observers still get the event.
#[derive(Default)]
pub struct EventBus {
    log: Vec<ProgressEvent>,
    observers: Vec<Box<dyn Observer>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn publish(&mut self, event: ProgressEvent) {
        for (i, observer) in self.observers.iter_mut().enumerate() {
            if let Err(e) = observer.on_event(&event) {
                log::warn!(
                    "observer #{i} failed to handle {}: {e}",
                    event.kind.name()
                );
            }
        }
        self.log.push(event);
    }

    /// Events published since the last [`Self::clear_log`], oldest first.
    pub fn events(&self) -> &[ProgressEvent] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::event::EventKind;
    use crate::pipeline::observers::FnObserver;
    use crate::uid::UID;
    use std::sync::{Arc, Mutex};

    struct Broken;

    impl Observer for Broken {
        fn on_event(&mut self, _event: &ProgressEvent) -> Result<(), TransportError> {
            Err(TransportError::Other("sink closed".to_string()))
        }
    }

    #[test]
    fn test_failing_observer_is_isolated() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut bus = EventBus::new();
        bus.subscribe(Broken);
        let sink = Arc::clone(&seen);
        bus.subscribe(FnObserver::new(move |e: &ProgressEvent| {
            sink.lock().unwrap().push(e.kind.name());
        }));

        let run_id = UID::new();
        bus.publish(ProgressEvent::new(run_id.clone(), EventKind::JobStart));
        bus.publish(ProgressEvent::new(run_id, EventKind::ParseStart));

        assert_eq!(*seen.lock().unwrap(), vec!["JobStart", "ParseStart"]);
        assert_eq!(bus.events().len(), 2);
    }

    #[test]
    fn test_log_without_observers() {
        let mut bus = EventBus::new();
        bus.publish(ProgressEvent::new(UID::new(), EventKind::Info("hello".into())));
        assert_eq!(bus.events()[0].message(), "hello");
        bus.clear_log();
        assert!(bus.events().is_empty());
    }
}
