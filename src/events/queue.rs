use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::events::event::Event;

/// FIFO buffer for analytics events with a pause gate.
///
/// While paused, events are held here instead of being sent; a flush drains them in the
/// order they were produced.
#[derive(Default)]
pub(crate) struct EventQueue {
    paused: AtomicBool,
    events: Mutex<VecDeque<Event>>,
}

impl EventQueue {
    pub(crate) fn new() -> EventQueue {
        EventQueue::default()
    }

    pub(crate) fn push(&self, event: Event) {
        let mut events = self
            .events
            .lock()
            .expect("thread holding event queue lock should not panic");
        events.push_back(event);
    }

    pub(crate) fn pop(&self) -> Option<Event> {
        let mut events = self
            .events
            .lock()
            .expect("thread holding event queue lock should not panic");
        events.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        let events = self
            .events
            .lock()
            .expect("thread holding event queue lock should not panic");
        events.len()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::{Event, EventBody, EventType, TrackBody};

    fn event(name: &str) -> Event {
        Event::new(
            "api-key".to_owned(),
            EventType::Track,
            EventBody::Track(TrackBody {
                event: name.to_owned(),
                ..TrackBody::default()
            }),
            "anon".to_owned(),
        )
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = EventQueue::new();
        queue.push(event("first"));
        queue.push(event("second"));
        queue.push(event("third"));

        let mut names = Vec::new();
        while let Some(event) = queue.pop() {
            if let EventBody::Track(body) = event.body {
                names.push(body.event);
            }
        }

        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn pause_gate_starts_open() {
        let queue = EventQueue::new();
        assert!(!queue.is_paused());

        queue.set_paused(true);
        assert!(queue.is_paused());
    }
}
