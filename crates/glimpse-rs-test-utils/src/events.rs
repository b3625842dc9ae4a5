use glimpse_rs_protocol::{EventMsg, EventPayload, EventSink};
use parking_lot::Mutex;
use std::sync::Arc;

/// Event sink keeping every event it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<EventMsg>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventMsg> {
        self.events.lock().clone()
    }

    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events
            .lock()
            .iter()
            .map(|event| event.payload.clone())
            .collect()
    }

    /// Concatenated `AnswerDelta` text.
    pub fn answer_text(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match &event.payload {
                EventPayload::AnswerDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: EventMsg) {
        self.events.lock().push(event);
    }
}
