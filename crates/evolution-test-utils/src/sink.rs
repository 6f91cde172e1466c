use evolution_protocol::{ChannelEvent, ChannelSink};
use parking_lot::Mutex;

/// Channel sink that keeps every event it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ChannelEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().clone()
    }
}

impl ChannelSink for CollectingSink {
    fn emit(&self, event: ChannelEvent) {
        self.events.lock().push(event);
    }
}
