use crate::event::Event;
use ic_stable_structures::memory_manager::{MemoryId, MemoryManager, VirtualMemory};
use ic_stable_structures::{DefaultMemoryImpl, StableLog};

type Memory = VirtualMemory<DefaultMemoryImpl>;

const LOG_INDEX_MEMORY_ID: MemoryId = MemoryId::new(0);
const LOG_DATA_MEMORY_ID: MemoryId = MemoryId::new(1);

/// Append-only audit trail of committed events, CBOR encoded.
pub struct EventLog {
    events: StableLog<Vec<u8>, Memory, Memory>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let memory_manager = MemoryManager::init(DefaultMemoryImpl::default());
        Self {
            events: StableLog::new(
                memory_manager.get(LOG_INDEX_MEMORY_ID),
                memory_manager.get(LOG_DATA_MEMORY_ID),
            ),
        }
    }

    /// Appends a new event to the log.
    pub fn append(&self, event: &Event) {
        let bytes = encode_event(event);
        self.events
            .append(&bytes)
            .expect("recording an event should succeed");
    }

    /// Returns an iterator over all recorded events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = Event> + '_ {
        self.events.iter().map(|bytes| decode_event(&bytes))
    }

    pub fn get(&self, index: u64) -> Option<Event> {
        self.events.get(index).map(|bytes| decode_event(&bytes))
    }

    /// Returns the current number of events in the log.
    pub fn len(&self) -> u64 {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encode_event(event: &Event) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(event, &mut buf).expect("failed to encode a manager event");
    buf
}

fn decode_event(buf: &[u8]) -> Event {
    ciborium::de::from_reader(buf).expect("failed to decode a manager event")
}
