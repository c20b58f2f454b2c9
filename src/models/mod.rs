pub mod envelope;
pub mod queue_entry;

pub use envelope::Envelope;
pub use queue_entry::{EntryPatch, QueueEntry, QueueEntryRow};
