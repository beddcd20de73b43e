// In-memory stand-ins for the store, the directory and the notifier.

pub mod directory;
pub mod notifier;
pub mod store;

pub use directory::{DirectoryCall, MockDirectory};
pub use notifier::{Notification, RecordingNotifier};
pub use store::MemoryStore;
