//! Shared test doubles for the URL shortener backend.

mod broker;
mod clock;
mod rng;
mod store;

pub use broker::{ChannelReceiver, RecordingSender, RecordingSubscriber};
pub use clock::{FixedClock, fixed_time};
pub use rng::SequenceRng;
pub use store::FailingEventStore;
