pub mod channels;
pub mod fanout;
pub mod queue;

pub use channels::MurmurChannels;
pub use fanout::Fanout;
pub use queue::Queue;
