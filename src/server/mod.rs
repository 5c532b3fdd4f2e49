//! Stream machines bridging network connections to application streams.
//!
//! [`StreamFactory`] classifies the first message of every stream and builds
//! either an [`AcceptStream`] for a routed network connection or a
//! [`ConnectReplyStream`] for an application reply. The machines share the
//! factory's slabs, correlation table and id sequences.

mod accept;
mod factory;
mod reply;

pub use accept::AcceptStream;
pub use factory::StreamFactory;
pub use reply::ConnectReplyStream;
