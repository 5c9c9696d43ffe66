pub mod codec;
pub mod local;
pub mod messages;

pub use codec::{Envelope, MAX_MESSAGE_SIZE};
pub use local::{AttachReplica, GetNetworkStats, LocalNetwork, NetworkStats, SetIsolated};
pub use messages::{BroadcastPaxosMessage, NetworkSink, SendPaxosMessage};
