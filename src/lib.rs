pub mod client;
pub mod config;
pub mod consensus;
pub mod network;
pub mod paxos;
pub mod util;
