use std::io;

use crate::paxos::types::ReplicaId;

#[derive(Debug)]
pub enum PaxosError {
    InvalidConfig(String),
    NotLeader(Option<ReplicaId>),
    Mailbox(String),
    IoError(io::Error),
    Codec(String),
    MessageTooLarge(usize),
}

impl std::fmt::Display for PaxosError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaxosError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            PaxosError::NotLeader(Some(leader)) => {
                write!(f, "Not the leader, current leader is replica {}", leader)
            }
            PaxosError::NotLeader(None) => write!(f, "Not the leader, no leader is trusted"),
            PaxosError::Mailbox(msg) => write!(f, "Mailbox error: {}", msg),
            PaxosError::IoError(err) => write!(f, "IO error: {}", err),
            PaxosError::Codec(msg) => write!(f, "Codec error: {}", msg),
            PaxosError::MessageTooLarge(len) => {
                write!(f, "Encoded message of {} bytes exceeds size limit", len)
            }
        }
    }
}

impl std::error::Error for PaxosError {}

impl From<io::Error> for PaxosError {
    fn from(err: io::Error) -> Self {
        PaxosError::IoError(err)
    }
}

impl From<bincode::error::EncodeError> for PaxosError {
    fn from(err: bincode::error::EncodeError) -> Self {
        PaxosError::Codec(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for PaxosError {
    fn from(err: bincode::error::DecodeError) -> Self {
        PaxosError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for PaxosError {
    fn from(err: serde_json::Error) -> Self {
        PaxosError::InvalidConfig(err.to_string())
    }
}

impl From<actix::MailboxError> for PaxosError {
    fn from(err: actix::MailboxError) -> Self {
        PaxosError::Mailbox(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PaxosError>;
