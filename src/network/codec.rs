use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use serde::{Deserialize, Serialize};

use crate::paxos::rpc::PaxosMessage;
use crate::paxos::types::ReplicaId;
use crate::util::errors::{PaxosError, Result};

// Constants for message size management
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB - prevent DoS attacks

/// A peer message together with the replica it is addressed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: ReplicaId,
    pub message: PaxosMessage,
}

/// Get bincode configuration for consistent encoding/decoding
fn bincode_config() -> bincode::config::Configuration {
    bincode::config::standard().with_variable_int_encoding()
}

/// Serialize with size limit using serde compatibility
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let encoded = bincode::serde::encode_to_vec(envelope, bincode_config())?;

    if encoded.len() > MAX_MESSAGE_SIZE {
        return Err(PaxosError::MessageTooLarge(encoded.len()));
    }

    Ok(encoded)
}

/// Deserialize with validation using serde compatibility
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(PaxosError::MessageTooLarge(bytes.len()));
    }

    let (envelope, _): (Envelope, usize) =
        bincode::serde::decode_from_slice(bytes, bincode_config())?;

    Ok(envelope)
}

/// Write 4-byte length prefix + payload
pub async fn write_frame<T>(io: &mut T, envelope: &Envelope) -> Result<()>
where
    T: AsyncWrite + Unpin,
{
    let bytes = encode(envelope)?;
    let len = bytes.len() as u32;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&bytes).await?;
    io.flush().await?;
    Ok(())
}

/// Read one length-prefixed envelope
pub async fn read_frame<T>(io: &mut T) -> Result<Envelope>
where
    T: AsyncRead + Unpin,
{
    // Read 4-byte length prefix to know exact message size
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(PaxosError::MessageTooLarge(len));
    }

    if len == 0 {
        return Err(PaxosError::Codec("Message size cannot be zero".to_string()));
    }

    let mut buffer = vec![0u8; len];
    io.read_exact(&mut buffer).await?;

    decode(&buffer)
}
