use crate::paxos::types::{Value, ValueKind};
use crate::util::errors::{PaxosError, Result};

fn bincode_config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Pack client commands into one application value
pub fn encode_batch(commands: &[Vec<u8>]) -> Result<Value> {
    let payload = bincode::serde::encode_to_vec(commands, bincode_config())?;
    Ok(Value::app_batch(payload))
}

/// Commands carried by a decided value; no-ops carry none
pub fn decode_batch(value: &Value) -> Result<Vec<Vec<u8>>> {
    match value.kind() {
        ValueKind::Noop => Ok(Vec::new()),
        ValueKind::AppBatch => {
            let (commands, _): (Vec<Vec<u8>>, usize) =
                bincode::serde::decode_from_slice(value.payload(), bincode_config())?;
            Ok(commands)
        }
        ValueKind::Reconfig => Err(PaxosError::Codec(
            "reconfiguration values carry no client commands".to_string(),
        )),
    }
}
