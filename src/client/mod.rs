pub mod actor;
pub mod batch;
pub mod messages;

pub use actor::Client;
pub use batch::{decode_batch, encode_batch};
pub use messages::{ClientStatus, Flush, GetClientStatus, SetProposer, SubmitCommand};
