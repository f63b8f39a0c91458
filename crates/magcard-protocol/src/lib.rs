pub mod frame;
pub mod packet;
pub mod parser;

pub use frame::encode_frame;
pub use packet::Packet;
pub use parser::{Inbound, PacketParser, Phase};
