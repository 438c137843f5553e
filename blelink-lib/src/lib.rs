pub mod ad;
pub mod address;
pub mod channel;
pub mod config;
pub mod constants;
pub mod context;
pub mod control;
pub mod error;
pub mod frame;
pub mod link;
pub mod pdu;
pub mod radio;
pub mod sim;
pub mod timing;

// Re-export the main types for easy access
pub use address::{AddressKind, DeviceAddress};
pub use config::{AdvertisingMode, LinkConfig};
pub use error::{FrameDefect, LinkError};
pub use link::{LinkEvent, LinkLayer, State};
pub use radio::{Phy, Radio, RxFrame};
pub use timing::{Clock, Tick, TickCounter, TickRate};
