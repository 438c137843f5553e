// Link Layer constants for the BLE peripheral

/// Access address shared by every advertising channel PDU ("BED6")
pub const ADV_ACCESS_ADDRESS: u32 = 0x8E89_BED6;

/// CRC init value used on the advertising channels
pub const ADV_CRC_INIT: u32 = 0x55_5555;

/// Advertising channels, in round-robin transmit order
pub const ADV_CHANNELS: [u8; 3] = [37, 38, 39];

/// Number of data channels covered by a channel map
pub const DATA_CHANNEL_COUNT: u8 = 37;

/// Size of both advertising and data channel headers (2 bytes)
pub const HEADER_SIZE: usize = 2;

/// Maximum payload of a legacy advertising PDU
pub const MAX_ADV_PAYLOAD: usize = 37;

/// Maximum payload of a data channel PDU
pub const MAX_DATA_PAYLOAD: usize = 251;

/// Largest PDU the link layer ever handles (header + data payload)
pub const MAX_PDU_SIZE: usize = HEADER_SIZE + MAX_DATA_PAYLOAD;

/// Size of a device address on air
pub const ADDRESS_SIZE: usize = 6;

/// AD structures share the advertising payload with the advertiser address
pub const MAX_AD_DATA: usize = MAX_ADV_PAYLOAD - ADDRESS_SIZE;

/// Size of a SCAN_REQ payload (ScanA + AdvA)
pub const SCAN_REQ_SIZE: usize = 12;

/// Size of a CONNECT_REQ payload (InitA + AdvA + LLData)
pub const CONNECT_REQ_SIZE: usize = 34;

/// Inter-frame space in microseconds
pub const T_IFS_US: u32 = 150;

/// Connection parameters are carried in 1.25 ms units
pub const UNIT_1250_US: u32 = 1250;

/// Supervision timeout is carried in 10 ms units
pub const UNIT_10_MS_US: u32 = 10_000;

/// Valid connection interval range, in 1.25 ms units (7.5 ms to 4 s)
pub const MIN_CONN_INTERVAL: u16 = 6;
pub const MAX_CONN_INTERVAL: u16 = 3200;

/// Valid hop increment range
pub const MIN_HOP_INCREMENT: u8 = 5;
pub const MAX_HOP_INCREMENT: u8 = 16;

/// Mask for the hop increment in the hop/SCA byte
pub const HOP_MASK: u8 = 0x1F;

/// Shift for the sleep clock accuracy in the hop/SCA byte
pub const SCA_SHIFT: u8 = 5;

/// Bluetooth SIG company identifier of WCH
pub const CID_WCH: u16 = 0x07D7;

/// Default advertising interval in milliseconds
pub const DEFAULT_ADV_INTERVAL_MS: u32 = 500;

/// Default receive window after each advertisement, in microseconds
pub const DEFAULT_ADV_RX_WINDOW_US: u32 = 2000;
