pub const HEADER: [u8; 2] = [0xAA, 0xAA];
pub const RECIPE_HEADER: [u8; 2] = [0xAA, 0x55];
pub const FOOTER: [u8; 2] = [0xAA, 0xFA];
pub const TEMP_UNIT: [u8; 2] = [0x61, 0x74];
pub const FLAGS: [u8; 1] = [0x63];
pub const RECIPE_STATE_CODE: [u8; 2] = [0x00, 0x00];

pub const BODY_LEN: usize = 10;
pub const PACKET_LEN: usize = HEADER.len() + BODY_LEN + FOOTER.len();

/// Temperature word the roaster reports while it has no reading (150 °F).
pub const TEMP_SENTINEL: u16 = 0xFF00;
pub const TEMP_MIN_F: u16 = 150;
pub const TEMP_MAX_F: u16 = 550;

/// Flags byte values marking the end of the stored recipe replay.
pub const END_OF_RECIPE: [u8; 2] = [0xAF, 0x00];
