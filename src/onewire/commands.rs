//! ROM command bytes shared by every 1-Wire slave

pub const SEARCH_NORMAL: u8 = 0xF0;
pub const READ_ROM: u8 = 0x33;
pub const MATCH_ROM: u8 = 0x55;
pub const SKIP_ROM: u8 = 0xCC;
