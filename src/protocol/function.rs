//! Block/function command identifiers.
//!
//! A command id addresses a functional block in its high byte and an
//! operation within that block in its low byte. Only the identifiers are
//! listed here; payload layouts are left to callers.

/// Functional block of a command id.
#[inline]
pub fn block_of(cmd: u16) -> u8 {
    (cmd >> 8) as u8
}

/// Operation within the block of a command id.
#[inline]
pub fn function_of(cmd: u16) -> u8 {
    (cmd & 0xFF) as u8
}

/// Build a command id from block and function.
#[inline]
pub const fn command(block: u8, function: u8) -> u16 {
    ((block as u16) << 8) | function as u16
}

pub mod block {
    pub const PRODUCT_INFO: u8 = 0x00;
    pub const SETTINGS: u8 = 0x01;
    pub const STATUS: u8 = 0x02;
    pub const FIRMWARE_UPDATE: u8 = 0x03;
    pub const DEVICE_MANAGEMENT: u8 = 0x04;
    pub const AUDIO_MANAGEMENT: u8 = 0x05;
    pub const CALL_MANAGEMENT: u8 = 0x06;
    pub const CONTROL: u8 = 0x07;
    pub const DEBUG: u8 = 0x08;
    pub const NOTIFICATION: u8 = 0x09;
    pub const HEARING_ASSISTANCE: u8 = 0x0C;
    pub const DATA_COLLECTION: u8 = 0x0D;
    pub const HEART_RATE: u8 = 0x0E;
    pub const VPA: u8 = 0x10;
    pub const AUGMENTED_REALITY: u8 = 0x15;
}

// PRODUCT_INFO
pub const PRODUCT_INFO: u16 = 0x0000;
/// Must be the first request on a freshly opened link.
pub const PRODUCT_VERSION: u16 = 0x0001;
pub const GET_ALL_FUNCTION_BLOCKS: u16 = 0x0002;
pub const PRODUCT_ID_VARIANT: u16 = 0x0003;
pub const PRODUCT_INFO_GET_ALL_FUNCTIONS: u16 = 0x0004;
pub const FIRMWARE_VERSION: u16 = 0x0005;
pub const MAX_ADDRESS: u16 = 0x0006;
pub const SERIAL_NUMBER: u16 = 0x0007;
pub const HARDWARE_REVISION: u16 = 0x000A;
pub const COMPONENT_DEVICES: u16 = 0x000B;

// SETTINGS
pub const SETTINGS_INFO: u16 = 0x0100;
/// Answered with a nested tree, one entry per setting.
pub const SETTINGS_GET_ALL: u16 = 0x0101;
pub const PRODUCT_NAME: u16 = 0x0102;
pub const VOICE_PROMPTS: u16 = 0x0103;
pub const STANDBY_TIMER: u16 = 0x0104;
pub const CNC: u16 = 0x0105;
pub const ANR: u16 = 0x0106;
pub const BASS_CONTROL: u16 = 0x0107;
pub const ALERTS: u16 = 0x0108;
pub const BUTTONS: u16 = 0x0109;
pub const MULTIPOINT: u16 = 0x010A;
pub const SIDETONE: u16 = 0x010B;
pub const IMU_VOLUME_CONTROL: u16 = 0x0115;

// STATUS
pub const STATUS_INFO: u16 = 0x0200;
pub const STATUS_GET_ALL_FUNCTIONS: u16 = 0x0201;
pub const BATTERY_LEVEL: u16 = 0x0202;
pub const AUX_CABLE_DETECTION: u16 = 0x0203;
pub const MIC_LEVEL: u16 = 0x0204;
pub const CHARGER_DETECT: u16 = 0x0205;

// DEVICE_MANAGEMENT
pub const DEVICE_MANAGEMENT_INFO: u16 = 0x0400;
pub const CONNECT: u16 = 0x0401;
pub const DISCONNECT: u16 = 0x0402;
pub const REMOVE_DEVICE: u16 = 0x0403;
/// Answered with a sequence of device records.
pub const LIST_DEVICES: u16 = 0x0404;
pub const PAIRED_DEVICE_INFO: u16 = 0x0405;
pub const EXTENDED_PAIRED_DEVICE_INFO: u16 = 0x0406;
pub const CLEAR_DEVICE_LIST: u16 = 0x0407;
pub const PAIRING_MODE: u16 = 0x0408;
pub const LOCAL_MAC_ADDRESS: u16 = 0x0409;
pub const PREPARE_P2P: u16 = 0x040A;
pub const P2P_MODE: u16 = 0x040B;
pub const ROUTING: u16 = 0x040C;

// AUDIO_MANAGEMENT
pub const AUDIO_MANAGEMENT_INFO: u16 = 0x0500;
pub const SOURCE: u16 = 0x0501;
pub const AUDIO_GET_ALL: u16 = 0x0502;
pub const AUDIO_CONTROL: u16 = 0x0503;
pub const PLAYBACK_STATUS: u16 = 0x0504;
pub const VOLUME: u16 = 0x0505;
pub const NOW_PLAYING: u16 = 0x0506;

/// Readable name of a known command id, for logs.
pub fn name_of(cmd: u16) -> Option<&'static str> {
    let name = match cmd {
        PRODUCT_INFO => "PRODUCT_INFO",
        PRODUCT_VERSION => "PRODUCT_VERSION",
        GET_ALL_FUNCTION_BLOCKS => "GET_ALL_FUNCTION_BLOCKS",
        PRODUCT_ID_VARIANT => "PRODUCT_ID_VARIANT",
        PRODUCT_INFO_GET_ALL_FUNCTIONS => "PRODUCT_INFO_GET_ALL_FUNCTIONS",
        FIRMWARE_VERSION => "FIRMWARE_VERSION",
        MAX_ADDRESS => "MAX_ADDRESS",
        SERIAL_NUMBER => "SERIAL_NUMBER",
        HARDWARE_REVISION => "HARDWARE_REVISION",
        COMPONENT_DEVICES => "COMPONENT_DEVICES",
        SETTINGS_INFO => "SETTINGS_INFO",
        SETTINGS_GET_ALL => "SETTINGS_GET_ALL",
        PRODUCT_NAME => "PRODUCT_NAME",
        VOICE_PROMPTS => "VOICE_PROMPTS",
        STANDBY_TIMER => "STANDBY_TIMER",
        CNC => "CNC",
        ANR => "ANR",
        BASS_CONTROL => "BASS_CONTROL",
        ALERTS => "ALERTS",
        BUTTONS => "BUTTONS",
        MULTIPOINT => "MULTIPOINT",
        SIDETONE => "SIDETONE",
        IMU_VOLUME_CONTROL => "IMU_VOLUME_CONTROL",
        STATUS_INFO => "STATUS_INFO",
        STATUS_GET_ALL_FUNCTIONS => "STATUS_GET_ALL_FUNCTIONS",
        BATTERY_LEVEL => "BATTERY_LEVEL",
        AUX_CABLE_DETECTION => "AUX_CABLE_DETECTION",
        MIC_LEVEL => "MIC_LEVEL",
        CHARGER_DETECT => "CHARGER_DETECT",
        DEVICE_MANAGEMENT_INFO => "DEVICE_MANAGEMENT_INFO",
        CONNECT => "CONNECT",
        DISCONNECT => "DISCONNECT",
        REMOVE_DEVICE => "REMOVE_DEVICE",
        LIST_DEVICES => "LIST_DEVICES",
        PAIRED_DEVICE_INFO => "PAIRED_DEVICE_INFO",
        EXTENDED_PAIRED_DEVICE_INFO => "EXTENDED_PAIRED_DEVICE_INFO",
        CLEAR_DEVICE_LIST => "CLEAR_DEVICE_LIST",
        PAIRING_MODE => "PAIRING_MODE",
        LOCAL_MAC_ADDRESS => "LOCAL_MAC_ADDRESS",
        PREPARE_P2P => "PREPARE_P2P",
        P2P_MODE => "P2P_MODE",
        ROUTING => "ROUTING",
        AUDIO_MANAGEMENT_INFO => "AUDIO_MANAGEMENT_INFO",
        SOURCE => "SOURCE",
        AUDIO_GET_ALL => "AUDIO_GET_ALL",
        AUDIO_CONTROL => "AUDIO_CONTROL",
        PLAYBACK_STATUS => "PLAYBACK_STATUS",
        VOLUME => "VOLUME",
        NOW_PLAYING => "NOW_PLAYING",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_and_function() {
        assert_eq!(block_of(VOLUME), block::AUDIO_MANAGEMENT);
        assert_eq!(function_of(VOLUME), 0x05);
        assert_eq!(command(block::SETTINGS, 0x02), PRODUCT_NAME);
    }

    #[test]
    fn test_name_of() {
        assert_eq!(name_of(BATTERY_LEVEL), Some("BATTERY_LEVEL"));
        assert_eq!(name_of(0x7F7F), None);
    }
}
