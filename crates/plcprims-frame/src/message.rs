//! Message identifiers understood by the PLC side of the protocol.
//!
//! The transport layer only carries these values in the message-type byte;
//! their meaning belongs to the equipment layer.

pub const INIT: u8 = 0x01;
pub const SET_TIME: u8 = 0x02;
pub const SET_CFG: u8 = 0x03;
pub const END_CFG: u8 = 0x04;
pub const GET_ALL_DATA: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const BOOL_DATA: u8 = 0x07;
pub const ANALOG_DATA: u8 = 0x08;
pub const HANDLER_ALIVE: u8 = 0x09;
pub const SUPERV_ALIVE: u8 = 0x0A;
pub const BOOL_CMD: u8 = 0x0B;
pub const ANALOG_CMD: u8 = 0x0C;
pub const SET_DEADBAND: u8 = 0x0D;
pub const NACK: u8 = 0x0F;
pub const INFO: u8 = 0x10;
pub const CONFIRM_BOOL_CMD: u8 = 0x11;
pub const CONFIRM_ANA_CMD: u8 = 0x12;
pub const BOOL_DATA_CTRL: u8 = 0x13;
pub const ANA_DATA_CTRL: u8 = 0x14;
pub const BOOL_CMD_CTRL: u8 = 0x15;
pub const CONFIRM_BOOL_CMD_CTRL: u8 = 0x16;

/// Data-type values carried by SET_CFG messages.
pub mod config_type {
    pub const PLC_CONF_DATA: u8 = 0x01;
    pub const ANA_DATA_DEADBAND: u8 = 0x02;
    pub const BOOL_CMD_VALUE: u8 = 0x03;
    pub const ANA_CMD_VALUE: u8 = 0x04;
}

/// Returns a human-readable name for a message identifier.
pub fn message_name(id: u8) -> &'static str {
    match id {
        INIT => "INIT",
        SET_TIME => "SET_TIME",
        SET_CFG => "SET_CFG",
        END_CFG => "END_CFG",
        GET_ALL_DATA => "GET_ALL_DATA",
        ACK => "ACK",
        BOOL_DATA => "BOOL_DATA",
        ANALOG_DATA => "ANALOG_DATA",
        HANDLER_ALIVE => "HANDLER_ALIVE",
        SUPERV_ALIVE => "SUPERV_ALIVE",
        BOOL_CMD => "BOOL_CMD",
        ANALOG_CMD => "ANALOG_CMD",
        SET_DEADBAND => "SET_DEADBAND",
        NACK => "NACK",
        INFO => "INFO",
        CONFIRM_BOOL_CMD => "CONFIRM_BOOL_CMD",
        CONFIRM_ANA_CMD => "CONFIRM_ANA_CMD",
        BOOL_DATA_CTRL => "BOOL_DATA_CTRL",
        ANA_DATA_CTRL => "ANA_DATA_CTRL",
        BOOL_CMD_CTRL => "BOOL_CMD_CTRL",
        CONFIRM_BOOL_CMD_CTRL => "CONFIRM_BOOL_CMD_CTRL",
        _ => "UNKNOWN",
    }
}

/// Returns true if the identifier is an acknowledgement (positive or negative).
pub fn is_acknowledgement(id: u8) -> bool {
    matches!(id, ACK | NACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_known_identifiers() {
        assert_eq!(message_name(INIT), "INIT");
        assert_eq!(message_name(SUPERV_ALIVE), "SUPERV_ALIVE");
        assert_eq!(message_name(CONFIRM_BOOL_CMD_CTRL), "CONFIRM_BOOL_CMD_CTRL");
    }

    #[test]
    fn unknown_identifier() {
        assert_eq!(message_name(0x0E), "UNKNOWN");
        assert_eq!(message_name(0xFF), "UNKNOWN");
    }

    #[test]
    fn acknowledgements() {
        assert!(is_acknowledgement(ACK));
        assert!(is_acknowledgement(NACK));
        assert!(!is_acknowledgement(BOOL_DATA));
    }
}
