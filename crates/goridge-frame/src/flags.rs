//! Frame flag bits.
//!
//! The low three bits carry the codec id of the payload. The remaining bits
//! are independent control flags.

/// Payload is opaque bytes.
pub const CODEC_RAW: u8 = 0;

/// Payload is JSON.
pub const CODEC_JSON: u8 = 1;

/// Payload is MessagePack.
pub const CODEC_MSGPACK: u8 = 2;

/// Bits reserved for the codec id.
pub const CODEC_MASK: u8 = 0x07;

/// The response reports a remote failure; the payload is a UTF-8 message.
pub const ERROR: u8 = 0x08;

/// The frame carries protocol metadata rather than a user payload.
pub const CONTROL: u8 = 0x10;

/// Extract the codec id from a flag set.
pub fn codec_id(flags: u8) -> u8 {
    flags & CODEC_MASK
}

/// Returns a human-readable name for a codec id.
pub fn codec_name(id: u8) -> &'static str {
    match id {
        CODEC_RAW => "raw",
        CODEC_JSON => "json",
        CODEC_MSGPACK => "msgpack",
        _ => "unknown",
    }
}

/// Returns true if the `ERROR` bit is set.
pub fn is_error(flags: u8) -> bool {
    flags & ERROR != 0
}

/// Returns true if the `CONTROL` bit is set.
pub fn is_control(flags: u8) -> bool {
    flags & CONTROL != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_bits_do_not_overlap_control_bits() {
        assert_eq!(CODEC_MASK & ERROR, 0);
        assert_eq!(CODEC_MASK & CONTROL, 0);
        assert_eq!(ERROR & CONTROL, 0);
    }

    #[test]
    fn flag_accessors() {
        let flags = CODEC_MSGPACK | ERROR;
        assert_eq!(codec_id(flags), CODEC_MSGPACK);
        assert_eq!(codec_name(codec_id(flags)), "msgpack");
        assert!(is_error(flags));
        assert!(!is_control(flags));
        assert_eq!(codec_name(5), "unknown");
    }
}
