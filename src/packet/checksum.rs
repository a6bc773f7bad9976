//! DDC/CI checksum

use super::ALTMODE_SOURCE_BYTE;

/// XOR of all bytes.
pub fn xor_bytes(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0x00, |acc, b| acc ^ b)
}

/// Checksum over the covered span of a packet.
///
/// With `altmode` the first byte is replaced by the virtual host address
/// `0x50` before XOR-ing. That is how the checksum of a display reply is
/// computed: the display checksums against the virtual source address, not
/// the address that actually appears in the normalized reply.
pub fn checksum(bytes: &[u8], altmode: bool) -> u8 {
    match bytes.split_first() {
        Some((_, rest)) if altmode => ALTMODE_SOURCE_BYTE ^ xor_bytes(rest),
        _ => xor_bytes(bytes),
    }
}
