//! Request packet construction

use super::{
    DISPLAY_ADDR_BYTE, HOST_ADDR_BYTE, LENGTH_FLAG, MAX_DDC_DATA_SIZE, MultiPartRead, Packet,
    PacketKind, checksum,
};
use tracing::trace;

/// Builds a request packet whose payload is `opcode` followed by `args`.
///
/// # Panics
///
/// Panics if the payload exceeds [`MAX_DDC_DATA_SIZE`]. Every caller in
/// this crate builds fixed-size payloads, so an oversized one is a bug.
pub fn build_request(opcode: u8, args: &[u8], tag: &str) -> Packet {
    let payload_len = 1 + args.len();
    assert!(
        payload_len <= MAX_DDC_DATA_SIZE,
        "DDC payload of {payload_len} bytes exceeds protocol maximum {MAX_DDC_DATA_SIZE}"
    );

    let mut bytes = Vec::with_capacity(payload_len + 4);
    bytes.push(DISPLAY_ADDR_BYTE);
    bytes.push(HOST_ADDR_BYTE);
    bytes.push(payload_len as u8 | LENGTH_FLAG);
    bytes.push(opcode);
    bytes.extend_from_slice(args);
    bytes.push(checksum(&bytes, false));

    trace!(tag, opcode, bytes = ?bytes, "Built DDC request");
    Packet::from_parts(PacketKind::from_opcode(opcode), bytes, tag)
}

/// Get VCP Feature request.
pub fn get_vcp_request(vcp_code: u8, tag: &str) -> Packet {
    build_request(PacketKind::GetVcpRequest.opcode(), &[vcp_code], tag)
}

/// Set VCP Feature request, value sent big-endian.
pub fn set_vcp_request(vcp_code: u8, new_value: u16, tag: &str) -> Packet {
    let [hi, lo] = new_value.to_be_bytes();
    build_request(PacketKind::SetVcpRequest.opcode(), &[vcp_code, hi, lo], tag)
}

/// Save Current Settings request.
pub fn save_settings_request(tag: &str) -> Packet {
    build_request(PacketKind::SaveSettingsRequest.opcode(), &[], tag)
}

/// Capabilities or Table Read request for the fragment at `offset`.
///
/// The high offset byte is taken from bits 16..23 here but from bits 8..15
/// in [`Packet::update_multipart_offset`]. Reads always start at offset 0
/// and move on through the update path, so only the update encoding ever
/// reaches a display with a non-zero high byte.
pub fn multipart_read_request(request: MultiPartRead, offset: u32, tag: &str) -> Packet {
    let ofs_hi = ((offset >> 16) & 0xff) as u8;
    let ofs_lo = (offset & 0xff) as u8;
    let opcode = request.request_kind().opcode();
    match request {
        MultiPartRead::Capabilities => build_request(opcode, &[ofs_hi, ofs_lo], tag),
        MultiPartRead::TableRead { vcp_code } => {
            build_request(opcode, &[vcp_code, ofs_hi, ofs_lo], tag)
        }
    }
}

/// Table Write request carrying `data` at `offset`.
///
/// # Panics
///
/// Panics if `data` does not fit the 35-byte payload (31 data bytes).
pub fn table_write_request(vcp_code: u8, offset: u16, data: &[u8], tag: &str) -> Packet {
    let [ofs_hi, ofs_lo] = offset.to_be_bytes();
    let mut args = Vec::with_capacity(3 + data.len());
    args.extend_from_slice(&[vcp_code, ofs_hi, ofs_lo]);
    args.extend_from_slice(data);
    build_request(PacketKind::TableWriteRequest.opcode(), &args, tag)
}

impl Packet {
    /// Rewrites the offset of a multi-part read request and its checksum.
    ///
    /// Capabilities requests carry the offset at payload bytes 1..3, table
    /// read requests at payload bytes 2..4 (after the feature code).
    ///
    /// # Panics
    ///
    /// Panics if the packet is not a multi-part read request.
    pub fn update_multipart_offset(&mut self, new_offset: u16) {
        let position = match self.kind {
            PacketKind::CapabilitiesRequest => 3 + 1,
            PacketKind::TableReadRequest => 3 + 2,
            other => panic!("update_multipart_offset called on {other:?} packet"),
        };
        let [ofs_hi, ofs_lo] = new_offset.to_be_bytes();
        self.bytes[position] = ofs_hi;
        self.bytes[position + 1] = ofs_lo;

        let checksum_pos = self.bytes.len() - 1;
        self.bytes[checksum_pos] = checksum(&self.bytes[..checksum_pos], false);
        trace!(tag = %self.tag, new_offset, "Updated multi-part offset");
    }
}
