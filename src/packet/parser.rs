//! Reply validation and payload parsing
//!
//! [`parse_base_response`] checks the envelope, the declared length and the
//! checksum. [`parse_response`] adds the null, type and payload checks for
//! a reply the caller expects to be of a particular kind. Either a fully
//! validated [`Packet`] comes back, or an error and nothing else.

use super::{
    DISPLAY_ADDR_BYTE, HOST_DEST_BYTE, MAX_DDC_DATA_SIZE, MAX_FRAGMENT_SIZE, MultiPartFragment,
    NonTableVcpValue, Packet, PacketKind, ParsedResponse, ResponseKind, checksum,
};
use crate::error::{DdcError, Result};
use tracing::{debug, trace};

/// Two identical leading bytes: some displays repeat the source address
/// where the length byte belongs.
pub fn is_double_byte(raw: &[u8]) -> bool {
    matches!(raw, [first, second, ..] if first == second)
}

/// Validates the envelope of a raw reply and normalizes it to a [`Packet`].
///
/// The returned packet is untyped: its kind is derived from the first data
/// byte and nothing beyond the checksum has been checked.
pub fn parse_base_response(raw: &[u8], tag: &str) -> Result<Packet> {
    let source = *raw.first().ok_or(DdcError::PacketSize {
        declared: 0,
        max: MAX_DDC_DATA_SIZE,
        available: 0,
    })?;
    if source != DISPLAY_ADDR_BYTE {
        debug!(tag, found = source, "Reply envelope invalid");
        return Err(DdcError::Envelope { found: source });
    }

    let length_byte = *raw.get(1).ok_or(DdcError::PacketSize {
        declared: 0,
        max: MAX_DDC_DATA_SIZE,
        available: raw.len(),
    })?;
    let data_ct = usize::from(length_byte & 0x7f);
    if data_ct > MAX_DDC_DATA_SIZE {
        if is_double_byte(raw) {
            debug!(tag, byte = length_byte, "Double byte in reply header");
            return Err(DdcError::DoubleByte { byte: length_byte });
        }
        debug!(tag, data_ct, "Reply length exceeds protocol maximum");
        return Err(DdcError::PacketSize {
            declared: data_ct,
            max: MAX_DDC_DATA_SIZE,
            available: raw.len(),
        });
    }
    // length byte, data, checksum
    if raw.len() < data_ct + 3 {
        debug!(tag, data_ct, available = raw.len(), "Reply shorter than declared length");
        return Err(DdcError::PacketSize {
            declared: data_ct,
            max: MAX_DDC_DATA_SIZE,
            available: raw.len(),
        });
    }

    let mut bytes = Vec::with_capacity(data_ct + 4);
    bytes.push(HOST_DEST_BYTE);
    bytes.push(DISPLAY_ADDR_BYTE);
    bytes.extend_from_slice(&raw[1..data_ct + 3]);

    let expected = checksum(&bytes[..3 + data_ct], true);
    let actual = bytes[3 + data_ct];
    if expected != actual {
        debug!(tag, expected, actual, "Reply checksum mismatch");
        return Err(DdcError::Checksum { expected, actual });
    }

    let kind = match data_ct {
        0 => PacketKind::Generic,
        _ => PacketKind::from_opcode(bytes[3]),
    };
    trace!(tag, ?kind, data_ct, "Reply envelope valid");
    Ok(Packet::from_parts(kind, bytes, tag))
}

/// Validates a raw reply and interprets its payload.
///
/// `expected_subtype` is the feature code the reply must echo for Get VCP
/// replies; fragment replies carry no subtype.
pub fn parse_response(raw: &[u8], expected: ResponseKind, expected_subtype: u8) -> Result<Packet> {
    let tag = match expected {
        ResponseKind::GetVcp => "getvcp-reply",
        ResponseKind::Capabilities => "capabilities-reply",
        ResponseKind::TableRead => "table-read-reply",
    };
    let packet = parse_base_response(raw, tag)?;

    if packet.is_null() {
        debug!(tag, "DDC Null Message");
        return Err(DdcError::NullResponse);
    }

    let opcode = packet.data()[0];
    if opcode != expected.opcode() {
        debug!(tag, expected = expected.opcode(), actual = opcode, "Unexpected reply type");
        return Err(DdcError::ResponseType { expected: expected.opcode(), actual: opcode });
    }

    let parsed = match expected {
        ResponseKind::GetVcp => {
            ParsedResponse::NonTableVcpValue(parse_nontable_vcp(packet.data(), expected_subtype)?)
        }
        ResponseKind::Capabilities | ResponseKind::TableRead => {
            ParsedResponse::MultiPartFragment(parse_multipart_fragment(packet.data())?)
        }
    };
    Ok(packet.with_parsed(parsed))
}

/// Splits the data bytes of a fragment reply into offset and content.
pub fn parse_multipart_fragment(data: &[u8]) -> Result<MultiPartFragment> {
    if !(3..=MAX_FRAGMENT_SIZE + 3).contains(&data.len()) {
        return Err(DdcError::invalid_data(
            "multi-part fragment",
            format!("data length {} outside 3..=35", data.len()),
        ));
    }
    Ok(MultiPartFragment {
        fragment_kind: PacketKind::from_opcode(data[0]),
        offset: u16::from_be_bytes([data[1], data[2]]),
        data: data[3..].to_vec(),
    })
}

/// Interprets the 8 data bytes of a Get VCP Feature reply.
///
/// ```text
/// 0 opcode  1 result  2 feature  3 type  4-5 max  6-7 current
/// ```
pub fn parse_nontable_vcp(data: &[u8], requested_code: u8) -> Result<NonTableVcpValue> {
    let &[_, result_code, vcp_code, vcp_type, mh, ml, sh, sl] = data else {
        return Err(DdcError::invalid_data(
            "vcp reply",
            format!("expected 8 data bytes, got {}", data.len()),
        ));
    };

    if vcp_code != requested_code {
        return Err(DdcError::invalid_data(
            "vcp reply",
            format!("requested feature {requested_code:#04x}, reply is for {vcp_code:#04x}"),
        ));
    }

    match result_code {
        0x00 => Ok(NonTableVcpValue {
            vcp_code,
            vcp_type,
            valid_response: true,
            supported_opcode: true,
            max_value: u16::from_be_bytes([mh, ml]),
            cur_value: u16::from_be_bytes([sh, sl]),
            mh,
            ml,
            sh,
            sl,
        }),
        0x01 => {
            debug!(vcp_code, "Display reports feature unsupported");
            Ok(NonTableVcpValue {
                vcp_code,
                vcp_type,
                valid_response: true,
                supported_opcode: false,
                ..NonTableVcpValue::default()
            })
        }
        other => Err(DdcError::invalid_data(
            "vcp reply",
            format!("result code {other:#04x} for feature {vcp_code:#04x}"),
        )),
    }
}
