//! DDC/CI packet construction and validation.
//!
//! # Wire Layout
//!
//! A host request, as held in a [`Packet`]:
//!
//! ```text
//! byte 0      0x6e            destination (display, 8-bit address form)
//! byte 1      0x51            source (host)
//! byte 2      0x80 | n        length, high bit always set
//! bytes 3..   payload         n bytes, first is the opcode
//! last        checksum        XOR of every preceding byte
//! ```
//!
//! Byte 0 is the I2C address itself, so only `bytes[1..]` go over the bus.
//!
//! A display reply, as read from the bus:
//!
//! ```text
//! byte 0      0x6e            source (display)
//! byte 1      0x80 | n        length
//! bytes 2..   data            n bytes, first is the reply opcode
//! next        checksum        XOR with the virtual host address 0x50 first
//! ```
//!
//! The parser normalizes a reply to the same five-part shape as a request
//! (`0x6f 0x6e len data.. checksum`), so `bytes.len()` is always the
//! declared length plus 4 for every [`Packet`] this module hands out.
//!
//! # Error Signatures
//!
//! Parsing distinguishes every failure mode the protocol has, in this order:
//! envelope, double byte / oversized length, checksum, null response,
//! response type, payload. See [`parse_response`].

mod builder;
mod checksum;
mod fragment;
mod parser;
mod reassembly;

pub use builder::{
    build_request, get_vcp_request, multipart_read_request, save_settings_request,
    set_vcp_request, table_write_request,
};
pub use checksum::{checksum, xor_bytes};
pub use fragment::{MultiPartFragment, NonTableVcpValue, ParsedResponse};
pub use parser::{
    is_double_byte, parse_base_response, parse_multipart_fragment, parse_nontable_vcp,
    parse_response,
};
pub use reassembly::{FragmentAssembler, FragmentProgress};

use serde::{Deserialize, Serialize};

/// Largest data count a reply may declare: 1 opcode byte, 2 offset bytes
/// and a 32-byte fragment.
pub const MAX_DDC_DATA_SIZE: usize = 35;

/// Largest fragment of a multi-part read.
pub const MAX_FRAGMENT_SIZE: usize = 32;

/// Fragment size used when writing table values.
pub const TABLE_WRITE_FRAGMENT_SIZE: usize = MAX_FRAGMENT_SIZE - 4;

/// Read buffer size for a multi-part fragment reply.
pub const MULTI_PART_READ_SIZE: usize = 6 + MAX_FRAGMENT_SIZE + 1;

/// Read buffer size for a Get VCP Feature reply.
pub const GETVCP_READ_SIZE: usize = 11;

/// Envelope bytes.
pub const DISPLAY_ADDR_BYTE: u8 = 0x6e;
pub const HOST_ADDR_BYTE: u8 = 0x51;
pub const HOST_DEST_BYTE: u8 = 0x6f;
pub const ALTMODE_SOURCE_BYTE: u8 = 0x50;
pub const LENGTH_FLAG: u8 = 0x80;

/// Request and response semantics of a packet, keyed by opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    /// Untyped packet (unknown opcode, or no data bytes).
    Generic,
    GetVcpRequest,
    GetVcpResponse,
    SetVcpRequest,
    SaveSettingsRequest,
    CapabilitiesRequest,
    CapabilitiesResponse,
    TableReadRequest,
    TableReadResponse,
    TableWriteRequest,
}

impl PacketKind {
    pub fn opcode(self) -> u8 {
        match self {
            PacketKind::Generic => 0x00,
            PacketKind::GetVcpRequest => 0x01,
            PacketKind::GetVcpResponse => 0x02,
            PacketKind::SetVcpRequest => 0x03,
            PacketKind::SaveSettingsRequest => 0x0c,
            PacketKind::CapabilitiesRequest => 0xf3,
            PacketKind::CapabilitiesResponse => 0xe3,
            PacketKind::TableReadRequest => 0xe2,
            PacketKind::TableReadResponse => 0xe4,
            PacketKind::TableWriteRequest => 0xe7,
        }
    }

    pub fn from_opcode(opcode: u8) -> Self {
        match opcode {
            0x01 => PacketKind::GetVcpRequest,
            0x02 => PacketKind::GetVcpResponse,
            0x03 => PacketKind::SetVcpRequest,
            0x0c => PacketKind::SaveSettingsRequest,
            0xf3 => PacketKind::CapabilitiesRequest,
            0xe3 => PacketKind::CapabilitiesResponse,
            0xe2 => PacketKind::TableReadRequest,
            0xe4 => PacketKind::TableReadResponse,
            0xe7 => PacketKind::TableWriteRequest,
            _ => PacketKind::Generic,
        }
    }
}

/// Reply kinds the typed parser knows how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseKind {
    GetVcp,
    Capabilities,
    TableRead,
}

impl ResponseKind {
    pub fn packet_kind(self) -> PacketKind {
        match self {
            ResponseKind::GetVcp => PacketKind::GetVcpResponse,
            ResponseKind::Capabilities => PacketKind::CapabilitiesResponse,
            ResponseKind::TableRead => PacketKind::TableReadResponse,
        }
    }

    pub fn opcode(self) -> u8 {
        self.packet_kind().opcode()
    }
}

/// The two multi-part read requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiPartRead {
    Capabilities,
    TableRead { vcp_code: u8 },
}

impl MultiPartRead {
    pub fn request_kind(self) -> PacketKind {
        match self {
            MultiPartRead::Capabilities => PacketKind::CapabilitiesRequest,
            MultiPartRead::TableRead { .. } => PacketKind::TableReadRequest,
        }
    }

    pub fn response_kind(self) -> ResponseKind {
        match self {
            MultiPartRead::Capabilities => ResponseKind::Capabilities,
            MultiPartRead::TableRead { .. } => ResponseKind::TableRead,
        }
    }

    /// Subtype the reply is checked against: the feature code for table
    /// reads, 0 for capabilities.
    pub fn subtype(self) -> u8 {
        match self {
            MultiPartRead::Capabilities => 0x00,
            MultiPartRead::TableRead { vcp_code } => vcp_code,
        }
    }
}

/// A DDC/CI packet with its exact envelope bytes.
///
/// Packets only come out of the builders and parsers in this module, which
/// keeps `bytes.len() == data_len() + 4` and guarantees that `parsed` is set
/// only on replies that validated completely.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    kind: PacketKind,
    bytes: Vec<u8>,
    tag: String,
    parsed: Option<ParsedResponse>,
}

impl Packet {
    pub(crate) fn from_parts(kind: PacketKind, bytes: Vec<u8>, tag: impl Into<String>) -> Self {
        debug_assert!(bytes.len() >= 4);
        debug_assert_eq!(bytes.len(), usize::from(bytes[2] & 0x7f) + 4);
        Self { kind, bytes, tag: tag.into(), parsed: None }
    }

    pub(crate) fn with_parsed(mut self, parsed: ParsedResponse) -> Self {
        self.parsed = Some(parsed);
        self
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Full envelope, including the address byte and the checksum.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes to hand to the bus: everything after the address byte.
    pub fn wire_bytes(&self) -> &[u8] {
        &self.bytes[1..]
    }

    /// Debug label given at construction.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Data bytes between the length byte and the checksum.
    pub fn data(&self) -> &[u8] {
        &self.bytes[3..self.bytes.len() - 1]
    }

    pub fn data_len(&self) -> usize {
        self.bytes.len() - 4
    }

    /// A DDC Null Message carries no data bytes.
    pub fn is_null(&self) -> bool {
        self.data_len() == 0
    }

    pub fn checksum_byte(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    pub fn parsed(&self) -> Option<&ParsedResponse> {
        self.parsed.as_ref()
    }

    pub fn multipart_fragment(&self) -> Option<&MultiPartFragment> {
        match &self.parsed {
            Some(ParsedResponse::MultiPartFragment(fragment)) => Some(fragment),
            _ => None,
        }
    }

    pub fn nontable_value(&self) -> Option<&NonTableVcpValue> {
        match &self.parsed {
            Some(ParsedResponse::NonTableVcpValue(value)) => Some(value),
            _ => None,
        }
    }

    /// Consumes the packet, returning the parsed reply if there is one.
    pub fn into_parsed(self) -> Option<ParsedResponse> {
        self.parsed
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} [{}]", self.kind, self.tag)?;
        for byte in &self.bytes {
            write!(f, " {byte:02x}")?;
        }
        Ok(())
    }
}
