//! Parsed reply payloads

use super::PacketKind;
use serde::{Deserialize, Serialize};

/// Interpretation attached to a fully validated reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParsedResponse {
    MultiPartFragment(MultiPartFragment),
    NonTableVcpValue(NonTableVcpValue),
}

/// One fragment of a capabilities or table read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiPartFragment {
    /// Reply opcode the fragment arrived under.
    pub fragment_kind: PacketKind,
    pub offset: u16,
    /// 0 to 32 bytes. An empty fragment ends the read.
    pub data: Vec<u8>,
}

impl MultiPartFragment {
    pub fn is_terminal(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reply to Get VCP Feature for a continuous or non-continuous feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NonTableVcpValue {
    pub vcp_code: u8,
    /// VCP type byte: 0x00 set parameter, 0x01 momentary.
    pub vcp_type: u8,
    pub valid_response: bool,
    /// When false, the value fields below are zero and carry no meaning.
    pub supported_opcode: bool,
    pub max_value: u16,
    pub cur_value: u16,
    pub mh: u8,
    pub ml: u8,
    pub sh: u8,
    pub sl: u8,
}

impl NonTableVcpValue {
    /// Current value as the display reported it, if the feature is supported.
    pub fn current(&self) -> Option<u16> {
        self.supported_opcode.then_some(self.cur_value)
    }

    pub fn maximum(&self) -> Option<u16> {
        self.supported_opcode.then_some(self.max_value)
    }
}
