use serde::{Deserialize, Serialize};

use super::{parse_hex, FilterType, ProtocolId};

/// A message filter as started on a channel. Mask, pattern and flow control are hex byte strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub filter_type: FilterType,
    pub protocol: ProtocolId,
    pub flags: u32,
    pub mask: String,
    pub pattern: String,
    /// Empty unless `filter_type` is [`FilterType::FlowControl`]
    #[serde(default)]
    pub flow_control: String,
}

impl Filter {
    /// Returns the filter as seen from the other side of the conversation. Pass and block filters swap mask and
    /// pattern, flow control filters swap pattern and flow control.
    pub fn inverted(&self) -> Filter {
        let mut filter = self.clone();
        match self.filter_type {
            FilterType::FlowControl => std::mem::swap(&mut filter.pattern, &mut filter.flow_control),
            FilterType::Pass | FilterType::Block => std::mem::swap(&mut filter.mask, &mut filter.pattern),
        }
        filter
    }

    pub fn mask_bytes(&self) -> Option<Vec<u8>> {
        parse_hex(&self.mask)
    }

    pub fn pattern_bytes(&self) -> Option<Vec<u8>> {
        parse_hex(&self.pattern)
    }

    pub fn flow_control_bytes(&self) -> Option<Vec<u8>> {
        match self.flow_control.trim().is_empty() {
            true => None,
            false => parse_hex(&self.flow_control),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(filter_type: FilterType, flow_control: &str) -> Filter {
        Filter {
            filter_type,
            protocol: ProtocolId::ISO15765,
            flags: 0x40,
            mask: "FF FF FF FF".into(),
            pattern: "00 00 07 E8".into(),
            flow_control: flow_control.into(),
        }
    }

    #[test]
    fn pass_filter_inversion() {
        let pass = filter(FilterType::Pass, "");
        let inverted = pass.inverted();
        assert_eq!(inverted.mask, "00 00 07 E8");
        assert_eq!(inverted.pattern, "FF FF FF FF");
        assert_eq!(inverted.inverted(), pass);
    }

    #[test]
    fn flow_control_inversion() {
        let flow = filter(FilterType::FlowControl, "00 00 07 E0");
        let inverted = flow.inverted();
        assert_eq!(inverted.mask, "FF FF FF FF");
        assert_eq!(inverted.pattern, "00 00 07 E0");
        assert_eq!(inverted.flow_control, "00 00 07 E8");
        assert_eq!(inverted.inverted(), flow);
    }

    #[test]
    fn byte_accessors() {
        let flow = filter(FilterType::FlowControl, "00 00 07 E0");
        assert_eq!(flow.mask_bytes(), Some(vec![0xff; 4]));
        assert_eq!(flow.flow_control_bytes(), Some(vec![0x00, 0x00, 0x07, 0xe0]));
        assert_eq!(filter(FilterType::Pass, "").flow_control_bytes(), None);
    }
}
