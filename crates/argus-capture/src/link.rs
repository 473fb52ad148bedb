//! Link-layer demultiplexing: strip the per-device framing and keep IPv4.

use crate::CaptureError;

const ETHERTYPE_IPV4: [u8; 2] = [0x08, 0x00];
const ETHERNET_HEADER: usize = 14;
const NULL_HEADER: usize = 4;
const SLL_HEADER: usize = 16;
/// AF_INET in the BSD loopback pseudo-header.
const NULL_AF_INET: u32 = 2;

/// The link layers this pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// BSD loopback.
    Null,
    /// Linux cooked capture (`any` device).
    LinuxSll,
}

impl LinkType {
    /// Anything else is fatal for the device, surfaced at open time.
    pub fn from_pcap(raw: pcap::Linktype) -> Result<Self, CaptureError> {
        if raw == pcap::Linktype::ETHERNET {
            Ok(Self::Ethernet)
        } else if raw == pcap::Linktype::NULL {
            Ok(Self::Null)
        } else if raw == pcap::Linktype::LINUX_SLL {
            Ok(Self::LinuxSll)
        } else {
            Err(CaptureError::UnsupportedLinkType(raw.0))
        }
    }
}

/// Strip the link header from one captured frame. `None` for anything that
/// is not IPv4; the caller drops it silently.
#[must_use]
pub fn ipv4_payload(link: LinkType, frame: &[u8]) -> Option<&[u8]> {
    match link {
        LinkType::Ethernet => {
            if frame.len() < ETHERNET_HEADER || frame[12..14] != ETHERTYPE_IPV4 {
                return None;
            }
            Some(&frame[ETHERNET_HEADER..])
        }
        LinkType::Null => {
            if frame.len() < NULL_HEADER {
                return None;
            }
            let family = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
            if family != NULL_AF_INET {
                return None;
            }
            Some(&frame[NULL_HEADER..])
        }
        LinkType::LinuxSll => {
            if frame.len() < SLL_HEADER || frame[14..16] != ETHERTYPE_IPV4 {
                return None;
            }
            Some(&frame[SLL_HEADER..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_requires_ipv4_ethertype() {
        let mut frame = vec![0u8; 20];
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert_eq!(ipv4_payload(LinkType::Ethernet, &frame).unwrap().len(), 6);

        // ARP is dropped.
        frame[13] = 0x06;
        assert!(ipv4_payload(LinkType::Ethernet, &frame).is_none());
        // Truncated frames are dropped.
        assert!(ipv4_payload(LinkType::Ethernet, &frame[..10]).is_none());
    }

    #[test]
    fn null_checks_address_family() {
        let mut frame = vec![0u8; 8];
        frame[0] = 2;
        assert_eq!(ipv4_payload(LinkType::Null, &frame).unwrap().len(), 4);

        // AF_INET6 on most BSDs.
        frame[0] = 30;
        assert!(ipv4_payload(LinkType::Null, &frame).is_none());
    }

    #[test]
    fn sll_payload_starts_at_sixteen() {
        let mut frame = vec![0u8; 24];
        frame[14] = 0x08;
        frame[15] = 0x00;
        assert_eq!(ipv4_payload(LinkType::LinuxSll, &frame).unwrap().len(), 8);

        frame[15] = 0xDD;
        assert!(ipv4_payload(LinkType::LinuxSll, &frame).is_none());
    }
}
