//! Target selection for scan results.

use crate::ble::transport::{DiscoveredPeripheral, PeripheralAddress};

/// Decides whether a discovered peripheral is the configured target.
///
/// Comparison is byte-exact string equality on the address: no case folding
/// and no separator normalization, so `ee:74:...` does not match `EE:74:...`.
#[derive(Debug, Clone)]
pub struct AddressMatcher {
    target: PeripheralAddress,
}

impl AddressMatcher {
    /// Create a matcher for a target address.
    pub fn new(target: PeripheralAddress) -> Self {
        Self { target }
    }

    /// The address being looked for.
    pub fn target(&self) -> &PeripheralAddress {
        &self.target
    }

    /// Check a scan result against the target.
    pub fn is_target(&self, peripheral: &DiscoveredPeripheral) -> bool {
        matches(&peripheral.address, &self.target)
    }
}

/// Byte-exact address comparison.
#[inline]
pub fn matches(candidate: &PeripheralAddress, target: &PeripheralAddress) -> bool {
    candidate.as_str().as_bytes() == target.as_str().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let target = PeripheralAddress::from("EE:74:7D:C9:2A:68");
        assert!(matches(&PeripheralAddress::from("EE:74:7D:C9:2A:68"), &target));
    }

    #[test]
    fn test_case_and_format_differences_do_not_match() {
        let target = PeripheralAddress::from("EE:74:7D:C9:2A:68");

        assert!(!matches(&PeripheralAddress::from("ee:74:7d:c9:2a:68"), &target));
        assert!(!matches(&PeripheralAddress::from("EE-74-7D-C9-2A-68"), &target));
        assert!(!matches(&PeripheralAddress::from("EE747DC92A68"), &target));
        assert!(!matches(&PeripheralAddress::from(" EE:74:7D:C9:2A:68"), &target));
    }

    #[test]
    fn test_matcher_checks_scan_results() {
        let matcher = AddressMatcher::new("CD:30:22:D6:4F:70".into());

        let mut hit = DiscoveredPeripheral::new("CD:30:22:D6:4F:70");
        hit.rssi = Some(-60);
        hit.local_name = Some("Polar H10".to_string());

        assert!(matcher.is_target(&hit));
        assert!(!matcher.is_target(&DiscoveredPeripheral::new("CD:30:22:D6:4F:71")));
    }
}
