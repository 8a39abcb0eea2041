use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current unix timestamp in milliseconds
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Validate a group, node or device identifier
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name string must not be empty".into());
    }
    if name.contains(['+', '/', '#']) {
        return Err(format!(
            "name string {name} cannot contain '+', '/' or '#' characters"
        ));
    }
    Ok(())
}

/// Derive a node id from a hardware MAC address.
///
/// The id is the upper-case hex encoding of the last three octets, e.g.
/// `00:1A:2B:AA:BB:CC` gives `AABBCC`.
pub fn node_id_from_mac(mac: &[u8; 6]) -> String {
    mac[3..].iter().map(|b| format!("{b:02X}")).collect()
}

/// Parse a `aa:bb:cc:dd:ee:ff` (or `-` separated) MAC address string
pub fn parse_mac(mac: &str) -> Result<[u8; 6], String> {
    let mut out = [0u8; 6];
    let mut parts = mac.split([':', '-']);
    for byte in out.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| format!("mac address {mac} is too short"))?;
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| format!("mac address {mac} has invalid octet {part}"))?;
    }
    if parts.next().is_some() {
        return Err(format!("mac address {mac} is too long"));
    }
    Ok(out)
}
