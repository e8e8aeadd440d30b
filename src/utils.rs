use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|value| hex::encode_upper([*value]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats an optional RSSI for terminal output.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    match rssi {
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}

/// Parses a UUID, expanding the 16-bit short form onto the Bluetooth base UUID.
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, uuid::Error> {
    let value = value.trim();
    if value.len() == 4
        && let Ok(short) = u16::from_str_radix(value, 16)
    {
        return Ok(uuid_from_u16(short));
    }
    Uuid::parse_str(value)
}

/// Parses a hexadecimal payload, ignoring whitespace between bytes.
pub(crate) fn parse_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}
