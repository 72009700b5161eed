use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Hex64Error {
	#[error("Invalid hex: {0}")]
	InvalidHex(#[from] hex::FromHexError),

	#[error("Expected 8 bytes, got {0}")]
	InvalidLength(usize),
}

/// Decode a hex string holding a little-endian 64-bit unsigned integer.
pub fn hex64_le_to_u64(value: &str) -> Result<u64, Hex64Error> {
	let bytes = hex::decode(value.trim_start_matches("0x"))?;
	let bytes: [u8; 8] = bytes
		.as_slice()
		.try_into()
		.map_err(|_| Hex64Error::InvalidLength(bytes.len()))?;
	Ok(u64::from_le_bytes(bytes))
}

pub fn unix_seconds_to_datetime(seconds: i64) -> Option<DateTime<Utc>> {
	DateTime::from_timestamp(seconds, 0)
}
