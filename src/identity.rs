//! Device identifier helpers.
//!
//! The IMEI is carried as a `u64`.  For compact transport it is written as
//! standard-alphabet base64 without padding over its big-endian bytes with
//! leading zero bytes stripped, so a 15-digit IMEI (7 significant bytes)
//! becomes 10 characters.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;

use crate::error::IdentityError;

/// Longest decimal identifier accepted from the modem.
pub const MAX_IMEI_DIGITS: usize = 16;

pub fn encode_u64(value: u64) -> String {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    STANDARD_NO_PAD.encode(&bytes[skip..])
}

pub fn decode_u64(encoded: &str) -> Result<u64, IdentityError> {
    let bytes = STANDARD_NO_PAD
        .decode(encoded)
        .map_err(|_| IdentityError::Encoding)?;
    if bytes.len() > 8 {
        return Err(IdentityError::TooLong);
    }
    Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Parse the decimal IMEI printed by `AT+GSN`.
pub fn parse_imei(digits: &str) -> Result<u64, IdentityError> {
    let digits = digits.trim();
    if digits.is_empty()
        || digits.len() > MAX_IMEI_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(IdentityError::InvalidDigits);
    }
    digits.parse().map_err(|_| IdentityError::InvalidDigits)
}

/// Render an IMEI as 15 digits, zero-padded.
pub fn format_imei(imei: u64) -> String {
    format!("{:015}", imei)
}
