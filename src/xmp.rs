//! XMP metadata block shared by every frame of a dynamic wallpaper.
//!
//! The block is a fixed XMP document whose single placeholder token is replaced by the base64
//! encoding of the compact JSON array of all frame records.

use base64::Engine as _;
use serde_json::Value;

use crate::metadata::MetaData;

/// XMP document the payload is substituted into.
pub const XMP_TEMPLATE: &str = include_str!("../resources/xmp/metadata.xml");

/// Token in [`XMP_TEMPLATE`] replaced by the base64 payload.
pub const PAYLOAD_PLACEHOLDER: &str = "base64";

/// Compact UTF-8 JSON array with one object per record, in order.
///
/// Records without any field are kept as `{}`.
pub fn payload_json(meta_data: &[MetaData]) -> Vec<u8> {
    let array = Value::Array(
        meta_data
            .iter()
            .map(|md| Value::Object(md.to_json()))
            .collect(),
    );
    array.to_string().into_bytes()
}

/// Build the complete XMP block for `meta_data`.
pub fn serialize_meta_data(meta_data: &[MetaData]) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload_json(meta_data));
    XMP_TEMPLATE
        .replacen(PAYLOAD_PLACEHOLDER, &encoded, 1)
        .into_bytes()
}

#[cfg(test)]
#[path = "../tests/unit/xmp.rs"]
mod tests;
