//! Vendor-aware attribute decoding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use dirgraph_connector::record::{DirectoryRecord, RawValue};

use crate::vendor::{LdapVendor, PhotoPolicy};

/// Attributes holding binary image data.
pub const PHOTO_ATTRIBUTES: [&str; 3] = ["jpegPhoto", "thumbnailPhoto", "photo"];

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn is_photo_attribute(attribute: &str) -> bool {
    PHOTO_ATTRIBUTES
        .iter()
        .any(|photo| photo.eq_ignore_ascii_case(attribute))
}

/// Render image bytes as a `data:` URL.
pub fn photo_data_url(bytes: &[u8]) -> String {
    let mime = if bytes.starts_with(&PNG_MAGIC) {
        "image/png"
    } else {
        "image/jpeg"
    };
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Format a 16-byte Active Directory GUID in canonical form.
///
/// The first three fields are stored little-endian.
pub fn format_object_guid(bytes: &[u8]) -> Option<String> {
    uuid::Uuid::from_slice_le(bytes)
        .ok()
        .map(|guid| guid.hyphenated().to_string())
}

/// Extract the ordered string values of `attribute` from `record`.
///
/// An absent attribute yields an empty vector.
pub fn decode_attribute(vendor: LdapVendor, record: &DirectoryRecord, attribute: &str) -> Vec<String> {
    let Some(values) = record.get(attribute) else {
        return Vec::new();
    };

    let is_guid = vendor.has_binary_guid() && attribute.eq_ignore_ascii_case(vendor.uuid_attribute());
    let is_photo = is_photo_attribute(attribute);

    values
        .iter()
        .filter_map(|value| {
            if is_guid && value.as_bytes().len() == 16 {
                return format_object_guid(value.as_bytes());
            }

            if is_photo && value.is_binary() {
                return match vendor.photo_policy() {
                    PhotoPolicy::DataUrl => Some(photo_data_url(value.as_bytes())),
                    PhotoPolicy::Omit => None,
                };
            }

            match value {
                RawValue::Text(text) => Some(text.clone()),
                RawValue::Binary(bytes) => match std::str::from_utf8(bytes) {
                    Ok(text) => Some(text.to_string()),
                    Err(_) => {
                        debug!(
                            dn = %record.dn(),
                            attribute = %attribute,
                            len = bytes.len(),
                            "Dropping undecodable binary attribute value"
                        );
                        None
                    }
                },
            }
        })
        .collect()
}
