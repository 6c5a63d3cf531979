//! Decoding of the base64 texture document embedded in a `textures` property
//!
//! Malformed payloads never raise: callers receive an empty payload
//! (classic variant, no cape, no skin URL).

use super::SkinVariant;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::trace;

/// Metadata extracted from a texture document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TexturePayload {
    pub skin_url: Option<String>,
    pub cape_url: Option<String>,
    pub variant: SkinVariant,
}

#[derive(Deserialize)]
struct TextureDocument {
    textures: Option<TextureSet>,
}

#[derive(Deserialize)]
struct TextureSet {
    #[serde(rename = "SKIN")]
    skin: Option<TextureEntry>,
    #[serde(rename = "CAPE")]
    cape: Option<TextureEntry>,
}

#[derive(Deserialize)]
struct TextureEntry {
    url: Option<String>,
    metadata: Option<TextureMetadata>,
}

#[derive(Deserialize)]
struct TextureMetadata {
    model: Option<String>,
}

/// Decode base64 into UTF-8 JSON text
pub fn decode_json(value: &str) -> Option<String> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| trace!("texture value is not base64: {}", e))
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// Decode a `textures` value into its URLs and model variant
pub fn decode_payload(value: &str) -> TexturePayload {
    let Some(json) = decode_json(value) else {
        return TexturePayload::default();
    };
    let document: TextureDocument = match serde_json::from_str(&json) {
        Ok(doc) => doc,
        Err(e) => {
            trace!("texture document is not valid JSON: {}", e);
            return TexturePayload::default();
        }
    };
    let Some(set) = document.textures else {
        return TexturePayload::default();
    };

    let (skin_url, variant) = match set.skin {
        Some(skin) => {
            let variant = skin
                .metadata
                .and_then(|m| m.model)
                .map(|m| SkinVariant::from_model(&m))
                .unwrap_or_default();
            (skin.url, variant)
        }
        None => (None, SkinVariant::Classic),
    };

    TexturePayload {
        skin_url,
        cape_url: set.cape.and_then(|c| c.url),
        variant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextureProperty;

    fn encode(json: &str) -> String {
        STANDARD.encode(json)
    }

    #[test]
    fn test_decode_slim_skin() {
        let value = encode(r#"{"textures":{"SKIN":{"url":"https://x","metadata":{"model":"slim"}}}}"#);
        let payload = decode_payload(&value);
        assert_eq!(payload.skin_url.as_deref(), Some("https://x"));
        assert_eq!(payload.variant, SkinVariant::Slim);
        assert!(payload.cape_url.is_none());
    }

    #[test]
    fn test_missing_metadata_is_classic() {
        let value = encode(r#"{"textures":{"SKIN":{"url":"https://x"}}}"#);
        assert_eq!(decode_payload(&value).variant, SkinVariant::Classic);
    }

    #[test]
    fn test_cape_detection() {
        let value = encode(r#"{"textures":{"SKIN":{"url":"https://s"},"CAPE":{"url":"https://c"}}}"#);
        let property = TextureProperty::new(value, "sig").unwrap();
        assert!(property.has_cape());
        assert_eq!(property.cape_url().as_deref(), Some("https://c"));
    }

    #[test]
    fn test_malformed_input_yields_defaults() {
        assert_eq!(decode_payload("%%% not base64 %%%"), TexturePayload::default());
        assert_eq!(decode_payload(&encode("{not json")), TexturePayload::default());
        assert_eq!(decode_payload(&encode(r#"{"profileName":"x"}"#)), TexturePayload::default());
    }
}
