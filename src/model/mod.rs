//! Appearance value types
//!
//! Immutable descriptors shared by every subsystem: the signed texture
//! property, animation frames and the per-subject skin configuration.

pub mod cape;
pub mod texture;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub use cape::{CapeType, SkinVariant};
pub use texture::TexturePayload;

/// Profile property name carrying the signed appearance blob
pub const TEXTURES_PROPERTY: &str = "textures";

/// Frame duration used when a config carries a non-positive value
pub const DEFAULT_FRAME_DURATION_TICKS: u32 = 10;

/// Signed appearance descriptor
///
/// Both fields are guaranteed non-empty; equality compares value and signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureProperty {
    value: String,
    signature: String,
}

impl TextureProperty {
    /// Build a property, rejecting empty value or signature
    pub fn new(value: impl Into<String>, signature: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let signature = signature.into();
        if value.is_empty() || signature.is_empty() {
            return None;
        }
        Some(Self { value, signature })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Decode the embedded texture document. Never fails.
    pub fn decode(&self) -> TexturePayload {
        texture::decode_payload(&self.value)
    }

    pub fn skin_url(&self) -> Option<String> {
        self.decode().skin_url
    }

    pub fn cape_url(&self) -> Option<String> {
        self.decode().cape_url
    }

    pub fn variant(&self) -> SkinVariant {
        self.decode().variant
    }

    pub fn has_cape(&self) -> bool {
        self.decode().cape_url.is_some()
    }

    /// View this descriptor as a named profile property
    pub fn to_profile_property(&self) -> ProfileProperty {
        ProfileProperty {
            name: TEXTURES_PROPERTY.to_string(),
            value: self.value.clone(),
            signature: Some(self.signature.clone()),
        }
    }
}

/// Generic (name, value, signature) entry attached to a session's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

impl ProfileProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            signature,
        }
    }

    pub fn is_textures(&self) -> bool {
        self.name == TEXTURES_PROPERTY
    }

    /// Interpret this entry as a texture descriptor if it is a signed `textures` property
    pub fn as_texture(&self) -> Option<TextureProperty> {
        if !self.is_textures() {
            return None;
        }
        TextureProperty::new(self.value.clone(), self.signature.clone()?)
    }
}

/// Find the texture descriptor among a profile's properties
pub fn find_texture(properties: &[ProfileProperty]) -> Option<TextureProperty> {
    properties.iter().find_map(ProfileProperty::as_texture)
}

/// Replace (or insert) the `textures` entry, keeping every other property in order
pub fn with_texture(properties: &[ProfileProperty], texture: &TextureProperty) -> Vec<ProfileProperty> {
    let mut out: Vec<ProfileProperty> = properties
        .iter()
        .filter(|p| !p.is_textures())
        .cloned()
        .collect();
    out.push(texture.to_profile_property());
    out
}

/// Playback policy applied when a frame's duration elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Loop,
    Once,
    PingPong,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Loop => "loop",
            LoopMode::Once => "once",
            LoopMode::PingPong => "ping_pong",
        }
    }

    /// Parse a stored or remote value; unknown modes play as `loop`
    pub fn parse_lossy(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loop" => Ok(LoopMode::Loop),
            "once" => Ok(LoopMode::Once),
            "ping_pong" | "pingpong" => Ok(LoopMode::PingPong),
            other => Err(format!("unknown loop mode '{}'", other)),
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LoopMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(LoopMode::parse_lossy).unwrap_or_default())
    }
}

/// One animation frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinFrame {
    pub frame_index: u32,
    pub texture_value: String,
    pub texture_signature: String,
    #[serde(default)]
    pub texture_url: Option<String>,
}

impl SkinFrame {
    pub fn new(frame_index: u32, texture: &TextureProperty, texture_url: Option<String>) -> Self {
        Self {
            frame_index,
            texture_value: texture.value().to_string(),
            texture_signature: texture.signature().to_string(),
            texture_url,
        }
    }

    /// The frame as an appliable descriptor; absent when either half is empty
    pub fn to_property(&self) -> Option<TextureProperty> {
        TextureProperty::new(self.texture_value.clone(), self.texture_signature.clone())
    }
}

fn default_cape_type() -> String {
    CapeType::Vanilla.id().to_string()
}

fn default_frame_duration() -> i32 {
    DEFAULT_FRAME_DURATION_TICKS as i32
}

fn default_enabled() -> bool {
    true
}

fn frames_in_order<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SkinFrame>, D::Error> {
    let frames = Option::<Vec<SkinFrame>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(order_frames(frames))
}

/// Sort by frame index and keep the first frame for each index
fn order_frames(mut frames: Vec<SkinFrame>) -> Vec<SkinFrame> {
    frames.sort_by_key(|f| f.frame_index);
    frames.dedup_by_key(|f| f.frame_index);
    frames
}

/// A subject's full animation configuration
///
/// Always replaced wholesale; never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub minecraft_uuid: Uuid,
    #[serde(default)]
    pub minecraft_username: String,
    #[serde(default = "default_cape_type")]
    pub cape_type: String,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default = "default_frame_duration")]
    frame_duration_ticks: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "frames_in_order")]
    frames: Vec<SkinFrame>,
}

impl SkinConfig {
    pub fn new(subject: Uuid, name: impl Into<String>, frames: Vec<SkinFrame>) -> Self {
        Self {
            id: None,
            minecraft_uuid: subject,
            minecraft_username: name.into(),
            cape_type: default_cape_type(),
            loop_mode: LoopMode::Loop,
            frame_duration_ticks: DEFAULT_FRAME_DURATION_TICKS as i32,
            enabled: true,
            frames: order_frames(frames),
        }
    }

    pub fn with_loop_mode(mut self, mode: LoopMode) -> Self {
        self.loop_mode = mode;
        self
    }

    pub fn with_frame_duration(mut self, ticks: i32) -> Self {
        self.frame_duration_ticks = ticks;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_cape_type(mut self, cape_type: impl Into<String>) -> Self {
        self.cape_type = cape_type.into();
        self
    }

    pub fn subject(&self) -> Uuid {
        self.minecraft_uuid
    }

    /// Effective frame duration, never zero
    pub fn frame_duration_ticks(&self) -> u32 {
        if self.frame_duration_ticks <= 0 {
            DEFAULT_FRAME_DURATION_TICKS
        } else {
            self.frame_duration_ticks as u32
        }
    }

    pub fn frames(&self) -> &[SkinFrame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&SkinFrame> {
        self.frames.get(index)
    }

    pub fn first_frame(&self) -> Option<&SkinFrame> {
        self.frames.first()
    }

    pub fn is_animated(&self) -> bool {
        self.enabled && self.frames.len() > 1
    }

    /// Whether replacing `self` with `other` changes what is rendered
    pub fn appearance_differs(&self, other: &SkinConfig) -> bool {
        if self.frames.len() != other.frames.len() {
            return true;
        }
        let mine = self.first_frame().map(|f| f.texture_signature.as_str());
        let theirs = other.first_frame().map(|f| f.texture_signature.as_str());
        mine != theirs
    }
}
