//! Stream envelope `{type, data}`

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// Frames were regenerated for a subject
    SkinUpdated { subject: Uuid, name: String },
    /// Playback settings changed for a subject
    ConfigChanged { subject: Uuid },
    PlayerOnline { subject: Uuid, name: String },
    PlayerOffline { subject: Uuid },
    RequestSkinData { subject: Uuid },
    Ping,
    Pong,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize, Deserialize)]
struct SubjectData {
    minecraft_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minecraft_username: Option<String>,
}

impl WsMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            WsMessage::SkinUpdated { .. } => "SkinUpdated",
            WsMessage::ConfigChanged { .. } => "ConfigChanged",
            WsMessage::PlayerOnline { .. } => "PlayerOnline",
            WsMessage::PlayerOffline { .. } => "PlayerOffline",
            WsMessage::RequestSkinData { .. } => "RequestSkinData",
            WsMessage::Ping => "Ping",
            WsMessage::Pong => "Pong",
        }
    }

    /// Subject the message concerns, if any
    pub fn subject(&self) -> Option<Uuid> {
        match self {
            WsMessage::SkinUpdated { subject, .. }
            | WsMessage::ConfigChanged { subject }
            | WsMessage::PlayerOnline { subject, .. }
            | WsMessage::PlayerOffline { subject }
            | WsMessage::RequestSkinData { subject } => Some(*subject),
            WsMessage::Ping | WsMessage::Pong => None,
        }
    }

    pub fn to_json(&self) -> String {
        let data = match self {
            WsMessage::SkinUpdated { subject, name } | WsMessage::PlayerOnline { subject, name } => {
                json!({ "minecraft_uuid": subject, "minecraft_username": name })
            }
            WsMessage::ConfigChanged { subject }
            | WsMessage::PlayerOffline { subject }
            | WsMessage::RequestSkinData { subject } => json!({ "minecraft_uuid": subject }),
            WsMessage::Ping | WsMessage::Pong => Value::Null,
        };
        json!({ "type": self.type_name(), "data": data }).to_string()
    }

    /// Parse an inbound frame; unknown types and malformed frames yield `None`
    pub fn from_json(text: &str) -> Option<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| debug!("Ignoring malformed stream frame: {}", e))
            .ok()?;
        let subject = || serde_json::from_value::<SubjectData>(envelope.data.clone()).ok();

        let message = match envelope.kind.as_str() {
            "Ping" => WsMessage::Ping,
            "Pong" => WsMessage::Pong,
            "SkinUpdated" => {
                let data = subject()?;
                WsMessage::SkinUpdated {
                    subject: data.minecraft_uuid,
                    name: data.minecraft_username.unwrap_or_default(),
                }
            }
            "PlayerOnline" => {
                let data = subject()?;
                WsMessage::PlayerOnline {
                    subject: data.minecraft_uuid,
                    name: data.minecraft_username.unwrap_or_default(),
                }
            }
            "ConfigChanged" => WsMessage::ConfigChanged { subject: subject()?.minecraft_uuid },
            "PlayerOffline" => WsMessage::PlayerOffline { subject: subject()?.minecraft_uuid },
            "RequestSkinData" => WsMessage::RequestSkinData { subject: subject()?.minecraft_uuid },
            other => {
                debug!("Ignoring stream message of unknown type {}", other);
                return None;
            }
        };
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_skin_updated() {
        let text = r#"{"type":"SkinUpdated","data":{"minecraft_uuid":"069a79f4-44e9-4726-a5be-fca90e38aaf5","minecraft_username":"Notch"}}"#;
        let msg = WsMessage::from_json(text).unwrap();
        assert_eq!(
            msg,
            WsMessage::SkinUpdated {
                subject: "069a79f4-44e9-4726-a5be-fca90e38aaf5".parse().unwrap(),
                name: "Notch".to_string(),
            }
        );
    }

    #[test]
    fn test_pong_without_data() {
        assert_eq!(WsMessage::from_json(r#"{"type":"Pong"}"#), Some(WsMessage::Pong));
        assert_eq!(WsMessage::from_json(r#"{"type":"Pong","data":null}"#), Some(WsMessage::Pong));
    }

    #[test]
    fn test_outbound_ping_has_null_data() {
        let value: Value = serde_json::from_str(&WsMessage::Ping.to_json()).unwrap();
        assert_eq!(value["type"], "Ping");
        assert!(value["data"].is_null());
    }

    #[test]
    fn test_outbound_player_offline() {
        let id = Uuid::new_v4();
        let value: Value = serde_json::from_str(&WsMessage::PlayerOffline { subject: id }.to_json()).unwrap();
        assert_eq!(value["type"], "PlayerOffline");
        assert_eq!(value["data"]["minecraft_uuid"], id.to_string());
    }

    #[test]
    fn test_unknown_or_malformed_is_ignored() {
        assert_eq!(WsMessage::from_json(r#"{"type":"Mystery","data":{}}"#), None);
        assert_eq!(WsMessage::from_json("not json"), None);
        assert_eq!(WsMessage::from_json(r#"{"type":"ConfigChanged","data":{}}"#), None);
    }
}
