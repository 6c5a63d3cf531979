//! One-time negotiation of how appearance can be mutated on this host
//!
//! The probe prefers the host's stable profile surface, then tries to bind the
//! internal profile structures through the symbol table. The result is an
//! owned value handed to the applier; call sites dispatch on it and never
//! probe again.

use super::{SkinError, SkinResult};
use crate::host::{
    HostError, HostServer, Member, MemberId, MemberKind, ProfileApi, SymbolTable, TypeRef, Value,
    ValueKind,
};
use crate::model::{ProfileProperty, TEXTURES_PROPERTY};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Internal session type paths, most specific first. `{tag}` is the host's version tag.
const SESSION_TYPE_CANDIDATES: &[&str] = &[
    "org.bukkit.craftbukkit.{tag}.entity.CraftPlayer",
    "org.bukkit.craftbukkit.entity.CraftPlayer",
    "net.md_5.bungee.connection.InitialHandler",
];

const PROFILE_ACCESSORS: &[&str] = &["getProfile", "getGameProfile", "loginProfile"];
const PROPERTY_GETTERS: &[&str] = &["getProperties", "properties"];
const PROPERTY_SETTERS: &[&str] = &["setProperties", "properties"];
const NAME_GETTERS: &[&str] = &["getName", "name"];
const VALUE_GETTERS: &[&str] = &["getValue", "value"];
const SIGNATURE_GETTERS: &[&str] = &["getSignature", "signature"];

/// How appearance is mutated on this host
pub enum SkinCapability {
    Native(Arc<dyn ProfileApi>),
    DynamicBinding(DynamicBinding),
    Unavailable { reason: String },
}

impl std::fmt::Debug for SkinCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkinCapability::Native(_) => write!(f, "Native"),
            SkinCapability::DynamicBinding(b) => write!(f, "DynamicBinding({})", b.session_type_path),
            SkinCapability::Unavailable { reason } => write!(f, "Unavailable({})", reason),
        }
    }
}

impl SkinCapability {
    pub fn name(&self) -> &'static str {
        match self {
            SkinCapability::Native(_) => "native",
            SkinCapability::DynamicBinding(_) => "dynamic-binding",
            SkinCapability::Unavailable { .. } => "unavailable",
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, SkinCapability::Unavailable { .. })
    }

    pub fn read_properties(&self, subject: Uuid) -> SkinResult<Vec<ProfileProperty>> {
        match self {
            SkinCapability::Native(api) => api.properties(subject).map_err(SkinError::from),
            SkinCapability::DynamicBinding(binding) => binding.read_properties(subject),
            SkinCapability::Unavailable { reason } => Err(SkinError::BindingUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    pub fn write_properties(&self, subject: Uuid, properties: Vec<ProfileProperty>) -> SkinResult<()> {
        match self {
            SkinCapability::Native(api) => {
                api.set_properties(subject, properties)?;
                api.refresh_self(subject)?;
                Ok(())
            }
            SkinCapability::DynamicBinding(binding) => binding.write_properties(subject, properties),
            SkinCapability::Unavailable { reason } => Err(SkinError::BindingUnavailable {
                reason: reason.clone(),
            }),
        }
    }
}

/// Probe the host once. Side-effect free apart from the log line.
pub fn detect_capability(host: &dyn HostServer) -> SkinCapability {
    let descriptor = host.descriptor();

    if let Some(api) = host.profile_api() {
        info!("🎭 {} {} exposes a native profile API", descriptor.brand, descriptor.version);
        return SkinCapability::Native(api);
    }

    let capability = match host.symbols() {
        Some(symbols) => match DynamicBinding::probe(symbols) {
            Ok(binding) => {
                info!(
                    "🎭 {} {}: bound profile internals through {}",
                    descriptor.brand, descriptor.version, binding.session_type_path
                );
                SkinCapability::DynamicBinding(binding)
            }
            Err(reason) => SkinCapability::Unavailable { reason },
        },
        None => SkinCapability::Unavailable {
            reason: "host exposes neither a profile API nor a symbol table".to_string(),
        },
    };

    if let SkinCapability::Unavailable { reason } = &capability {
        error!(
            "❌ Skin application disabled on {} {}: {}",
            descriptor.brand, descriptor.version, reason
        );
    }
    capability
}

/// Members of the host's internal profile structures, resolved once
pub struct DynamicBinding {
    symbols: Arc<dyn SymbolTable>,
    session_type_path: String,
    profile_accessor: MemberId,
    profile_setter: Option<MemberId>,
    profile_ctor: Option<Member>,
    properties_getter: MemberId,
    properties_setter: MemberId,
    property_ctor: MemberId,
    name_getter: MemberId,
    value_getter: MemberId,
    signature_getter: MemberId,
}

fn find_member<'a>(
    members: &'a [Member],
    names: &[&str],
    what: &str,
    accept: impl Fn(&Member) -> bool,
) -> Result<&'a Member, String> {
    members
        .iter()
        .find(|m| m.named(names) && accept(m))
        .ok_or_else(|| format!("no {} member among {:?}", what, names))
}

fn object_type(kind: &ValueKind) -> Option<TypeRef> {
    match kind {
        ValueKind::Object(ty) => Some(*ty),
        _ => None,
    }
}

impl DynamicBinding {
    /// Resolve every member needed to read and rewrite profile properties
    pub fn probe(symbols: Arc<dyn SymbolTable>) -> Result<Self, String> {
        let tag = symbols.platform_tag();
        let candidates: Vec<String> = SESSION_TYPE_CANDIDATES
            .iter()
            .filter_map(|path| match (&tag, path.contains("{tag}")) {
                (Some(tag), true) => Some(path.replace("{tag}", tag)),
                (None, true) => None,
                (_, false) => Some(path.to_string()),
            })
            .collect();

        let (session_type_path, session_type) = candidates
            .iter()
            .find_map(|path| symbols.find_type(path).map(|ty| (path.clone(), ty)))
            .ok_or_else(|| format!("no session type among {:?}", candidates))?;

        let session_members = symbols.members(session_type);
        let accessor = find_member(&session_members, PROFILE_ACCESSORS, "profile accessor", |m| {
            m.is_getter() && object_type(&m.returns).is_some()
        })?;
        let profile_type = object_type(&accessor.returns)
            .ok_or_else(|| "profile accessor does not return an object".to_string())?;
        let profile_setter = session_members
            .iter()
            .find(|m| m.name == accessor.name && m.kind == MemberKind::FieldSet)
            .map(|m| m.id);

        let profile_members = symbols.members(profile_type);
        let properties_getter = find_member(&profile_members, PROPERTY_GETTERS, "property list getter", |m| {
            m.is_getter() && m.returns == ValueKind::List
        })?;
        let properties_setter = find_member(&profile_members, PROPERTY_SETTERS, "property list setter", |m| {
            matches!(m.kind, MemberKind::FieldSet | MemberKind::Method) && m.params == [ValueKind::List]
        })?;
        // older hosts build the profile through a 2-arity constructor, newer ones take 3
        let profile_ctor = profile_members
            .iter()
            .find(|m| {
                m.kind == MemberKind::Constructor
                    && (2..=3).contains(&m.params.len())
                    && m.params.last() == Some(&ValueKind::List)
            })
            .cloned();

        let property_type = ["com.mojang.authlib.properties.Property", "net.md_5.bungee.protocol.Property"]
            .iter()
            .find_map(|path| symbols.find_type(path))
            .ok_or_else(|| "no property type".to_string())?;
        let property_members = symbols.members(property_type);
        let property_ctor = find_member(&property_members, &["<init>"], "property constructor", |m| {
            m.kind == MemberKind::Constructor && m.params == [ValueKind::Str, ValueKind::Str, ValueKind::Str]
        })?;
        let is_str_getter = |m: &Member| m.is_getter() && m.returns == ValueKind::Str;
        let name_getter = find_member(&property_members, NAME_GETTERS, "property name", is_str_getter)?;
        let value_getter = find_member(&property_members, VALUE_GETTERS, "property value", is_str_getter)?;
        let signature_getter = find_member(&property_members, SIGNATURE_GETTERS, "property signature", is_str_getter)?;

        Ok(Self {
            session_type_path,
            profile_accessor: accessor.id,
            profile_setter,
            profile_ctor,
            properties_getter: properties_getter.id,
            properties_setter: properties_setter.id,
            property_ctor: property_ctor.id,
            name_getter: name_getter.id,
            value_getter: value_getter.id,
            signature_getter: signature_getter.id,
            symbols,
        })
    }

    pub fn session_type_path(&self) -> &str {
        &self.session_type_path
    }

    fn session(&self, subject: Uuid) -> SkinResult<Value> {
        self.symbols
            .session_object(subject)
            .ok_or(SkinError::SubjectGone { subject })
    }

    fn read_str(&self, getter: MemberId, property: &Value) -> SkinResult<Option<String>> {
        match self.symbols.invoke(getter, Some(property), vec![])? {
            Value::Str(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            other => Err(SkinError::PerCallBindingFailure {
                reason: format!("expected string, got {:?}", other),
            }),
        }
    }

    fn raw_properties(&self, profile: &Value) -> SkinResult<Vec<Value>> {
        match self.symbols.invoke(self.properties_getter, Some(profile), vec![])? {
            Value::Null => Ok(Vec::new()),
            other => other.into_list().ok_or_else(|| SkinError::PerCallBindingFailure {
                reason: "property getter did not return a list".to_string(),
            }),
        }
    }

    pub fn read_properties(&self, subject: Uuid) -> SkinResult<Vec<ProfileProperty>> {
        let session = self.session(subject)?;
        let profile = self.symbols.invoke(self.profile_accessor, Some(&session), vec![])?;
        if profile == Value::Null {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for raw in self.raw_properties(&profile)? {
            let Some(name) = self.read_str(self.name_getter, &raw)? else {
                continue;
            };
            let value = self.read_str(self.value_getter, &raw)?.unwrap_or_default();
            let signature = self.read_str(self.signature_getter, &raw)?;
            out.push(ProfileProperty { name, value, signature });
        }
        Ok(out)
    }

    fn build_property(&self, property: &ProfileProperty) -> SkinResult<Value> {
        let signature = property.signature.clone().map(Value::Str).unwrap_or(Value::Null);
        Ok(self.symbols.invoke(
            self.property_ctor,
            None,
            vec![Value::Str(property.name.clone()), Value::Str(property.value.clone()), signature],
        )?)
    }

    /// Rewrite the `textures` entry, keeping other properties as the host holds them
    pub fn write_properties(&self, subject: Uuid, properties: Vec<ProfileProperty>) -> SkinResult<()> {
        let session = self.session(subject)?;
        let profile = self.symbols.invoke(self.profile_accessor, Some(&session), vec![])?;

        let mut list = Vec::with_capacity(properties.len());
        for property in properties.iter().filter(|p| p.name == TEXTURES_PROPERTY) {
            list.push(self.build_property(property)?);
        }

        if profile == Value::Null {
            let (ctor, setter) = match (&self.profile_ctor, self.profile_setter) {
                (Some(ctor), Some(setter)) => (ctor, setter),
                _ => {
                    return Err(SkinError::PerCallBindingFailure {
                        reason: "session has no profile and none can be created".to_string(),
                    })
                }
            };
            let mut args = vec![Value::Null; ctor.params.len() - 1];
            args.push(Value::List(list));
            let created = self.symbols.invoke(ctor.id, None, args)?;
            self.symbols.invoke(setter, Some(&session), vec![created])?;
            return Ok(());
        }

        let mut kept = Vec::new();
        for raw in self.raw_properties(&profile)? {
            if self.read_str(self.name_getter, &raw)?.as_deref() != Some(TEXTURES_PROPERTY) {
                kept.push(raw);
            }
        }
        kept.extend(list);
        self.symbols
            .invoke(self.properties_setter, Some(&profile), vec![Value::List(kept)])?;
        Ok(())
    }
}

impl From<HostError> for SkinError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::SessionGone { subject } => SkinError::SubjectGone { subject },
            other => SkinError::PerCallBindingFailure {
                reason: other.to_string(),
            },
        }
    }
}
