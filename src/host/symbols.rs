//! Runtime symbol table over host internals
//!
//! Internal host surfaces change shape between versions, so they are reached
//! through a reflective table: types are found by path, members are matched by
//! name and signature, and calls pass dynamically typed [`Value`]s.

use super::HostResult;
use uuid::Uuid;

/// Opaque handle to a type known to the symbol table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(pub u32);

/// Opaque handle to a member of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId(pub u32);

/// Opaque handle to a live host object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Constructor,
    FieldGet,
    FieldSet,
}

/// Declared type of a parameter or return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Void,
    Bool,
    Int,
    Str,
    Uuid,
    List,
    Object(TypeRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Uuid(Uuid),
    List(Vec<Value>),
    Object(ObjectRef),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Member description as published by the symbol table
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub kind: MemberKind,
    pub params: Vec<ValueKind>,
    pub returns: ValueKind,
}

impl Member {
    pub fn is_getter(&self) -> bool {
        matches!(self.kind, MemberKind::Method | MemberKind::FieldGet) && self.params.is_empty()
    }

    pub fn named(&self, candidates: &[&str]) -> bool {
        candidates.iter().any(|c| *c == self.name)
    }
}

pub trait SymbolTable: Send + Sync {
    /// Version tag embedded in internal type paths, if the host uses one
    fn platform_tag(&self) -> Option<String>;

    fn find_type(&self, path: &str) -> Option<TypeRef>;

    fn members(&self, owner: TypeRef) -> Vec<Member>;

    /// Internal object backing a connected session
    fn session_object(&self, subject: Uuid) -> Option<Value>;

    fn invoke(&self, member: MemberId, receiver: Option<&Value>, args: Vec<Value>) -> HostResult<Value>;
}
