//! Field metadata: which properties map to which remote search fields, and
//! which comparisons each field supports.
//!
//! Tables are built explicitly (per entity type, or from configuration) and
//! consulted through the [`FieldLookup`] trait.

use crate::errors::JqlError;
use crate::expr::{Expr, MemberId, TypeRef, Value};
use crate::query::methods;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Comparison capabilities of a remote field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CompareFlags(u16);

impl CompareFlags {
    pub const NONE: CompareFlags = CompareFlags(0);
    pub const COMPARABLE: CompareFlags = CompareFlags(1);
    pub const SORTABLE: CompareFlags = CompareFlags(1 << 1);
    /// Text field: equality compiles to `~` / `!~`
    pub const CONTAINS: CompareFlags = CompareFlags(1 << 2);
    pub const INCLUDE: CompareFlags = CompareFlags(1 << 3);
    pub const CHECK: CompareFlags = CompareFlags(1 << 4);
    pub const WAS: CompareFlags = CompareFlags(1 << 5);
    pub const WAS_INCLUDE: CompareFlags = CompareFlags(1 << 6);
    pub const CHANGED: CompareFlags = CompareFlags(1 << 7);

    const NAMES: [(&'static str, CompareFlags); 8] = [
        ("comparable", Self::COMPARABLE),
        ("sortable", Self::SORTABLE),
        ("contains", Self::CONTAINS),
        ("include", Self::INCLUDE),
        ("check", Self::CHECK),
        ("was", Self::WAS),
        ("was_include", Self::WAS_INCLUDE),
        ("changed", Self::CHANGED),
    ];

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: CompareFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: CompareFlags) -> CompareFlags {
        CompareFlags(self.0 | other.0)
    }

    /// Look up a single flag by its configuration name
    pub fn from_name(name: &str) -> Option<CompareFlags> {
        let name = name.trim().to_lowercase();
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }

    /// Names of the flags set, in declaration order
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for CompareFlags {
    type Output = CompareFlags;

    fn bitor(self, rhs: CompareFlags) -> CompareFlags {
        self.union(rhs)
    }
}

impl BitOrAssign for CompareFlags {
    fn bitor_assign(&mut self, rhs: CompareFlags) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for CompareFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}

/// Remote name and capabilities of one searchable field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub remote_name: String,
    pub flags: CompareFlags,
    /// Declared type of the property, `Any` when not recorded
    pub ty: TypeRef,
}

impl FieldDescriptor {
    pub fn new(remote_name: impl Into<String>, flags: CompareFlags) -> Self {
        Self {
            remote_name: remote_name.into(),
            flags,
            ty: TypeRef::Any,
        }
    }

    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.ty = ty;
        self
    }

    pub fn allows(&self, flag: CompareFlags) -> bool {
        self.flags.contains(flag)
    }
}

/// Source of field descriptors, keyed by property identifier
pub trait FieldLookup {
    fn lookup(&self, member: &MemberId) -> Option<&FieldDescriptor>;
}

/// Explicit property → descriptor mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable {
    fields: BTreeMap<MemberId, FieldDescriptor>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(
        mut self,
        owner: &str,
        name: &str,
        remote_name: &str,
        flags: CompareFlags,
    ) -> Self {
        self.insert(
            MemberId::new(owner, name),
            FieldDescriptor::new(remote_name, flags),
        );
        self
    }

    /// Registration for a property whose declared type matters to translation
    pub fn with_typed(
        mut self,
        owner: &str,
        name: &str,
        remote_name: &str,
        flags: CompareFlags,
        ty: TypeRef,
    ) -> Self {
        self.insert(
            MemberId::new(owner, name),
            FieldDescriptor::new(remote_name, flags).with_type(ty),
        );
        self
    }

    pub fn insert(&mut self, member: MemberId, descriptor: FieldDescriptor) {
        self.fields.insert(member, descriptor);
    }

    /// Add every entry of `other`, replacing duplicates
    pub fn merge(&mut self, other: &FieldTable) {
        for (member, descriptor) in &other.fields {
            self.fields.insert(member.clone(), descriptor.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, &FieldDescriptor)> {
        self.fields.iter()
    }
}

impl FieldLookup for FieldTable {
    fn lookup(&self, member: &MemberId) -> Option<&FieldDescriptor> {
        self.fields.get(member)
    }
}

/// Resolve the descriptor of the field being compared.
///
/// Accepts a property access, a property access under one conversion, or a
/// `custom_field("Name")` call (synthesized as a quoted, text-searchable field).
pub fn resolve_field(expr: &Expr, fields: &dyn FieldLookup) -> Result<FieldDescriptor, JqlError> {
    match expr {
        Expr::Member { member, .. } => fields
            .lookup(member)
            .cloned()
            .ok_or_else(|| JqlError::Schema(format!("'{}' is not a searchable field", member))),
        Expr::Convert { operand, .. } => match operand.as_ref() {
            inner @ Expr::Member { .. } => resolve_field(inner, fields),
            other => Err(unresolved(other)),
        },
        Expr::Call {
            target,
            method,
            args,
        } if method.name == methods::CUSTOM_FIELD => {
            let name = target
                .iter()
                .chain(args.iter())
                .find_map(|arg| match arg.as_constant() {
                    Some((Value::Str(name), _)) => Some(name.clone()),
                    _ => None,
                })
                .ok_or_else(|| {
                    JqlError::Schema("custom_field requires a literal field name".to_string())
                })?;
            Ok(FieldDescriptor::new(
                format!("\"{}\"", name),
                CompareFlags::CONTAINS,
            ))
        }
        other => Err(unresolved(other)),
    }
}

fn unresolved(expr: &Expr) -> JqlError {
    JqlError::Schema(format!("unable to resolve field from {} node", expr.kind()))
}
