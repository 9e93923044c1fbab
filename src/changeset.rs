//! Attribute change-set builder.
//!
//! Turns caller attribute tables into an ordered list of modifications with
//! fixed capacity ceilings: at most `max_attrs` modifications, `2 * max_attrs`
//! value slots (one per value plus a terminator per value list) and
//! `max_attrs` value buffers. The builder never grows past those ceilings.

use crate::error::{Error, Result};
use crate::protocol::ModifyOperation;
use crate::value::{Key, Table, Value};
use std::borrow::Cow;

/// Default ceiling on modifications per operation.
pub const MAX_ATTRS: usize = 100;

/// Value payload of one attribute, binary safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue<'a> {
    /// Attribute named without values; on delete it drops every value.
    Absent,
    Single(Cow<'a, [u8]>),
    Multi(Vec<Cow<'a, [u8]>>),
}

impl<'a> AttributeValue<'a> {
    /// Build from decoded server values: none, one, or many.
    pub fn from_values(mut values: Vec<Vec<u8>>) -> AttributeValue<'static> {
        match values.len() {
            0 => AttributeValue::Absent,
            1 => AttributeValue::Single(Cow::Owned(values.remove(0))),
            _ => AttributeValue::Multi(values.into_iter().map(Cow::Owned).collect()),
        }
    }

    pub fn values(&self) -> Vec<&[u8]> {
        match self {
            AttributeValue::Absent => Vec::new(),
            AttributeValue::Single(v) => vec![v.as_ref()],
            AttributeValue::Multi(vs) => vs.iter().map(|v| v.as_ref()).collect(),
        }
    }

    pub fn into_owned(self) -> AttributeValue<'static> {
        match self {
            AttributeValue::Absent => AttributeValue::Absent,
            AttributeValue::Single(v) => AttributeValue::Single(Cow::Owned(v.into_owned())),
            AttributeValue::Multi(vs) => {
                AttributeValue::Multi(vs.into_iter().map(|v| Cow::Owned(v.into_owned())).collect())
            }
        }
    }

    /// Value slots consumed: one per value plus the list terminator.
    fn slots(&self) -> usize {
        match self {
            AttributeValue::Absent => 0,
            AttributeValue::Single(_) => 2,
            AttributeValue::Multi(vs) => vs.len() + 1,
        }
    }

    fn buffers(&self) -> usize {
        match self {
            AttributeValue::Absent => 0,
            AttributeValue::Single(_) => 1,
            AttributeValue::Multi(vs) => vs.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification<'a> {
    pub op: ModifyOperation,
    pub attribute_name: &'a str,
    pub value: AttributeValue<'a>,
}

/// Modifications borrowed from caller tables for the length of one submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<'a> {
    modifications: Vec<Modification<'a>>,
    value_slots: usize,
    buffers: usize,
}

impl<'a> ChangeSet<'a> {
    /// Build from ordered `(op, attribute table)` groups.
    pub fn build(groups: &[(ModifyOperation, &'a Table)], max_attrs: usize) -> Result<Self> {
        let mut builder = ChangeSetBuilder::new(max_attrs);
        for (op, table) in groups {
            builder.add_group(*op, table)?;
        }
        Ok(builder.finish())
    }

    pub fn modifications(&self) -> &[Modification<'a>] {
        &self.modifications
    }

    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    pub fn value_slots(&self) -> usize {
        self.value_slots
    }

    pub fn buffers(&self) -> usize {
        self.buffers
    }
}

pub struct ChangeSetBuilder<'a> {
    max_attrs: usize,
    modifications: Vec<Modification<'a>>,
    value_slots: usize,
    buffers: usize,
}

impl<'a> ChangeSetBuilder<'a> {
    pub fn new(max_attrs: usize) -> Self {
        Self {
            max_attrs,
            modifications: Vec::with_capacity(max_attrs),
            value_slots: 0,
            buffers: 0,
        }
    }

    /// Append every named attribute of `table` under `op`. Positional keys and
    /// names that read as numbers (`"7"`, `"0x1f"`) are skipped.
    pub fn add_group(&mut self, op: ModifyOperation, table: &'a Table) -> Result<()> {
        for (key, value) in table.iter() {
            let name = match key {
                Key::Name(name) if !is_numeric_name(name) => name.as_str(),
                _ => continue,
            };
            self.add(op, name, value)?;
        }
        Ok(())
    }

    pub fn add(&mut self, op: ModifyOperation, name: &'a str, value: &'a Value) -> Result<()> {
        if self.modifications.len() >= self.max_attrs {
            return Err(Error::TooManyAttributes);
        }
        let value = convert_value(name, value)?;
        if self.value_slots + value.slots() > self.max_attrs * 2
            || self.buffers + value.buffers() > self.max_attrs
        {
            return Err(Error::TooManyValues);
        }
        self.value_slots += value.slots();
        self.buffers += value.buffers();
        self.modifications.push(Modification {
            op,
            attribute_name: name,
            value,
        });
        Ok(())
    }

    pub fn finish(self) -> ChangeSet<'a> {
        ChangeSet {
            modifications: self.modifications,
            value_slots: self.value_slots,
            buffers: self.buffers,
        }
    }
}

fn is_numeric_name(name: &str) -> bool {
    let name = name.trim();
    let hex = name
        .strip_prefix("0x")
        .or_else(|| name.strip_prefix("0X"))
        .map_or(false, |digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()));
    hex || name.parse::<f64>().map_or(false, f64::is_finite)
}

fn convert_value<'a>(name: &str, value: &'a Value) -> Result<AttributeValue<'a>> {
    let invalid = |found: &'static str| Error::InvalidAttributeValue {
        attribute: name.to_string(),
        found,
    };
    match value {
        Value::Bool(true) => Ok(AttributeValue::Absent),
        Value::Bytes(b) => Ok(AttributeValue::Single(Cow::Borrowed(b.as_slice()))),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Bytes(b) => Ok(Cow::Borrowed(b.as_slice())),
                other => Err(invalid(other.kind_name())),
            })
            .collect::<Result<Vec<_>>>()
            .map(AttributeValue::Multi),
        other => Err(invalid(other.kind_name())),
    }
}
