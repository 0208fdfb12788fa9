// src/access.rs

//! Read/write access annotations on task arguments.
//!
//! Every positional argument carries an access tag describing how the task
//! touches it. Unannotated arguments default to read-only. A compound
//! [`Arg::Deps`] access restricts the analysis to named sub-regions of an
//! aggregate value while still passing the whole value to the task.

use crate::data::{TaskHandle, Value};
use crate::errors::{DepschedError, Result};

/// Read/write intent flags for a single access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessTag {
    pub read: bool,
    pub write: bool,
}

impl AccessTag {
    /// Unused argument.
    pub const IGNORED: AccessTag = AccessTag { read: false, write: false };
    /// Read-only argument; the default for unannotated arguments.
    pub const IN: AccessTag = AccessTag { read: true, write: false };
    /// Write-only argument.
    pub const OUT: AccessTag = AccessTag { read: false, write: true };
    /// Read-write argument.
    pub const INOUT: AccessTag = AccessTag { read: true, write: true };

    pub fn union(self, other: AccessTag) -> AccessTag {
        AccessTag {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }
}

/// Names a sub-region of an aggregate value: a field or a slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Field(String),
    Range { start: u64, len: u64 },
}

impl Selector {
    pub fn field(name: impl Into<String>) -> Self {
        Selector::Field(name.into())
    }

    pub fn range(start: u64, len: u64) -> Self {
        Selector::Range { start, len }
    }
}

/// What an access annotation wraps.
///
/// `Sub` selectors are only meaningful inside [`Arg::Deps`]; anywhere else
/// they are a usage error.
#[derive(Debug, Clone)]
pub enum ArgValue {
    /// A tracked value.
    Data(Value),
    /// A task handle whose output the task consumes.
    Task(TaskHandle),
    /// A sub-region selector of the enclosing `Deps` base value.
    Sub(Selector),
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Data(value)
    }
}

impl From<&Value> for ArgValue {
    fn from(value: &Value) -> Self {
        ArgValue::Data(value.clone())
    }
}

impl From<TaskHandle> for ArgValue {
    fn from(task: TaskHandle) -> Self {
        ArgValue::Task(task)
    }
}

impl From<&TaskHandle> for ArgValue {
    fn from(task: &TaskHandle) -> Self {
        ArgValue::Task(task.clone())
    }
}

impl From<Selector> for ArgValue {
    fn from(selector: Selector) -> Self {
        ArgValue::Sub(selector)
    }
}

/// A positional task argument with its access annotation.
///
/// `Deps` pairs a base value with an ordered list of sub-accesses; each
/// element must itself be `In`, `Out` or `InOut` applied to a
/// [`Selector`]. Anything else in the list is rejected at submission.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Unannotated; treated as `In`.
    Plain(ArgValue),
    In(ArgValue),
    Out(ArgValue),
    InOut(ArgValue),
    Ignored(ArgValue),
    Deps(ArgValue, Vec<Arg>),
}

impl Arg {
    fn describe(&self) -> &'static str {
        match self {
            Arg::Plain(_) => "a bare value",
            Arg::In(_) => "In",
            Arg::Out(_) => "Out",
            Arg::InOut(_) => "InOut",
            Arg::Ignored(_) => "Ignored",
            Arg::Deps(_, _) => "a nested Deps",
        }
    }
}

/// A single declared access: tag plus optional selector restricting it to
/// a sub-region.
#[derive(Debug, Clone)]
pub struct Access {
    pub tag: AccessTag,
    pub selector: Option<Selector>,
}

/// An argument unwrapped for dependency analysis: the value actually
/// passed plus the accesses declared on it.
#[derive(Debug, Clone)]
pub struct UnwrappedArg {
    pub value: ArgValue,
    pub accesses: Vec<Access>,
}

impl UnwrappedArg {
    /// Union of the declared accesses over the argument as a whole.
    pub fn combined_tag(&self) -> AccessTag {
        self.accesses
            .iter()
            .fold(AccessTag::IGNORED, |acc, a| acc.union(a.tag))
    }
}

/// Unwrap an annotated argument, validating compound accesses.
pub fn unwrap_arg(arg: &Arg) -> Result<UnwrappedArg> {
    match arg {
        Arg::Plain(v) => whole(v, AccessTag::IN),
        Arg::In(v) => whole(v, AccessTag::IN),
        Arg::Out(v) => whole(v, AccessTag::OUT),
        Arg::InOut(v) => whole(v, AccessTag::INOUT),
        Arg::Ignored(v) => whole(v, AccessTag::IGNORED),
        Arg::Deps(base, parts) => {
            if matches!(base, ArgValue::Sub(_)) {
                return Err(DepschedError::InvalidAccess(
                    "the base of `Deps` must be a value, not a selector".into(),
                ));
            }
            let mut accesses = Vec::with_capacity(parts.len());
            for part in parts {
                accesses.push(sub_access(part)?);
            }
            Ok(UnwrappedArg {
                value: base.clone(),
                accesses,
            })
        }
    }
}

fn whole(value: &ArgValue, tag: AccessTag) -> Result<UnwrappedArg> {
    if let ArgValue::Sub(selector) = value {
        return Err(DepschedError::InvalidAccess(format!(
            "selector {selector:?} used outside `Deps`"
        )));
    }
    Ok(UnwrappedArg {
        value: value.clone(),
        accesses: vec![Access {
            tag,
            selector: None,
        }],
    })
}

fn sub_access(part: &Arg) -> Result<Access> {
    let (tag, value) = match part {
        Arg::In(v) => (AccessTag::IN, v),
        Arg::Out(v) => (AccessTag::OUT, v),
        Arg::InOut(v) => (AccessTag::INOUT, v),
        other => {
            return Err(DepschedError::InvalidAccess(format!(
                "`Deps` elements must be `In`, `Out` or `InOut`, got {}",
                other.describe()
            )))
        }
    };
    match value {
        ArgValue::Sub(selector) => Ok(Access {
            tag,
            selector: Some(selector.clone()),
        }),
        _ => Err(DepschedError::InvalidAccess(
            "`Deps` elements must wrap a selector".into(),
        )),
    }
}
