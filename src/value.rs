//! The runtime value model shared by the tree-walking evaluator and the bytecode VM.
//!
//! Both engines produce and consume the same [Value] enum so that their observable behavior can be
//! compared statement-for-statement; see SPEC_FULL.md's equivalence property.

use crate::ast::BlockStatement;
use crate::environment::Environment;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use static_assertions::assert_eq_size;

/// FNV-1a offset basis and prime, 64-bit variant. Used to hash [Value]s that appear as hash-literal
/// keys (integers, booleans, strings) into a stable [HashKey].
const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A discriminator distinguishing which [Value] variant a [HashKey] was derived from, so that
/// `1` (integer) and `"1"` (string) never collide even though their digests might.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKeyKind {
    Integer,
    Boolean,
    String,
}

/// The hashable, equality-comparable projection of a [Value] used as a hash-literal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: HashKeyKind,
    pub digest: u64,
}

/// Values that are legal as hash-literal keys implement this to produce their [HashKey].
pub trait Hashable {
    fn hash_key(&self) -> HashKey;
}

/// A function value captured from a [crate::ast::Expression::FunctionLiteral] by the tree-walking
/// evaluator, closing over the [Environment] it was defined in.
#[derive(Debug, Clone)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: Environment,
}

// Functions never compare equal to each other structurally; two closures over the same AST node
// are still distinct values. PartialEq is still required so `Value` as a whole can derive it for
// the variants that *are* structurally comparable (Integer, Boolean, String, Null, Array, Hash).
impl PartialEq for Function {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

/// A compiled function body: bytecode plus the frame layout the VM needs to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A [CompiledFunction] together with the free variables it closed over at the point its
/// `OpClosure` instruction ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// A built-in function: name, arity-checked implementation, shared by both engines.
#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&[Value]) -> Value,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Every kind of runtime value. `Null`/`True`/`False` are not interned singletons (see
/// SPEC_FULL.md §9): since no mutation or identity comparison exists in this language, structural
/// `PartialEq` on plain variants gives the same externally observable behavior as identity
/// comparison would, without needing `rlox`'s unsafe global GC.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Array(Rc<Vec<Value>>),
    Hash(Rc<HashMap<HashKey, (Value, Value)>>),
    /// Wraps a `return`ed value so it can unwind through nested block evaluation without being
    /// mistaken for an ordinary value; unwrapped before being handed back to the caller.
    ReturnWrapper(Rc<Value>),
    /// A runtime error message. Propagates like a `ReturnWrapper` but is never unwrapped — it
    /// terminates evaluation of the whole program.
    Error(Rc<str>),
    Function(Rc<Function>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
}

// Guards against the enum silently growing a fat variant (e.g. an un-Rc'd Vec/String) that would
// bloat every Value on the evaluator's and VM's stacks.
assert_eq_size!(Value, [u8; 24]);

impl Value {
    /// Per the language's truthiness rule: everything is truthy except `false` and `null`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::String(_) => "STRING",
            Value::Null => "NULL",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::ReturnWrapper(_) => "RETURN_VALUE",
            Value::Error(_) => "ERROR",
            Value::Function(_) => "FUNCTION",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION_OBJ",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The raw message of a [Value::Error], without the `ERROR: ` prefix `Display` adds.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Value::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn is_hashable(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Boolean(_) | Value::String(_))
    }

    /// Constructs an [Value::Error] from a formatted message, matching both engines' convention of
    /// surfacing runtime failures as ordinary (if terminal) values rather than panics.
    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::from(message.into()))
    }
}

impl Hashable for Value {
    /// Panics if called on a non-hashable variant; callers must check [Value::is_hashable] first
    /// (both engines do, returning an [Value::Error] otherwise).
    fn hash_key(&self) -> HashKey {
        match self {
            Value::Integer(v) => HashKey {
                kind: HashKeyKind::Integer,
                digest: *v as u64,
            },
            Value::Boolean(v) => HashKey {
                kind: HashKeyKind::Boolean,
                digest: if *v { 1 } else { 0 },
            },
            Value::String(v) => HashKey {
                kind: HashKeyKind::String,
                digest: fnv1a(v.as_bytes()),
            },
            other => unreachable!("{other:?} is not hashable"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                let items: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Hash(pairs) => {
                let mut items: Vec<String> = pairs
                    .values()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect();
                items.sort();
                write!(f, "{{{}}}", items.join(", "))
            }
            Value::ReturnWrapper(v) => write!(f, "{v}"),
            Value::Error(msg) => write!(f, "ERROR: {msg}"),
            Value::Function(func) => {
                write!(f, "fn({}) {{\n{}\n}}", func.parameters.join(", "), func.body)
            }
            Value::CompiledFunction(_) => write!(f, "CompiledFunction[{:p}]", self),
            Value::Closure(_) => write!(f, "Closure[{:p}]", self),
            Value::Builtin(b) => write!(f, "builtin function: {}", b.name),
        }
    }
}
