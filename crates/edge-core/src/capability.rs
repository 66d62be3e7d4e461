//! Typed per-request capability registry.

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a context token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TokenId(u64);

/// Typed key for exactly one capability slot.
///
/// Tokens are lookup keys only: they hold no value and are meant to be created
/// once per process (usually behind a `LazyLock`). A `ContextToken<T>` can only
/// ever bind a value of type `T`, so reads never need a runtime type check that
/// can fail.
pub struct ContextToken<T> {
    id: TokenId,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ContextToken<T> {
    /// Create a new token. Every call yields a distinct key, even for the same name.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            _marker: PhantomData,
        }
    }
}

impl<T> ContextToken<T> {
    /// Name used in errors and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for ContextToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextToken")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .finish()
    }
}

/// Wiring errors raised by the capability registry.
///
/// Both variants mean the dispatcher and the code reading the registry disagree
/// about what a request provides. They are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("capability `{0}` is not bound for this request")]
    Unbound(&'static str),

    #[error("capability `{0}` is already bound for this request")]
    DuplicateBinding(&'static str),
}

struct Slot {
    name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

/// Per-request mapping from context token to capability value.
///
/// Created fresh for each request, populated once per token by the dispatcher,
/// then shared read-only (behind an `Arc`) with the render pipeline. It is
/// dropped when the last holder, usually the streaming task, finishes.
#[derive(Default)]
pub struct CapabilityRegistry {
    slots: HashMap<TokenId, Slot>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `token`. Tokens are single-assignment per registry.
    pub fn set<T: Send + Sync + 'static>(
        &mut self,
        token: &ContextToken<T>,
        value: T,
    ) -> Result<(), CapabilityError> {
        match self.slots.entry(token.id) {
            Entry::Occupied(_) => Err(CapabilityError::DuplicateBinding(token.name)),
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    name: token.name,
                    value: Box::new(value),
                });
                Ok(())
            }
        }
    }

    /// Read a required capability.
    ///
    /// An `Unbound` error here is a wiring bug: the dispatcher did not provide
    /// something the caller depends on.
    pub fn get<T: 'static>(&self, token: &ContextToken<T>) -> Result<&T, CapabilityError> {
        self.try_get(token)
            .ok_or(CapabilityError::Unbound(token.name))
    }

    /// Read an optional capability, `None` when the deployment does not provide it.
    pub fn try_get<T: 'static>(&self, token: &ContextToken<T>) -> Option<&T> {
        self.slots
            .get(&token.id)
            .and_then(|slot| slot.value.downcast_ref::<T>())
    }

    /// Check whether a token has been bound.
    pub fn contains<T>(&self, token: &ContextToken<T>) -> bool {
        self.slots.contains_key(&token.id)
    }

    /// Number of bound capabilities.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing has been bound yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names of the bound capabilities, sorted.
    pub fn bound_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.values().map(|s| s.name).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("bound", &self.bound_names())
            .finish()
    }
}
