//! Persistent, parent-linked execution context.
//!
//! Stages extend the context on the way down the chain. Adding a value never
//! mutates the receiver: it returns a child that shares every ancestor.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::errors::ExecutionError;

struct Node {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
    parent: Option<Arc<Node>>,
}

/// Typed value carrier threaded through the handler chain.
///
/// Lookups walk from the newest value towards the root, so a stage can shadow
/// a facet for every stage after it without affecting those before it.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// Creates an empty root context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a child context carrying `value`; `self` is left unchanged.
    #[must_use]
    pub fn with<T>(&self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            head: Some(Arc::new(Node {
                value: Box::new(value),
                type_name: type_name::<T>(),
                parent: self.head.clone(),
            })),
        }
    }

    /// Nearest value of type `T`, if any stage provided one.
    #[must_use]
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.nodes().find_map(|node| node.value.downcast_ref::<T>())
    }

    /// As [`Context::get`], failing when no value of type `T` exists.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::MissingContext`] naming the requested type.
    pub fn require<T>(&self) -> Result<&T, ExecutionError>
    where
        T: Any + Send + Sync,
    {
        self.get::<T>().ok_or(ExecutionError::MissingContext {
            facet: type_name::<T>(),
        })
    }

    /// Returns `true` when some stage provided a value of type `T`.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: Any + Send + Sync,
    {
        self.get::<T>().is_some()
    }

    /// Number of values between this context and the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes().count()
    }

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(self.head.as_deref(), |node| node.parent.as_deref())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes().map(|node| node.type_name))
            .finish()
    }
}
