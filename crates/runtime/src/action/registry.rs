//! Action registry
//!
//! Actions register under a unique name. The registry keeps a type-erased
//! handle plus the [`ActionDescriptor`] so tooling can introspect actions
//! without knowing their concrete types; callers that do know the types get
//! the typed action back with [`ActionRegistry::get`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::definition::{ActionDescriptor, BidiAction};
use crate::channel::{InputStream, Responder};
use crate::context::ActionContext;
use crate::error::Result;

/// Anything that can be stored in an [`ActionRegistry`]
pub trait Registrable: Clone + Send + Sync + 'static {
    /// Unique registration name
    fn registry_name(&self) -> &str;

    /// Type descriptors for introspection
    fn registry_descriptor(&self) -> ActionDescriptor;
}

impl<I, O, N, S> Registrable for BidiAction<I, O, N, S>
where
    I: Send + 'static,
    O: Clone + Send + Sync + 'static,
    N: Default + Send + 'static,
    S: Send + 'static,
{
    fn registry_name(&self) -> &str {
        self.name()
    }

    fn registry_descriptor(&self) -> ActionDescriptor {
        self.descriptor().clone()
    }
}

struct Entry {
    descriptor: ActionDescriptor,
    handle: Arc<dyn Any + Send + Sync>,
}

/// Registry of named actions
///
/// Cheap to share behind an `Arc`; registration takes `&self`.
#[derive(Default)]
pub struct ActionRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ActionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under its name
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateAction`] if the name is taken.
    pub fn register<A: Registrable>(&self, action: A) -> std::result::Result<(), RegistryError> {
        let name = action.registry_name().to_string();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(RegistryError::DuplicateAction(name));
        }

        debug!(action = %name, "Registered action");
        entries.insert(
            name,
            Entry {
                descriptor: action.registry_descriptor(),
                handle: Arc::new(action),
            },
        );
        Ok(())
    }

    /// Define a bidirectional action and register it in one step
    ///
    /// # Example
    ///
    /// ```ignore
    /// let registry = ActionRegistry::new();
    /// let echo = registry.define_bidi_action("echo", |_ctx, mut inputs: InputStream<String>, _init: (), out: Responder<String>| async move {
    ///     while let Some(msg) = inputs.next().await {
    ///         out.send(msg).await?;
    ///     }
    ///     Ok(())
    /// })?;
    /// ```
    pub fn define_bidi_action<I, O, N, S, F, Fut>(
        &self,
        name: impl Into<String>,
        worker: F,
    ) -> std::result::Result<BidiAction<I, O, N, S>, RegistryError>
    where
        I: Send + 'static,
        O: Clone + Send + Sync + 'static,
        N: Default + Send + 'static,
        S: Send + 'static,
        F: Fn(ActionContext, InputStream<I>, N, Responder<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let action = BidiAction::new(name, worker);
        self.register(action.clone())?;
        Ok(action)
    }

    /// Look up a registered action by name with its concrete type
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownAction`] if nothing is registered under `name`
    /// - [`RegistryError::TypeMismatch`] if it was registered with another type
    pub fn get<A: Registrable>(&self, name: &str) -> std::result::Result<A, RegistryError> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownAction(name.to_string()))?;

        entry
            .handle
            .downcast_ref::<A>()
            .cloned()
            .ok_or_else(|| RegistryError::TypeMismatch(name.to_string()))
    }

    /// Descriptor of a registered action
    pub fn descriptor(&self, name: &str) -> Option<ActionDescriptor> {
        self.entries.read().get(name).map(|e| e.descriptor.clone())
    }

    /// Check if an action is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered action names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered actions
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name already taken
    #[error("action already registered: {0}")]
    DuplicateAction(String),

    /// Name not registered
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Registered under a different concrete type
    #[error("action {0} is registered with different types")]
    TypeMismatch(String),
}
