// Per-scope state container with clone-on-descent semantics

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::hooks::HookStore;
use crate::router::RouteDescriptor;
use crate::scope::ScopeNode;
use crate::serialize::SerializerFn;

/// Capability for user slot values that want a per-scope copy on descent.
///
/// Values without this capability are shared by reference across scopes.
pub trait CloneSlot: Any + Send + Sync {
    fn clone_slot(&self) -> Box<dyn CloneSlot>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Clone + Send + Sync + 'static> CloneSlot for T {
    fn clone_slot(&self) -> Box<dyn CloneSlot> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

enum UserSlot {
    /// Shared by reference on descent.
    Shared(Arc<dyn Any + Send + Sync>),
    /// Cloned through the capability on descent.
    Owned(Box<dyn CloneSlot>),
}

/// A scope recorded in the modules chain.
#[derive(Clone)]
pub struct ModuleRef {
    pub name: String,
    pub(crate) node: Weak<ScopeNode>,
}

impl ModuleRef {
    pub(crate) fn node(&self) -> Option<Arc<ScopeNode>> {
        self.node.upgrade()
    }
}

impl std::fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModuleRef").field(&self.name).finish()
    }
}

/// The per-scope bag of framework state.
///
/// Well-known slots are strongly typed fields; user slots are keyed by
/// `TypeId`. On scope descent each slot follows the clone rules: vectors are
/// duplicated, `CloneSlot` values are cloned through the capability, and
/// everything else is shared by reference.
#[derive(Default)]
pub struct Container {
    hooks: HookStore,
    route_descriptors: Vec<RouteDescriptor>,
    modules_chain: Vec<ModuleRef>,
    serializer: Option<SerializerFn>,
    user: HashMap<TypeId, UserSlot>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the container for a child scope.
    pub fn descend(&self) -> Container {
        let user = self
            .user
            .iter()
            .map(|(id, slot)| {
                let copy = match slot {
                    UserSlot::Shared(value) => UserSlot::Shared(Arc::clone(value)),
                    UserSlot::Owned(value) => {
                        let value: &dyn CloneSlot = value.as_ref();
                        UserSlot::Owned(CloneSlot::clone_slot(value))
                    }
                };
                (*id, copy)
            })
            .collect();

        Container {
            // Hooks attach to the scope that registered them; ancestors are
            // aggregated at dispatch, so a descended scope starts empty.
            hooks: HookStore::new(),
            route_descriptors: self.route_descriptors.clone(),
            modules_chain: self.modules_chain.clone(),
            serializer: self.serializer.clone(),
            user,
        }
    }

    pub fn hooks(&self) -> &HookStore {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookStore {
        &mut self.hooks
    }

    pub fn route_descriptors(&self) -> &[RouteDescriptor] {
        &self.route_descriptors
    }

    pub fn push_descriptor(&mut self, descriptor: RouteDescriptor) {
        self.route_descriptors.push(descriptor);
    }

    pub fn modules_chain(&self) -> &[ModuleRef] {
        &self.modules_chain
    }

    pub(crate) fn push_module(&mut self, module: ModuleRef) {
        self.modules_chain.push(module);
    }

    pub fn serializer(&self) -> Option<SerializerFn> {
        self.serializer.clone()
    }

    pub fn set_serializer(&mut self, serializer: SerializerFn) {
        self.serializer = Some(serializer);
    }

    /// Store a value shared by reference across descents.
    pub fn insert_shared<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.user.insert(TypeId::of::<T>(), UserSlot::Shared(value));
    }

    /// Store a value cloned per scope on descent.
    pub fn insert_owned<T: CloneSlot>(&mut self, value: T) {
        self.user
            .insert(TypeId::of::<T>(), UserSlot::Owned(Box::new(value)));
    }

    pub fn get_shared<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self.user.get(&TypeId::of::<T>())? {
            UserSlot::Shared(value) => value.clone().downcast::<T>().ok(),
            UserSlot::Owned(_) => None,
        }
    }

    pub fn get_owned<T: CloneSlot>(&self) -> Option<&T> {
        match self.user.get(&TypeId::of::<T>())? {
            UserSlot::Owned(value) => {
                let value: &dyn CloneSlot = value.as_ref();
                value.as_any().downcast_ref::<T>()
            }
            UserSlot::Shared(_) => None,
        }
    }

    pub fn get_owned_mut<T: CloneSlot>(&mut self) -> Option<&mut T> {
        match self.user.get_mut(&TypeId::of::<T>())? {
            UserSlot::Owned(value) => value.as_any_mut().downcast_mut::<T>(),
            UserSlot::Shared(_) => None,
        }
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.user.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("hooks", &self.hooks)
            .field("route_descriptors", &self.route_descriptors.len())
            .field("modules_chain", &self.modules_chain)
            .field("user_slots", &self.user.len())
            .finish()
    }
}
