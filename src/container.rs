//! Dependency-injection registry.
//!
//! A [`Container`] maps string aliases to values. It is built during boot and
//! read during request handling; the router, the registry helpers and the
//! kernel all take it by `Arc` so tests can build as many isolated
//! applications as they like.
//!
//! Aliases are plain strings. Middleware, interceptors, terminators and
//! controllers live under fixed namespaces (`App/Middleware/<name>`, …) so a
//! route can refer to them by short name.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::Error;

/// A type-erased container value.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Container) -> Instance + Send + Sync>;

#[derive(Clone)]
enum Binding {
    Instance(Instance),
    Singleton { factory: Factory, cell: Arc<OnceLock<Instance>> },
    Transient(Factory),
}

/// The process-wide (but explicitly passed) registry of named values.
#[derive(Default)]
pub struct Container {
    bindings: RwLock<HashMap<String, Binding>>,
}

impl Container {
    pub fn new() -> Self { Self::default() }

    /// Binds an already-built value.
    pub fn register_instance<T>(&self, alias: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.bind(alias.into(), Binding::Instance(Arc::new(value)));
    }

    /// Binds a constructor that runs once, on first resolution.
    pub fn register_singleton<T, F>(&self, alias: impl Into<String>, ctor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.bind(alias.into(), Binding::Singleton {
            factory: erase(ctor),
            cell: Arc::new(OnceLock::new()),
        });
    }

    /// Binds a constructor that runs on every resolution.
    pub fn register_transient<T, F>(&self, alias: impl Into<String>, ctor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        self.bind(alias.into(), Binding::Transient(erase(ctor)));
    }

    pub fn has_registration(&self, alias: &str) -> bool {
        self.bindings.read().contains_key(alias)
    }

    /// Resolves `alias` without checking its type. `None` when unbound.
    pub fn resolve_any(&self, alias: &str) -> Option<Instance> {
        // Clone the binding out so constructors may resolve their own
        // dependencies without re-entering the lock.
        let binding = self.bindings.read().get(alias).cloned()?;
        Some(match binding {
            Binding::Instance(value) => value,
            Binding::Singleton { factory, cell } => Arc::clone(cell.get_or_init(|| factory(self))),
            Binding::Transient(factory) => factory(self),
        })
    }

    /// Resolves `alias` as a `T`. `Ok(None)` when unbound, an error when the
    /// binding holds some other type.
    pub fn resolve<T>(&self, alias: &str) -> Result<Option<Arc<T>>, Error>
    where
        T: Send + Sync + 'static,
    {
        let Some(value) = self.resolve_any(alias) else {
            return Ok(None);
        };
        value.downcast::<T>().map(Some).map_err(|_| Error::BindingType {
            alias: alias.to_owned(),
            expected: type_name::<T>(),
        })
    }

    /// Removes one binding. Returns whether it existed.
    pub fn forget(&self, alias: &str) -> bool {
        self.bindings.write().remove(alias).is_some()
    }

    /// Drops every binding.
    pub fn clear(&self) {
        self.bindings.write().clear();
    }

    /// Every bound alias, sorted.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<_> = self.bindings.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    fn bind(&self, alias: String, binding: Binding) {
        if self.bindings.write().insert(alias.clone(), binding).is_some() {
            tracing::debug!(alias = %alias, "container binding replaced");
        }
    }
}

fn erase<T, F>(ctor: F) -> Factory
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> T + Send + Sync + 'static,
{
    Arc::new(move |container| Arc::new(ctor(container)) as Instance)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn singletons_construct_once() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container.register_singleton("App/Clock", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            42_u32
        });

        assert_eq!(*container.resolve::<u32>("App/Clock").unwrap().unwrap(), 42);
        assert_eq!(*container.resolve::<u32>("App/Clock").unwrap().unwrap(), 42);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transients_construct_every_time() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container.register_transient("App/Id", move |_| counter.fetch_add(1, Ordering::SeqCst));

        let first = container.resolve::<usize>("App/Id").unwrap().unwrap();
        let second = container.resolve::<usize>("App/Id").unwrap().unwrap();
        assert_ne!(*first, *second);
    }

    #[test]
    fn constructors_can_resolve_dependencies() {
        let container = Container::new();
        container.register_instance("App/Prefix", String::from("v1"));
        container.register_singleton("App/Greeting", |c: &Container| {
            let prefix = c.resolve::<String>("App/Prefix").ok().flatten();
            format!("{}-hello", prefix.as_deref().map_or("", String::as_str))
        });
        let greeting = container.resolve::<String>("App/Greeting").unwrap().unwrap();
        assert_eq!(greeting.as_str(), "v1-hello");
    }

    #[test]
    fn wrong_type_is_an_error_and_unbound_is_none() {
        let container = Container::new();
        container.register_instance("App/Name", String::from("x"));
        assert!(matches!(
            container.resolve::<u8>("App/Name"),
            Err(Error::BindingType { .. })
        ));
        assert!(container.resolve::<u8>("App/Missing").unwrap().is_none());
    }

    #[test]
    fn forget_and_clear_tear_down() {
        let container = Container::new();
        container.register_instance("a", 1_u8);
        container.register_instance("b", 2_u8);
        assert!(container.forget("a"));
        assert!(!container.has_registration("a"));
        container.clear();
        assert!(container.aliases().is_empty());
    }
}
