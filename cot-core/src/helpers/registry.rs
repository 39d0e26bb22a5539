//! Name-keyed registries of helpers and package managers.
//!
//! A registry builds an entry the first time its name is asked for and hands
//! out the same shared instance for the rest of its life. Entries are never
//! removed, so cached discovery and version results live as long as the
//! registry does.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, warn};

use super::catalog::HelperCatalog;
use super::helper::{Confirm, Helper};
use super::package_manager::PackageManager;

/// Something a [`Registry`] can key by name.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for Helper {
    fn name(&self) -> &str {
        Helper::name(self)
    }
}

impl Named for PackageManager {
    fn name(&self) -> &str {
        PackageManager::name(self)
    }
}

type Factory<T> = Box<dyn Fn(&str) -> T + Send + Sync>;

/// Lazily populated, name-keyed collection of shared entries.
pub struct Registry<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
    factory: Factory<T>,
}

pub type HelperRegistry = Registry<Helper>;
pub type PackageManagerRegistry = Registry<PackageManager>;

impl<T: Named> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

impl<T: Named> Registry<T> {
    /// Creates an empty registry that builds entries with `factory`.
    ///
    /// The factory runs with the registry locked and must not look up entries
    /// in the same registry.
    pub fn new(factory: impl Fn(&str) -> T + Send + Sync + 'static) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Registry lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Returns the entry for `name`, building it on first request.
    pub fn get(&self, name: &str) -> Arc<T> {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(name) {
            return Arc::clone(entry);
        }
        debug!("Creating registry entry for '{}'", name);
        let entry = Arc::new((self.factory)(name));
        entries.insert(name.to_string(), Arc::clone(&entry));
        entry
    }

    /// Adds a pre-built entry under its own name.
    ///
    /// An existing entry wins; the one actually stored is returned.
    pub fn register(&self, entry: T) -> Arc<T> {
        let mut entries = self.lock();
        Arc::clone(
            entries
                .entry(entry.name().to_string())
                .or_insert_with(|| Arc::new(entry)),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Names of all entries built so far, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Registry<PackageManager> {
    /// Registry of package managers, searching `search_path` if given.
    pub fn for_package_managers(search_path: Option<OsString>) -> Self {
        Self::new(move |name| {
            let manager = PackageManager::new(name);
            match &search_path {
                Some(path) => manager.with_search_path(path.clone()),
                None => manager,
            }
        })
    }
}

impl Registry<Helper> {
    /// Registry of helpers built from `catalog` definitions.
    ///
    /// Every helper can install itself through `package_managers` and asks
    /// `confirm` (if any) first. Names missing from the catalog get a bare
    /// definition.
    pub fn for_helpers(
        catalog: HelperCatalog,
        package_managers: Arc<PackageManagerRegistry>,
        confirm: Option<Arc<dyn Confirm>>,
    ) -> Self {
        Self::new(move |name| {
            Helper::new(catalog.definition(name))
                .with_package_managers(Arc::clone(&package_managers))
                .with_confirm(confirm.clone())
        })
    }
}

/// The process-wide package manager registry.
pub fn package_managers() -> Arc<PackageManagerRegistry> {
    static PACKAGE_MANAGERS: OnceLock<Arc<PackageManagerRegistry>> = OnceLock::new();
    Arc::clone(
        PACKAGE_MANAGERS.get_or_init(|| Arc::new(PackageManagerRegistry::for_package_managers(None))),
    )
}

/// The process-wide helper registry.
///
/// Built from [`HelperCatalog::load`] on first use. Helpers in it never ask
/// before installing; callers that want a prompt build their own registry
/// with [`Registry::for_helpers`].
pub fn helpers() -> &'static HelperRegistry {
    static HELPERS: OnceLock<HelperRegistry> = OnceLock::new();
    HELPERS.get_or_init(|| {
        let catalog = HelperCatalog::load().unwrap_or_else(|e| {
            warn!("Failed to load helper catalog, using built-in definitions: {:#}", e);
            HelperCatalog::builtin()
        });
        HelperRegistry::for_helpers(catalog, package_managers(), None)
    })
}
