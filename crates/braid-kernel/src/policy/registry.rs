//! Policy registry: look up selection algorithms by name.

use std::collections::HashMap;

use super::algorithms as alg;
use super::{Category, Policy, SelectFn};

/// The three flavours of one named policy.
#[derive(Clone, Copy)]
pub struct PolicyFamily {
    pub search: SelectFn,
    pub create: SelectFn,
    pub action: SelectFn,
}

impl PolicyFamily {
    fn get(&self, category: Category) -> SelectFn {
        match category {
            Category::Search => self.search,
            Category::Create => self.create,
            Category::Action => self.action,
        }
    }
}

/// Registry of available policies.
#[derive(Default, Clone)]
pub struct PolicyRegistry {
    families: HashMap<&'static str, PolicyFamily>,
}

impl PolicyRegistry {
    /// A registry with no policies; `builtin` is what configs normally use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in policy.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "ff",
            PolicyFamily {
                search: alg::ff_search,
                create: alg::ff_create,
                action: alg::ff_action,
            },
        );
        registry.register(
            "all",
            PolicyFamily {
                search: alg::ff_search,
                create: alg::all_create,
                action: alg::all_action,
            },
        );
        registry.register(
            "epff",
            PolicyFamily {
                search: alg::ff_search,
                create: alg::epff_create,
                action: alg::ff_action,
            },
        );
        registry.register(
            "epall",
            PolicyFamily {
                search: alg::epall_search,
                create: alg::epall_create,
                action: alg::all_action,
            },
        );
        registry.register(
            "mfs",
            PolicyFamily {
                search: alg::mfs_search,
                create: alg::mfs_create,
                action: alg::mfs_action,
            },
        );
        registry.register(
            "epmfs",
            PolicyFamily {
                search: alg::mfs_search,
                create: alg::epmfs_create,
                action: alg::mfs_action,
            },
        );
        registry.register(
            "lfs",
            PolicyFamily {
                search: alg::lfs_search,
                create: alg::lfs_create,
                action: alg::lfs_action,
            },
        );
        registry.register(
            "newest",
            PolicyFamily {
                search: alg::newest_search,
                create: alg::newest_create,
                action: alg::newest_action,
            },
        );
        registry
    }

    /// Register a policy, replacing any existing one with the same name.
    pub fn register(&mut self, name: &'static str, family: PolicyFamily) {
        self.families.insert(name, family);
    }

    /// The policy called `name`, in the flavour for `category`.
    pub fn get(&self, name: &str, category: Category) -> Option<Policy> {
        self.families
            .get_key_value(name)
            .map(|(&name, family)| Policy::new(name, category, family.get(category)))
    }

    /// True if `name` names a policy family, whatever the category.
    pub fn contains(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    /// Every policy name, sorted so listings are stable.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.families.keys().copied().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.names())
            .finish()
    }
}
