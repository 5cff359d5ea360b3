//! A small pull-based derivation graph.
//!
//! Source cells ([`State`]) carry a version that moves on every write. Derived
//! nodes remember the dependency versions they last computed from and only
//! recompute when one of them moved. When a recomputed value is equal to the
//! previous one under the node's equality, the previous `Rc` is kept and the
//! node's own version stays put, so nothing downstream observes a change.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use tracing::debug;

pub trait Versioned {
    fn version(&self) -> u64;
}

pub type Dependency = Rc<dyn Versioned>;

struct StateCell<T> {
    label: &'static str,
    value: RefCell<Rc<T>>,
    version: Cell<u64>,
}

impl<T> Versioned for StateCell<T> {
    fn version(&self) -> u64 {
        self.version.get()
    }
}

pub struct State<T> {
    inner: Rc<StateCell<T>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> State<T> {
    pub fn new(label: &'static str, value: T) -> Self {
        Self {
            inner: Rc::new(StateCell {
                label,
                value: RefCell::new(Rc::new(value)),
                version: Cell::new(0),
            }),
        }
    }

    pub fn get(&self) -> Rc<T> {
        Rc::clone(&self.inner.value.borrow())
    }

    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = Rc::new(value);
        let version = self.inner.version.get() + 1;
        self.inner.version.set(version);
        debug!(node = self.inner.label, version, "state written");
    }

    pub fn update<F>(&self, edit: F)
    where
        T: Clone,
        F: FnOnce(&mut T),
    {
        let mut next = T::clone(&self.get());
        edit(&mut next);
        self.set(next);
    }

    pub fn dependency(&self) -> Dependency {
        self.inner.clone()
    }
}

impl<T> Versioned for State<T> {
    fn version(&self) -> u64 {
        self.inner.version.get()
    }
}

struct Memo<T> {
    value: Rc<T>,
    seen: Vec<u64>,
}

type Compute<T> = Box<dyn Fn() -> T>;
type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

struct DerivedCell<T> {
    label: &'static str,
    deps: Vec<Dependency>,
    compute: Compute<T>,
    equals: Equality<T>,
    memo: RefCell<Option<Memo<T>>>,
    version: Cell<u64>,
}

impl<T> DerivedCell<T> {
    fn refresh(&self) -> Rc<T> {
        let current: Vec<u64> = self.deps.iter().map(|dep| dep.version()).collect();

        if let Some(memo) = self.memo.borrow().as_ref()
            && memo.seen == current
        {
            return Rc::clone(&memo.value);
        }

        // The borrow is released before computing: `compute` may read nodes
        // that share this cell's dependencies.
        let next = (self.compute)();

        let mut memo = self.memo.borrow_mut();
        if let Some(previous) = memo.as_mut()
            && (self.equals)(&next, &previous.value)
        {
            previous.seen = current;
            return Rc::clone(&previous.value);
        }

        let value = Rc::new(next);
        *memo = Some(Memo {
            value: Rc::clone(&value),
            seen: current,
        });
        let version = self.version.get() + 1;
        self.version.set(version);
        debug!(node = self.label, version, "derived value changed");
        value
    }
}

impl<T> Versioned for DerivedCell<T> {
    fn version(&self) -> u64 {
        self.refresh();
        self.version.get()
    }
}

pub struct Derived<T> {
    inner: Rc<DerivedCell<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Derived<T> {
    /// A derived node that propagates every recompute.
    pub fn new<F>(label: &'static str, deps: Vec<Dependency>, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::memoized(label, deps, compute, |_, _| false)
    }

    /// A derived node that keeps its previous value whenever `equals(next,
    /// previous)` holds.
    pub fn memoized<F, E>(label: &'static str, deps: Vec<Dependency>, compute: F, equals: E) -> Self
    where
        F: Fn() -> T + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            inner: Rc::new(DerivedCell {
                label,
                deps,
                compute: Box::new(compute),
                equals: Box::new(equals),
                memo: RefCell::new(None),
                version: Cell::new(0),
            }),
        }
    }

    pub fn get(&self) -> Rc<T> {
        self.inner.refresh()
    }

    pub fn dependency(&self) -> Dependency {
        self.inner.clone()
    }
}

impl<T> Versioned for Derived<T> {
    fn version(&self) -> u64 {
        self.inner.version()
    }
}

/// A derived node with a write path back into its sources.
pub struct Lens<T> {
    node: Derived<T>,
    setter: Rc<dyn Fn(T)>,
}

impl<T> Clone for Lens<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            setter: Rc::clone(&self.setter),
        }
    }
}

impl<T: 'static> Lens<T> {
    pub fn new<S>(node: Derived<T>, setter: S) -> Self
    where
        S: Fn(T) + 'static,
    {
        Self {
            node,
            setter: Rc::new(setter),
        }
    }

    pub fn get(&self) -> Rc<T> {
        self.node.get()
    }

    pub fn set(&self, value: T) {
        (self.setter)(value);
    }

    pub fn update<F>(&self, edit: F)
    where
        T: Clone,
        F: FnOnce(&mut T),
    {
        let mut next = T::clone(&self.get());
        edit(&mut next);
        self.set(next);
    }

    pub fn node(&self) -> &Derived<T> {
        &self.node
    }

    pub fn dependency(&self) -> Dependency {
        self.node.dependency()
    }
}

impl<T> Versioned for Lens<T> {
    fn version(&self) -> u64 {
        self.node.version()
    }
}

type Factory<K, T> = Rc<dyn Fn(&K) -> Derived<T>>;

/// Keyed derived nodes with one memo slot per key.
///
/// Slots are created on first access and live as long as the family.
pub struct Family<K, T> {
    factory: Factory<K, T>,
    slots: RefCell<HashMap<K, Derived<T>>>,
}

impl<K, T> Family<K, T>
where
    K: Eq + Hash + Clone,
    T: 'static,
{
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&K) -> Derived<T> + 'static,
    {
        Self {
            factory: Rc::new(factory),
            slots: RefCell::new(HashMap::new()),
        }
    }

    pub fn node(&self, key: &K) -> Derived<T> {
        if let Some(node) = self.slots.borrow().get(key) {
            return node.clone();
        }

        let node = (self.factory)(key);
        self.slots.borrow_mut().insert(key.clone(), node.clone());
        node
    }

    pub fn get(&self, key: &K) -> Rc<T> {
        self.node(key).get()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.borrow().len()
    }
}

pub struct LensFamily<K, T> {
    family: Family<K, T>,
    setter: Rc<dyn Fn(&K, T)>,
}

impl<K, T> LensFamily<K, T>
where
    K: Eq + Hash + Clone,
    T: 'static,
{
    pub fn new<F, S>(factory: F, setter: S) -> Self
    where
        F: Fn(&K) -> Derived<T> + 'static,
        S: Fn(&K, T) + 'static,
    {
        Self {
            family: Family::new(factory),
            setter: Rc::new(setter),
        }
    }

    pub fn node(&self, key: &K) -> Derived<T> {
        self.family.node(key)
    }

    pub fn get(&self, key: &K) -> Rc<T> {
        self.family.get(key)
    }

    pub fn set(&self, key: &K, value: T) {
        (self.setter)(key, value);
    }

    pub fn slot_count(&self) -> usize {
        self.family.slot_count()
    }
}

/// Remembers the last version a consumer observed on some node.
#[derive(Debug, Default)]
pub struct Tracker {
    seen: Cell<Option<u64>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports whether `node` moved since the previous call and records its
    /// current version. The first call always reports a change.
    pub fn changed(&self, node: &dyn Versioned) -> bool {
        let version = node.version();
        let changed = self.seen.get() != Some(version);
        self.seen.set(Some(version));
        changed
    }
}
