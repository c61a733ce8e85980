//! Engine-owned state and read-only views over it.
//!
//! The engine owns exactly one state value. Guards observe it through a
//! [`StateView`]; only transition mutations ever receive mutable access.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::btree_map::{self, BTreeMap};
use std::fmt::Debug;
use std::ops::Deref;

/// Trait for values an engine can own as its state.
///
/// # Required Traits
///
/// - `Clone`: mutations run against a working copy that is committed on success
/// - `Debug`: state must be debuggable for diagnostics
/// - `Serialize` + `Deserialize`: snapshots can be exported by the embedder
/// - `Send` + `Sync`: an engine is shared between threads
///
/// Any type meeting these bounds is a `State`.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use std::collections::BTreeMap;
///
/// #[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// struct Ballot {
///     votes: BTreeMap<String, u32>,
///     closed: bool,
/// }
///
/// fn assert_state<S: warrant::core::State>() {}
/// assert_state::<Ballot>();
/// ```
pub trait State:
    Clone + Debug + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static
{
}

impl<T> State for T where
    T: Clone + Debug + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static
{
}

/// Read-only projection of engine state handed to guards.
///
/// Dereferences to the underlying state, so guards call the state's own
/// accessors directly. There is no way to obtain `&mut S` from a view.
#[derive(Debug)]
pub struct StateView<'a, S> {
    state: &'a S,
}

impl<'a, S> StateView<'a, S> {
    pub fn new(state: &'a S) -> Self {
        Self { state }
    }

    /// The viewed state, with the view's full lifetime.
    pub fn state(&self) -> &'a S {
        self.state
    }
}

impl<S> Clone for StateView<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for StateView<'_, S> {}

impl<S> Deref for StateView<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.state
    }
}

/// Ordered key to value mapping, the stock state type.
///
/// Keys iterate in order, so snapshots and serialized forms are
/// deterministic.
///
/// # Example
///
/// ```rust
/// use warrant::core::KeyValueState;
///
/// let mut balances: KeyValueState<String, u64> = KeyValueState::new()
///     .with("alice".to_string(), 100);
///
/// balances.update("bob".to_string(), |b| *b += 25);
///
/// assert_eq!(balances.get_or_default("alice"), 100);
/// assert_eq!(balances.get_or_default("bob"), 25);
/// assert_eq!(balances.get_or_default("carol"), 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValueState<K: Ord, V> {
    entries: BTreeMap<K, V>,
}

impl<K: Ord, V> Default for KeyValueState<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> KeyValueState<K, V> {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Builder-style insert, for seeding initial state.
    pub fn with(mut self, key: K, value: V) -> Self {
        self.entries.insert(key, value);
        self
    }

    /// Value for `key`, if present.
    ///
    /// # Example
    ///
    /// ```rust
    /// use warrant::core::KeyValueState;
    ///
    /// let votes = KeyValueState::<String, u64>::new().with("ana".to_string(), 3);
    /// assert_eq!(votes.get("ana"), Some(&3));
    /// assert_eq!(votes.get("bo"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.get(key)
    }

    /// Value for `key`, or `V::default()` when the key is absent.
    pub fn get_or_default<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone + Default,
    {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Whether `key` has a value, default or not.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Set `key` to `value`, returning the previous value if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    /// Remove `key`, returning its value if it had one.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.remove(key)
    }

    /// Apply `f` to the value at `key`, inserting `V::default()` first if absent.
    pub fn update<F>(&mut self, key: K, f: F)
    where
        V: Default,
        F: FnOnce(&mut V),
    {
        f(self.entries.entry(key).or_default());
    }

    /// In-place access to the value at `key`, as with `BTreeMap::entry`.
    pub fn entry(&mut self, key: K) -> btree_map::Entry<'_, K, V> {
        self.entries.entry(key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.entries.iter()
    }

    /// Keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, K, V> {
        self.entries.keys()
    }

    /// Number of keys with a value.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key has a value.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for KeyValueState<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a KeyValueState<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = btree_map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
