use fxhash::FxBuildHasher;
use indexmap::{IndexMap, IndexSet};

// indexmap gives us deterministic iteration order, which matters for
// collection/document accumulation order.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
pub type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;
