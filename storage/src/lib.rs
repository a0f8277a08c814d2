pub mod dense;
pub mod kv;
pub mod row;

pub use dense::{DenseIndex, DenseMatch, IndexError, MemoryDenseIndex};
pub use kv::{KeyValueStore, KvError, MemoryKvStore};
pub use row::{DailyUsage, LexicalHit, MemoryRowStore, RowStore, StoreError};
