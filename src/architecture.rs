/// The following diagram shows a high level overview of the library and how an application
/// might use it.
///
/// Only [`LimitedStore`](crate::LimitedStore) is expanded to show how its configuration selects
/// a partition of the store.
#[cfg_attr(doc, aquamarine::aquamarine)]
/// ```mermaid
/// graph TB
///     subgraph Social Application
///         api[API layer]
///     end
///     api -- create / increment --> limited_store
///     api -- profiles / follows --> profile_concept
///     api -- labels --> label_concept
///     subgraph Social Concepts
///         subgraph LimitedStore
///             limit_kind[LimitKind]-- config --> limit_config[LimitConfig]
///             limited_store[increment]-- atomic increment_one --> doc_collection
///         end
///         profile_concept[ProfileConcept] --> doc_collection
///         label_concept[LabelConcept] --> doc_collection
///         doc_collection[DocCollection] --> doc_store
///         doc_store>DocStore]
///         memory_store[MemoryStore]-. impl .- doc_store
///         rocksdb_store[RocksDbStore]-. impl .- doc_store
///         rocksdb_store --> rocksdb
///         rocksdb[RocksDB]
///     end
/// ```
///
/// Concepts never talk to each other. An application creates a limited item when it creates the
/// owning entity (a profile, a post-bearing item...) and deletes it alongside the entity.
///
/// The ceiling of a [`LimitKind`](crate::LimitKind) is enforced by the store itself through
/// [`DocStore::increment_one`](crate::DocStore::increment_one): the check and the write cannot be
/// interleaved with another increment of the same item.
pub struct Diagram;
