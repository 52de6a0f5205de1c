/// Filter capability trait, shared filter state, and the deferred task queue.
pub mod base;
/// Built-in shader filters.
pub mod effects;
/// Ordered filter composites with copy-on-write chain snapshots.
pub mod group;
