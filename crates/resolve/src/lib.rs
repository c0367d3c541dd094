//! Fuzzy entity and relation resolution over extracted triplets.

pub mod merge;
pub mod reconcile;
pub mod similarity;

pub use merge::{
    cluster_by_name, Clustering, EntityMerger, EntityMergerConfig, RelationMerger,
    RelationMergerConfig,
};
pub use reconcile::{ReconcilerConfig, TripletEntityReconciler};
pub use similarity::ratio;
