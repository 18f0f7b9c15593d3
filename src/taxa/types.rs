//! Handle type for tracked taxa.

/// Unique identifier for a taxon within a [`TaxonRegistry`](super::TaxonRegistry).
///
/// TaxonIds are assigned sequentially when a detection is turned into a
/// putative taxon. They replace reference identity: set membership, merge
/// survivors and the added/updated/removed diff all work on ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxonId(pub u64);

impl TaxonId {
    /// Create a new TaxonId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaxonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}
