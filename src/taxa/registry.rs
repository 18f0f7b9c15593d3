//! Arena of tracked taxa keyed by stable handles.

use std::collections::HashMap;

use super::taxon::CameraTrackedTaxon;
use super::types::TaxonId;

/// Ordered set of taxa.
///
/// Iteration follows insertion order. Removing and re-inserting a taxon
/// moves it to the back, matching "pop from tracked, push back after merge".
#[derive(Debug, Clone, Default)]
pub struct TaxonRegistry {
    order: Vec<TaxonId>,
    taxa: HashMap<TaxonId, CameraTrackedTaxon>,
    next_id: u64,
}

impl TaxonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh handle. Handles are never reused.
    pub fn allocate_id(&mut self) -> TaxonId {
        let id = TaxonId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert under a fresh handle.
    pub fn insert(&mut self, taxon: CameraTrackedTaxon) -> TaxonId {
        let id = self.allocate_id();
        self.insert_with_id(id, taxon);
        id
    }

    /// Insert (or replace) under an existing handle.
    pub fn insert_with_id(&mut self, id: TaxonId, taxon: CameraTrackedTaxon) {
        if self.taxa.insert(id, taxon).is_none() {
            self.order.push(id);
        }
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
    }

    pub fn remove(&mut self, id: TaxonId) -> Option<CameraTrackedTaxon> {
        let taxon = self.taxa.remove(&id)?;
        self.order.retain(|&other| other != id);
        Some(taxon)
    }

    pub fn get(&self, id: TaxonId) -> Option<&CameraTrackedTaxon> {
        self.taxa.get(&id)
    }

    pub fn get_mut(&mut self, id: TaxonId) -> Option<&mut CameraTrackedTaxon> {
        self.taxa.get_mut(&id)
    }

    pub fn contains(&self, id: TaxonId) -> bool {
        self.taxa.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles in iteration order.
    pub fn ids(&self) -> Vec<TaxonId> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaxonId, &CameraTrackedTaxon)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.taxa.get(id).map(|t| (*id, t)))
    }

    /// Owned copy of every taxon, safe to hold across later passes.
    pub fn snapshot(&self) -> Vec<(TaxonId, CameraTrackedTaxon)> {
        self.iter().map(|(id, t)| (id, t.clone())).collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.taxa.clear();
    }
}
