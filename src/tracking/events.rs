//! Taxon change events and their fan-out to subscribers.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::taxa::{CameraTrackedTaxon, TaxonId};

/// Payload of every event: the handle and a copy of the taxon at emission.
#[derive(Debug, Clone)]
pub struct TaxonEventData {
    pub id: TaxonId,
    pub taxon: CameraTrackedTaxon,
}

#[derive(Debug, Clone)]
pub enum TaxonEvent {
    Added(TaxonEventData),
    Updated(TaxonEventData),
    Removed(TaxonEventData),
}

impl TaxonEvent {
    pub fn id(&self) -> TaxonId {
        self.data().id
    }

    pub fn data(&self) -> &TaxonEventData {
        match self {
            Self::Added(data) | Self::Updated(data) | Self::Removed(data) => data,
        }
    }

    pub fn taxon(&self) -> &CameraTrackedTaxon {
        &self.data().taxon
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Updated(_) => "updated",
            Self::Removed(_) => "removed",
        }
    }
}

/// Fan-out to any number of channel subscribers.
///
/// Subscribers whose receiver was dropped are forgotten on the next publish.
#[derive(Debug, Default)]
pub struct EventHub {
    senders: Vec<Sender<TaxonEvent>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<TaxonEvent> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }

    /// Deliver events in order to every live subscriber.
    pub fn publish(&mut self, events: &[TaxonEvent]) {
        if events.is_empty() {
            return;
        }
        self.senders
            .retain(|tx| events.iter().all(|event| tx.send(event.clone()).is_ok()));
    }
}
