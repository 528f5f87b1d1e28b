//! Listing book
//!
//! Listings seen in `DataPublish` events. A listing is recorded once and
//! never changed afterwards.

use parking_lot::RwLock;
use shared_types::{Listing, PublishId};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Default)]
pub struct ListingBook {
    listings: RwLock<BTreeMap<PublishId, Listing>>,
}

impl ListingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `listing`. Returns `false` when its publish id is already known;
    /// the stored listing is left as it was.
    pub fn insert(&self, listing: Listing) -> bool {
        let mut listings = self.listings.write();
        if listings.contains_key(&listing.publish_id) {
            debug!(publish_id = %listing.publish_id, "Listing already recorded");
            return false;
        }
        listings.insert(listing.publish_id.clone(), listing);
        true
    }

    pub fn get(&self, publish_id: &PublishId) -> Option<Listing> {
        self.listings.read().get(publish_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.listings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.read().is_empty()
    }

    /// Every listing, ordered by publish id.
    pub fn all(&self) -> Vec<Listing> {
        self.listings.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Address, U256};

    fn listing(price: u64) -> Listing {
        Listing {
            publish_id: PublishId::from("pub-1"),
            price: U256::from(price),
            seller: Address([3; 20]),
            metadata_ref: "ref".into(),
            proof_refs: vec![],
            verification_required: true,
            published_at: 5,
        }
    }

    #[test]
    fn test_first_listing_wins() {
        let book = ListingBook::new();
        assert!(book.insert(listing(100)));
        assert!(!book.insert(listing(999)));

        let stored = book.get(&PublishId::from("pub-1")).unwrap();
        assert_eq!(stored.price, U256::from(100u64));
        assert_eq!(book.len(), 1);
    }
}
