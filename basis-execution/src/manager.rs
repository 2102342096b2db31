use crate::{error::ExecutionError, interface::VenueInterface};
use basis_instrument::{order::Operation, position::PositionKey, venue::VenueId, Timestamp};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{collections::HashMap, sync::Arc};

fn route_key(venue: &VenueId, operation: Operation) -> (VenueId, SmolStr) {
    (venue.clone(), SmolStr::new(format!("{operation:?}")))
}

/// Pure router from `(venue, operation)` to the `VenueInterface` that should handle it
/// (spec.md §4.9). The routing table is static once built: constructed from the mode's enabled
/// venues at init and never mutated over a request's lifetime.
#[derive(Debug, Clone, Default)]
pub struct VenueInterfaceManager {
    routes: HashMap<(VenueId, SmolStr), Arc<dyn VenueInterface>>,
}

impl VenueInterfaceManager {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register `interface` to handle every operation in `operations` for its venue.
    pub fn register(
        &mut self,
        interface: Arc<dyn VenueInterface>,
        operations: &[Operation],
    ) {
        for &operation in operations {
            self.routes
                .insert(route_key(interface.venue(), operation), interface.clone());
        }
    }

    /// Advance every registered venue to `t`, once per distinct interface (a venue registered
    /// for several operations shares one interface and is only advanced once). Called by the
    /// `Engine` at the start of every full-loop pass, before the strategy or execution layers
    /// touch any venue for `T` (spec.md §4.9).
    pub fn advance_all(&self, t: Timestamp) {
        let mut seen = Vec::new();
        for interface in self.routes.values() {
            if seen.iter().any(|seen: &Arc<dyn VenueInterface>| Arc::ptr_eq(seen, interface)) {
                continue;
            }
            interface.advance_to(t);
            seen.push(interface.clone());
        }
    }

    /// Re-query every registered venue's authoritative balances for the keys it owns (spec.md §9
    /// "live `position_refresh` re-queries ALL venues every tick"). `keys` may span several
    /// venues; each is routed to the interface whose `venue()` it names.
    pub fn query_all_positions(
        &self,
        keys: &[PositionKey],
    ) -> Result<HashMap<PositionKey, Decimal>, ExecutionError> {
        let mut seen: Vec<Arc<dyn VenueInterface>> = Vec::new();
        let mut result = HashMap::new();
        for interface in self.routes.values() {
            if seen.iter().any(|seen| Arc::ptr_eq(seen, interface)) {
                continue;
            }
            seen.push(interface.clone());

            let venue_keys: Vec<PositionKey> = keys
                .iter()
                .filter(|key| &key.venue == interface.venue())
                .cloned()
                .collect();
            if venue_keys.is_empty() {
                continue;
            }
            result.extend(interface.query_positions(&venue_keys)?);
        }
        Ok(result)
    }

    /// Resolve the `VenueInterface` that handles `(venue, operation)`, or
    /// [`ExecutionError::NoVenueConfigured`] if none was registered for it.
    pub fn route(
        &self,
        venue: &VenueId,
        operation: Operation,
    ) -> Result<Arc<dyn VenueInterface>, ExecutionError> {
        self.routes
            .get(&route_key(venue, operation))
            .cloned()
            .ok_or_else(|| ExecutionError::NoVenueConfigured {
                venue: venue.clone(),
                operation: SmolStr::new(format!("{operation:?}")),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_live::MockLiveVenue;
    use basis_instrument::order::Operation;

    #[test]
    fn unregistered_route_is_an_error() {
        let manager = VenueInterfaceManager::new();
        let venue = VenueId::from("binance");
        let err = manager.route(&venue, Operation::SpotTrade).unwrap_err();
        assert!(matches!(err, ExecutionError::NoVenueConfigured { .. }));
    }

    #[test]
    fn registered_route_resolves() {
        let mut manager = VenueInterfaceManager::new();
        let venue = VenueId::from("binance");
        let interface: Arc<dyn VenueInterface> =
            Arc::new(MockLiveVenue::new(venue.clone(), 0, 0));
        manager.register(interface, &[Operation::SpotTrade]);

        assert!(manager.route(&venue, Operation::SpotTrade).is_ok());
        assert!(manager.route(&venue, Operation::PerpTrade).is_err());
    }
}
