use crate::context::DustBalance;
use basis_instrument::{order::{Operation, Order, OrderType, Side}, position::PositionMap};
use rust_decimal::Decimal;
use smol_str::SmolStr;

/// Any non-share-class, non-asset, non-LST token above `dust_delta` (spec.md §4.8 "Order
/// emission rules"). `exempt_symbols` is the share class plus the mode's primary asset and LST
/// symbols, which are never dust regardless of balance.
pub fn find_dust(
    positions: &PositionMap,
    dust_delta: Decimal,
    exempt_symbols: &[SmolStr],
) -> Vec<DustBalance> {
    positions
        .iter()
        .filter(|(key, amount)| {
            amount.abs() > dust_delta && !exempt_symbols.iter().any(|s| s == &key.symbol)
        })
        .map(|(key, amount)| DustBalance {
            symbol: key.symbol.clone(),
            venue: key.venue.clone(),
            amount: *amount,
        })
        .collect()
}

/// Build the `sell_dust` orders for the given dust balances. Prioritized ahead of normal
/// rebalancing orders by the caller (these are prepended to the returned order list).
pub fn sell_dust_orders(dust: &[DustBalance]) -> Vec<Order> {
    dust.iter()
        .map(|balance| {
            let mut order = Order::new(
                balance.venue.clone(),
                Operation::SpotTrade,
                balance.amount.abs(),
                OrderType::Market,
            );
            order.pair = Some(balance.symbol.clone());
            order.side = Some(if balance.amount.is_sign_positive() {
                Side::Sell
            } else {
                Side::Buy
            });
            order
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_instrument::{
        position::{PositionKey, PositionType},
        venue::VenueId,
    };
    use rust_decimal_macros::dec;

    #[test]
    fn flags_small_non_exempt_balance_as_dust() {
        let mut positions = PositionMap::new();
        positions.insert(
            PositionKey::new(VenueId::from("binance"), PositionType::Spot, "DOGE"),
            dec!(50),
        );
        positions.insert(
            PositionKey::new(VenueId::from("binance"), PositionType::Spot, "USDT"),
            dec!(1000),
        );

        let dust = find_dust(&positions, dec!(1), &[SmolStr::new("USDT")]);
        assert_eq!(dust.len(), 1);
        assert_eq!(dust[0].symbol.as_str(), "DOGE");
    }

    #[test]
    fn sell_dust_orders_sell_positive_balances() {
        let dust = vec![DustBalance {
            symbol: SmolStr::new("DOGE"),
            venue: VenueId::from("binance"),
            amount: dec!(50),
        }];
        let orders = sell_dust_orders(&dust);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Some(Side::Sell));
    }
}
