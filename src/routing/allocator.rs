//! Percentage fan-out
//!
//! Copies every route once per percentage of the configured step grid so
//! the quote fetcher can price each (route, percentage) pair in one
//! batch. Deterministic and order-preserving: routes keep their input
//! order, percentages descend from 100.

use crate::types::Route;
use alloy::primitives::U256;

pub struct RouteQuoteAllocator {
    percentage_step: u32,
}

impl RouteQuoteAllocator {
    pub fn new(percentage_step: u32) -> RouteQuoteAllocator {
        RouteQuoteAllocator { percentage_step }
    }

    /// Fan routes into (route-at-percentage, portioned-amount) pairs.
    pub fn allocate(&self, routes: &[Route], amount: U256) -> Vec<(Route, U256)> {
        let mut out = Vec::with_capacity(routes.len() * (100 / self.percentage_step) as usize);
        for route in routes {
            let mut percentage = 100u32;
            while percentage >= self.percentage_step {
                let portioned = amount * U256::from(percentage) / U256::from(100u32);
                out.push((route.clone().with_percentage(percentage), portioned));
                percentage -= self.percentage_step;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::Chain;
    use crate::types::{Pool, V2Pool};
    use alloy::primitives::Address;

    fn route() -> Route {
        let token0 = Address::repeat_byte(1);
        let token1 = Address::repeat_byte(2);
        Route::new(
            Chain::Mainnet,
            vec![Pool::V2(V2Pool {
                address: Address::repeat_byte(9),
                token0,
                token1,
                reserve0: 1,
                reserve1: 1,
            })],
            token0,
            token1,
        )
    }

    #[test]
    fn test_allocation_grid() {
        let allocator = RouteQuoteAllocator::new(25);
        let pairs = allocator.allocate(&[route()], U256::from(1_000u64));
        let percentages: Vec<u32> = pairs.iter().map(|(r, _)| r.percentage).collect();
        assert_eq!(percentages, vec![100, 75, 50, 25]);
        let amounts: Vec<u64> = pairs.iter().map(|(_, a)| a.to::<u64>()).collect();
        assert_eq!(amounts, vec![1_000, 750, 500, 250]);
    }

    #[test]
    fn test_step_100_yields_single_copy() {
        let allocator = RouteQuoteAllocator::new(100);
        let pairs = allocator.allocate(&[route(), route()], U256::from(10u64));
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(r, _)| r.percentage == 100));
    }
}
