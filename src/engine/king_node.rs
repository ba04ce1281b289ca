//! # engine::king_node
//!
//! Derive the [`KingNode`] from an options chain snapshot:
//!
//! 1. Sum open interest per strike (calls + puts, all expiries in the snapshot)
//! 2. King strike = strike with the largest total OI (ties → nearest to price)
//! 3. Wall type   = side with more OI on that strike (tie → CALL_WALL)
//! 4. Strength    = strike OI / chain OI × 100

use std::collections::BTreeMap;

use crate::models::{ContractType, KingNode, OptionContract, WallType};

#[derive(Debug, Default, Clone, Copy)]
struct StrikeOi {
    call: f64,
    put:  f64,
}

impl StrikeOi {
    fn total(&self) -> f64 {
        self.call + self.put
    }
}

/// Strike prices keyed in hundredths so `f64` strikes group exactly.
fn strike_key(strike: f64) -> i64 {
    (strike * 100.0).round() as i64
}

/// `None` when the chain carries no usable open interest.
pub fn derive_king_node(chain: &[OptionContract], price: f64) -> Option<KingNode> {
    let mut by_strike: BTreeMap<i64, StrikeOi> = BTreeMap::new();
    let mut chain_total = 0.0;

    for c in chain {
        if !c.strike.is_finite() || !c.open_interest.is_finite() || c.open_interest <= 0.0 {
            continue;
        }
        let entry = by_strike.entry(strike_key(c.strike)).or_default();
        match c.contract_type {
            ContractType::Call => entry.call += c.open_interest,
            ContractType::Put  => entry.put  += c.open_interest,
        }
        chain_total += c.open_interest;
    }

    if chain_total <= 0.0 {
        return None;
    }

    let (key, oi) = by_strike.iter().max_by(|(ka, a), (kb, b)| {
        a.total()
            .total_cmp(&b.total())
            // on equal OI prefer the strike closer to price (max_by keeps the "greater")
            .then_with(|| {
                let da = (**ka as f64 / 100.0 - price).abs();
                let db = (**kb as f64 / 100.0 - price).abs();
                db.total_cmp(&da)
            })
    })?;

    let wall = if oi.put > oi.call { WallType::PutWall } else { WallType::CallWall };

    Some(KingNode {
        strike:   *key as f64 / 100.0,
        wall,
        strength: oi.total() / chain_total * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(strike: f64, contract_type: ContractType, oi: f64) -> OptionContract {
        OptionContract { strike, contract_type, open_interest: oi, volume: 0.0 }
    }

    #[test]
    fn test_picks_largest_total_oi() {
        let chain = vec![
            contract(5800.0, ContractType::Call, 4000.0),
            contract(5800.0, ContractType::Put, 1000.0),
            contract(5750.0, ContractType::Put, 3000.0),
            contract(5850.0, ContractType::Call, 2000.0),
        ];
        let node = derive_king_node(&chain, 5790.0).unwrap();
        assert_eq!(node.strike, 5800.0);
        assert_eq!(node.wall, WallType::CallWall);
        assert!((node.strength - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_put_dominated_strike_is_put_wall() {
        let chain = vec![
            contract(445.0, ContractType::Put, 9000.0),
            contract(445.0, ContractType::Call, 1000.0),
            contract(450.0, ContractType::Call, 2000.0),
        ];
        let node = derive_king_node(&chain, 448.0).unwrap();
        assert_eq!(node.strike, 445.0);
        assert_eq!(node.wall, WallType::PutWall);
    }

    #[test]
    fn test_ties_prefer_nearest_strike() {
        let chain = vec![
            contract(440.0, ContractType::Call, 500.0),
            contract(450.0, ContractType::Call, 500.0),
        ];
        assert_eq!(derive_king_node(&chain, 449.0).unwrap().strike, 450.0);
        assert_eq!(derive_king_node(&chain, 441.0).unwrap().strike, 440.0);
    }

    #[test]
    fn test_empty_or_zero_oi_chain() {
        assert!(derive_king_node(&[], 100.0).is_none());
        let chain = vec![contract(100.0, ContractType::Call, 0.0), contract(f64::NAN, ContractType::Put, 10.0)];
        assert!(derive_king_node(&chain, 100.0).is_none());
    }

    #[test]
    fn test_fractional_strikes_group() {
        let chain = vec![
            contract(212.5, ContractType::Call, 100.0),
            contract(212.5, ContractType::Put, 300.0),
            contract(213.0, ContractType::Call, 350.0),
        ];
        let node = derive_king_node(&chain, 212.0).unwrap();
        assert_eq!(node.strike, 212.5);
        assert_eq!(node.wall, WallType::PutWall);
    }
}
