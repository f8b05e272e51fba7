//! Wire Budget Tracker.
//!
//! The sum of every wire's detailed-path length may never exceed the
//! level's ceiling. Lengths are always recomputed from the live geometry.

use crate::{
    error::EditError,
    geometry,
    network::Network,
    types::ConnectionId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBudget {
    ceiling: f64,
}

impl WireBudget {
    pub fn new(ceiling: f64) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Total wire length, optionally leaving one connection out.
    pub fn total(&self, network: &Network, excluded: Option<ConnectionId>) -> f64 {
        network
            .connections()
            .filter(|c| Some(c.id) != excluded)
            .map(|c| geometry::polyline_length(&network.path_of(c)))
            .sum()
    }

    pub fn remaining(&self, network: &Network) -> f64 {
        self.ceiling - self.total(network, None)
    }

    /// Exactly reaching the ceiling is allowed.
    pub fn check(
        &self,
        network: &Network,
        additional: f64,
        excluded: Option<ConnectionId>,
    ) -> Result<(), EditError> {
        let total = self.total(network, excluded) + additional;
        if total <= self.ceiling {
            Ok(())
        } else {
            Err(EditError::WireBudgetExceeded { total, ceiling: self.ceiling })
        }
    }
}
