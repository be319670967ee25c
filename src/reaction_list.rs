//! Per-compartment reaction catalogue and propensity bookkeeping
//! (`original_source`'s `ReactionsWithSameRateAndLHS`/`ReactionList`).

use crate::error::{Error, Result};
use crate::reaction::{ReactionEquation, ReactionSide};
use crate::species::Species;

/// A group of reactions sharing an identical LHS and rate constant, with
/// one or more alternative RHS (spec §4.2's "Group").
#[derive(Debug, Clone)]
pub struct ReactionsWithSameRateAndLHS {
    pub lhs: ReactionSide,
    pub rate: f64,
    pub all_rhs: Vec<ReactionSide>,
}

impl ReactionsWithSameRateAndLHS {
    pub fn new(rate: f64, lhs: ReactionSide, rhs: ReactionSide) -> Self {
        ReactionsWithSameRateAndLHS {
            lhs,
            rate,
            all_rhs: vec![rhs],
        }
    }

    pub fn add_if_same_lhs(&mut self, rate: f64, lhs: &ReactionSide, rhs: ReactionSide) -> bool {
        if self.lhs == *lhs && self.rate == rate {
            self.all_rhs.push(rhs);
            true
        } else {
            false
        }
    }

    pub fn size(&self) -> usize {
        self.all_rhs.len()
    }

    /// `rate · ∏ C(n_i, m_i)` over the LHS components, i.e. the
    /// combinatorial count of available reactant tuples times the rate
    /// constant, times the number of equally-likely RHS alternatives
    /// (spec §4.2: "Picking a specific RHS within the group is uniform by
    /// default weighted by the number of alternatives").
    pub fn propensity(&self, species: &[Species]) -> f64 {
        let combinatorial: u64 = self
            .lhs
            .components
            .iter()
            .map(|c| {
                let n = match c.compartment.owned_index() {
                    Some(i) => species[c.species].copy_numbers[i].max(0) as u64,
                    // A ghost LHS component's copy number is owned by an
                    // external collaborator; this crate has no visibility
                    // into it and treats it as always present (count 1 for
                    // a unimolecular ghost source), matching the one-sided
                    // jump semantics of `set_ghost_cell_interface`.
                    None => 1,
                };
                crate::reaction::binomial(n, c.multiplicity)
            })
            .product();
        self.rate * combinatorial as f64
    }

    /// Picks one of the group's RHS alternatives uniformly at random.
    pub fn pick_random_rhs(&self, u: f64) -> &ReactionSide {
        let idx = ((u * self.all_rhs.len() as f64) as usize).min(self.all_rhs.len() - 1);
        &self.all_rhs[idx]
    }
}

/// The per-compartment catalogue of reaction groups plus cached
/// propensities (spec §4.2 / §3's `ReactionList`).
#[derive(Debug, Clone, Default)]
pub struct ReactionList {
    groups: Vec<ReactionsWithSameRateAndLHS>,
    propensities: Vec<f64>,
    total_propensity: f64,
}

impl ReactionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.groups.len()
    }

    pub fn get_propensity(&self) -> f64 {
        self.total_propensity
    }

    pub fn inv_total_propensity(&self) -> Option<f64> {
        if self.total_propensity > 0.0 {
            Some(1.0 / self.total_propensity)
        } else {
            None
        }
    }

    /// If an existing group shares the LHS and rate, appends to it;
    /// otherwise creates a new group (spec §4.2). `propensities` always
    /// mirrors `groups` one-to-one, so it only grows when a new group does.
    pub fn add_reaction(&mut self, rate: f64, eq: ReactionEquation) {
        for group in self.groups.iter_mut() {
            if group.add_if_same_lhs(rate, &eq.lhs, eq.rhs.clone()) {
                return;
            }
        }
        self.groups
            .push(ReactionsWithSameRateAndLHS::new(rate, eq.lhs, eq.rhs));
        self.propensities.push(0.0);
    }

    /// Finds the first group whose LHS and any stored RHS match `eq`,
    /// removes that RHS, and removes the group entirely if it becomes
    /// empty. Returns the group's rate, or `Error::NotFound`.
    pub fn delete_reaction(&mut self, eq: &ReactionEquation) -> Result<f64> {
        for (gi, group) in self.groups.iter_mut().enumerate() {
            if group.lhs != eq.lhs {
                continue;
            }
            if let Some(ri) = group.all_rhs.iter().position(|rhs| *rhs == eq.rhs) {
                let rate = group.rate;
                group.all_rhs.remove(ri);
                if group.all_rhs.is_empty() {
                    self.groups.remove(gi);
                    self.propensities.remove(gi);
                }
                return Ok(rate);
            }
        }
        Err(Error::NotFound)
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.propensities.clear();
        self.total_propensity = 0.0;
    }

    /// Recomputes every group's propensity from current copy numbers and
    /// updates `total_propensity`. Must be called whenever a referenced
    /// copy number changes, before the next `pick_random_reaction`.
    pub fn recalculate_propensities(&mut self, species: &[Species]) -> f64 {
        self.total_propensity = 0.0;
        for (group, p) in self.groups.iter().zip(self.propensities.iter_mut()) {
            *p = group.propensity(species);
            self.total_propensity += *p;
        }
        self.total_propensity
    }

    /// Samples a group by cumulative-sum search on `propensities` using
    /// threshold `u * total_propensity`, then a uniform RHS within the
    /// group (spec §4.2). Stable under ties by earliest-insertion order.
    pub fn pick_random_reaction(&self, u: f64, u_rhs: f64) -> Result<ReactionEquation> {
        if self.total_propensity <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "pick_random_reaction called on a compartment with zero propensity".into(),
            ));
        }
        let threshold = u * self.total_propensity;
        let mut cumulative = 0.0;
        for (group, &p) in self.groups.iter().zip(self.propensities.iter()) {
            cumulative += p;
            if threshold < cumulative {
                let rhs = group.pick_random_rhs(u_rhs);
                return Ok(ReactionEquation::new(group.lhs.clone(), rhs.clone()));
            }
        }
        // Floating point edge case: threshold landed exactly on the total.
        let group = self.groups.last().ok_or(Error::NotFound)?;
        Ok(ReactionEquation::new(
            group.lhs.clone(),
            group.pick_random_rhs(u_rhs).clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::{CompartmentRef, ReactionComponent};

    fn side(species: usize, mult: u32, compartment: usize) -> ReactionSide {
        ReactionSide::from_components(&[ReactionComponent::new(
            mult,
            species,
            CompartmentRef::Owned(compartment),
        )])
    }

    #[test]
    fn add_then_delete_restores_propensity() {
        let mut species = vec![Species::new(0.0)];
        species[0].copy_numbers = vec![10];
        let mut list = ReactionList::new();
        let eq = ReactionEquation::new(side(0, 1, 0), ReactionSide::new());
        list.add_reaction(1.0, eq.clone());
        list.recalculate_propensities(&species);
        let before = list.get_propensity();
        assert_eq!(before, 10.0);

        let rate = list.delete_reaction(&eq).unwrap();
        assert_eq!(rate, 1.0);
        list.recalculate_propensities(&species);
        assert_eq!(list.get_propensity(), 0.0);
        assert_eq!(list.size(), 0);
    }

    #[test]
    fn zero_copy_number_gives_zero_propensity() {
        let mut species = vec![Species::new(0.0)];
        species[0].copy_numbers = vec![0];
        let mut list = ReactionList::new();
        list.add_reaction(1.0, ReactionEquation::new(side(0, 1, 0), ReactionSide::new()));
        let total = list.recalculate_propensities(&species);
        assert_eq!(total, 0.0);
        assert!(list.inv_total_propensity().is_none());
    }

    #[test]
    fn bimolecular_lhs_uses_binomial_weight() {
        let mut species = vec![Species::new(0.0)];
        species[0].copy_numbers = vec![5];
        let mut list = ReactionList::new();
        list.add_reaction(2.0, ReactionEquation::new(side(0, 2, 0), ReactionSide::new()));
        let total = list.recalculate_propensities(&species);
        // C(5,2) = 10, rate 2.0 -> propensity 20.
        assert_eq!(total, 20.0);
    }

    #[test]
    fn delete_missing_reaction_is_not_found() {
        let mut list = ReactionList::new();
        list.add_reaction(1.0, ReactionEquation::new(side(0, 1, 0), ReactionSide::new()));
        let missing = ReactionEquation::new(side(1, 1, 0), ReactionSide::new());
        assert!(matches!(list.delete_reaction(&missing), Err(Error::NotFound)));
    }
}
