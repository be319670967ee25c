//! The Next Subvolume Method operator: a [`crate::grid::Grid`], one
//! [`ReactionList`] per compartment, and an [`EventScheduler`] tying them
//! together under a single simulation clock
//! (`original_source/src/NextSubvolumeMethod.h`).

use std::collections::{BTreeSet, HashMap};

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::grid::Grid;
use crate::reaction::{CompartmentRef, ReactionComponent, ReactionEquation, ReactionSide};
use crate::reaction_list::ReactionList;
use crate::scheduler::EventScheduler;
use crate::species::Species;

type StateCallback = Box<dyn FnMut(f64, &[i64])>;

fn side(species: usize, multiplicity: u32, compartment: CompartmentRef) -> ReactionSide {
    ReactionSide::from_components(&[ReactionComponent::new(multiplicity, species, compartment)])
}

/// The NSM operator: owns a grid, the species attached to it, a
/// per-compartment reaction catalogue and the global event heap.
///
/// Every structural call (`add_reaction*`, `add_diffusion*`, `set_interface`,
/// ...) recomputes and reschedules the priority of whichever compartments it
/// touched, so the heap is always consistent before the next `integrate`.
pub struct Nsm<G: Grid> {
    grid: G,
    species: Vec<Species>,
    subvolume_reactions: Vec<ReactionList>,
    scheduler: EventScheduler,
    time: f64,
    rng: StdRng,
    diffusing_species: Vec<usize>,
    callbacks: HashMap<usize, Vec<StateCallback>>,
    active: bool,
}

impl<G: Grid> Nsm<G> {
    pub fn new(grid: G, seed: u64) -> Self {
        let n = grid.size();
        Nsm {
            grid,
            species: Vec::new(),
            subvolume_reactions: vec![ReactionList::new(); n],
            scheduler: EventScheduler::with_capacity(n),
            time: 0.0,
            rng: StdRng::seed_from_u64(seed),
            diffusing_species: Vec::new(),
            callbacks: HashMap::new(),
            active: true,
        }
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn species_mut(&mut self) -> &mut [Species] {
        &mut self.species
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn get_next_event_time(&self) -> f64 {
        self.scheduler.peek().0
    }

    /// Attaches `species` to this NSM's grid, binding its copy-number vector
    /// if it isn't already bound. Returns the species' index within this
    /// NSM, used to identify it in every `add_reaction*`/`add_diffusion*`
    /// call.
    pub fn add_species(&mut self, mut species: Species) -> Result<usize> {
        match species.grid_size() {
            Some(size) if size == self.grid.size() => {}
            Some(size) => {
                return Err(Error::ShapeMismatch {
                    expected: (self.grid.size(), 1, 1),
                    actual: (size, 1, 1),
                })
            }
            None => species.bind_grid(&self.grid),
        }
        let idx = self.species.len();
        self.species.push(species);
        Ok(idx)
    }

    /// Adds a spatially-uniform reaction to every compartment: any
    /// component whose compartment is [`CompartmentRef::UNSET`] is tagged
    /// with that compartment's own index (spec §4.4).
    pub fn add_reaction(&mut self, rate: f64, eq: ReactionEquation) -> Result<()> {
        for i in 0..self.grid.size() {
            self.add_reaction_to(i, rate, eq.clone())?;
        }
        Ok(())
    }

    /// Adds the reaction only to compartments on `geometry`'s boundary
    /// slice.
    pub fn add_reaction_on(&mut self, geometry: &dyn Geometry, rate: f64, eq: ReactionEquation) -> Result<()> {
        for i in self.grid.get_slice(geometry) {
            self.add_reaction_to(i, rate, eq.clone())?;
        }
        Ok(())
    }

    /// Adds the reaction to every compartment enclosed by `geometry`.
    pub fn add_reaction_in(&mut self, geometry: &dyn Geometry, rate: f64, eq: ReactionEquation) -> Result<()> {
        for i in self.grid.get_region(geometry) {
            self.add_reaction_to(i, rate, eq.clone())?;
        }
        Ok(())
    }

    fn add_reaction_to(&mut self, compartment: usize, rate: f64, mut eq: ReactionEquation) -> Result<()> {
        eq.tag_unset(compartment);
        self.subvolume_reactions[compartment].add_reaction(rate, eq);
        self.reset_priority(compartment)
    }

    /// Adds `eq` to a single named compartment — the building block
    /// `BindingReaction` uses to install its bound/unbound transitions at
    /// specific receptor sites.
    pub fn add_reaction_to_compartment(&mut self, compartment: usize, rate: f64, eq: ReactionEquation) -> Result<()> {
        self.add_reaction_to(compartment, rate, eq)
    }

    /// Adds a diffusive jump for `species` along every edge of the grid,
    /// rate `D / distance²` per `original_source`'s `add_diffusion`. Each
    /// directed edge `i -> j` becomes one reaction entry in compartment
    /// `i`'s catalogue.
    pub fn add_diffusion(&mut self, species: usize) -> Result<()> {
        if !self.diffusing_species.contains(&species) {
            self.diffusing_species.push(species);
        }
        let d = self.species[species].diffusion_coefficient;
        for i in 0..self.grid.size() {
            let neighbours = self.grid.neighbours(i)?.to_vec();
            let distances = self.grid.neighbour_distances(i)?.to_vec();
            for (&j, &dist) in neighbours.iter().zip(distances.iter()) {
                let rate = d / (dist * dist);
                let lhs = side(species, 1, CompartmentRef::Owned(i));
                let rhs = side(species, 1, CompartmentRef::Owned(j));
                self.subvolume_reactions[i].add_reaction(rate, ReactionEquation::new(lhs, rhs));
            }
            self.reset_priority(i)?;
        }
        Ok(())
    }

    /// Adds explicit one-directional jump reactions `from[k] -> to[k]` at
    /// `rate`, for use at coarse/fine grid interfaces where the regular
    /// neighbour structure doesn't apply.
    pub fn add_diffusion_between(
        &mut self,
        species: usize,
        rate: f64,
        from: &[usize],
        to: &[usize],
    ) -> Result<()> {
        if from.len() != to.len() {
            return Err(Error::InvalidConfiguration(
                "add_diffusion_between: from/to length mismatch".into(),
            ));
        }
        if !self.diffusing_species.contains(&species) {
            self.diffusing_species.push(species);
        }
        for (&i, &j) in from.iter().zip(to.iter()) {
            let lhs = side(species, 1, CompartmentRef::Owned(i));
            let rhs = side(species, 1, CompartmentRef::Owned(j));
            self.subvolume_reactions[i].add_reaction(rate, ReactionEquation::new(lhs, rhs));
            self.reset_priority(i)?;
        }
        Ok(())
    }

    /// Multiplies the rate of every diffusion reaction of `species` whose
    /// two endpoints straddle `geometry`'s boundary by `factor`.
    pub fn scale_diffusion_across(&mut self, species: usize, geometry: &dyn Geometry, factor: f64) -> Result<()> {
        for i in self.grid.get_slice(geometry) {
            let inside = self.grid.is_in(geometry, i)?;
            let neighbours = self.grid.neighbours(i)?.to_vec();
            for j in neighbours {
                if self.grid.is_in(geometry, j)? == inside {
                    continue;
                }
                let lhs = side(species, 1, CompartmentRef::Owned(i));
                let rhs = side(species, 1, CompartmentRef::Owned(j));
                let eq = ReactionEquation::new(lhs.clone(), rhs.clone());
                if let Ok(rate) = self.subvolume_reactions[i].delete_reaction(&eq) {
                    self.subvolume_reactions[i].add_reaction(rate * factor, eq);
                }
            }
            self.reset_priority(i)?;
        }
        Ok(())
    }

    /// Replaces the plain `D/h²` diffusion rate across `geometry`'s
    /// boundary with a corrected hopping rate suited to coupling this
    /// compartment-based domain to a finer-grained (e.g. particle-based)
    /// neighbour, following the Flegg/Erban-Chapman meso/micro coupling
    /// correction. With `corrected = false` this just re-derives the raw
    /// `D/h²` rate, equivalent to `unset_interface` followed by a no-op.
    pub fn set_interface(&mut self, geometry: &dyn Geometry, dt: f64, corrected: bool) -> Result<()> {
        for i in self.grid.get_slice(geometry) {
            let inside = self.grid.is_in(geometry, i)?;
            let neighbours = self.grid.neighbours(i)?.to_vec();
            let distances = self.grid.neighbour_distances(i)?.to_vec();
            for (&j, &h) in neighbours.iter().zip(distances.iter()) {
                if self.grid.is_in(geometry, j)? == inside {
                    continue;
                }
                for &s in self.diffusing_species.clone().iter() {
                    let d = self.species[s].diffusion_coefficient;
                    let lhs = side(s, 1, CompartmentRef::Owned(i));
                    let rhs = side(s, 1, CompartmentRef::Owned(j));
                    let eq = ReactionEquation::new(lhs.clone(), rhs.clone());
                    if self.subvolume_reactions[i].delete_reaction(&eq).is_ok() {
                        let rate = interface_rate(d, h, dt, corrected);
                        self.subvolume_reactions[i].add_reaction(rate, eq);
                    }
                }
            }
            self.reset_priority(i)?;
        }
        Ok(())
    }

    /// Marks every compartment on the far side of `geometry`'s boundary as
    /// a ghost compartment: its existing reactions are cleared, and the
    /// diffusive jump across the interface is split into a one-sided
    /// outward jump (real source, ghost sink — mass never returns to the
    /// domain this way) and a ghost self-loop that only replenishes the
    /// ghost's own copy number, following `original_source`'s
    /// `set_ghost_cell_interface`.
    pub fn set_ghost_cell_interface(&mut self, geometry: &dyn Geometry) -> Result<()> {
        let slice = self.grid.get_slice(geometry);
        let mut ghost_cells = BTreeSet::new();
        let mut pairs = Vec::new();
        for &i in &slice {
            if !self.grid.is_in(geometry, i)? {
                continue;
            }
            for &j in self.grid.neighbours(i)?.to_vec().iter() {
                if !self.grid.is_in(geometry, j)? {
                    ghost_cells.insert(j);
                    pairs.push((i, j));
                }
            }
        }
        for &g in &ghost_cells {
            self.subvolume_reactions[g].clear();
        }
        for &(i, j) in &pairs {
            for &s in self.diffusing_species.clone().iter() {
                let lhs = side(s, 1, CompartmentRef::Owned(i));
                let rhs = side(s, 1, CompartmentRef::Owned(j));
                let eq = ReactionEquation::new(lhs.clone(), rhs.clone());
                let Ok(rate) = self.subvolume_reactions[i].delete_reaction(&eq) else {
                    continue;
                };
                // Outward: real i loses a molecule into the ghost sink j —
                // the only jump that ever touches a real compartment here.
                let outward_rhs = side(s, 1, CompartmentRef::Ghost(j));
                self.subvolume_reactions[i]
                    .add_reaction(rate, ReactionEquation::new(lhs, outward_rhs));

                // Inward: a frozen ghost source that only replenishes j's
                // own (ghost-owned) copy number, never the real side — the
                // domain never reads this back, it only makes the ghost
                // cell's own bookkeeping reflect a standing reservoir.
                let inward_lhs = side(s, 1, CompartmentRef::Ghost(j));
                self.subvolume_reactions[j]
                    .add_reaction(rate, ReactionEquation::new(inward_lhs, rhs));
            }
            self.reset_priority(i)?;
            self.reset_priority(j)?;
        }
        Ok(())
    }

    /// Reverts `set_interface`/`set_ghost_cell_interface` across
    /// `geometry`'s boundary, restoring plain two-sided `D/h²` diffusion.
    pub fn unset_interface(&mut self, geometry: &dyn Geometry) -> Result<()> {
        for i in self.grid.get_slice(geometry) {
            let inside = self.grid.is_in(geometry, i)?;
            let neighbours = self.grid.neighbours(i)?.to_vec();
            let distances = self.grid.neighbour_distances(i)?.to_vec();
            for (&j, &dist) in neighbours.iter().zip(distances.iter()) {
                if self.grid.is_in(geometry, j)? == inside {
                    continue;
                }
                for &s in self.diffusing_species.clone().iter() {
                    self.remove_any_jump(i, j, s);
                    self.remove_any_jump(j, i, s);
                    let d = self.species[s].diffusion_coefficient;
                    let rate = d / (dist * dist);
                    let lhs = side(s, 1, CompartmentRef::Owned(i));
                    let rhs = side(s, 1, CompartmentRef::Owned(j));
                    self.subvolume_reactions[i].add_reaction(rate, ReactionEquation::new(lhs, rhs));
                    let lhs2 = side(s, 1, CompartmentRef::Owned(j));
                    let rhs2 = side(s, 1, CompartmentRef::Owned(i));
                    self.subvolume_reactions[j].add_reaction(rate, ReactionEquation::new(lhs2, rhs2));
                }
                self.reset_priority(j)?;
            }
            self.reset_priority(i)?;
        }
        Ok(())
    }

    /// Removes whichever of the owned-to-owned, owned-to-ghost or
    /// ghost-self-loop jump reactions for `species` currently exists between
    /// `from` and `to`, ignoring a missing match. The first two live in
    /// `subvolume_reactions[from]` since `from` is their source; the
    /// ghost-self-loop (`set_ghost_cell_interface`'s frozen reservoir
    /// reaction) lives in `subvolume_reactions[to]` instead, since it only
    /// ever replenishes `to`'s own copy number.
    fn remove_any_jump(&mut self, from: usize, to: usize, species: usize) {
        let lhs = side(species, 1, CompartmentRef::Owned(from));
        let owned_rhs = side(species, 1, CompartmentRef::Owned(to));
        let _ = self.subvolume_reactions[from].delete_reaction(&ReactionEquation::new(lhs.clone(), owned_rhs));
        let ghost_rhs = side(species, 1, CompartmentRef::Ghost(to));
        let _ = self.subvolume_reactions[from].delete_reaction(&ReactionEquation::new(lhs, ghost_rhs));
        let ghost_lhs = side(species, 1, CompartmentRef::Ghost(to));
        let to_owned = side(species, 1, CompartmentRef::Owned(to));
        let _ = self.subvolume_reactions[to].delete_reaction(&ReactionEquation::new(ghost_lhs, to_owned));
    }

    pub fn clear_reactions(&mut self, compartment: usize) -> Result<()> {
        self.subvolume_reactions
            .get_mut(compartment)
            .ok_or(Error::OutOfRange {
                index: compartment,
                size: self.subvolume_reactions.len(),
            })?
            .clear();
        self.reset_priority(compartment)
    }

    pub fn reset_all_priorities(&mut self) -> Result<()> {
        for i in 0..self.subvolume_reactions.len() {
            self.reset_priority(i)?;
        }
        Ok(())
    }

    /// Recomputes compartment `i`'s total propensity and reschedules its
    /// next firing time, drawing a fresh `Exp(1)` waiting time. A
    /// compartment with zero propensity is dropped from the heap.
    fn reset_priority(&mut self, i: usize) -> Result<()> {
        let total = self.subvolume_reactions[i].recalculate_propensities(&self.species);
        let t_next = if total > 0.0 {
            let draw: f64 = Exp::new(1.0).unwrap().sample(&mut self.rng);
            self.time + draw / total
        } else {
            crate::scheduler::INFINITE_PRIORITY
        };
        self.scheduler.reset_priority(i, t_next);
        Ok(())
    }

    /// Registers a callback invoked with `(time, copy_numbers)` for
    /// `species` every time a firing changes that species' copy numbers,
    /// synchronously before the next event is drawn.
    pub fn register_state_callback(&mut self, species: usize, callback: impl FnMut(f64, &[i64]) + 'static) {
        self.callbacks.entry(species).or_default().push(Box::new(callback));
    }

    /// Advances the simulation clock by `dt`, firing every scheduled
    /// reaction whose time falls within `[time, time + dt)` (spec §4.4).
    pub fn integrate(&mut self, dt: f64) -> Result<()> {
        let target = self.time + dt;
        loop {
            let (t_next, i) = self.scheduler.peek();
            if t_next >= target {
                self.time = target;
                return Ok(());
            }
            let u: f64 = self.rng.random();
            let u_rhs: f64 = self.rng.random();
            let eq = self.subvolume_reactions[i].pick_random_reaction(u, u_rhs)?;
            eq.apply(&mut self.species);
            self.time = t_next;

            let touched_species: BTreeSet<usize> = eq
                .lhs
                .components
                .iter()
                .chain(eq.rhs.components.iter())
                .map(|c| c.species)
                .collect();
            for s in touched_species {
                if let Some(cbs) = self.callbacks.get_mut(&s) {
                    let copy_numbers = self.species[s].copy_numbers.clone();
                    for cb in cbs.iter_mut() {
                        cb(self.time, &copy_numbers);
                    }
                }
            }

            let touched_compartments: BTreeSet<usize> = eq.touched_compartments().collect();
            for j in touched_compartments {
                self.reset_priority(j)?;
            }
        }
    }
}

/// The Flegg/Erban-Chapman-style corrected hopping rate: widens the
/// effective hop length by the diffusive lengthscale `sqrt(pi * D * dt)`
/// so the coarse-grained flux across the interface matches the
/// fine-grained (particle) regime's expected crossing rate.
fn interface_rate(d: f64, h: f64, dt: f64, corrected: bool) -> f64 {
    let raw = d / (h * h);
    if !corrected {
        return raw;
    }
    d / (h * (h + (std::f64::consts::PI * d * dt).sqrt()))
}

impl<G: Grid + 'static> crate::operator::Operator for Nsm<G> {
    fn integrate(&mut self, dt: f64) -> Result<()> {
        Nsm::integrate(self, dt)
    }

    fn reset(&mut self) -> Result<()> {
        self.time = 0.0;
        for species in self.species.iter_mut() {
            species.copy_numbers.iter_mut().for_each(|n| *n = 0);
        }
        self.reset_all_priorities()
    }

    fn active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
