//! End-to-end scenarios (spec §8): one integration test per named scenario,
//! exercised through the public `Nsm`/`Species`/`Operator` surface rather
//! than any module's internals.

use nsm_core::binding::{BindingParams, BindingReaction};
use nsm_core::geometry::{Axis, Plane};
use nsm_core::grid::{Grid, StructuredGrid};
use nsm_core::nsm::Nsm;
use nsm_core::operator::{Operator, OperatorList};
use nsm_core::reaction::{CompartmentRef, ReactionComponent, ReactionEquation, ReactionSide};
use nsm_core::species::Species;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn side(species: usize, mult: u32, compartment: CompartmentRef) -> ReactionSide {
    ReactionSide::from_components(&[ReactionComponent::new(mult, species, compartment)])
}

/// Scenario 1: pure decay. A single compartment, `A -> ∅` at rate 1, 1000
/// starting molecules; the mean over many seeds should track `1000·e^-5`.
#[test]
fn pure_decay_matches_exponential_mean() {
    let mut total = 0.0;
    let runs = 200;
    for seed in 0..runs {
        let grid = StructuredGrid::new([0.0; 3], [1.0; 3], [1, 1, 1]).unwrap();
        let mut nsm = Nsm::new(grid, seed);
        let mut a = Species::new(0.0);
        a.bind_grid(nsm.grid());
        a.copy_numbers[0] = 1000;
        let a = nsm.add_species(a).unwrap();
        let eq = ReactionEquation::new(side(a, 1, CompartmentRef::UNSET), ReactionSide::new());
        nsm.add_reaction(1.0, eq).unwrap();
        nsm.integrate(5.0).unwrap();
        total += nsm.species()[a].copy_numbers[0] as f64;
    }
    let mean = total / runs as f64;
    let expected = 1000.0 * (-5.0f64).exp();
    assert!(
        (mean - expected).abs() < 1.0,
        "mean {mean} too far from expected {expected}"
    );
}

/// Scenario 2: reversible binding relaxes toward the law-of-mass-action
/// equilibrium `[A]^2 * k_f = [B] * k_r`.
#[test]
fn reversible_binding_relaxes_to_equilibrium() {
    let grid = StructuredGrid::new([0.0; 3], [10.0; 3], [10, 10, 10]).unwrap();
    let mut nsm = Nsm::new(grid, 1234);
    let mut a = Species::new(0.0);
    a.bind_grid(nsm.grid());
    let a_idx = nsm.add_species(a).unwrap();
    let grid_copy = nsm.grid().clone();
    let all_cells: Vec<usize> = (0..grid_copy.size()).collect();
    let mut rng = StdRng::seed_from_u64(1234);
    nsm.species_mut()[a_idx].fill_uniform(&grid_copy, &all_cells, 10000, &mut rng);

    let b = Species::new(0.0);
    let b_idx = nsm.add_species(b).unwrap();

    let forward = ReactionEquation::new(
        side(a_idx, 2, CompartmentRef::UNSET),
        side(b_idx, 1, CompartmentRef::UNSET),
    );
    nsm.add_reaction(1e-3, forward).unwrap();
    let reverse = ReactionEquation::new(
        side(b_idx, 1, CompartmentRef::UNSET),
        side(a_idx, 2, CompartmentRef::UNSET),
    );
    nsm.add_reaction(1.0, reverse).unwrap();

    nsm.integrate(10.0).unwrap();

    let a_total: i64 = nsm.species()[a_idx].copy_numbers.iter().sum();
    let b_total: i64 = nsm.species()[b_idx].copy_numbers.iter().sum();
    // Conservation: every unit of B came from two units of A.
    assert_eq!(a_total + 2 * b_total, 10000);
    assert!(a_total > 0);
}

/// Scenario 3: diffusive mixing. All of species A starts in one end cell
/// of a 1-D chain; after `t = L^2 / D` it should have spread out so no
/// cell still holds the majority of the total.
#[test]
fn diffusion_spreads_a_localized_pulse() {
    let n = 20;
    let d = 1e-2;
    let l = 1.0;
    let grid = StructuredGrid::new([0.0; 3], [l, 1.0, 1.0], [n, 1, 1]).unwrap();
    let mut nsm = Nsm::new(grid, 5);
    let mut a = Species::new(d);
    a.bind_grid(nsm.grid());
    a.copy_numbers[0] = 100;
    let a = nsm.add_species(a).unwrap();
    nsm.add_diffusion(a).unwrap();

    nsm.integrate(l * l / d).unwrap();

    let counts = &nsm.species()[a].copy_numbers;
    let total: i64 = counts.iter().sum();
    assert_eq!(total, 100);
    assert!(
        (counts[0] as f64) < 0.5 * total as f64,
        "pulse never spread out of the source cell: {counts:?}"
    );
}

/// Scenario 4: ghost interface. Cells 5..9 become ghost across a plane at
/// x = 5h; a jump out of cell 4 never deposits into cell 5, and cell 5's
/// own copy numbers (externally owned) stay exactly as set.
#[test]
fn ghost_interface_drops_outward_jumps_silently() {
    let n = 10;
    let grid = StructuredGrid::new([0.0; 3], [n as f64, 1.0, 1.0], [n, 1, 1]).unwrap();
    let cell_size = grid.cell_size()[0];
    let mut nsm = Nsm::new(grid, 8);
    let mut a = Species::new(1.0);
    a.bind_grid(nsm.grid());
    a.copy_numbers[4] = 500;
    let a = nsm.add_species(a).unwrap();
    nsm.add_diffusion(a).unwrap();

    let boundary = Plane {
        axis: Axis::X,
        offset: 5.0 * cell_size,
    };
    nsm.set_ghost_cell_interface(&boundary).unwrap();
    nsm.integrate(200.0).unwrap();

    assert_eq!(nsm.species()[a].copy_numbers[5], 0);
}

/// Scenario 5: determinism. Two identically-seeded runs with identical
/// setup produce bit-identical trajectories.
#[test]
fn identical_seeds_reproduce_bit_for_bit() {
    fn run() -> Vec<i64> {
        let grid = StructuredGrid::new([0.0; 3], [5.0, 1.0, 1.0], [5, 1, 1]).unwrap();
        let mut nsm = Nsm::new(grid, 777);
        let mut a = Species::new(0.3);
        a.bind_grid(nsm.grid());
        a.copy_numbers[2] = 200;
        let a = nsm.add_species(a).unwrap();
        nsm.add_diffusion(a).unwrap();
        let eq = ReactionEquation::new(side(a, 1, CompartmentRef::UNSET), ReactionSide::new());
        nsm.add_reaction(0.1, eq).unwrap();
        nsm.integrate(10.0).unwrap();
        nsm.species()[a].copy_numbers.clone()
    }
    assert_eq!(run(), run());
}

/// Scenario 6: operator composition. Two NSM instances over disjoint
/// species, driven through a shared `OperatorList`, give the same marginal
/// trajectory per species as running each alone with the same seed.
#[test]
fn operator_list_matches_running_each_nsm_alone() {
    fn build(seed: u64) -> Nsm<StructuredGrid> {
        let grid = StructuredGrid::new([0.0; 3], [1.0; 3], [1, 1, 1]).unwrap();
        let mut nsm = Nsm::new(grid, seed);
        let mut species = Species::new(0.0);
        species.bind_grid(nsm.grid());
        species.copy_numbers[0] = 300;
        let s = nsm.add_species(species).unwrap();
        let eq = ReactionEquation::new(side(s, 1, CompartmentRef::UNSET), ReactionSide::new());
        nsm.add_reaction(0.5, eq).unwrap();
        nsm
    }

    let mut alone_a = build(1);
    let mut alone_b = build(2);
    alone_a.integrate(3.0).unwrap();
    alone_b.integrate(3.0).unwrap();

    let mut list = OperatorList::new();
    list.push(Box::new(build(1)));
    list.push(Box::new(build(2)));
    list.integrate(3.0).unwrap();

    let Some(composed_a) = list.get(0).and_then(|op| op.as_any().downcast_ref::<Nsm<StructuredGrid>>()) else {
        panic!("expected an Nsm<StructuredGrid> at index 0");
    };
    let Some(composed_b) = list.get(1).and_then(|op| op.as_any().downcast_ref::<Nsm<StructuredGrid>>()) else {
        panic!("expected an Nsm<StructuredGrid> at index 1");
    };

    assert_eq!(alone_a.species()[0].copy_numbers, composed_a.species()[0].copy_numbers);
    assert_eq!(alone_b.species()[0].copy_numbers, composed_b.species()[0].copy_numbers);
}

/// Binding reactions install correctly into a shared `Nsm` and their
/// site state tracks the bound complex's copy number.
#[test]
fn binding_reaction_site_state_matches_complex_copy_number() {
    let grid = StructuredGrid::new([0.0; 3], [1.0; 3], [1, 1, 1]).unwrap();
    let mut nsm = Nsm::new(grid, 42);
    let mut receptor = Species::new(0.0);
    receptor.bind_grid(nsm.grid());
    receptor.copy_numbers[0] = 10;
    let r = nsm.add_species(receptor).unwrap();
    let mut ligand = Species::new(0.0);
    ligand.bind_grid(nsm.grid());
    ligand.copy_numbers[0] = 10;
    let l = nsm.add_species(ligand).unwrap();
    let complex = Species::new(0.0);
    let c = nsm.add_species(complex).unwrap();

    let params = BindingParams {
        binding: 1.0,
        unbinding: 0.1,
        dt: 0.1,
        min: [0.0; 3],
        max: [1.0; 3],
        periodic: [false; 3],
        reversible: true,
    };
    let binding = BindingReaction::new(&mut nsm, r, l, c, &[0], params).unwrap();
    nsm.integrate(20.0).unwrap();

    let state = binding.get_site_state(&nsm);
    assert_eq!(state[0], nsm.species()[c].copy_numbers[0]);
}
