use thiserror::Error;

/// Errors surfaced by structural setup calls on [`crate::grid::Grid`],
/// [`crate::reaction_list::ReactionList`] and [`crate::nsm::Nsm`].
///
/// Stepping itself is total (spec §7): a compartment that reaches zero
/// propensity is simply dropped from the event heap, it never errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("compartment index {index} out of range (grid size {size})")]
    OutOfRange { index: usize, size: usize },

    #[error("no matching reaction found")]
    NotFound,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("particle position {position:?} lies outside the grid bounds")]
    DomainViolation { position: [f64; 3] },
}

pub type Result<T> = std::result::Result<T, Error>;
