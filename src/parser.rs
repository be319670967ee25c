//! Text format for well-mixed reaction networks: initial copy numbers and
//! reaction equations, parsed with `nom` the way the teacher's
//! `parsers.rs` does, generalized to produce [`ReactionEquation`]s tagged
//! with [`CompartmentRef::UNSET`] for `Nsm::add_reaction` to compile into
//! every compartment.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use derive_new::new;
use itertools::Itertools;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{digit0, digit1, multispace0},
    combinator::map_res,
    multi::separated_list0,
    number::complete::double,
    sequence::delimited,
    AsChar, IResult, Parser,
};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::reaction::{CompartmentRef, ReactionComponent, ReactionEquation, ReactionSide};

/// The result of parsing a line defining a new reaction.
#[derive(Clone, Debug)]
struct NamedReaction {
    inputs: Vec<(String, u32)>,
    outputs: Vec<(String, u32)>,
    rate: f64,
}

/// The result of parsing a line setting a species' initial copy number.
#[derive(Clone, Debug, new)]
struct InitialCount {
    name: String,
    amount: i64,
}

enum Line {
    InitialCount(InitialCount),
    Reaction(NamedReaction),
}

fn decimal(data: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>()).parse(data)
}

/// Parses a line of the form `A = 5`, setting a species' initial copy
/// number.
fn parse_initial_count(data: &str) -> IResult<&str, Line> {
    let (rem, (name, _, _, _, amount)) = (
        take_while1(AsChar::is_alphanum),
        multispace0,
        tag("="),
        multispace0,
        decimal,
    )
        .parse(data)?;

    Ok((
        rem,
        Line::InitialCount(InitialCount::new(name.to_owned(), amount as i64)),
    ))
}

/// Parses a term of the form `2A`.
fn parse_reaction_item(data: &str) -> IResult<&str, (String, u32)> {
    let (rem, num): (&str, u32) = map_res(digit0, |s: &str| {
        if s.is_empty() {
            Ok(1)
        } else {
            s.parse::<u32>()
        }
    })
    .parse(data)?;
    let (rem, name) = take_while1(AsChar::is_alphanum).parse(rem)?;

    Ok((rem, (name.to_owned(), num)))
}

/// Parses one side of a reaction, e.g. `2A + B`. An empty side (a zeroth-
/// or uni-molecular product side) parses as an empty list.
fn parse_reaction_half(data: &str) -> IResult<&str, Vec<(String, u32)>> {
    separated_list0(
        delimited(multispace0, tag("+"), multispace0),
        parse_reaction_item,
    )
    .parse(data)
}

/// Parses a full reaction line: `2A + B -> 3C, 3.5e-9`.
fn parse_reaction(reaction: &str) -> IResult<&str, Line> {
    let (rem, (left_half, _, right_half, _, rate)) = (
        parse_reaction_half,
        delimited(multispace0, tag("->"), multispace0),
        parse_reaction_half,
        delimited(multispace0, tag(","), multispace0),
        double,
    )
        .parse(reaction)?;

    Ok((
        rem,
        Line::Reaction(NamedReaction {
            inputs: left_half,
            outputs: right_half,
            rate,
        }),
    ))
}

fn parse_line(line: &str) -> IResult<&str, Line> {
    alt((parse_initial_count, parse_reaction)).parse(line)
}

fn named_to_equation(
    named: &NamedReaction,
    species_ids: &FxHashMap<String, usize>,
) -> Result<(f64, ReactionEquation)> {
    let mut lhs = ReactionSide::new();
    for (name, mult) in &named.inputs {
        let species = *species_ids
            .get(name)
            .ok_or_else(|| Error::InvalidConfiguration(format!("undefined species {name:?}")))?;
        lhs.push(ReactionComponent::new(*mult, species, CompartmentRef::UNSET));
    }
    let mut rhs = ReactionSide::new();
    for (name, mult) in &named.outputs {
        let species = *species_ids
            .get(name)
            .ok_or_else(|| Error::InvalidConfiguration(format!("undefined species {name:?}")))?;
        rhs.push(ReactionComponent::new(*mult, species, CompartmentRef::UNSET));
    }
    Ok((named.rate, ReactionEquation::new(lhs, rhs)))
}

/// Accumulates parsed lines before resolving species names to indices.
#[derive(Default)]
pub struct ParseState {
    initial_counts: FxHashMap<String, i64>,
    reactions: Vec<NamedReaction>,
}

impl ParseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every non-comment, non-blank line of `reactions_path`.
    pub fn parse_data_file(&mut self, reactions_path: &Path) -> Result<&mut Self> {
        let file = File::open(reactions_path)
            .map_err(|err| Error::InvalidConfiguration(format!("{reactions_path:?}: {err}")))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| Error::InvalidConfiguration(err.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (_, parsed) = parse_line(trimmed)
                .map_err(|err| Error::InvalidConfiguration(format!("{trimmed:?}: {err}")))?;
            match parsed {
                Line::InitialCount(c) => {
                    self.initial_counts.insert(c.name, c.amount);
                }
                Line::Reaction(r) => self.reactions.push(r),
            }
        }
        Ok(self)
    }

    /// Resolves species names to indices in first-seen order and returns
    /// `(species names, initial copy numbers, (rate, equation) pairs)`.
    pub fn into_network(self) -> Result<(Vec<String>, Vec<i64>, Vec<(f64, ReactionEquation)>)> {
        let mut species_ids = FxHashMap::default();
        let mut names = Vec::new();
        let mut initial = Vec::new();

        for name in self
            .reactions
            .iter()
            .flat_map(|r| r.inputs.iter().chain(r.outputs.iter()).map(|(n, _)| n))
            .chain(self.initial_counts.keys())
            .unique()
            .cloned()
            .collect::<Vec<_>>()
        {
            species_ids.insert(name.clone(), names.len());
            initial.push(*self.initial_counts.get(&name).unwrap_or(&0));
            names.push(name);
        }

        let equations = self
            .reactions
            .iter()
            .map(|r| named_to_equation(r, &species_ids))
            .collect::<Result<Vec<_>>>()?;

        Ok((names, initial, equations))
    }
}
