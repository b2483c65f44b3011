//! Class labels for the auxiliary scorer.
//!
//! A [`LabelMapping`] is loaded once from the checkpoint and defines which
//! target classes a decoder can be steered toward. Construction checks that
//! the mapping is a bijection onto `0..num_classes`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Immutable name ↔ index mapping over `0..num_classes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMapping {
    by_name: BTreeMap<String, usize>,
    by_index: Vec<String>,
}

impl LabelMapping {
    /// Builds a mapping, checking it covers exactly `0..num_classes` once each.
    pub fn new(by_name: BTreeMap<String, usize>, num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(Error::InvalidLabelMapping(
                "num_classes must be positive".to_string(),
            ));
        }
        if by_name.len() != num_classes {
            return Err(Error::InvalidLabelMapping(format!(
                "{} names for {num_classes} classes",
                by_name.len()
            )));
        }

        let mut by_index: Vec<Option<String>> = vec![None; num_classes];
        for (name, &index) in &by_name {
            let slot = by_index.get_mut(index).ok_or_else(|| {
                Error::InvalidLabelMapping(format!(
                    "class {name:?} has index {index}, expected < {num_classes}"
                ))
            })?;
            if let Some(existing) = slot {
                return Err(Error::InvalidLabelMapping(format!(
                    "classes {existing:?} and {name:?} share index {index}"
                )));
            }
            *slot = Some(name.clone());
        }

        // Every slot is filled: len matches and indices are unique and in range.
        let by_index = by_index.into_iter().flatten().collect();

        Ok(Self { by_name, by_index })
    }

    /// Builds a mapping from names listed in index order.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let by_name: BTreeMap<String, usize> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.into(), i))
            .collect();
        let n = by_name.len();
        Self::new(by_name, n)
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.by_index.len()
    }

    /// Index of a class name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Name of a class index.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.by_index.get(index).map(String::as_str)
    }

    /// Class names in index order.
    pub fn names(&self) -> &[String] {
        &self.by_index
    }

    /// The full name → index mapping.
    pub fn as_map(&self) -> &BTreeMap<String, usize> {
        &self.by_name
    }

    /// Resolves a target class given by name or index.
    pub fn resolve(&self, target: &TargetClass) -> Result<usize> {
        match target {
            TargetClass::Name(name) => self.index_of(name).ok_or_else(|| Error::UnknownClass {
                name: name.clone(),
                available: self.names().to_vec(),
            }),
            TargetClass::Index(index) => {
                if *index < self.num_classes() {
                    Ok(*index)
                } else {
                    Err(Error::ClassIndexOutOfRange {
                        index: *index,
                        num_classes: self.num_classes(),
                    })
                }
            }
        }
    }
}

/// A target class given either by name or by raw index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetClass {
    Name(String),
    Index(usize),
}

impl TargetClass {
    /// Parses user input: all-digit strings are indices, anything else a name.
    pub fn parse(input: &str) -> Self {
        match input.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(input.to_string()),
        }
    }
}

impl From<&str> for TargetClass {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TargetClass {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for TargetClass {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Index(index) => write!(f, "#{index}"),
        }
    }
}
