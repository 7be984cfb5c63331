//! Dotted release versions (`1.2.10`, `v2.0.0-rc1`).

use anyhow::{bail, Context, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A release version: numeric components plus an optional pre-release tag.
///
/// Missing trailing components compare as zero (`1.2 == 1.2.0`); a
/// pre-release sorts before the release it precedes (`1.0.0-rc1 < 1.0.0`).
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
    pre: Option<String>,
}

impl Version {
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let (numbers, pre) = match body.split_once(['-', '+']) {
            Some((n, p)) => (n, Some(p.to_string())),
            None => (body, None),
        };
        if numbers.is_empty() {
            bail!("empty version {text:?}");
        }
        let parts = numbers
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("invalid version {text:?}"))?;
        Ok(Self {
            parts,
            pre: pre.filter(|p| !p.is_empty()),
        })
    }

    fn part(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&numbers.join("."))?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            match self.part(i).cmp(&other.part(i)) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}
