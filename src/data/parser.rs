//! Literal grammar for augmented data
//!
//! | literal        | meaning                      |
//! |----------------|------------------------------|
//! | `3.5`          | present value                |
//! | `?`            | fully missing                |
//! | `{1 2 4}`      | missing among a finite set   |
//! | `[a:b]`        | missing in an interval       |
//! | `[-inf:b]`     | missing, left-unbounded      |
//! | `[a:+inf]`     | missing, right-unbounded     |
//!
//! Discrete values are shifted down by an offset (modalities are 1-based in
//! input and 0-based internally).

use crate::error::{MixtError, Result};

use super::augmented::{AugmentedData, DataValue, MisVal};

const MISSING: &str = "?";

/// Parses one literal into a working value (present only) and its tag
pub fn parse_literal<T: DataValue>(literal: &str, offset: usize) -> Option<(T, MisVal<T>)> {
    let literal = literal.trim();

    if literal == MISSING {
        return Some((T::default(), MisVal::Missing));
    }

    if let Some(inner) = literal.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        let mut candidates = inner
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(|s| T::parse_value(s, offset))
            .collect::<Option<Vec<T>>>()?;
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        candidates.dedup();
        return Some((T::default(), MisVal::FiniteValues(candidates)));
    }

    if let Some(inner) = literal.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let (left, right) = inner.split_once(':')?;
        let (left, right) = (left.trim(), right.trim());
        let left_unbounded = left == "-inf";
        let right_unbounded = right == "+inf" || right == "inf";

        let mis = match (left_unbounded, right_unbounded) {
            (true, true) => MisVal::Missing,
            (true, false) => MisVal::LeftUnbounded(T::parse_value(right, offset)?),
            (false, true) => MisVal::RightUnbounded(T::parse_value(left, offset)?),
            (false, false) => {
                let a = T::parse_value(left, offset)?;
                let b = T::parse_value(right, offset)?;
                if a.partial_cmp(&b) != Some(std::cmp::Ordering::Less) {
                    return None;
                }
                MisVal::Interval(a, b)
            }
        };
        return Some((T::default(), mis));
    }

    T::parse_value(literal, offset).map(|v| (v, MisVal::Present))
}

/// Parses the literals of one variable, one per individual
pub fn parse_augmented_data<T: DataValue>(
    variable: &str,
    literals: &[String],
    offset: usize,
) -> Result<AugmentedData<T>> {
    let mut data = Vec::with_capacity(literals.len());
    let mut mis_data = Vec::with_capacity(literals.len());
    for (row, literal) in literals.iter().enumerate() {
        let (value, mis) =
            parse_literal::<T>(literal, offset).ok_or_else(|| MixtError::parse(variable, row, literal))?;
        data.push(value);
        mis_data.push(mis);
    }
    AugmentedData::from_parts(data, mis_data)
}
