//! Missing-value taxonomy and augmented data

pub mod augmented;
pub mod parser;

pub use augmented::{prior_draw, AugmentedData, DataValue, MisType, MisVal, Range};
pub use parser::{parse_augmented_data, parse_literal};
