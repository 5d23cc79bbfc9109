//! Running statistics on parameters and missing values

pub mod conf_int;
pub mod data_stat;

pub use conf_int::ConfIntParamStat;
pub use data_stat::{ClassDataStat, ConfIntDataStat, DataStat, DiscreteDataStat};
