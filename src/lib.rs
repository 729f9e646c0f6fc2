#![deny(dead_code)]
#![deny(unused_imports)]

pub mod data;
pub mod mi;
pub mod regress;
pub mod select;

pub use data::{DataError, VariableTable};
pub use mi::{MiStrategy, MutualInformation, tie_fraction};
pub use regress::{Regression, RegressionError};
pub use select::{
    ForwardSelection, KeptVariable, Selection, SelectionError, write_tie_diagnostics,
};
