pub mod data;
pub mod hash;
pub mod naming;

pub use data::{JobData, JobDataView, Scalar};
