pub mod features;
pub mod filter;
pub mod find;
pub mod request;

pub use features::{ApiFeatures, Pagination};
pub use filter::{Constraint, Filter, RangeOp};
pub use find::{FindQuery, Projection, SortDirection, SortKey};
pub use request::{ParamValue, QueryRequest};
