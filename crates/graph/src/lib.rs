pub mod constraints;
pub mod driver;
pub mod error;
pub mod memory;

pub use constraints::{all_constraints, existence_constraints, unique_constraints, GraphBackend};
pub use driver::{GraphDriver, GraphStats};
pub use error::GraphError;
pub use memory::InMemoryGraphDriver;
