pub mod record;
pub mod writer;

pub use record::{assemble, is_populated, AnyPopulated, Assembly, Record, RecordFilter};
pub use writer::{strip_qualifier, Table};
