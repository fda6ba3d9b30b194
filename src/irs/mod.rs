pub mod archive;
pub mod batches;
pub mod index;
pub mod return_type;
pub mod source;

pub use return_type::ReturnType;
pub use source::IrsSource;
