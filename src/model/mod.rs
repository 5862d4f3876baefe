//! Data model shared by the dispatcher contract and the facade.
//!
//! Record encoding is owned by the transport; these types only carry what the
//! adaptation layer needs to correlate, classify and hand results back.

mod batch;
mod index;
mod key;
mod node;
mod operation;
mod query;
mod record;
mod result_code;
mod value;

pub use batch::*;
pub use index::*;
pub use key::*;
pub use node::*;
pub use operation::*;
pub use query::*;
pub use record::*;
pub use result_code::*;
pub use value::*;
