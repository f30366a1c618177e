pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, ErrorClass, Result};
pub use types::{NamespaceId, RelationId, Row, RowId, SessionId};
pub use value::{DataType, Value};
