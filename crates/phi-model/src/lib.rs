pub mod audit;
pub mod batch;
pub mod error;
pub mod ids;
pub mod policy;
pub mod record;
pub mod schema;

pub use audit::{AuditDetail, AuditEvent, Outcome, REASON_UNMAPPED_PII, Stage};
pub use batch::{BatchRequest, BatchResult, BatchState, ProcessedBatch};
pub use error::ModelError;
pub use ids::{BatchId, RecordId, Role};
pub use policy::{
    Algorithm, EncryptionSpec, Entitlement, FieldKeySpec, MaskStrategy, PermissionMatrix,
    PiiPattern,
};
pub use record::{EncryptedValue, FieldValue, Record, child_path, index_path, path_root};
pub use schema::{Constraints, FieldSpec, FieldType, Schema};
