pub mod gate;
pub mod response;
pub mod validate;

pub use gate::{gate_layer, Caller, Gate, Policy};
pub use response::{ApiResponse, ApiResult, Envelope, Page, PageQuery};
pub use validate::{QueryParams, ValidJson, Validate};
