//! Wire types shared between the image search client and the backend
//! search/inventory service.

pub mod error;
pub mod search;

pub use error::RpcCode;
pub use error::RpcError;
pub use search::ImageRecord;
pub use search::SearchImagesRequest;
pub use search::SearchImagesResponse;
