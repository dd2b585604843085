pub mod block_store;
pub mod env;
pub mod log;
pub mod preprocess;
pub mod records;
pub mod upload;

pub use block_store::{BlockStore, BlockStoreHttp, MockBlockStore};
pub use records::{stream_records, AttrValue, BlockRecord, RecordKey};
pub use upload::{estimate_upload, upload_all, UploadConfig, UploadSummary};
