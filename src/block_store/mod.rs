mod store;

pub use store::BatchWriteOutcome;
pub use store::BlockStore;
pub use store::BlockStoreHttp;
pub use store::MockBlockStore;

// Hard per-call item limit of the store's bulk-write endpoint.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;
