pub mod batch_ctx;
pub mod batch_flow;
pub mod checkpoint;
pub mod pacer;

pub use batch_ctx::BatchCtx;
pub use batch_flow::{clamp_batch_size, BatchFlow, ItemOutcome, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
pub use checkpoint::{CheckpointStore, RunCheckpoint};
pub use pacer::{FixedDelayPacer, Pacer, TokenBucketPacer};
