pub mod estimate;
pub mod job;
pub mod record;

pub use estimate::{Estimate, ResultRecord, RESULT_COLUMNS, STATUS_FAILED, STATUS_OK};
pub use job::{balanced_sizes, ChunkState, JobLayout, JobMeta};
pub use record::{InputColumns, InputRecord};
