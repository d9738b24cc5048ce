// Block media and partition discovery

pub mod block;
pub mod gpt;
pub mod partition;

pub use block::{BlockDevice, GptBlockDevice};
pub use partition::{PartitionInfo, PartitionTable, PartitionType};
