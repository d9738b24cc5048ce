// Partition information for bootdev media

use gpt_disk_types::{guid, GptPartitionType};
use uguid::Guid;

/// Maximum partitions tracked per device
pub const MAX_PARTITIONS: usize = 32;

#[derive(Copy, Clone, Debug)]
pub struct PartitionInfo {
    /// Partition number, 1-based (0 is the whole device)
    pub number: u32,
    pub partition_type: PartitionType,
    pub unique_guid: Guid,
    pub start_lba: u64,
    pub end_lba: u64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PartitionType {
    EfiSystem,
    LinuxFilesystem,
    LinuxSwap,
    BasicData,
    Unknown,
}

impl PartitionInfo {
    pub fn num_blocks(&self) -> u64 {
        self.end_lba - self.start_lba + 1
    }
}

const LINUX_FILESYSTEM: GptPartitionType =
    GptPartitionType(guid!("0fc63daf-8483-4772-8e79-3d69d8477de4"));
const LINUX_SWAP: GptPartitionType = GptPartitionType(guid!("0657fd6d-a4ab-43c4-84e5-0933c84b4f4f"));

/// Partition types bootmeths care about, by GPT type GUID
const KNOWN_TYPES: [(PartitionType, GptPartitionType); 4] = [
    (PartitionType::EfiSystem, GptPartitionType::EFI_SYSTEM),
    (PartitionType::BasicData, GptPartitionType::BASIC_DATA),
    (PartitionType::LinuxFilesystem, LINUX_FILESYSTEM),
    (PartitionType::LinuxSwap, LINUX_SWAP),
];

impl PartitionType {
    pub fn from_gpt_guid(guid: &GptPartitionType) -> Self {
        KNOWN_TYPES
            .iter()
            .find(|(_, g)| g == guid)
            .map_or(PartitionType::Unknown, |(ty, _)| *ty)
    }

    pub fn to_gpt_guid(&self) -> GptPartitionType {
        KNOWN_TYPES
            .iter()
            .find(|(ty, _)| ty == self)
            .map_or(GptPartitionType::UNUSED, |(_, g)| *g)
    }
}

/// Partition table for a bootdev
pub struct PartitionTable {
    partitions: [Option<PartitionInfo>; MAX_PARTITIONS],
    count: usize,
    pub has_gpt: bool,
}

impl PartitionTable {
    pub const fn new() -> Self {
        Self {
            partitions: [None; MAX_PARTITIONS],
            count: 0,
            has_gpt: false,
        }
    }

    pub fn clear(&mut self) {
        self.partitions = [None; MAX_PARTITIONS];
        self.count = 0;
        self.has_gpt = false;
    }

    /// Returns false when the table is full
    pub fn add_partition(&mut self, info: PartitionInfo) -> bool {
        if self.count >= MAX_PARTITIONS {
            return false;
        }

        self.partitions[self.count] = Some(info);
        self.count += 1;
        true
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Look up a partition by its 1-based number
    pub fn find(&self, number: u32) -> Option<&PartitionInfo> {
        self.iter().find(|p| p.number == number)
    }

    /// Highest partition number present, 0 if there are none
    pub fn max_number(&self) -> u32 {
        self.iter().map(|p| p.number).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionInfo> {
        self.partitions[..self.count]
            .iter()
            .filter_map(|p| p.as_ref())
    }
}
