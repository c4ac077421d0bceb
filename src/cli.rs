use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug)]
pub enum Command {
    /// Extend the OEM partition into space vacated by moving the stateful
    /// partition towards the end of the disk.
    #[command(name = "extend-oem")]
    ExtendOem(ExtendOemOptions),

    /// Reorganize the disk layout, optionally reclaiming the root partition
    /// to free leading space first.
    #[command(name = "reorganize")]
    Reorganize(ReorganizeOptions),

    /// Build a dm-verity hash tree over the OEM partition and add a verity
    /// target to the kernel command line in grub.cfg.
    #[command(name = "seal-oem")]
    SealOem(SealOemOptions),
}

#[derive(Parser, Debug)]
pub struct ExtendOemOptions {
    /// Disk device holding the partitions, e.g. /dev/sda.
    #[clap(long)]
    pub disk: String,

    /// Partition number of the stateful partition.
    #[clap(long)]
    pub state_partition: u32,

    /// Partition number of the OEM partition.
    #[clap(long)]
    pub oem_partition: u32,

    /// New OEM partition size: a sector count, or a number with a B/K/M/G suffix.
    #[clap(long)]
    pub size: String,
}

#[derive(Parser, Debug)]
pub struct ReorganizeOptions {
    /// Disk device holding the partitions, e.g. /dev/sda.
    #[clap(long)]
    pub disk: String,

    /// Partition number of the stateful partition.
    #[clap(long)]
    pub state_partition: u32,

    /// Partition number of the OEM partition.
    #[clap(long)]
    pub oem_partition: u32,

    /// New OEM partition size: a sector count, or a number with a B/K/M/G suffix.
    #[clap(long)]
    pub size: String,

    /// Partition number of the root partition to shrink when --reclaim-root is set.
    #[clap(long, default_value = "3")]
    pub root_partition: u32,

    /// Shrink the root partition to its minimum footprint and reuse the freed space.
    #[clap(long, default_value = "false")]
    pub reclaim_root: bool,
}

#[derive(Parser, Debug)]
pub struct SealOemOptions {
    /// Disk device holding the partitions, e.g. /dev/sda.
    #[clap(long)]
    pub disk: String,

    /// Partition number of the OEM partition to seal.
    #[clap(long)]
    pub oem_partition: u32,

    /// Partition number of the EFI system partition carrying grub.cfg.
    #[clap(long, default_value = "12")]
    pub efi_partition: u32,

    /// Size of the OEM filesystem in 4 KiB blocks. The hash tree is written
    /// into the same partition, immediately after the filesystem.
    #[clap(long)]
    pub fs_size_blocks: u64,

    /// Name of the device-mapper device verified at boot.
    #[clap(long, default_value = "oemroot")]
    pub dm_name: String,
}
