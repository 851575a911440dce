use bitflags::bitflags;

/// A known CPU sensor location.
#[derive(enum_map::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CpuSensorLocation {
    Package,
    Cores,
    Uncore,
    Dram,
    System,
    GpuRail,
}

impl CpuSensorLocation {
    pub const ALL: [CpuSensorLocation; 6] = [
        CpuSensorLocation::Package,
        CpuSensorLocation::Cores,
        CpuSensorLocation::Uncore,
        CpuSensorLocation::Dram,
        CpuSensorLocation::System,
        CpuSensorLocation::GpuRail,
    ];
}

impl std::fmt::Display for CpuSensorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    /// Bitset of [`CpuSensorLocation`] values that a reader should watch.
    /// Construction fails unless at least one bit is set.
    pub struct LocationMask: u8 {
        const PACKAGE = 1 << 0;
        const CORES   = 1 << 1;
        const UNCORE  = 1 << 2;
        const DRAM    = 1 << 3;
        const SYSTEM  = 1 << 4;
        const GPU_RAIL = 1 << 5;
        const ALL = Self::PACKAGE.bits | Self::CORES.bits | Self::UNCORE.bits
            | Self::DRAM.bits | Self::SYSTEM.bits | Self::GPU_RAIL.bits;
    }
}

impl LocationMask {
    pub fn contains_location(&self, loc: CpuSensorLocation) -> bool {
        let bit = match loc {
            CpuSensorLocation::Package => LocationMask::PACKAGE,
            CpuSensorLocation::Cores => LocationMask::CORES,
            CpuSensorLocation::Uncore => LocationMask::UNCORE,
            CpuSensorLocation::Dram => LocationMask::DRAM,
            CpuSensorLocation::System => LocationMask::SYSTEM,
            CpuSensorLocation::GpuRail => LocationMask::GPU_RAIL,
        };
        self.contains(bit)
    }
}

bitflags! {
    /// Bitset of socket indices (bit N == socket N participates).
    /// At most 64 sockets are representable, which exceeds anything real
    /// hardware exposes.
    pub struct SocketMask: u64 {
        const NONE = 0;
    }
}

impl SocketMask {
    pub fn single(socket: u32) -> Self {
        SocketMask::from_bits_truncate(1u64 << socket)
    }

    pub fn all(n_sockets: u32) -> Self {
        let mut m = SocketMask::NONE;
        for s in 0..n_sockets {
            m |= SocketMask::single(s);
        }
        m
    }

    pub fn contains_socket(&self, socket: u32) -> bool {
        self.bits() & (1u64 << socket) != 0
    }
}

bitflags! {
    /// Bitset of GPU device indices, same layout as [`SocketMask`].
    pub struct DeviceMask: u64 {
        const NONE = 0;
    }
}

impl DeviceMask {
    pub fn single(device: u32) -> Self {
        DeviceMask::from_bits_truncate(1u64 << device)
    }

    pub fn all(n_devices: u32) -> Self {
        let mut m = DeviceMask::NONE;
        for d in 0..n_devices {
            m |= DeviceMask::single(d);
        }
        m
    }

    pub fn contains_device(&self, device: u32) -> bool {
        self.bits() & (1u64 << device) != 0
    }
}

/// GPU reading kind bitmask. Power is always
/// instantaneous; energy is a monotonically increasing counter.
bitflags! {
    pub struct GpuReadingKind: u8 {
        const POWER = 1 << 0;
        const ENERGY = 1 << 1;
    }
}
