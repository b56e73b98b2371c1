//! Bus command language and immutable programs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::regs::REGISTER_MASK;

/// One instruction of the bus sequencer.
///
/// Register indices are masked to 5 bits by the constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCommand {
    /// Stop issuing bus activity and mark the program complete.
    Done,
    /// Idle for `count` bus cycles.
    Delay {
        /// Cycles to idle.
        count: u32,
    },
    /// Hold until the next vertical sync edge.
    WaitVSync,
    /// Single register write.
    RegWrite {
        /// Target register.
        reg: u8,
        /// Byte written.
        value: u8,
    },
    /// The same byte written `count` times.
    RegWriteRepeated {
        /// Target register.
        reg: u8,
        /// Byte written.
        value: u8,
        /// Number of writes.
        count: u32,
    },
    /// `count` writes taken in order from an in-memory buffer.
    RegWriteArray {
        /// Target register.
        reg: u8,
        /// Source bytes.
        bytes: Arc<[u8]>,
        /// Number of writes.
        count: u32,
    },
    /// `count` writes streamed from a file.
    RegWriteFile {
        /// Target register.
        reg: u8,
        /// Source file, opened on first use.
        path: PathBuf,
        /// Number of writes.
        count: u32,
    },
    /// Replays the loaded replay table, one event per iteration.
    RegWriteReplay,
    /// Single register read.
    RegRead {
        /// Source register.
        reg: u8,
    },
    /// `count` reads appended to a file.
    RegReadFile {
        /// Source register.
        reg: u8,
        /// Destination file, created on first use.
        path: PathBuf,
        /// Number of reads.
        count: u32,
    },
}

impl BusCommand {
    /// Terminal command.
    #[must_use]
    pub const fn done() -> Self {
        Self::Done
    }

    /// Idles for `count` bus cycles.
    #[must_use]
    pub const fn delay(count: u32) -> Self {
        Self::Delay { count }
    }

    /// Waits for the next vertical sync.
    #[must_use]
    pub const fn wait_vsync() -> Self {
        Self::WaitVSync
    }

    /// Writes `value` to `reg` once.
    #[must_use]
    pub const fn reg_write(reg: u8, value: u8) -> Self {
        Self::RegWrite {
            reg: reg & REGISTER_MASK,
            value,
        }
    }

    /// Writes `value` to `reg` `count` times.
    #[must_use]
    pub const fn reg_write_repeated(reg: u8, value: u8, count: u32) -> Self {
        Self::RegWriteRepeated {
            reg: reg & REGISTER_MASK,
            value,
            count,
        }
    }

    /// Writes `count` bytes from `bytes` to `reg`.
    #[must_use]
    pub fn reg_write_array(reg: u8, bytes: impl Into<Arc<[u8]>>, count: u32) -> Self {
        Self::RegWriteArray {
            reg: reg & REGISTER_MASK,
            bytes: bytes.into(),
            count,
        }
    }

    /// Writes `count` bytes read from `path` to `reg`.
    #[must_use]
    pub fn reg_write_file(reg: u8, path: impl Into<PathBuf>, count: u32) -> Self {
        Self::RegWriteFile {
            reg: reg & REGISTER_MASK,
            path: path.into(),
            count,
        }
    }

    /// Replays the sequencer's replay table.
    #[must_use]
    pub const fn reg_write_replay() -> Self {
        Self::RegWriteReplay
    }

    /// Reads `reg` once.
    #[must_use]
    pub const fn reg_read(reg: u8) -> Self {
        Self::RegRead {
            reg: reg & REGISTER_MASK,
        }
    }

    /// Reads `reg` `count` times, appending each byte to `path`.
    #[must_use]
    pub fn reg_read_file(reg: u8, path: impl Into<PathBuf>, count: u32) -> Self {
        Self::RegReadFile {
            reg: reg & REGISTER_MASK,
            path: path.into(),
            count,
        }
    }

    /// Nominal number of iterations; replay is resolved against its table at dispatch.
    #[must_use]
    pub const fn repeat_count(&self) -> u32 {
        match self {
            Self::Done | Self::WaitVSync | Self::RegWriteReplay => 0,
            Self::RegWrite { .. } | Self::RegRead { .. } => 1,
            Self::Delay { count }
            | Self::RegWriteRepeated { count, .. }
            | Self::RegWriteArray { count, .. }
            | Self::RegWriteFile { count, .. }
            | Self::RegReadFile { count, .. } => *count,
        }
    }

    /// Returns true for commands that issue read transactions.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::RegRead { .. } | Self::RegReadFile { .. })
    }

    /// Returns true for commands that issue write transactions.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::RegWrite { .. }
                | Self::RegWriteRepeated { .. }
                | Self::RegWriteArray { .. }
                | Self::RegWriteFile { .. }
                | Self::RegWriteReplay
        )
    }

    /// Target register, when the command has a fixed one.
    #[must_use]
    pub const fn register(&self) -> Option<u8> {
        match self {
            Self::RegWrite { reg, .. }
            | Self::RegWriteRepeated { reg, .. }
            | Self::RegWriteArray { reg, .. }
            | Self::RegWriteFile { reg, .. }
            | Self::RegRead { reg }
            | Self::RegReadFile { reg, .. } => Some(*reg),
            Self::Done | Self::Delay { .. } | Self::WaitVSync | Self::RegWriteReplay => None,
        }
    }

    /// Short mnemonic used in log output.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Delay { .. } => "DELAY",
            Self::WaitVSync => "WAIT_VSYNC",
            Self::RegWrite { .. } => "WRITE",
            Self::RegWriteRepeated { .. } => "WRITE_REP",
            Self::RegWriteArray { .. } => "WRITE_ARRAY",
            Self::RegWriteFile { .. } => "WRITE_FILE",
            Self::RegWriteReplay => "WRITE_REPLAY",
            Self::RegRead { .. } => "READ",
            Self::RegReadFile { .. } => "READ_FILE",
        }
    }
}

/// Ordered, immutable list of bus commands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    commands: Arc<[BusCommand]>,
}

impl Program {
    /// Builds a program from commands in execution order.
    #[must_use]
    pub fn new(commands: impl Into<Vec<BusCommand>>) -> Self {
        Self {
            commands: commands.into().into(),
        }
    }

    /// Command at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BusCommand> {
        self.commands.get(index)
    }

    /// Number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true when the program has no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterates the commands in order.
    pub fn iter(&self) -> impl Iterator<Item = &BusCommand> {
        self.commands.iter()
    }

    /// Returns true when any command replays the replay table.
    #[must_use]
    pub fn uses_replay(&self) -> bool {
        self.iter().any(|cmd| matches!(cmd, BusCommand::RegWriteReplay))
    }
}

impl FromIterator<BusCommand> for Program {
    fn from_iter<T: IntoIterator<Item = BusCommand>>(iter: T) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BusCommand, Program};

    #[test]
    fn constructors_mask_register_to_five_bits() {
        assert_eq!(
            BusCommand::reg_write(0x25, 1),
            BusCommand::RegWrite { reg: 0x05, value: 1 }
        );
        assert_eq!(BusCommand::reg_read(0xFF).register(), Some(0x1F));
    }

    #[test]
    fn classification_splits_reads_and_writes() {
        let read = BusCommand::reg_read_file(3, "out.bin", 4);
        assert!(read.is_read());
        assert!(!read.is_write());
        assert!(BusCommand::reg_write_replay().is_write());
        assert!(!BusCommand::delay(5).is_read());
        assert!(!BusCommand::delay(5).is_write());
    }

    #[test]
    fn repeat_counts_follow_command_kind() {
        assert_eq!(BusCommand::reg_write(0, 0).repeat_count(), 1);
        assert_eq!(BusCommand::delay(50).repeat_count(), 50);
        assert_eq!(
            BusCommand::reg_write_array(3, vec![1, 2, 3], 3).repeat_count(),
            3
        );
        assert_eq!(BusCommand::wait_vsync().repeat_count(), 0);
    }

    #[test]
    fn program_collects_and_reports_replay_use() {
        let program: Program = [BusCommand::delay(1), BusCommand::reg_write_replay()]
            .into_iter()
            .collect();
        assert_eq!(program.len(), 2);
        assert!(program.uses_replay());
        assert!(!Program::new(vec![BusCommand::done()]).uses_replay());
        assert!(Program::default().is_empty());
    }
}
