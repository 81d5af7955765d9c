//! Adaptive I/O strategy selection.
//!
//! An [`IoStrategy`] records, for one file, which transfer mechanism each
//! direction uses and which buffer shapes those mechanisms require or prefer.
//! Defaults are inferred from the open direction, the access pattern, the
//! file's sizes and a [`StrategyConfig`] chosen once at startup.
//!
//! # Design
//!
//! | Direction | Pattern    | Mechanism (profile A / B)                        |
//! |-----------|------------|--------------------------------------------------|
//! | input     | sequential | paged / paged with read-ahead                    |
//! | input     | random     | direct, block aligned                            |
//! | output    | sequential | paged below threshold, mapped above / paged      |
//! | output    | random     | direct, block aligned                            |
//! | both      | sequential | paged with read-ahead / mapped below threshold   |
//! | both      | random     | direct, block aligned                            |
//!
//! Selection is a pure function of its inputs; the file is only touched by
//! [`IoStrategy::for_path`] and [`IoStrategy::refresh`], which stat it.

mod open_mode;
mod profile;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::constraints::ConstraintSet;
use crate::file::sys;
use crate::{Error, Result};

pub use open_mode::OpenMode;
pub use profile::{KernelProfile, StrategyConfig, DEFAULT_LARGE_FILE_THRESHOLD};

const KIB: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPattern {
    Sequential,
    Random,
}

impl fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPattern::Sequential => f.write_str("sequential"),
            AccessPattern::Random => f.write_str("random"),
        }
    }
}

impl FromStr for AccessPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seq" | "sequential" => Ok(AccessPattern::Sequential),
            "random" | "rand" => Ok(AccessPattern::Random),
            _ => Err(Error::InvalidArgument("unknown access pattern")),
        }
    }
}

/// Low-level transfer mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoMethod {
    /// Buffered reads and writes through the page cache.
    Paged,
    /// Unbuffered transfers; buffers must be block aligned.
    Direct,
    /// Memory-mapped access.
    Mapped,
}

impl fmt::Display for IoMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoMethod::Paged => f.write_str("paged"),
            IoMethod::Direct => f.write_str("direct"),
            IoMethod::Mapped => f.write_str("mapped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
    Both,
}

impl Direction {
    pub fn has_input(self) -> bool {
        matches!(self, Direction::Input | Direction::Both)
    }

    pub fn has_output(self) -> bool {
        matches!(self, Direction::Output | Direction::Both)
    }
}

/// Required and preferred buffer constraints for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionConstraints {
    pub required: ConstraintSet,
    pub preferred: ConstraintSet,
}

/// Sizes the selection policy is keyed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub current_size: Option<u64>,
    pub expected_size: Option<u64>,
    pub block_size: Option<u64>,
}

impl FileMetadata {
    /// Stats `path`. A missing file reports size 0 and the block size of its
    /// parent directory, so that files about to be created can be planned.
    pub fn probe(path: &Path, expected_size: Option<u64>) -> Result<Self> {
        let st = match sys::stat(path) {
            Ok(st) => st,
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                let parent = match path.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p,
                    _ => Path::new("."),
                };
                sys::Stat {
                    size: 0,
                    block_size: sys::stat(parent)?.block_size,
                }
            }
            Err(err) => return Err(err),
        };
        Ok(Self {
            current_size: Some(st.size),
            expected_size,
            block_size: Some(st.block_size),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoStrategy {
    direction: Direction,
    input: DirectionConstraints,
    output: DirectionConstraints,
    fused: DirectionConstraints,
    metadata: FileMetadata,
    read_method: Option<IoMethod>,
    write_method: Option<IoMethod>,
    read_ahead: bool,
    preallocate: bool,
    large_file_threshold: u64,
}

impl IoStrategy {
    /// An undecided strategy: no mechanisms, no constraints.
    pub fn new(direction: Direction, metadata: FileMetadata) -> Self {
        Self {
            direction,
            input: DirectionConstraints::default(),
            output: DirectionConstraints::default(),
            fused: DirectionConstraints::default(),
            metadata,
            read_method: None,
            write_method: None,
            read_ahead: false,
            preallocate: false,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }

    /// Chooses mechanisms and constraints for the given access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStrategy`] if `metadata` lacks a size the
    /// policy needs (the block size always, and the current size for input).
    pub fn select(
        direction: Direction,
        pattern: AccessPattern,
        metadata: FileMetadata,
        config: &StrategyConfig,
    ) -> Result<Self> {
        let mut strategy = Self::new(direction, metadata);
        strategy.infer_defaults(pattern, config)?;
        Ok(strategy)
    }

    /// Stats `path` and selects a strategy for opening it with `mode`.
    pub fn for_path(
        path: &Path,
        mode: OpenMode,
        pattern: AccessPattern,
        expected_size: Option<u64>,
        config: &StrategyConfig,
    ) -> Result<Self> {
        let metadata = FileMetadata::probe(path, expected_size)?;
        Self::select(mode.direction(), pattern, metadata, config)
    }

    /// Resets mechanisms and constraints to the policy defaults.
    pub fn infer_defaults(&mut self, pattern: AccessPattern, config: &StrategyConfig) -> Result<()> {
        let block = self.block_alignment()?;
        self.input = DirectionConstraints::default();
        self.output = DirectionConstraints::default();
        self.fused = DirectionConstraints::default();
        self.read_method = None;
        self.write_method = None;
        self.read_ahead = false;
        self.preallocate = false;
        self.large_file_threshold = config.large_file_threshold;

        let threshold = config.large_file_threshold;
        let aligned = ConstraintSet::new().with_align_to(block)?;

        match (self.direction, pattern) {
            (Direction::Input, AccessPattern::Sequential) => {
                let current = self.require_current_size()?;
                self.read_method = Some(IoMethod::Paged);
                match config.profile {
                    KernelProfile::Linux => {
                        self.input.preferred =
                            ConstraintSet::from_bounds(Some(4 * KIB), Some(256 * KIB), None, Some(block))?;
                    }
                    KernelProfile::Xnu => {
                        self.read_ahead = true;
                        self.input.preferred = if current < threshold {
                            ConstraintSet::from_bounds(Some(4 * KIB), Some(1024 * KIB), None, Some(block))?
                        } else {
                            ConstraintSet::from_bounds(Some(4096 * KIB), None, None, Some(block))?
                        };
                    }
                }
            }
            (Direction::Input, AccessPattern::Random) => {
                self.require_current_size()?;
                self.read_method = Some(IoMethod::Direct);
                self.input = DirectionConstraints {
                    required: aligned,
                    preferred: aligned,
                };
            }
            (Direction::Output, AccessPattern::Sequential) => {
                let expected = self.metadata.expected_size;
                self.preallocate = expected.is_some();
                match config.profile {
                    KernelProfile::Linux => match expected {
                        Some(size) if size >= threshold => {
                            self.write_method = Some(IoMethod::Mapped);
                        }
                        _ => {
                            self.write_method = Some(IoMethod::Paged);
                            self.output.preferred =
                                ConstraintSet::from_bounds(Some(4096 * KIB), None, None, Some(block))?;
                        }
                    },
                    KernelProfile::Xnu => {
                        self.write_method = Some(IoMethod::Paged);
                        self.output.preferred = ConstraintSet::new().with_at_least(1024 * KIB)?;
                    }
                }
            }
            (Direction::Output, AccessPattern::Random) => {
                self.preallocate = self.metadata.expected_size.is_some();
                self.write_method = Some(IoMethod::Direct);
                self.output = DirectionConstraints {
                    required: aligned,
                    preferred: aligned,
                };
            }
            (Direction::Both, AccessPattern::Sequential) => {
                self.preallocate = self.grows();
                match config.profile {
                    KernelProfile::Linux => {
                        self.set_paged_both(aligned);
                        self.read_ahead = true;
                    }
                    KernelProfile::Xnu => {
                        let size = self.metadata.expected_size.or(self.metadata.current_size);
                        let mappable = self.metadata.expected_size.is_some()
                            && self.metadata.current_size.is_some()
                            && size.is_some_and(|s| s <= threshold);
                        if mappable {
                            self.read_method = Some(IoMethod::Mapped);
                            self.write_method = Some(IoMethod::Mapped);
                        } else {
                            self.set_paged_both(aligned);
                        }
                    }
                }
            }
            (Direction::Both, AccessPattern::Random) => {
                self.preallocate = self.grows();
                self.read_method = Some(IoMethod::Direct);
                self.write_method = Some(IoMethod::Direct);
                let both = DirectionConstraints {
                    required: aligned,
                    preferred: aligned,
                };
                self.input = both;
                self.output = both;
                self.fused = both;
            }
        }

        log::debug!(
            "selected {:?}/{} strategy: read={:?} write={:?} read_ahead={} preallocate={} profile={}",
            self.direction,
            pattern,
            self.read_method,
            self.write_method,
            self.read_ahead,
            self.preallocate,
            config.profile
        );
        Ok(())
    }

    fn set_paged_both(&mut self, aligned: ConstraintSet) {
        self.read_method = Some(IoMethod::Paged);
        self.write_method = Some(IoMethod::Paged);
        self.input.preferred = aligned;
        self.output.preferred = aligned;
        self.fused.preferred = aligned;
    }

    fn grows(&self) -> bool {
        match (self.metadata.expected_size, self.metadata.current_size) {
            (Some(expected), Some(current)) => expected > current,
            (Some(_), None) => true,
            _ => false,
        }
    }

    fn require_current_size(&self) -> Result<u64> {
        self.metadata
            .current_size
            .ok_or(Error::InvalidStrategy("current file size unknown"))
    }

    fn block_alignment(&self) -> Result<usize> {
        let block = self
            .metadata
            .block_size
            .ok_or(Error::InvalidStrategy("block size unknown"))?;
        match usize::try_from(block) {
            Ok(0) | Err(_) => Err(Error::InvalidStrategy("block size out of range")),
            Ok(block) => Ok(block),
        }
    }

    /// Checks the invariants every transfer relies on.
    ///
    /// # Errors
    ///
    /// - an active direction has no mechanism
    /// - a mapped direction lacks the size that determines its mapping
    /// - a direct direction's constraints are not block aligned
    pub fn validate(&self) -> Result<()> {
        if self.direction.has_input() {
            match self.read_method {
                None => return Err(Error::InvalidStrategy("no read mechanism chosen")),
                Some(IoMethod::Mapped) if self.metadata.current_size.is_none() => {
                    return Err(Error::InvalidStrategy("mapped input requires the current size"));
                }
                Some(IoMethod::Direct) => self.check_block_aligned(&self.input)?,
                _ => {}
            }
        }
        if self.direction.has_output() {
            match self.write_method {
                None => return Err(Error::InvalidStrategy("no write mechanism chosen")),
                Some(IoMethod::Mapped) if self.metadata.expected_size.is_none() => {
                    return Err(Error::InvalidStrategy("mapped output requires the expected size"));
                }
                Some(IoMethod::Direct) => self.check_block_aligned(&self.output)?,
                _ => {}
            }
        }
        if self.direction == Direction::Both
            && self.read_method == Some(IoMethod::Direct)
            && self.write_method == Some(IoMethod::Direct)
        {
            self.check_block_aligned(&self.fused)?;
        }
        Ok(())
    }

    fn check_block_aligned(&self, constraints: &DirectionConstraints) -> Result<()> {
        let block = self.block_alignment()?;
        let aligned = |set: &ConstraintSet| set.align_to().is_some_and(|a| a % block == 0);
        if aligned(&constraints.required) && aligned(&constraints.preferred) {
            Ok(())
        } else {
            Err(Error::InvalidStrategy("direct I/O requires block-aligned constraints"))
        }
    }

    /// True if a single buffer may serve both directions.
    pub fn supports_fused_buffers(&self) -> bool {
        (self.read_method == Some(IoMethod::Mapped)) == (self.write_method == Some(IoMethod::Mapped))
    }

    /// Re-stats `path` and records the new size and block size.
    ///
    /// Returns true if the size moved by more than half of the previously
    /// recorded size.
    pub fn refresh(&mut self, path: &Path) -> Result<bool> {
        let st = sys::stat(path)?;
        let significant = match self.metadata.current_size {
            None => true,
            Some(0) => st.size > 0,
            Some(old) => st.size.abs_diff(old) > old / 2,
        };
        self.metadata.current_size = Some(st.size);
        self.metadata.block_size = Some(st.block_size);
        Ok(significant)
    }

    /// Refreshes from `path` and re-infers defaults if the size changed
    /// significantly. Returns whether defaults were re-inferred.
    pub fn recalibrate(&mut self, path: &Path, pattern: AccessPattern, config: &StrategyConfig) -> Result<bool> {
        if !self.refresh(path)? {
            return Ok(false);
        }
        self.infer_defaults(pattern, config)?;
        Ok(true)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn current_size(&self) -> Option<u64> {
        self.metadata.current_size
    }

    pub fn expected_size(&self) -> Option<u64> {
        self.metadata.expected_size
    }

    pub fn block_size(&self) -> Option<u64> {
        self.metadata.block_size
    }

    pub fn large_file_threshold(&self) -> u64 {
        self.large_file_threshold
    }

    pub fn read_method(&self) -> Option<IoMethod> {
        self.read_method
    }

    pub fn write_method(&self) -> Option<IoMethod> {
        self.write_method
    }

    /// Mechanism serving `direction`; for [`Direction::Both`] only when the
    /// two directions agree.
    pub fn method(&self, direction: Direction) -> Option<IoMethod> {
        match direction {
            Direction::Input => self.read_method,
            Direction::Output => self.write_method,
            Direction::Both if self.read_method == self.write_method => self.read_method,
            Direction::Both => None,
        }
    }

    pub fn read_ahead(&self) -> bool {
        self.read_ahead
    }

    pub fn preallocate(&self) -> bool {
        self.preallocate
    }

    /// Constraints for `direction`; [`Direction::Both`] selects the fused set.
    pub fn constraints(&self, direction: Direction) -> &DirectionConstraints {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
            Direction::Both => &self.fused,
        }
    }

    pub fn constraints_mut(&mut self, direction: Direction) -> &mut DirectionConstraints {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
            Direction::Both => &mut self.fused,
        }
    }

    /// Overrides the read mechanism.
    ///
    /// # Errors
    ///
    /// Mapping the input requires the current size.
    pub fn set_read_method(&mut self, method: IoMethod) -> Result<()> {
        if method == IoMethod::Mapped && self.metadata.current_size.is_none() {
            return Err(Error::InvalidStrategy("mapped input requires the current size"));
        }
        self.read_method = Some(method);
        Ok(())
    }

    /// Overrides the write mechanism. Mapping the output enables
    /// preallocation.
    ///
    /// # Errors
    ///
    /// Mapping the output requires the expected size.
    pub fn set_write_method(&mut self, method: IoMethod) -> Result<()> {
        if method == IoMethod::Mapped {
            if self.metadata.expected_size.is_none() {
                return Err(Error::InvalidStrategy("mapped output requires the expected size"));
            }
            self.preallocate = true;
        }
        self.write_method = Some(method);
        Ok(())
    }

    pub fn set_read_ahead(&mut self, read_ahead: bool) {
        self.read_ahead = read_ahead;
    }

    pub fn set_preallocate(&mut self, preallocate: bool) {
        self.preallocate = preallocate;
    }

    pub fn set_expected_size(&mut self, expected_size: Option<u64>) {
        self.metadata.expected_size = expected_size;
    }
}

impl fmt::Display for IoStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn size(v: Option<u64>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        fn method(m: Option<IoMethod>) -> String {
            m.map_or_else(|| "-".to_string(), |m| m.to_string())
        }
        writeln!(f, "direction:      {:?}", self.direction)?;
        writeln!(f, "current size:   {}", size(self.metadata.current_size))?;
        writeln!(f, "expected size:  {}", size(self.metadata.expected_size))?;
        writeln!(f, "block size:     {}", size(self.metadata.block_size))?;
        writeln!(f, "read method:    {}", method(self.read_method))?;
        writeln!(f, "write method:   {}", method(self.write_method))?;
        writeln!(f, "read-ahead:     {}", self.read_ahead)?;
        writeln!(f, "preallocate:    {}", self.preallocate)?;
        writeln!(f, "fused buffers:  {}", self.supports_fused_buffers())?;
        for (name, direction) in [
            ("input", Direction::Input),
            ("output", Direction::Output),
            ("fused", Direction::Both),
        ] {
            let c = self.constraints(direction);
            writeln!(f, "{name:<6} required:  {}", c.required)?;
            writeln!(f, "{name:<6} preferred: {}", c.preferred)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn meta(current: Option<u64>, expected: Option<u64>) -> FileMetadata {
        FileMetadata {
            current_size: current,
            expected_size: expected,
            block_size: Some(4096),
        }
    }

    fn linux() -> StrategyConfig {
        StrategyConfig::with_profile(KernelProfile::Linux)
    }

    fn xnu() -> StrategyConfig {
        StrategyConfig::with_profile(KernelProfile::Xnu)
    }

    #[test]
    fn random_read_uses_direct_io() -> Result<()> {
        for config in [linux(), xnu()] {
            let s = IoStrategy::select(Direction::Input, AccessPattern::Random, meta(Some(MIB), None), &config)?;
            assert_eq!(s.read_method(), Some(IoMethod::Direct));
            assert!(!s.read_ahead());
            assert_eq!(s.constraints(Direction::Input).required.align_to(), Some(4096));
            assert_eq!(s.constraints(Direction::Input).preferred.align_to(), Some(4096));
            s.validate()?;
        }
        Ok(())
    }

    #[test]
    fn sequential_read_per_profile() -> Result<()> {
        let s = IoStrategy::select(Direction::Input, AccessPattern::Sequential, meta(Some(MIB), None), &linux())?;
        assert_eq!(s.read_method(), Some(IoMethod::Paged));
        assert!(!s.read_ahead());
        let preferred = s.constraints(Direction::Input).preferred;
        assert_eq!(preferred.at_least(), Some(4 * 1024));
        assert_eq!(preferred.at_most(), Some(256 * 1024));
        assert_eq!(preferred.align_to(), Some(4096));

        let s = IoStrategy::select(Direction::Input, AccessPattern::Sequential, meta(Some(MIB), None), &xnu())?;
        assert!(s.read_ahead());
        assert_eq!(s.constraints(Direction::Input).preferred.at_most(), Some(1024 * 1024));

        let s = IoStrategy::select(
            Direction::Input,
            AccessPattern::Sequential,
            meta(Some(512 * MIB), None),
            &xnu(),
        )?;
        let preferred = s.constraints(Direction::Input).preferred;
        assert_eq!(preferred.at_least(), Some(4096 * 1024));
        assert_eq!(preferred.at_most(), None);
        Ok(())
    }

    #[test]
    fn input_requires_current_size() {
        let metadata = meta(None, None);
        let err = IoStrategy::select(Direction::Input, AccessPattern::Sequential, metadata, &linux());
        assert!(matches!(err, Err(Error::InvalidStrategy(_))));

        let no_block = FileMetadata {
            block_size: None,
            ..meta(Some(10), None)
        };
        let err = IoStrategy::select(Direction::Input, AccessPattern::Random, no_block, &linux());
        assert!(matches!(err, Err(Error::InvalidStrategy(_))));
    }

    #[test]
    fn sequential_write_switches_on_threshold() -> Result<()> {
        let small = IoStrategy::select(Direction::Output, AccessPattern::Sequential, meta(Some(0), Some(MIB)), &linux())?;
        assert_eq!(small.write_method(), Some(IoMethod::Paged));
        assert!(small.preallocate());
        assert_eq!(small.constraints(Direction::Output).preferred.at_least(), Some(4096 * 1024));

        let large = IoStrategy::select(
            Direction::Output,
            AccessPattern::Sequential,
            meta(Some(0), Some(300 * MIB)),
            &linux(),
        )?;
        assert_eq!(large.write_method(), Some(IoMethod::Mapped));
        large.validate()?;

        let unknown = IoStrategy::select(Direction::Output, AccessPattern::Sequential, meta(Some(0), None), &linux())?;
        assert_eq!(unknown.write_method(), Some(IoMethod::Paged));
        assert!(!unknown.preallocate());

        let xnu = IoStrategy::select(Direction::Output, AccessPattern::Sequential, meta(Some(0), Some(MIB)), &xnu())?;
        assert_eq!(xnu.write_method(), Some(IoMethod::Paged));
        assert_eq!(xnu.constraints(Direction::Output).preferred.at_least(), Some(1024 * 1024));
        Ok(())
    }

    #[test]
    fn random_write_is_block_aligned() -> Result<()> {
        let s = IoStrategy::select(Direction::Output, AccessPattern::Random, meta(Some(0), None), &linux())?;
        assert_eq!(s.write_method(), Some(IoMethod::Direct));
        let c = s.constraints(Direction::Output);
        assert_eq!(c.required.align_to(), Some(4096));
        assert_eq!(c.preferred.align_to(), Some(4096));
        s.validate()
    }

    #[test]
    fn read_write_sequential_per_profile() -> Result<()> {
        let s = IoStrategy::select(Direction::Both, AccessPattern::Sequential, meta(Some(MIB), Some(2 * MIB)), &linux())?;
        assert_eq!(s.read_method(), Some(IoMethod::Paged));
        assert_eq!(s.write_method(), Some(IoMethod::Paged));
        assert!(s.read_ahead());
        assert!(s.preallocate());

        let s = IoStrategy::select(Direction::Both, AccessPattern::Sequential, meta(Some(MIB), Some(2 * MIB)), &xnu())?;
        assert_eq!(s.method(Direction::Both), Some(IoMethod::Mapped));
        assert!(!s.read_ahead());
        assert!(s.supports_fused_buffers());

        let s = IoStrategy::select(
            Direction::Both,
            AccessPattern::Sequential,
            meta(Some(MIB), Some(512 * MIB)),
            &xnu(),
        )?;
        assert_eq!(s.method(Direction::Both), Some(IoMethod::Paged));
        Ok(())
    }

    #[test]
    fn read_write_random_is_direct() -> Result<()> {
        let s = IoStrategy::select(Direction::Both, AccessPattern::Random, meta(Some(MIB), None), &linux())?;
        assert_eq!(s.method(Direction::Both), Some(IoMethod::Direct));
        assert!(!s.read_ahead());
        assert!(!s.preallocate());
        assert_eq!(s.constraints(Direction::Both).required.align_to(), Some(4096));
        s.validate()
    }

    #[test]
    fn mixed_mechanisms_disallow_fused_buffers() -> Result<()> {
        let mut s = IoStrategy::select(Direction::Both, AccessPattern::Sequential, meta(Some(MIB), Some(MIB)), &linux())?;
        assert!(s.supports_fused_buffers());
        s.set_write_method(IoMethod::Mapped)?;
        assert!(!s.supports_fused_buffers());
        assert_eq!(s.method(Direction::Both), None);
        Ok(())
    }

    #[test]
    fn validate_rejects_unaligned_direct() -> Result<()> {
        let mut s = IoStrategy::select(Direction::Input, AccessPattern::Random, meta(Some(MIB), None), &linux())?;
        s.constraints_mut(Direction::Input).preferred = ConstraintSet::new().with_align_to(512)?;
        assert!(matches!(s.validate(), Err(Error::InvalidStrategy(_))));
        Ok(())
    }

    #[test]
    fn mapped_output_requires_expected_size() -> Result<()> {
        let mut s = IoStrategy::select(Direction::Output, AccessPattern::Sequential, meta(Some(0), None), &linux())?;
        assert!(s.set_write_method(IoMethod::Mapped).is_err());
        s.set_expected_size(Some(MIB));
        s.set_write_method(IoMethod::Mapped)?;
        assert!(s.preallocate());
        s.validate()
    }

    #[test]
    fn refresh_detects_significant_growth() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("grow.bin");
        std::fs::write(&path, vec![0u8; 1000])?;
        let config = linux();
        let mut s = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config)?;
        assert_eq!(s.current_size(), Some(1000));

        std::fs::write(&path, vec![0u8; 1400])?;
        assert!(!s.refresh(&path)?);

        std::fs::write(&path, vec![0u8; 4000])?;
        assert!(s.recalibrate(&path, AccessPattern::Sequential, &config)?);
        assert_eq!(s.current_size(), Some(4000));
        Ok(())
    }

    #[test]
    fn probe_plans_missing_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("new.bin");
        let metadata = FileMetadata::probe(&path, Some(MIB))?;
        assert_eq!(metadata.current_size, Some(0));
        assert!(metadata.block_size.is_some());
        Ok(())
    }
}
