//! Executable loader router
//!
//! Classifies an executable, hands it to the matching external loader and
//! tags the new process with the chosen ABI before it is first scheduled.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use lk_api::{AbiPrivate, AbiTag, Error, Pid, Result};
use log::{debug, info};

use crate::process::{ProcessSpec, ProcessTable};

/// Bytes of header the router asks the loader for
pub const HEADER_LEN: usize = 0x20;

pub const ELF_MAGIC: &[u8; 4] = b"\x7FELF";
pub const MZ_MAGIC: &[u8; 2] = b"MZ";

/// Marker a DOS executable carries to request the KPI v2 interface
pub const KPI_MARKER: &[u8; 4] = b"LKV2";
/// Offset of [`KPI_MARKER`] in the MZ header (the reserved words)
pub const KPI_MARKER_OFFSET: usize = 0x1C;

fn has_extension(filename: &str, ext: &str) -> bool {
    let name = filename.as_bytes();
    name.len() >= ext.len() && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext.as_bytes())
}

/// Classifies by file name alone. Never returns `Unknown`.
pub fn detect(filename: &str) -> AbiTag {
    if has_extension(filename, ".exe") || has_extension(filename, ".com") {
        AbiTag::DosInterrupt
    } else if has_extension(filename, ".elf") || has_extension(filename, ".out") {
        AbiTag::Linux
    } else {
        AbiTag::Native
    }
}

/// Classifies by header bytes, falling back to [`detect`]
pub fn detect_image(filename: &str, header: Option<&[u8]>) -> AbiTag {
    let Some(header) = header else {
        return detect(filename);
    };
    if header.starts_with(ELF_MAGIC) {
        AbiTag::Linux
    } else if header.starts_with(MZ_MAGIC) {
        let marker = header.get(KPI_MARKER_OFFSET..KPI_MARKER_OFFSET + KPI_MARKER.len());
        if marker == Some(&KPI_MARKER[..]) {
            AbiTag::DosSyscall
        } else {
            AbiTag::DosInterrupt
        }
    } else {
        detect(filename)
    }
}

/// Where a freshly loaded image starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadedImage {
    pub entry: u32,
}

/// The external program loaders
pub trait ImageLoader: Send + Sync {
    /// Up to [`HEADER_LEN`] leading bytes of `filename`, if readable
    fn peek_header(&self, filename: &str) -> Option<Vec<u8>>;

    fn load_dos_exe(&self, filename: &str, argv: &[String], envp: &[String]) -> Result<LoadedImage>;

    fn load_linux_exe(&self, filename: &str, argv: &[String], envp: &[String]) -> Result<LoadedImage>;

    fn load_native_exe(&self, filename: &str, argv: &[String], envp: &[String]) -> Result<LoadedImage>;
}

/// Result of [`LoaderRouter::exec`]
#[derive(Debug)]
pub struct ExecOutcome {
    pub tag: AbiTag,
    /// Tag and private blob detached by the ABI switch, if the tag changed
    pub previous: Option<(AbiTag, AbiPrivate)>,
}

/// Picks a loader per executable and tags the result
pub struct LoaderRouter {
    loader: Arc<dyn ImageLoader>,
    processes: Arc<ProcessTable>,
}

impl LoaderRouter {
    pub fn new(loader: Arc<dyn ImageLoader>, processes: Arc<ProcessTable>) -> Self {
        Self { loader, processes }
    }

    /// ABI `filename` would run under when started by `parent`.
    ///
    /// A DOS executable started from a KPI v2 process stays on KPI v2.
    pub fn classify(&self, filename: &str, parent: Option<Pid>) -> AbiTag {
        let header = self.loader.peek_header(filename);
        let tag = detect_image(filename, header.as_deref());
        let parent_tag = parent.and_then(|p| self.processes.abi_context_of(p, |ctx| ctx.tag));
        if tag == AbiTag::DosInterrupt && parent_tag == Some(AbiTag::DosSyscall) {
            return AbiTag::DosSyscall;
        }
        tag
    }

    fn load_image(&self, tag: AbiTag, filename: &str, argv: &[String], envp: &[String]) -> Result<LoadedImage> {
        match tag {
            AbiTag::DosInterrupt | AbiTag::DosSyscall => self.loader.load_dos_exe(filename, argv, envp),
            AbiTag::Linux => self.loader.load_linux_exe(filename, argv, envp),
            AbiTag::Native | AbiTag::Unknown => self.loader.load_native_exe(filename, argv, envp),
        }
    }

    /// Loads `filename` as a new child of `parent` and returns its PID
    pub fn load(&self, filename: &str, argv: &[String], envp: &[String], parent: Option<Pid>) -> Result<Pid> {
        let tag = self.classify(filename, parent);
        let image = self.load_image(tag, filename, argv, envp)?;
        let pid = self.processes.create(
            ProcessSpec::new(filename, image.entry)
                .args(argv)
                .env(envp)
                .parent(parent),
        )?;
        self.processes.set_abi(pid, tag)?;
        info!("loader: {} -> pid {} ({})", filename, pid, tag);
        Ok(pid)
    }

    /// Replaces the image of `pid` and moves it to the ABI of the new image
    pub fn exec(&self, pid: Pid, filename: &str, argv: &[String], envp: &[String]) -> Result<ExecOutcome> {
        match self.processes.with_process(pid, |p| p.state) {
            None => return Err(Error::NoSuchProcess(pid)),
            Some(state) if !state.is_alive() => {
                return Err(Error::InvalidState(alloc::format!("pid {} has exited", pid)));
            }
            Some(_) => {}
        }
        let tag = self.classify(filename, Some(pid));
        let image = self.load_image(tag, filename, argv, envp)?;
        self.processes.replace_image(pid, filename, image.entry, argv, envp)?;
        let previous = self.processes.set_abi(pid, tag)?;
        debug!("loader: pid {} exec {} ({})", pid, filename, tag);
        Ok(ExecOutcome { tag, previous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mz_with_marker() -> Vec<u8> {
        let mut header = alloc::vec![0u8; HEADER_LEN];
        header[..2].copy_from_slice(MZ_MAGIC);
        header[KPI_MARKER_OFFSET..KPI_MARKER_OFFSET + 4].copy_from_slice(KPI_MARKER);
        header
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect("prog.elf"), AbiTag::Linux);
        assert_eq!(detect("a.out"), AbiTag::Linux);
        assert_eq!(detect("PROG.EXE"), AbiTag::DosInterrupt);
        assert_eq!(detect("command.Com"), AbiTag::DosInterrupt);
        assert_eq!(detect("tool"), AbiTag::Native);
        assert_eq!(detect(""), AbiTag::Native);
        assert_eq!(detect("exe"), AbiTag::Native);
    }

    #[test]
    fn test_detect_non_ascii_names() {
        assert_eq!(detect("ü"), AbiTag::Native);
        assert_eq!(detect("проба.exe"), AbiTag::DosInterrupt);
    }

    #[test]
    fn test_header_overrides_extension() {
        assert_eq!(detect_image("tool", Some(b"\x7FELF\x01\x01")), AbiTag::Linux);
        assert_eq!(detect_image("game.elf", Some(b"MZ\x90\x00")), AbiTag::DosInterrupt);
        assert_eq!(detect_image("game.exe", Some(&mz_with_marker())), AbiTag::DosSyscall);
    }

    #[test]
    fn test_short_or_foreign_header_falls_back() {
        assert_eq!(detect_image("x.exe", Some(b"")), AbiTag::DosInterrupt);
        assert_eq!(detect_image("x.out", Some(b"#!/bin/sh")), AbiTag::Linux);
        assert_eq!(detect_image("x", None), AbiTag::Native);
        // MZ truncated before the marker
        assert_eq!(detect_image("x", Some(b"MZ")), AbiTag::DosInterrupt);
    }
}
