//! Archive writer producing byte-exact container images.

use super::{ContainerFormat, ContainerLayout, INDEX_START};
use crate::{PlayerError, Result};

/// Assembles tracks into a container archive.
///
/// Track data is laid out contiguously right after the index, in insertion
/// order. For [`ContainerLayout::IndexedRecords`] the NUL-terminated names are
/// appended after the last track.
///
/// # Example
///
/// ```
/// use chipstream_player::container::{ArchiveBuilder, Container, ContainerFormat};
///
/// let archive = ArchiveBuilder::new(ContainerFormat::PSF_ARCHIVE)
///     .track("intro.minipsf", vec![0u8; 100])
///     .track("stage1.minipsf", vec![0u8; 50])
///     .build()
///     .unwrap();
/// let container = Container::parse(&archive, ContainerFormat::PSF_ARCHIVE).unwrap();
/// assert_eq!(container.entry(1).unwrap().byte_offset, 144);
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    format: ContainerFormat,
    tracks: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    /// Start an empty archive of the given format.
    pub fn new(format: ContainerFormat) -> Self {
        ArchiveBuilder {
            format,
            tracks: Vec::new(),
        }
    }

    /// Append a track. The name is ignored by offset-table archives.
    pub fn track(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.tracks.push((name.into(), data));
        self
    }

    /// Serialize the archive.
    ///
    /// An archive needs at least one track; an empty builder is a
    /// [`PlayerError::ConfigError`].
    pub fn build(&self) -> Result<Vec<u8>> {
        if self.tracks.is_empty() {
            return Err(PlayerError::ConfigError("archive needs at least one track".into()));
        }

        let index_end = INDEX_START + self.tracks.len() * self.format.layout.entry_size();
        let data_len: usize = self.tracks.iter().map(|(_, data)| data.len()).sum();
        let names_len: usize = match self.format.layout {
            ContainerLayout::IndexedRecords => {
                self.tracks.iter().map(|(name, _)| name.len() + 1).sum()
            }
            ContainerLayout::OffsetTable => 0,
        };
        let total = index_end + data_len + names_len;
        if total > u32::MAX as usize {
            return Err(PlayerError::CorruptInput(format!(
                "archive of {total} bytes exceeds 32-bit offsets"
            )));
        }

        let mut out = Vec::new();
        out.try_reserve_exact(total)?;
        out.extend_from_slice(self.format.magic);
        out.extend_from_slice(&(self.tracks.len() as u32).to_be_bytes());

        let mut data_offset = index_end;
        let mut name_offset = index_end + data_len;
        for (name, data) in &self.tracks {
            out.extend_from_slice(&(data_offset as u32).to_be_bytes());
            if self.format.layout == ContainerLayout::IndexedRecords {
                out.extend_from_slice(&(data.len() as u32).to_be_bytes());
                out.extend_from_slice(&(name_offset as u32).to_be_bytes());
                name_offset += name.len() + 1;
            }
            data_offset += data.len();
        }

        for (_, data) in &self.tracks {
            out.extend_from_slice(data);
        }
        if self.format.layout == ContainerLayout::IndexedRecords {
            for (name, _) in &self.tracks {
                out.extend_from_slice(name.as_bytes());
                out.push(0);
            }
        }

        debug_assert_eq!(out.len(), total);
        Ok(out)
    }
}
