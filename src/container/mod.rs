//! Multi-track container archives
//!
//! Several songs can be bundled into one archive so a single fetch delivers a
//! whole soundtrack. Two on-disk layouts share the same 20-byte preamble:
//!
//! - Bytes 0-15: ASCII magic (backend-specific)
//! - Bytes 16-19: big-endian track count
//!
//! followed by either
//!
//! - [`ContainerLayout::IndexedRecords`]: `count` x 12-byte records
//!   `{offset: u32 BE, size: u32 BE, name_offset: u32 BE}`, names stored as
//!   NUL-terminated strings elsewhere in the archive, or
//! - [`ContainerLayout::OffsetTable`]: `count` x big-endian u32 offsets; each
//!   track runs to the next offset, the last one to the end of the archive.
//!
//! Parsing is fully bounds-checked: anything pointing outside the buffer is
//! reported as [`PlayerError::CorruptInput`].

mod builder;
mod reader;

pub use builder::ArchiveBuilder;
pub use reader::ByteReader;

use crate::{PlayerError, Result};
use std::sync::Arc;

/// Length of the magic marker at the start of every archive.
pub const MAGIC_LEN: usize = 16;

/// Offset of the first index entry (magic + track count).
pub const INDEX_START: usize = MAGIC_LEN + 4;

/// Size of one [`ContainerLayout::IndexedRecords`] record.
pub const INDEX_RECORD_SIZE: usize = 12;

/// Size of one [`ContainerLayout::OffsetTable`] entry.
pub const OFFSET_ENTRY_SIZE: usize = 4;

/// Raw bytes of one loaded file (after any transport-level decompression).
///
/// Cheap to clone; backends keep a handle for as long as their session lives.
#[derive(Clone)]
pub struct SongBuffer(Arc<[u8]>);

impl SongBuffer {
    /// Copy `data` into a freshly allocated buffer.
    ///
    /// Allocation failure is reported as [`PlayerError::OutOfMemory`] rather
    /// than aborting the process.
    pub fn copy_from(data: &[u8]) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(data.len())?;
        bytes.extend_from_slice(data);
        Ok(SongBuffer(Arc::from(bytes)))
    }

    /// Byte length of the song.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the song holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for SongBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        SongBuffer(Arc::from(bytes))
    }
}

impl std::fmt::Debug for SongBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongBuffer").field("len", &self.0.len()).finish()
    }
}

/// How the per-track index is laid out after the preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLayout {
    /// 12-byte `{offset, size, name_offset}` records
    IndexedRecords,
    /// 4-byte offsets, sizes derived from neighbouring offsets
    OffsetTable,
}

impl ContainerLayout {
    /// Bytes occupied by one index entry.
    pub fn entry_size(self) -> usize {
        match self {
            ContainerLayout::IndexedRecords => INDEX_RECORD_SIZE,
            ContainerLayout::OffsetTable => OFFSET_ENTRY_SIZE,
        }
    }
}

/// A magic marker paired with the index layout it announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerFormat {
    /// 16-byte ASCII magic at offset 0
    pub magic: &'static [u8; MAGIC_LEN],
    /// Index layout following the track count
    pub layout: ContainerLayout,
}

impl ContainerFormat {
    /// Archive wrapper used by the PSF-family and 2SF backends.
    pub const PSF_ARCHIVE: ContainerFormat = ContainerFormat {
        magic: b"PSF Song Archive",
        layout: ContainerLayout::IndexedRecords,
    };

    /// Archive wrapper used by the multi-format game music backend.
    pub const GAME_MUSIC: ContainerFormat = ContainerFormat {
        magic: b"Game Music Files",
        layout: ContainerLayout::OffsetTable,
    };

    /// Check whether `data` starts with this format's magic.
    ///
    /// Buffers shorter than the magic never match.
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= MAGIC_LEN && &data[..MAGIC_LEN] == self.magic.as_slice()
    }
}

/// One song inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackIndexEntry {
    /// Absolute offset of the track's first byte
    pub byte_offset: u32,
    /// Length of the track in bytes
    pub byte_size: u32,
    /// Name record, present only for [`ContainerLayout::IndexedRecords`]
    pub name: Option<String>,
}

impl TrackIndexEntry {
    /// Byte range of the track within the archive.
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.byte_offset as usize;
        start..start + self.byte_size as usize
    }

    /// Case-insensitive prefix match of `requested` against this entry's name.
    fn name_matches(&self, requested: &str) -> bool {
        let Some(name) = self.name.as_deref() else {
            return false;
        };
        let (name, requested) = (name.as_bytes(), requested.as_bytes());
        name.len() >= requested.len() && name[..requested.len()].eq_ignore_ascii_case(requested)
    }
}

/// Parsed archive index. Entries are kept in on-disk order, which is the
/// externally visible track numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    format: ContainerFormat,
    entries: Vec<TrackIndexEntry>,
}

impl Container {
    /// Parse `data` as an archive of the given format.
    ///
    /// Returns `Ok(None)` when the magic is absent (a plain single-track
    /// song), `Ok(Some(_))` for a well-formed archive, and
    /// [`PlayerError::CorruptInput`] when the magic is present but the index is
    /// not.
    pub fn detect(data: &[u8], format: ContainerFormat) -> Result<Option<Self>> {
        if !format.matches(data) {
            return Ok(None);
        }
        Self::parse(data, format).map(Some)
    }

    /// Parse an archive whose magic is expected to be present.
    pub fn parse(data: &[u8], format: ContainerFormat) -> Result<Self> {
        if data.len() < MAGIC_LEN {
            return Err(PlayerError::CorruptInput(format!(
                "{} bytes is shorter than the {MAGIC_LEN}-byte archive magic",
                data.len()
            )));
        }
        if !format.matches(data) {
            return Err(PlayerError::CorruptInput("archive magic mismatch".into()));
        }

        let mut reader = ByteReader::new(data);
        reader.seek(MAGIC_LEN)?;
        let track_count = reader.read_u32_be()? as usize;
        if track_count == 0 {
            return Err(PlayerError::CorruptInput("archive declares zero tracks".into()));
        }

        // Reject absurd counts before allocating anything for them
        let index_len = track_count
            .checked_mul(format.layout.entry_size())
            .and_then(|len| len.checked_add(INDEX_START))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                PlayerError::CorruptInput(format!(
                    "index for {track_count} tracks does not fit in {} bytes",
                    data.len()
                ))
            })?;

        let entries = match format.layout {
            ContainerLayout::IndexedRecords => {
                Self::parse_records(&mut reader, track_count, index_len)?
            }
            ContainerLayout::OffsetTable => {
                Self::parse_offset_table(&mut reader, track_count, index_len, data.len())?
            }
        };
        debug_assert!(reader.position() == index_len);

        Ok(Container { format, entries })
    }

    fn parse_records(
        reader: &mut ByteReader<'_>,
        track_count: usize,
        index_len: usize,
    ) -> Result<Vec<TrackIndexEntry>> {
        let mut entries = Vec::with_capacity(track_count);
        for index in 0..track_count {
            let byte_offset = reader.read_u32_be()?;
            let byte_size = reader.read_u32_be()?;
            let name_offset = reader.read_u32_be()?;

            if (byte_offset as usize) < index_len {
                return Err(PlayerError::CorruptInput(format!(
                    "track {index} offset {byte_offset} lies inside the {index_len}-byte header"
                )));
            }

            reader
                .slice_at(byte_offset as usize, byte_size as usize)
                .map_err(|e| PlayerError::CorruptInput(format!("track {index}: {e}")))?;

            // Names are located independently of the index cursor
            let mut name_reader = reader.clone();
            name_reader
                .seek(name_offset as usize)
                .map_err(|e| PlayerError::CorruptInput(format!("track {index} name: {e}")))?;
            let name = name_reader.read_c_string()?;

            entries.push(TrackIndexEntry {
                byte_offset,
                byte_size,
                name: Some(name),
            });
        }
        Ok(entries)
    }

    fn parse_offset_table(
        reader: &mut ByteReader<'_>,
        track_count: usize,
        index_len: usize,
        data_len: usize,
    ) -> Result<Vec<TrackIndexEntry>> {
        let mut offsets = Vec::with_capacity(track_count);
        for _ in 0..track_count {
            offsets.push(reader.read_u32_be()?);
        }

        let mut entries = Vec::with_capacity(track_count);
        for (index, &offset) in offsets.iter().enumerate() {
            let end = offsets.get(index + 1).map_or(data_len, |&next| next as usize);
            if (offset as usize) < index_len {
                return Err(PlayerError::CorruptInput(format!(
                    "track {index} offset {offset} lies inside the {index_len}-byte header"
                )));
            }
            if offset as usize > end || end > data_len {
                return Err(PlayerError::CorruptInput(format!(
                    "track {index} offset {offset} is out of order or outside {data_len} bytes"
                )));
            }
            entries.push(TrackIndexEntry {
                byte_offset: offset,
                byte_size: (end - offset as usize) as u32,
                name: None,
            });
        }
        Ok(entries)
    }

    /// Format this archive was parsed as.
    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Number of tracks in the archive (always at least 1).
    pub fn track_count(&self) -> usize {
        self.entries.len()
    }

    /// All index entries in on-disk order.
    pub fn entries(&self) -> &[TrackIndexEntry] {
        &self.entries
    }

    /// Index entry for a 0-based track number.
    pub fn entry(&self, track: usize) -> Result<&TrackIndexEntry> {
        self.entries.get(track).ok_or(PlayerError::UnsupportedTrack {
            index: track,
            count: self.entries.len(),
        })
    }

    /// Borrow a track's bytes out of the archive they were parsed from.
    pub fn track_bytes<'a>(&self, data: &'a [u8], track: usize) -> Result<&'a [u8]> {
        let entry = self.entry(track)?;
        ByteReader::new(data).slice_at(entry.byte_offset as usize, entry.byte_size as usize)
    }

    /// Copy a track out into its own allocation.
    pub fn copy_track(&self, data: &[u8], track: usize) -> Result<Vec<u8>> {
        let bytes = self.track_bytes(data, track)?;
        let mut copy = Vec::new();
        copy.try_reserve_exact(bytes.len())?;
        copy.extend_from_slice(bytes);
        Ok(copy)
    }

    /// Find the first entry whose name starts with `requested`, ignoring ASCII case.
    ///
    /// Linear scan in on-disk order; archives are not guaranteed to be sorted.
    pub fn find_by_name(&self, requested: &str) -> Option<(usize, &TrackIndexEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.name_matches(requested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psf_archive() -> Vec<u8> {
        ArchiveBuilder::new(ContainerFormat::PSF_ARCHIVE)
            .track("Song01.minipsf", vec![1u8; 100])
            .track("song.psflib", vec![2u8; 50])
            .track("Song02.minipsf", vec![3u8; 10])
            .build()
            .unwrap()
    }

    #[test]
    fn test_plain_song_is_not_a_container() {
        let data = b"PSF\x01 not an archive at all";
        assert!(Container::detect(data, ContainerFormat::PSF_ARCHIVE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_short_buffer_is_not_a_container() {
        assert!(Container::detect(b"PSF Song", ContainerFormat::PSF_ARCHIVE)
            .unwrap()
            .is_none());
        assert!(matches!(
            Container::parse(b"PSF Song", ContainerFormat::PSF_ARCHIVE),
            Err(PlayerError::CorruptInput(_))
        ));
    }

    #[test]
    fn test_indexed_records_parse() {
        let data = psf_archive();
        let container = Container::detect(&data, ContainerFormat::PSF_ARCHIVE)
            .unwrap()
            .expect("archive magic present");
        assert_eq!(container.track_count(), 3);

        let entry = container.entry(1).unwrap();
        assert_eq!(entry.byte_size, 50);
        assert_eq!(entry.name.as_deref(), Some("song.psflib"));
        assert_eq!(container.track_bytes(&data, 1).unwrap(), &[2u8; 50][..]);
    }

    #[test]
    fn test_find_by_name_prefix_case_insensitive() {
        let data = psf_archive();
        let container = Container::parse(&data, ContainerFormat::PSF_ARCHIVE).unwrap();

        let (index, entry) = container.find_by_name("SONG.PSFLIB").unwrap();
        assert_eq!(index, 1);
        assert_eq!(entry.byte_size, 50);

        // Prefix match, first hit in on-disk order
        let (index, _) = container.find_by_name("song0").unwrap();
        assert_eq!(index, 0);

        assert!(container.find_by_name("song01.minipsf.extra").is_none());
        assert!(container.find_by_name("missing").is_none());
    }

    #[test]
    fn test_zero_tracks_rejected() {
        let mut data = b"PSF Song Archive".to_vec();
        data.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            Container::parse(&data, ContainerFormat::PSF_ARCHIVE),
            Err(PlayerError::CorruptInput(_))
        ));
    }

    #[test]
    fn test_huge_track_count_rejected_without_reading() {
        let mut data = b"PSF Song Archive".to_vec();
        data.extend_from_slice(&u32::MAX.to_be_bytes());
        let err = Container::parse(&data, ContainerFormat::PSF_ARCHIVE).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_record_outside_buffer_rejected() {
        let mut data = psf_archive();
        // Point track 0's size far past the end
        data[INDEX_START + 4..INDEX_START + 8].copy_from_slice(&0x00FF_FFFFu32.to_be_bytes());
        assert!(matches!(
            Container::parse(&data, ContainerFormat::PSF_ARCHIVE),
            Err(PlayerError::CorruptInput(_))
        ));
    }

    #[test]
    fn test_name_offset_outside_buffer_rejected() {
        let mut data = psf_archive();
        let len = data.len() as u32;
        data[INDEX_START + 8..INDEX_START + 12].copy_from_slice(&(len + 1).to_be_bytes());
        assert!(Container::parse(&data, ContainerFormat::PSF_ARCHIVE).is_err());
    }

    #[test]
    fn test_offset_table_sizes_derived() {
        let data = ArchiveBuilder::new(ContainerFormat::GAME_MUSIC)
            .track("", vec![0xAA; 30])
            .track("", vec![0xBB; 7])
            .build()
            .unwrap();
        let container = Container::parse(&data, ContainerFormat::GAME_MUSIC).unwrap();
        let entries = container.entries();
        assert_eq!(entries[0].byte_size, 30);
        assert_eq!(entries[1].byte_size, 7);
        assert_eq!(entries[1].range().end, data.len());
        assert!(entries.iter().all(|e| e.name.is_none()));
    }

    #[test]
    fn test_offset_table_out_of_order_rejected() {
        let mut data = ArchiveBuilder::new(ContainerFormat::GAME_MUSIC)
            .track("", vec![0; 8])
            .track("", vec![0; 8])
            .build()
            .unwrap();
        // Second offset before the first
        data[INDEX_START + 4..INDEX_START + 8].copy_from_slice(&1u32.to_be_bytes());
        assert!(matches!(
            Container::parse(&data, ContainerFormat::GAME_MUSIC),
            Err(PlayerError::CorruptInput(_))
        ));
    }

    #[test]
    fn test_offset_table_into_header_rejected() {
        let mut data = b"Game Music Files".to_vec();
        data.extend_from_slice(&2u32.to_be_bytes());
        for offset in [0u32, 4] {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        data.extend_from_slice(&[0u8; 16]);

        let err = Container::parse(&data, ContainerFormat::GAME_MUSIC).unwrap_err();
        assert!(matches!(err, PlayerError::CorruptInput(_)));
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_offset_table_first_track_at_index_end() {
        let mut data = ArchiveBuilder::new(ContainerFormat::GAME_MUSIC)
            .track("", vec![0; 8])
            .track("", vec![0; 8])
            .build()
            .unwrap();
        let index_len = INDEX_START + 2 * OFFSET_ENTRY_SIZE;
        let container = Container::parse(&data, ContainerFormat::GAME_MUSIC).unwrap();
        assert_eq!(container.entries()[0].byte_offset as usize, index_len);

        // One byte earlier overlaps the last offset entry
        data[INDEX_START..INDEX_START + 4].copy_from_slice(&(index_len as u32 - 1).to_be_bytes());
        assert!(matches!(
            Container::parse(&data, ContainerFormat::GAME_MUSIC),
            Err(PlayerError::CorruptInput(_))
        ));
    }

    #[test]
    fn test_record_into_header_rejected() {
        for offset in [0u32, MAGIC_LEN as u32, INDEX_START as u32 + 12] {
            let mut data = psf_archive();
            data[INDEX_START..INDEX_START + 4].copy_from_slice(&offset.to_be_bytes());
            data[INDEX_START + 4..INDEX_START + 8].copy_from_slice(&4u32.to_be_bytes());
            assert!(
                matches!(
                    Container::parse(&data, ContainerFormat::PSF_ARCHIVE),
                    Err(PlayerError::CorruptInput(_))
                ),
                "record at {offset} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_track_is_unsupported() {
        let data = psf_archive();
        let container = Container::parse(&data, ContainerFormat::PSF_ARCHIVE).unwrap();
        assert!(matches!(
            container.entry(3),
            Err(PlayerError::UnsupportedTrack { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_song_buffer_copy() {
        let song = SongBuffer::copy_from(&[1, 2, 3]).unwrap();
        assert_eq!(song.len(), 3);
        assert_eq!(song.as_bytes(), &[1, 2, 3]);
        assert!(SongBuffer::from(Vec::new()).is_empty());
    }
}
