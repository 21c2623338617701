// Reparse buffer codec
// Encodes and decodes the fixed-layout kernel buffer describing a reparse
// point: u32 tag, u16 data length, u16 reserved, then the tag-specific
// payload with its UTF-16LE path buffer.

use std::io::Cursor;
use std::mem;

use byteorder::{LittleEndian, ReadBytesExt};
use graft_core::JunctionError;
use log::trace;
use static_assertions::const_assert_eq;

// Reparse point tags
pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;

/// Size of the common reparse buffer header.
pub const REPARSE_HEADER_LEN: usize = 8;
/// Size of the mount point offset/length field block.
pub const MOUNT_POINT_FIELDS_LEN: usize = 8;
/// Size of the symbolic link field block, which adds a u32 flags word.
pub const SYMLINK_FIELDS_LEN: usize = 12;
/// Capacity of the path buffer region the kernel accepts.
pub const PATH_BUFFER_CAPACITY: usize = 0x3FF0;
/// Marker telling the filesystem to take the path that follows literally
/// instead of re-parsing it.
pub const NON_INTERPRETED_PREFIX: &str = r"\??\";

const UNICODE_NULL_LEN: usize = 2;
// The substitute name shares the path buffer with its own terminator slot
// and the empty print name's terminator slot.
const MAX_SUBSTITUTE_BYTES: usize = PATH_BUFFER_CAPACITY - 2 * UNICODE_NULL_LEN;

// These constants must agree with the kernel's REPARSE_DATA_BUFFER layout.
const_assert_eq!(REPARSE_HEADER_LEN, mem::size_of::<u32>() + 2 * mem::size_of::<u16>());
const_assert_eq!(MOUNT_POINT_FIELDS_LEN, 4 * mem::size_of::<u16>());
const_assert_eq!(SYMLINK_FIELDS_LEN, 4 * mem::size_of::<u16>() + mem::size_of::<u32>());

/// Discriminates the reparse buffer variants this codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseTag {
    None,
    MountPoint,
    SymLink,
    Unknown(u32),
}

impl ReparseTag {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ReparseTag::None,
            IO_REPARSE_TAG_MOUNT_POINT => ReparseTag::MountPoint,
            IO_REPARSE_TAG_SYMLINK => ReparseTag::SymLink,
            other => ReparseTag::Unknown(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            ReparseTag::None => 0,
            ReparseTag::MountPoint => IO_REPARSE_TAG_MOUNT_POINT,
            ReparseTag::SymLink => IO_REPARSE_TAG_SYMLINK,
            ReparseTag::Unknown(raw) => raw,
        }
    }
}

/// A reparse buffer decoded into its logical contents.
///
/// Path names come back with the non-interpreted prefix already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedReparse {
    MountPoint {
        substitute_name: String,
        print_name: String,
    },
    SymLink {
        substitute_name: String,
        print_name: String,
        is_relative: bool,
    },
}

/// Encode a mount point reparse buffer for the given absolute target path.
///
/// The substitute name is the target prefixed with `\??\` (not doubled if the
/// caller already supplied it); junctions carry no print name. Only actual
/// wire content is produced; the fixed path buffer region is an allocation
/// bound, not padding.
pub fn encode_mount_point(target: &str) -> Result<Vec<u8>, JunctionError> {
    let substitute = if target.starts_with(NON_INTERPRETED_PREFIX) {
        target.to_string()
    } else {
        format!("{}{}", NON_INTERPRETED_PREFIX, target)
    };

    let name_bytes: Vec<u8> = substitute
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    if name_bytes.len() > MAX_SUBSTITUTE_BYTES {
        return Err(JunctionError::PathTooLong);
    }

    let substitute_length = name_bytes.len() as u16;
    // The print name slot starts after the substitute name's terminator.
    let print_offset = substitute_length + UNICODE_NULL_LEN as u16;
    let data_length = substitute_length + (MOUNT_POINT_FIELDS_LEN + 2 * UNICODE_NULL_LEN) as u16;

    trace!(
        "encoding mount point buffer: substitute {} bytes, data length {}",
        substitute_length,
        data_length
    );

    let mut out = Vec::with_capacity(REPARSE_HEADER_LEN + data_length as usize);
    out.extend_from_slice(&IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
    out.extend_from_slice(&data_length.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // reserved
    out.extend_from_slice(&0u16.to_le_bytes()); // substitute name offset
    out.extend_from_slice(&substitute_length.to_le_bytes());
    out.extend_from_slice(&print_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // print name length: junctions carry none
    out.extend_from_slice(&name_bytes);
    out.extend_from_slice(&[0u8; 2 * UNICODE_NULL_LEN]); // name terminator slots
    Ok(out)
}

/// Encode the input buffer for the delete-reparse-point control operation.
/// The kernel requires the tag to match the point being removed but no path
/// data.
pub fn encode_delete_marker() -> Vec<u8> {
    let mut out = Vec::with_capacity(REPARSE_HEADER_LEN);
    out.extend_from_slice(&IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // data length
    out.extend_from_slice(&0u16.to_le_bytes()); // reserved
    out
}

/// Decode a reparse buffer as returned by the device channel.
///
/// Returns `Ok(None)` when the tag is not one this codec recognizes; the
/// caller decides whether that matters. Any offset/length pair that would
/// read outside the path buffer is a hard `CorruptReparseBuffer` error,
/// never a truncated string.
pub fn decode(data: &[u8]) -> Result<Option<DecodedReparse>, JunctionError> {
    let mut header = Cursor::new(data);
    let raw_tag = header
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("buffer shorter than the reparse header"))?;
    let data_length = header
        .read_u16::<LittleEndian>()
        .map_err(|_| corrupt("buffer shorter than the reparse header"))? as usize;
    let _reserved = header
        .read_u16::<LittleEndian>()
        .map_err(|_| corrupt("buffer shorter than the reparse header"))?;

    let tag = ReparseTag::from_raw(raw_tag);
    trace!("decoding reparse buffer: tag {:?}, data length {}", tag, data_length);

    if data.len() < REPARSE_HEADER_LEN + data_length {
        return Err(corrupt("data length runs past the supplied buffer"));
    }
    let payload = &data[REPARSE_HEADER_LEN..REPARSE_HEADER_LEN + data_length];

    match tag {
        ReparseTag::MountPoint => decode_mount_point(payload).map(Some),
        ReparseTag::SymLink => decode_symlink(payload).map(Some),
        ReparseTag::None | ReparseTag::Unknown(_) => Ok(None),
    }
}

/// Strip the non-interpreted prefix from a substitute name.
pub fn strip_non_interpreted_prefix(name: &str) -> &str {
    name.strip_prefix(NON_INTERPRETED_PREFIX).unwrap_or(name)
}

fn decode_mount_point(payload: &[u8]) -> Result<DecodedReparse, JunctionError> {
    // A zero-length payload is how the kernel describes a mount point that
    // is being deleted: present but empty, not an error.
    if payload.is_empty() {
        return Ok(DecodedReparse::MountPoint {
            substitute_name: String::new(),
            print_name: String::new(),
        });
    }
    if payload.len() < MOUNT_POINT_FIELDS_LEN {
        return Err(corrupt("mount point field block truncated"));
    }

    let mut fields = Cursor::new(payload);
    let substitute_offset = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;
    let substitute_length = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;
    let print_offset = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;
    let print_length = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;

    let path_buffer = &payload[MOUNT_POINT_FIELDS_LEN..];
    let substitute_name = read_path_name(path_buffer, substitute_offset, substitute_length)?;
    let substitute_name = strip_non_interpreted_prefix(&substitute_name).to_string();
    let print_name = if print_length == 0 {
        String::new()
    } else {
        read_path_name(path_buffer, print_offset, print_length)?
    };

    Ok(DecodedReparse::MountPoint {
        substitute_name,
        print_name,
    })
}

fn decode_symlink(payload: &[u8]) -> Result<DecodedReparse, JunctionError> {
    if payload.len() < SYMLINK_FIELDS_LEN {
        return Err(corrupt("symbolic link field block truncated"));
    }

    let mut fields = Cursor::new(payload);
    let substitute_offset = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;
    let substitute_length = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;
    let print_offset = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;
    let print_length = fields.read_u16::<LittleEndian>().map_err(|_| corrupt("field read"))?;
    let flags = fields.read_u32::<LittleEndian>().map_err(|_| corrupt("field read"))?;

    let path_buffer = &payload[SYMLINK_FIELDS_LEN..];
    let substitute_name = read_path_name(path_buffer, substitute_offset, substitute_length)?;
    let substitute_name = strip_non_interpreted_prefix(&substitute_name).to_string();
    let print_name = if print_length == 0 {
        String::new()
    } else {
        read_path_name(path_buffer, print_offset, print_length)?
    };

    Ok(DecodedReparse::SymLink {
        substitute_name,
        print_name,
        is_relative: flags & 1 != 0,
    })
}

/// Slice a UTF-16LE name out of the path buffer, validating the extent the
/// offset/length fields claim.
fn read_path_name(path_buffer: &[u8], offset: u16, length: u16) -> Result<String, JunctionError> {
    let offset = offset as usize;
    let length = length as usize;
    if length % 2 != 0 {
        return Err(corrupt("path name length is not a whole number of UTF-16 units"));
    }
    let end = offset + length;
    if end > path_buffer.len() {
        return Err(corrupt("path name extent runs past the path buffer"));
    }

    let units: Vec<u16> = path_buffer[offset..end]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| corrupt("path name is not valid UTF-16"))
}

fn corrupt(what: &str) -> JunctionError {
    JunctionError::CorruptReparseBuffer(what.to_string())
}
