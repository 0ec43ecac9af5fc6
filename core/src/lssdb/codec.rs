//! Binary container/session/stream codec for the last-synchronous-state
//! database, per the specification's §4.8 wire format.
//!
//! Grounded in the byte-oriented wire-format style shown across the pack's
//! network/codec examples (length-prefixed fields read with `byteorder`);
//! the zlib framing and session-splitting rules are specific to this
//! format and have no single teacher analogue, so they are implemented
//! directly against the specification's prose.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::debug;
use uuid::Uuid;

use super::{CompareVariant, Descriptor, FileEntry, FolderEntry, FolderStatus, LssdbError, SymlinkEntry, SyncFolder};

const MAGIC: &[u8; 12] = b"FreeFileSync";
const FORMAT_VERSION_CURRENT: u32 = 10;
const FORMAT_VERSION_LEGACY: u32 = 9;
const STREAM_VERSION_CURRENT: u32 = 3;
const STREAM_VERSION_LEGACY: u32 = 2;
const ZLIB_LEVEL: u32 = 3;

/// One session's raw stream as stored in a container file, before its
/// payload half has been interpreted.
struct RawSession {
    uuid: Uuid,
    is_lead: bool,
    stream_version: u32,
    half_size: u64,
    payload: Vec<u8>,
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> io::Result<()> {
    out.write_u64::<LittleEndian>(bytes.len() as u64)?;
    out.write_all(bytes)
}

fn read_len_prefixed<R: Read>(r: &mut R) -> Result<Vec<u8>, LssdbError> {
    let len = r
        .read_u64::<LittleEndian>()
        .map_err(|e| LssdbError::Corrupted(e.to_string()))? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
    Ok(buf)
}

fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(ZLIB_LEVEL));
    encoder.write_all(data).expect("in-memory write cannot fail");
    encoder.finish().expect("in-memory finish cannot fail")
}

fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>, LssdbError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| LssdbError::Corrupted(format!("zlib stream: {e}")))?;
    Ok(out)
}

/// Encodes `tree` as the "serialized directory description": three zlib
/// streams (text, small-num, big-num) concatenated with length prefixes.
fn encode_description(tree: &SyncFolder) -> Vec<u8> {
    let mut text = Vec::new();
    let mut small = Vec::new();
    let mut big = Vec::new();
    encode_folder_body(tree, &mut text, &mut small, &mut big);

    let mut out = Vec::new();
    for stream in [zlib_compress(&text), zlib_compress(&small), zlib_compress(&big)] {
        write_len_prefixed(&mut out, &stream).expect("in-memory write cannot fail");
    }
    out
}

fn decode_description(bytes: &[u8]) -> Result<SyncFolder, LssdbError> {
    let mut cursor = io::Cursor::new(bytes);
    let text_z = read_len_prefixed(&mut cursor)?;
    let small_z = read_len_prefixed(&mut cursor)?;
    let big_z = read_len_prefixed(&mut cursor)?;

    let text = zlib_decompress(&text_z)?;
    let small = zlib_decompress(&small_z)?;
    let big = zlib_decompress(&big_z)?;

    let mut text_r = io::Cursor::new(text.as_slice());
    let mut small_r = io::Cursor::new(small.as_slice());
    let mut big_r = io::Cursor::new(big.as_slice());
    decode_folder_body(&mut text_r, &mut small_r, &mut big_r)
}

fn write_string(text: &mut Vec<u8>, s: &str) {
    text.write_u32::<LittleEndian>(s.len() as u32)
        .expect("in-memory write cannot fail");
    text.extend_from_slice(s.as_bytes());
}

fn read_string<R: Read>(r: &mut R) -> Result<String, LssdbError> {
    let len = r
        .read_u32::<LittleEndian>()
        .map_err(|e| LssdbError::Corrupted(e.to_string()))? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| LssdbError::Corrupted(e.to_string()))
}

fn variant_tag(v: CompareVariant) -> u8 {
    match v {
        CompareVariant::ByTimeAndSize => 0,
        CompareVariant::ByContent => 1,
        CompareVariant::BySize => 2,
    }
}

fn variant_from_tag(tag: u8) -> Result<CompareVariant, LssdbError> {
    match tag {
        0 => Ok(CompareVariant::ByTimeAndSize),
        1 => Ok(CompareVariant::ByContent),
        2 => Ok(CompareVariant::BySize),
        other => Err(LssdbError::Corrupted(format!("unknown compare variant tag {other}"))),
    }
}

fn status_tag(s: FolderStatus) -> u8 {
    match s {
        FolderStatus::InSync => 0,
        FolderStatus::LeftOnly => 1,
        FolderStatus::RightOnly => 2,
    }
}

fn status_from_tag(tag: u8) -> Result<FolderStatus, LssdbError> {
    match tag {
        0 => Ok(FolderStatus::InSync),
        1 => Ok(FolderStatus::LeftOnly),
        2 => Ok(FolderStatus::RightOnly),
        other => Err(LssdbError::Corrupted(format!("unknown folder status tag {other}"))),
    }
}

fn encode_folder_body(folder: &SyncFolder, text: &mut Vec<u8>, small: &mut Vec<u8>, big: &mut Vec<u8>) {
    small
        .write_u32::<LittleEndian>(folder.files.len() as u32)
        .expect("in-memory write cannot fail");
    for file in &folder.files {
        write_string(text, &file.name);
        small.push(variant_tag(file.variant));
        small
            .write_u64::<LittleEndian>(file.left.size)
            .expect("in-memory write cannot fail");
        big.write_i64::<LittleEndian>(file.left.mod_time).unwrap();
        big.write_u64::<LittleEndian>(file.left.fingerprint).unwrap();
        big.write_i64::<LittleEndian>(file.right.mod_time).unwrap();
        big.write_u64::<LittleEndian>(file.right.fingerprint).unwrap();
        big.write_u64::<LittleEndian>(file.right.size).unwrap();
    }

    small
        .write_u32::<LittleEndian>(folder.symlinks.len() as u32)
        .expect("in-memory write cannot fail");
    for link in &folder.symlinks {
        write_string(text, &link.name);
        write_string(text, &link.left_target);
        write_string(text, &link.right_target);
    }

    small
        .write_u32::<LittleEndian>(folder.folders.len() as u32)
        .expect("in-memory write cannot fail");
    for sub in &folder.folders {
        write_string(text, &sub.name);
        small.push(status_tag(sub.status));
        encode_folder_body(&sub.node, text, small, big);
    }
}

fn decode_folder_body(
    text: &mut io::Cursor<&[u8]>,
    small: &mut io::Cursor<&[u8]>,
    big: &mut io::Cursor<&[u8]>,
) -> Result<SyncFolder, LssdbError> {
    let file_count = small
        .read_u32::<LittleEndian>()
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
    let mut files = Vec::with_capacity(file_count as usize);
    for _ in 0..file_count {
        let name = read_string(text)?;
        let mut tag = [0u8; 1];
        small
            .read_exact(&mut tag)
            .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let variant = variant_from_tag(tag[0])?;
        let left_size = small
            .read_u64::<LittleEndian>()
            .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let left_mod_time = big.read_i64::<LittleEndian>().map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let left_fingerprint = big.read_u64::<LittleEndian>().map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let right_mod_time = big.read_i64::<LittleEndian>().map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let right_fingerprint = big.read_u64::<LittleEndian>().map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let right_size = big.read_u64::<LittleEndian>().map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        files.push(FileEntry {
            name,
            variant,
            left: Descriptor {
                mod_time: left_mod_time,
                size: left_size,
                fingerprint: left_fingerprint,
            },
            right: Descriptor {
                mod_time: right_mod_time,
                size: right_size,
                fingerprint: right_fingerprint,
            },
        });
    }

    let symlink_count = small
        .read_u32::<LittleEndian>()
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
    let mut symlinks = Vec::with_capacity(symlink_count as usize);
    for _ in 0..symlink_count {
        let name = read_string(text)?;
        let left_target = read_string(text)?;
        let right_target = read_string(text)?;
        symlinks.push(SymlinkEntry {
            name,
            left_target,
            right_target,
        });
    }

    let folder_count = small
        .read_u32::<LittleEndian>()
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
    let mut folders = Vec::with_capacity(folder_count as usize);
    for _ in 0..folder_count {
        let name = read_string(text)?;
        let mut tag = [0u8; 1];
        small
            .read_exact(&mut tag)
            .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let status = status_from_tag(tag[0])?;
        let node = decode_folder_body(text, small, big)?;
        folders.push(FolderEntry { name, status, node });
    }

    Ok(SyncFolder { files, symlinks, folders })
}

/// A container file's bytes for one side, together with the session UUID
/// it was saved under (so the caller can persist it for the next run).
pub struct SavedSide {
    /// Bytes to write verbatim to that side's `.sync.ffs_db`.
    pub bytes: Vec<u8>,
    /// Session UUID shared by both sides of this save.
    pub session: Uuid,
}

/// Splits `tree` in half and serializes both container files for a fresh
/// save. `session` should be a freshly generated UUID; reusing it across
/// unrelated saves would defeat common-session discovery.
pub fn save(tree: &SyncFolder, session: Uuid) -> (SavedSide, SavedSide) {
    let description = encode_description(tree);
    debug!("saving session {} ({} bytes uncompressed)", session, description.len());
    let half = description.len() / 2;
    let (lead_half, trail_half) = description.split_at(half);

    let left_bytes = write_container(session, true, lead_half.to_vec());
    let right_bytes = write_container(session, false, trail_half.to_vec());

    (
        SavedSide {
            bytes: left_bytes,
            session,
        },
        SavedSide {
            bytes: right_bytes,
            session,
        },
    )
}

fn write_container(session: Uuid, is_lead: bool, half_payload: Vec<u8>) -> Vec<u8> {
    let mut stream = Vec::new();
    stream
        .write_u32::<LittleEndian>(STREAM_VERSION_CURRENT)
        .expect("in-memory write cannot fail");
    stream
        .write_u64::<LittleEndian>(half_payload.len() as u64)
        .expect("in-memory write cannot fail");
    stream.extend_from_slice(&half_payload);

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.write_u32::<LittleEndian>(FORMAT_VERSION_CURRENT)
        .expect("in-memory write cannot fail");
    out.write_u32::<LittleEndian>(1).expect("in-memory write cannot fail"); // session count
    write_len_prefixed(&mut out, session.to_string().as_bytes()).expect("in-memory write cannot fail");
    out.push(is_lead as u8);
    write_len_prefixed(&mut out, &stream).expect("in-memory write cannot fail");
    out
}

fn read_container(bytes: &[u8]) -> Result<Vec<RawSession>, LssdbError> {
    let mut cursor = io::Cursor::new(bytes);
    let mut magic = [0u8; 12];
    cursor
        .read_exact(&mut magic)
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
    if &magic != MAGIC {
        return Err(LssdbError::Corrupted("bad magic".into()));
    }

    let format_version = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
    if format_version != FORMAT_VERSION_CURRENT && format_version != FORMAT_VERSION_LEGACY {
        return Err(LssdbError::Corrupted(format!(
            "unsupported container format version {format_version}"
        )));
    }

    let session_count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| LssdbError::Corrupted(e.to_string()))?;

    let mut sessions = Vec::with_capacity(session_count as usize);
    for _ in 0..session_count {
        let uuid_bytes = read_len_prefixed(&mut cursor)?;
        let uuid_str = String::from_utf8(uuid_bytes).map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let uuid = Uuid::parse_str(&uuid_str).map_err(|e| LssdbError::Corrupted(e.to_string()))?;

        let mut lead_byte = [0u8; 1];
        cursor
            .read_exact(&mut lead_byte)
            .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let is_lead = lead_byte[0] != 0;

        let raw_stream = read_len_prefixed(&mut cursor)?;
        let mut stream_cursor = io::Cursor::new(raw_stream.as_slice());
        let stream_version = stream_cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        if stream_version != STREAM_VERSION_CURRENT && stream_version != STREAM_VERSION_LEGACY {
            return Err(LssdbError::Corrupted(format!(
                "unsupported stream format version {stream_version}"
            )));
        }
        let half_size = stream_cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| LssdbError::Corrupted(e.to_string()))?;
        let mut payload = vec![0u8; half_size as usize];
        stream_cursor
            .read_exact(&mut payload)
            .map_err(|e| LssdbError::Corrupted(e.to_string()))?;

        sessions.push(RawSession {
            uuid,
            is_lead,
            stream_version,
            half_size,
            payload,
        });
    }

    Ok(sessions)
}

/// Loads the common session out of two container files and reconstructs
/// the tree it describes.
///
/// `left_bytes`/`right_bytes` are `None` when that side's `.sync.ffs_db`
/// does not exist, which raises [`LssdbError::NotExisting`] rather than a
/// plain I/O error — the direction engine treats that as first-run.
pub fn load(left_bytes: Option<&[u8]>, right_bytes: Option<&[u8]>) -> Result<SyncFolder, LssdbError> {
    let (left_bytes, right_bytes) = match (left_bytes, right_bytes) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(LssdbError::NotExisting(Default::default())),
    };

    let left_sessions = read_container(left_bytes)?;
    let right_sessions = read_container(right_bytes)?;
    debug!("{} session(s) on the left, {} on the right", left_sessions.len(), right_sessions.len());

    let mut matches = Vec::new();
    for l in &left_sessions {
        for r in &right_sessions {
            if l.uuid == r.uuid && l.is_lead != r.is_lead {
                matches.push((l, r));
            }
        }
    }

    if matches.len() > 1 {
        return Err(LssdbError::MultipleCommonSessions);
    }
    let (left, right) = matches
        .into_iter()
        .next()
        .ok_or_else(|| LssdbError::Corrupted("no common session between the two sides".into()))?;

    let (lead, trail) = if left.is_lead { (left, right) } else { (right, left) };

    let mut description = Vec::with_capacity(lead.payload.len() + trail.payload.len());
    description.extend_from_slice(&lead.payload);
    description.extend_from_slice(&trail.payload);

    let _ = (lead.stream_version, lead.half_size);
    decode_description(&description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lssdb::{CompareVariant, Descriptor, FileEntry};

    fn sample_tree() -> SyncFolder {
        SyncFolder {
            files: vec![FileEntry {
                name: "a.txt".into(),
                variant: CompareVariant::ByTimeAndSize,
                left: Descriptor {
                    mod_time: 1_000,
                    size: 10,
                    fingerprint: 7,
                },
                right: Descriptor {
                    mod_time: 1_000,
                    size: 10,
                    fingerprint: 9,
                },
            }],
            symlinks: vec![],
            folders: vec![FolderEntry {
                name: "sub".into(),
                status: FolderStatus::InSync,
                node: SyncFolder::empty(),
            }],
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let tree = sample_tree();
        let session = Uuid::new_v4();
        let (left, right) = save(&tree, session);

        let loaded = load(Some(&left.bytes), Some(&right.bytes)).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn missing_side_reports_not_existing() {
        let tree = sample_tree();
        let (left, _right) = save(&tree, Uuid::new_v4());
        let err = load(Some(&left.bytes), None).unwrap_err();
        assert!(matches!(err, LssdbError::NotExisting(_)));
    }

    #[test]
    fn re_saving_unchanged_tree_is_deterministic() {
        let tree = sample_tree();
        let session = Uuid::new_v4();
        let (left1, right1) = save(&tree, session);
        let (left2, right2) = save(&tree, session);
        assert_eq!(left1.bytes, left2.bytes);
        assert_eq!(right1.bytes, right2.bytes);
    }
}
