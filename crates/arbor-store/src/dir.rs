//! Directory-backed array store.
//!
//! One file per key under the store root. On-disk format:
//!
//! ```text
//! [4 bytes: magic "ARBT"] [1: version] [1: dtype code] [1: flags, bit0 = zstd]
//! [1: ndim] [ndim x 8 bytes: dims (little-endian u64)]
//! [4 bytes: CRC32 of payload] [8 bytes: payload length]
//! [payload: raw little-endian element bytes, zstd-compressed when flagged]
//! ```
//!
//! Writes land in a temp file that is atomically persisted over the final
//! path, so a crash mid-write never leaves a torn entry. Uncompressed
//! entries can be read back as a memory-mapped view instead of an owned
//! copy.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use arbor_tree::{DType, Tensor};

use crate::error::{StoreError, StoreResult};
use crate::traits::{validate_key, ArrayStore};

const MAGIC: &[u8; 4] = b"ARBT";
const VERSION: u8 = 1;
const FLAG_ZSTD: u8 = 0b0000_0001;

/// Compression codec applied to array payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    /// zstd at the given level.
    Zstd(i32),
}

impl Codec {
    /// zstd at its usual default level.
    pub fn zstd() -> Self {
        Codec::Zstd(3)
    }
}

/// Array store keeping one file per key in a directory.
pub struct DirArrayStore {
    root: PathBuf,
    id: String,
    compression: Option<Codec>,
}

impl DirArrayStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path, compression: Option<Codec>) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        let id = root.display().to_string();
        Ok(Self {
            root,
            id,
            compression,
        })
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

struct Header {
    dtype: DType,
    shape: Vec<usize>,
    flags: u8,
    crc: u32,
    payload_len: usize,
    header_len: usize,
}

fn parse_header(key: &str, data: &[u8]) -> StoreResult<Header> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if data.len() < 8 {
        return Err(corrupt("file too short for header"));
    }
    if &data[0..4] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = data[4];
    if version != VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    let dtype = DType::from_code(data[5]).ok_or_else(|| corrupt("unknown dtype code"))?;
    let flags = data[6];
    let ndim = data[7] as usize;

    let dims_end = 8 + ndim * 8;
    if data.len() < dims_end + 12 {
        return Err(corrupt("file too short for shape"));
    }
    let mut shape = Vec::with_capacity(ndim);
    for i in 0..ndim {
        let start = 8 + i * 8;
        let dim = u64::from_le_bytes(data[start..start + 8].try_into().expect("8-byte slice"));
        shape.push(dim as usize);
    }
    let crc = u32::from_le_bytes(data[dims_end..dims_end + 4].try_into().expect("4-byte slice"));
    let payload_len = u64::from_le_bytes(
        data[dims_end + 4..dims_end + 12]
            .try_into()
            .expect("8-byte slice"),
    ) as usize;
    let header_len = dims_end + 12;

    if data.len() < header_len + payload_len {
        return Err(corrupt("payload extends beyond file"));
    }

    Ok(Header {
        dtype,
        shape,
        flags,
        crc,
        payload_len,
        header_len,
    })
}

fn encode(key: &str, tensor: &Tensor, compression: Option<Codec>) -> StoreResult<Vec<u8>> {
    let shape = tensor.shape();
    if shape.len() > u8::MAX as usize {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("{} dimensions exceed the format limit", shape.len()),
        });
    }

    let (payload, flags) = match compression {
        Some(Codec::Zstd(level)) => (
            zstd::encode_all(tensor.bytes(), level)
                .map_err(|e| StoreError::Compression(e.to_string()))?,
            FLAG_ZSTD,
        ),
        None => (tensor.bytes().to_vec(), 0u8),
    };

    let mut out = Vec::with_capacity(20 + shape.len() * 8 + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(tensor.dtype().code());
    out.push(flags);
    out.push(shape.len() as u8);
    for dim in shape {
        out.extend_from_slice(&(*dim as u64).to_le_bytes());
    }
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn checked_payload<'d>(key: &str, header: &Header, data: &'d [u8]) -> StoreResult<&'d [u8]> {
    let payload = &data[header.header_len..header.header_len + header.payload_len];
    let actual = crc32fast::hash(payload);
    if actual != header.crc {
        return Err(StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("CRC mismatch: expected {}, computed {actual}", header.crc),
        });
    }
    Ok(payload)
}

impl ArrayStore for DirArrayStore {
    fn store_id(&self) -> &str {
        &self.id
    }

    fn write(&self, key: &str, tensor: &Tensor) -> StoreResult<()> {
        validate_key(key)?;
        let encoded = encode(key, tensor, self.compression)?;

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&encoded)?;
        tmp.persist(self.entry_path(key))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn read(&self, key: &str) -> StoreResult<Option<Tensor>> {
        validate_key(key)?;
        let data = match fs::read(self.entry_path(key)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let header = parse_header(key, &data)?;
        let payload = checked_payload(key, &header, &data)?;

        let bytes = if header.flags & FLAG_ZSTD != 0 {
            zstd::decode_all(payload).map_err(|e| StoreError::Compression(e.to_string()))?
        } else {
            payload.to_vec()
        };
        let tensor =
            Tensor::from_bytes(header.dtype, &header.shape, bytes).map_err(|e| {
                StoreError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })?;
        Ok(Some(tensor))
    }

    fn read_mapped(&self, key: &str) -> StoreResult<Option<Tensor>> {
        validate_key(key)?;
        let file = match fs::File::open(self.entry_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // Safety note applies to external writers; within this process the
        // store only replaces entries atomically, never in place.
        let map = unsafe { Mmap::map(&file)? };
        let header = parse_header(key, &map)?;
        if header.flags & FLAG_ZSTD != 0 {
            // Compressed entries always materialize.
            return self.read(key);
        }
        checked_payload(key, &header, &map)?;
        let tensor = Tensor::from_mapped(
            header.dtype,
            &header.shape,
            Arc::new(map),
            header.header_len,
        )
        .map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(tensor))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self) -> StoreResult<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    // Temp files from in-flight writes are dot-prefixed.
                    if !name.starts_with('.') {
                        keys.insert(name);
                    }
                }
                Err(name) => {
                    warn!(?name, "skipping non-UTF-8 store entry");
                }
            }
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for DirArrayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirArrayStore")
            .field("root", &self.root)
            .field("compression", &self.compression)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tensor() -> Tensor {
        let data: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        Tensor::from_slice(&[3, 4], &data).unwrap()
    }

    #[test]
    fn write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        let t = make_tensor();
        store.write("root.frame", &t).unwrap();
        let back = store.read("root.frame").unwrap().expect("should exist");
        assert_eq!(back, t);
        assert!(!back.is_mapped());
    }

    #[test]
    fn compressed_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), Some(Codec::zstd())).unwrap();
        let t = make_tensor();
        store.write("z", &t).unwrap();
        assert_eq!(store.read("z").unwrap().unwrap(), t);
    }

    #[test]
    fn mapped_read_returns_view() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        let t = make_tensor();
        store.write("m", &t).unwrap();
        let mapped = store.read_mapped("m").unwrap().unwrap();
        assert!(mapped.is_mapped());
        assert_eq!(mapped, t);
    }

    #[test]
    fn mapped_read_of_compressed_entry_materializes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), Some(Codec::Zstd(1))).unwrap();
        store.write("c", &make_tensor()).unwrap();
        let t = store.read_mapped("c").unwrap().unwrap();
        assert!(!t.is_mapped());
        assert_eq!(t, make_tensor());
    }

    #[test]
    fn missing_key_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        assert!(store.read("absent").unwrap().is_none());
        assert!(store.read_mapped("absent").unwrap().is_none());
    }

    #[test]
    fn overwrite_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        store
            .write("k", &Tensor::from_slice(&[2], &[1i64, 2]).unwrap())
            .unwrap();
        store
            .write("k", &Tensor::from_slice(&[3], &[7i64, 8, 9]).unwrap())
            .unwrap();
        let back = store.read("k").unwrap().unwrap();
        assert_eq!(back.to_vec::<i64>().unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn delete_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        store.write("k", &make_tensor()).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn list_keys_sees_only_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        store.write("a", &make_tensor()).unwrap();
        store.write("b.0.c", &make_tensor()).unwrap();
        fs::write(dir.path().join(".tmp-leftover"), b"junk").unwrap();
        let keys: Vec<String> = store.list_keys().unwrap().into_iter().collect();
        assert_eq!(keys, vec!["a".to_string(), "b.0.c".to_string()]);
    }

    #[test]
    fn corruption_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        store.write("k", &make_tensor()).unwrap();

        // Flip one payload byte behind the store's back.
        let path = store.root().join("k");
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&path, data).unwrap();

        let err = store.read("k").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        fs::write(dir.path().join("evil"), b"NOTATENSOR").unwrap();
        let err = store.read("evil").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn scalar_tensor_roundtrip() {
        // Zero-dimensional tensor: one element, empty shape.
        let dir = tempfile::tempdir().unwrap();
        let store = DirArrayStore::open(dir.path(), None).unwrap();
        let t = Tensor::from_slice(&[], &[42i32]).unwrap();
        store.write("s", &t).unwrap();
        assert_eq!(store.read("s").unwrap().unwrap().to_vec::<i32>().unwrap(), vec![42]);
    }
}
