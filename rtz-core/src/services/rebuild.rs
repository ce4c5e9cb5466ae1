use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ContainerError;
use crate::model::block::TextBlock;

/// Splits `blob` into one mutable window per block. Blocks must be sorted by
/// offset; each window is exactly `allocated_length` bytes, so writes through
/// them can never change the blob length or touch a neighbour.
pub fn carve<'a>(blob: &'a mut [u8], blocks: &[TextBlock]) -> Result<Vec<&'a mut [u8]>, ContainerError> {
    let len = blob.len();
    let mut slots = Vec::with_capacity(blocks.len());
    let mut rest = blob;
    let mut consumed = 0usize;
    let mut previous = 0usize;

    for block in blocks {
        if block.offset < consumed {
            return Err(ContainerError::Overlap {
                first: previous,
                second: block.offset,
            });
        }
        if block.end() > len {
            return Err(ContainerError::WriteOutOfBounds {
                offset: block.offset,
                length: block.allocated_length,
                len,
            });
        }

        let (_, tail) = std::mem::take(&mut rest).split_at_mut(block.offset - consumed);
        let (slot, tail) = tail.split_at_mut(block.allocated_length);
        slots.push(slot);
        rest = tail;
        consumed = block.end();
        previous = block.offset;
    }

    Ok(slots)
}

/// Replaces a file in one step: the bytes go to a sibling temp file that is
/// then renamed over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(path);

    if let Some(parent) = tmp.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(n) => n.to_string(),
        None => "rtz".to_string(),
    };
    p.set_file_name(format!("{file_name}.tmp"));
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(offset: usize, len: usize) -> TextBlock {
        TextBlock::new(offset, vec![b'x'; len])
    }

    #[test]
    fn carved_slots_cover_only_their_blocks() {
        let mut blob = vec![b'.'; 12];
        let blocks = [block(2, 3), block(5, 2), block(9, 3)];
        {
            let slots = carve(&mut blob, &blocks).unwrap();
            assert_eq!(slots.iter().map(|s| s.len()).collect::<Vec<_>>(), vec![3, 2, 3]);
            for slot in slots {
                slot.fill(b'#');
            }
        }
        assert_eq!(&blob, b"..#####..###");
    }

    #[test]
    fn overlapping_or_oversized_blocks_are_refused() {
        let mut blob = vec![0u8; 8];
        assert!(matches!(
            carve(&mut blob, &[block(0, 4), block(3, 2)]),
            Err(ContainerError::Overlap { first: 0, second: 3 })
        ));
        assert!(matches!(
            carve(&mut blob, &[block(6, 4)]),
            Err(ContainerError::WriteOutOfBounds { offset: 6, .. })
        ));
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("tuto_001.rtz");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("out").join("tuto_001.rtz.tmp").exists());
    }
}
