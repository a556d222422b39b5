//! # Speedup planner
//!
//! Certain page ranges of a HONMON/START file must always be stored
//! uncompressed, regardless of level, so the EB/EPWING decoder can scan
//! them quickly. The regions are declared by index-page entries with
//! codes `0x90..0x92`; grounded on `ebzip/speedup.c`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{EbzipError, EbzipResult};
use crate::zio::EB_PAGE;

pub const MAX_SPEEDUP_REGIONS: usize = 3;
const INDEX_ENTRY_LEN: usize = 16;
/// Upper bound on how many 16-byte entries fit after the 16-byte page
/// header in one 2048-byte page. `index_count` (`buf[1]`) is an untrusted
/// byte and can claim up to 255; without this clamp a page whose first
/// bytes aren't a genuine index page indexes past the fixed-size buffer.
const MAX_INDEX_ENTRIES: usize = (EB_PAGE as usize - 16) / INDEX_ENTRY_LEN;

fn be4(buf: &[u8]) -> u32 {
    u32::from_be_bytes(buf.try_into().expect("4 bytes"))
}

#[derive(Clone, Copy, Debug)]
pub struct SpeedupRegion {
    pub start_page: u64,
    pub end_page: u64,
}

#[derive(Default)]
pub struct SpeedupPlan {
    regions: Vec<SpeedupRegion>,
}

impl SpeedupPlan {
    /// Scan the index page at `index_page` for up to `MAX_SPEEDUP_REGIONS`
    /// entries with codes `0x90..0x92`. For each, `start_page` comes
    /// straight from the entry; `end_page` is recovered by re-reading
    /// `start_page`'s own page and taking its byte-3 page count, per the
    /// original's two-pass read.
    pub fn scan(path: &Path, index_page: u32) -> EbzipResult<Self> {
        let mut file = File::open(path).map_err(|e| EbzipError::io(path, e))?;
        let page = if index_page == 0 { 1 } else { index_page };
        let offset = (page as u64 - 1) * EB_PAGE;
        file.seek(SeekFrom::Start(offset)).map_err(|e| EbzipError::io(path, e))?;
        let mut buf = [0u8; EB_PAGE as usize];
        file.read_exact(&mut buf).map_err(|_| EbzipError::UnexpectedEof { path: path.to_path_buf() })?;

        let index_count = (buf[1] as usize).min(MAX_INDEX_ENTRIES);
        let mut start_pages = Vec::new();
        for i in 0..index_count {
            if start_pages.len() >= MAX_SPEEDUP_REGIONS {
                break;
            }
            let entry = &buf[16 + i * INDEX_ENTRY_LEN..16 + (i + 1) * INDEX_ENTRY_LEN];
            if matches!(entry[0], 0x90..=0x92) {
                start_pages.push(be4(&entry[2..6]) as u64);
            }
        }

        let mut regions = Vec::with_capacity(start_pages.len());
        for start_page in start_pages {
            let region_offset = (start_page - 1) * EB_PAGE;
            file.seek(SeekFrom::Start(region_offset)).map_err(|e| EbzipError::io(path, e))?;
            let mut region_page = [0u8; EB_PAGE as usize];
            file.read_exact(&mut region_page)
                .map_err(|_| EbzipError::UnexpectedEof { path: path.to_path_buf() })?;
            let page_count = region_page[3] as u64;
            regions.push(SpeedupRegion { start_page, end_page: start_page + page_count - 1 });
        }
        Ok(SpeedupPlan { regions })
    }

    /// Whether slice `slice_no` at compression `level` must be stored
    /// rather than compressed: true if it overlaps any speedup region.
    /// A slice covers physical pages `[s*2^L + 1, (s+1)*2^L]`.
    pub fn is_speedup_slice(&self, slice_no: u64, level: u8) -> bool {
        let shift = 1u64 << level;
        let start_page = slice_no * shift + 1;
        let end_page = (slice_no + 1) * shift;
        self.regions
            .iter()
            .any(|r| start_page <= r.end_page && r.start_page <= end_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(regions: Vec<SpeedupRegion>) -> SpeedupPlan {
        SpeedupPlan { regions }
    }

    #[test]
    fn overlap_detects_region_within_slice() {
        let plan = plan_with(vec![SpeedupRegion { start_page: 5, end_page: 8 }]);
        // level 0: slice s covers pages [s+1, s+1]; slice 4 covers page 5.
        assert!(plan.is_speedup_slice(4, 0));
        assert!(!plan.is_speedup_slice(3, 0));
    }

    #[test]
    fn overlap_at_higher_level_spans_multiple_pages() {
        let plan = plan_with(vec![SpeedupRegion { start_page: 9, end_page: 9 }]);
        // level 2: slice s covers pages [4s+1, 4s+4]; slice 2 covers [9,12].
        assert!(plan.is_speedup_slice(2, 2));
        assert!(!plan.is_speedup_slice(1, 2));
    }

    #[test]
    fn capped_at_three_regions() {
        // regions beyond the cap are simply never recorded by `scan`;
        // exercised at the data-structure level since `scan` needs a file.
        let regions: Vec<SpeedupRegion> =
            (0..5).map(|i| SpeedupRegion { start_page: i, end_page: i }).take(MAX_SPEEDUP_REGIONS).collect();
        assert_eq!(regions.len(), MAX_SPEEDUP_REGIONS);
    }
}
