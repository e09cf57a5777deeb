//! Multi-file merge: draws from N opened readers and yields one
//! globally ordered stream.
//!
//! Each reader contributes at most one *pending* record to a binary
//! heap keyed by the active sort order; popping returns the least
//! pending and refills from the same reader. All inputs must agree on
//! the reference dictionary — ref ids are only comparable when they
//! name the same sequences.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashSet;

use log::warn;

use crate::error::{BamError, Result, UsageErrorKind};
use crate::header::RefData;
use crate::index::IndexKind;
use crate::reader::BamReader;
use crate::record::BamAlignment;
use crate::region::BamRegion;

/// Global order applied across inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending `(ref_id, position)`; unmapped records last. Stable:
    /// equal keys come from readers in insertion order.
    #[default]
    ByPosition,
    /// Lexicographic read name; stable on ties.
    ByReadName,
    /// No reordering: records drain in arrival order.
    Unsorted,
}

/// Open-time options.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiReaderOptions {
    /// Look for `.bai`/`.bti` files next to each input.
    pub load_indexes: bool,
    /// Core-only decoding; char data stays raw in merged output.
    pub core_mode: bool,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, PartialEq)]
enum MergeKey {
    Position { ref_key: i64, position: i32 },
    Name(String),
    Fifo,
}

#[derive(Debug)]
struct MergeEntry {
    key: MergeKey,
    reader_index: usize,
    /// Monotone arrival counter; orders Unsorted mode and breaks
    /// residual ties.
    sequence: u64,
    alignment: BamAlignment,
}

impl MergeEntry {
    fn rank(&self, other: &Self) -> Ordering {
        let key_cmp = match (&self.key, &other.key) {
            (
                MergeKey::Position { ref_key, position },
                MergeKey::Position {
                    ref_key: other_ref,
                    position: other_pos,
                },
            ) => (ref_key, position).cmp(&(other_ref, other_pos)),
            (MergeKey::Name(a), MergeKey::Name(b)) => a.cmp(b),
            _ => Ordering::Equal,
        };
        key_cmp.then_with(|| match self.key {
            // FIFO mode orders purely by arrival.
            MergeKey::Fifo => self.sequence.cmp(&other.sequence),
            // Sorted modes: stable by reader insertion order.
            _ => (self.reader_index, self.sequence).cmp(&(other.reader_index, other.sequence)),
        })
    }
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    // Inverted so the std max-heap pops the least entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other).reverse()
    }
}

/// Merged view over multiple BAM inputs. Owns its readers.
#[derive(Debug)]
pub struct BamMultiReader {
    readers: Vec<BamReader>,
    pending: BinaryHeap<MergeEntry>,
    sort_order: SortOrder,
    core_mode: bool,
    sequence: u64,
}

impl BamMultiReader {
    /// Opens every input. An input that fails to open propagates its
    /// error; an input that opens but holds no alignments is excluded
    /// with a warning — unless it is the only input, in which case the
    /// open itself fails. All surviving inputs must share an identical
    /// reference dictionary.
    pub fn open<S: AsRef<str>>(
        filenames: &[S],
        options: MultiReaderOptions,
    ) -> Result<BamMultiReader> {
        let mut readers = Vec::with_capacity(filenames.len());
        for name in filenames {
            let mut reader = BamReader::open(name.as_ref())?;
            if options.load_indexes {
                reader.locate_index(IndexKind::Bai)?;
            }
            readers.push(reader);
        }

        validate_references(&readers)?;

        let mut multi = BamMultiReader {
            readers,
            pending: BinaryHeap::new(),
            sort_order: options.sort_order,
            core_mode: options.core_mode,
            sequence: 0,
        };
        multi.prime_pending(true)?;
        Ok(multi)
    }

    /// Number of (surviving) inputs.
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// The shared reference dictionary.
    pub fn references(&self) -> &[RefData] {
        self.readers
            .first()
            .map(|r| r.references())
            .unwrap_or(&[])
    }

    /// Pops the least pending record and refills from its reader.
    /// Returns false when every input is exhausted.
    pub fn next_alignment(&mut self, al: &mut BamAlignment) -> Result<bool> {
        let entry = match self.pending.pop() {
            Some(e) => e,
            None => return Ok(false),
        };
        let reader_index = entry.reader_index;
        *al = entry.alignment;
        self.push_from_reader(reader_index)?;
        Ok(true)
    }

    /// Forwards the region to every reader and restarts the pending
    /// queue. Readers whose index reports an empty region simply
    /// contribute nothing — that is not an error.
    pub fn set_region(&mut self, region: BamRegion) -> Result<()> {
        for reader in &mut self.readers {
            reader.set_region(region)?;
        }
        self.prime_pending(false)?;
        Ok(())
    }

    /// Re-keys the pending records under a new order without touching
    /// the underlying files.
    pub fn set_sort_order(&mut self, order: SortOrder) {
        if order == self.sort_order {
            return;
        }
        self.sort_order = order;
        let old = std::mem::take(&mut self.pending);
        for mut entry in old.into_vec() {
            entry.key = make_key(order, &entry.alignment);
            self.pending.push(entry);
        }
    }

    /// Builds (and writes) an index for every input.
    pub fn create_indexes(&mut self, kind: IndexKind) -> Result<()> {
        for reader in &mut self.readers {
            reader.create_index(kind)?;
        }
        Ok(())
    }

    /// Unified header text.
    ///
    /// One input passes through verbatim. For several: the first
    /// input's `@HD`/`@SQ` lines as-is, `@RG` lines unioned by their
    /// `ID:` (a duplicate inside one file is warned, cross-file
    /// duplicates dedupe silently), `@PG`/`@CO` lines from all inputs
    /// in first-seen order.
    pub fn header_text(&self) -> String {
        if self.readers.len() == 1 {
            return self.readers[0].header_text().to_string();
        }

        let mut merged = String::new();
        let mut seen_read_groups: HashSet<String> = HashSet::new();

        for (i, reader) in self.readers.iter().enumerate() {
            let mut file_read_groups: HashSet<String> = HashSet::new();
            for line in reader.header_text().lines() {
                if line.is_empty() {
                    continue;
                }
                if line.starts_with("@HD") || line.starts_with("@SQ") {
                    if i == 0 {
                        merged.push_str(line);
                        merged.push('\n');
                    }
                } else if line.starts_with("@RG") {
                    let id = extract_read_group(line);
                    if !file_read_groups.insert(id.clone()) {
                        warn!(
                            "{}: duplicate read group ID '{}' within one file",
                            reader.filename(),
                            id
                        );
                        continue;
                    }
                    if seen_read_groups.insert(id) {
                        merged.push_str(line);
                        merged.push('\n');
                    }
                } else if line.starts_with("@PG") || line.starts_with("@CO") {
                    merged.push_str(line);
                    merged.push('\n');
                }
            }
        }
        merged
    }

    /// Closes every reader and releases the queue.
    pub fn close(self) {}

    // ─────────────────────────────────────────────────────────────────────
    // Pending-queue plumbing
    // ─────────────────────────────────────────────────────────────────────

    /// Clears the queue and pulls one record from every reader. During
    /// the initial fill, inputs with no alignments at all are excluded
    /// before queue indices are assigned.
    fn prime_pending(&mut self, exclude_empty: bool) -> Result<()> {
        self.pending.clear();

        if !exclude_empty {
            for i in 0..self.readers.len() {
                self.push_from_reader(i)?;
            }
            return Ok(());
        }

        let input_count = self.readers.len();
        let mut survivors = Vec::with_capacity(input_count);
        let mut firsts = Vec::with_capacity(input_count);
        for mut reader in std::mem::take(&mut self.readers) {
            let mut al = BamAlignment::new();
            let has = if self.core_mode {
                reader.next_alignment_core(&mut al)?
            } else {
                reader.next_alignment(&mut al)?
            };
            if has {
                survivors.push(reader);
                firsts.push(al);
            } else if input_count == 1 {
                // A lone input with nothing to merge is a failed open,
                // not an exclusion.
                return Err(BamError::usage(UsageErrorKind::NotOpen));
            } else {
                warn!("{}: no alignments; excluding from merge", reader.filename());
            }
        }
        self.readers = survivors;
        for (i, al) in firsts.into_iter().enumerate() {
            self.push_entry(i, al);
        }
        Ok(())
    }

    /// Pulls the next record from one reader into the queue. False when
    /// that reader is exhausted.
    fn push_from_reader(&mut self, reader_index: usize) -> Result<bool> {
        let mut al = BamAlignment::new();
        let reader = &mut self.readers[reader_index];
        let has = if self.core_mode {
            reader.next_alignment_core(&mut al)?
        } else {
            reader.next_alignment(&mut al)?
        };
        if !has {
            return Ok(false);
        }
        self.push_entry(reader_index, al);
        Ok(true)
    }

    fn push_entry(&mut self, reader_index: usize, alignment: BamAlignment) {
        let key = make_key(self.sort_order, &alignment);
        let sequence = self.sequence;
        self.sequence += 1;
        self.pending.push(MergeEntry {
            key,
            reader_index,
            sequence,
            alignment,
        });
    }
}

fn make_key(order: SortOrder, al: &BamAlignment) -> MergeKey {
    match order {
        SortOrder::ByPosition => MergeKey::Position {
            // Unmapped records (ref id −1) sort after all mapped ones.
            ref_key: if al.ref_id < 0 {
                i64::MAX
            } else {
                al.ref_id as i64
            },
            position: al.position,
        },
        SortOrder::ByReadName => MergeKey::Name(name_of(al)),
        SortOrder::Unsorted => MergeKey::Fifo,
    }
}

/// Read name without forcing full char-data materialization.
fn name_of(al: &BamAlignment) -> String {
    if !al.is_core_only() {
        return al.name.clone();
    }
    let n = (al.support.query_name_length as usize).min(al.support.all_char_data.len());
    let raw = &al.support.all_char_data[..n];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn validate_references(readers: &[BamReader]) -> Result<()> {
    let first = match readers.first() {
        Some(r) => r.references(),
        None => return Ok(()),
    };
    for reader in &readers[1..] {
        if reader.references() != first {
            return Err(BamError::usage(UsageErrorKind::ReferenceMismatch));
        }
    }
    Ok(())
}

/// Value of the `ID:` field of an `@RG` header line.
fn extract_read_group(line: &str) -> String {
    for part in line.split('\t') {
        let mut fields = part.splitn(2, ':');
        if fields.next() == Some("ID") {
            let rest = fields.next().unwrap_or("");
            return rest.split(':').next().unwrap_or("").to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(order: SortOrder, ref_id: i32, position: i32, reader: usize, seq: u64) -> MergeEntry {
        let mut al = BamAlignment::new();
        al.ref_id = ref_id;
        al.position = position;
        MergeEntry {
            key: make_key(order, &al),
            reader_index: reader,
            sequence: seq,
            alignment: al,
        }
    }

    #[test]
    fn position_order_pops_least_first() {
        let mut heap = BinaryHeap::new();
        heap.push(entry(SortOrder::ByPosition, 1, 50, 0, 0));
        heap.push(entry(SortOrder::ByPosition, 0, 900, 1, 1));
        heap.push(entry(SortOrder::ByPosition, 0, 100, 2, 2));

        let order: Vec<(i32, i32)> = std::iter::from_fn(|| {
            heap.pop().map(|e| (e.alignment.ref_id, e.alignment.position))
        })
        .collect();
        assert_eq!(order, vec![(0, 100), (0, 900), (1, 50)]);
    }

    #[test]
    fn unmapped_sorts_last() {
        let mut heap = BinaryHeap::new();
        heap.push(entry(SortOrder::ByPosition, -1, 0, 0, 0));
        heap.push(entry(SortOrder::ByPosition, 5, 10_000, 1, 1));
        let first = heap.pop().unwrap();
        assert_eq!(first.alignment.ref_id, 5);
        assert_eq!(heap.pop().unwrap().alignment.ref_id, -1);
    }

    #[test]
    fn equal_keys_prefer_earlier_reader() {
        let mut heap = BinaryHeap::new();
        heap.push(entry(SortOrder::ByPosition, 0, 100, 1, 0));
        heap.push(entry(SortOrder::ByPosition, 0, 100, 0, 1));
        assert_eq!(heap.pop().unwrap().reader_index, 0);
        assert_eq!(heap.pop().unwrap().reader_index, 1);
    }

    #[test]
    fn name_order_is_lexicographic() {
        let named = |name: &str, seq: u64| {
            let mut al = BamAlignment::new();
            al.name = name.to_string();
            MergeEntry {
                key: make_key(SortOrder::ByReadName, &al),
                reader_index: 0,
                sequence: seq,
                alignment: al,
            }
        };
        let mut heap = BinaryHeap::new();
        heap.push(named("read_b", 0));
        heap.push(named("read_a", 1));
        heap.push(named("read_c", 2));
        assert_eq!(heap.pop().unwrap().alignment.name, "read_a");
        assert_eq!(heap.pop().unwrap().alignment.name, "read_b");
        assert_eq!(heap.pop().unwrap().alignment.name, "read_c");
    }

    #[test]
    fn fifo_order_is_arrival_order() {
        let mut heap = BinaryHeap::new();
        heap.push(entry(SortOrder::Unsorted, 3, 999, 2, 0));
        heap.push(entry(SortOrder::Unsorted, 0, 1, 0, 1));
        assert_eq!(heap.pop().unwrap().sequence, 0);
        assert_eq!(heap.pop().unwrap().sequence, 1);
    }

    #[test]
    fn read_group_extraction() {
        assert_eq!(
            extract_read_group("@RG\tID:sample1\tSM:s1\tLB:lib1"),
            "sample1"
        );
        assert_eq!(extract_read_group("@RG\tSM:s1\tID:xyz"), "xyz");
        assert_eq!(extract_read_group("@RG\tSM:s1"), "");
    }
}
