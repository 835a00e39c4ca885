//! Contiguous partitioning of a document's records

/// A contiguous slice of a document's records assigned to one worker
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    pub ordinal: usize,
    pub records: Vec<T>,
}

impl<T> Chunk<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split `records` into `min(worker_count, records.len())` chunks
///
/// Every chunk but the last holds `len / count` records; the last one takes
/// the remainder. An empty input yields no chunks.
pub fn partition<T>(records: Vec<T>, worker_count: usize) -> Vec<Chunk<T>> {
    let count = worker_count.min(records.len());
    if count == 0 {
        return Vec::new();
    }

    let size = records.len() / count;
    let mut chunks = Vec::with_capacity(count);
    let mut rest = records.into_iter();
    for ordinal in 0..count {
        let records: Vec<T> = if ordinal + 1 == count {
            rest.by_ref().collect()
        } else {
            rest.by_ref().take(size).collect()
        };
        chunks.push(Chunk { ordinal, records });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(chunks: &[Chunk<u32>]) -> Vec<u32> {
        chunks.iter().flat_map(|c| c.records.iter().copied()).collect()
    }

    #[test]
    fn test_partition_preserves_order() {
        for len in 1..40u32 {
            for workers in 1..13usize {
                let records: Vec<u32> = (0..len).collect();
                let chunks = partition(records.clone(), workers);
                assert_eq!(chunks.len(), workers.min(len as usize));
                assert_eq!(flatten(&chunks), records);
                for (i, chunk) in chunks.iter().enumerate() {
                    assert_eq!(chunk.ordinal, i);
                    assert!(!chunk.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_last_chunk_takes_remainder() {
        let chunks = partition((0..23u32).collect(), 10);
        assert_eq!(chunks.len(), 10);
        assert!(chunks[..9].iter().all(|c| c.len() == 2));
        assert_eq!(chunks[9].len(), 5);
    }

    #[test]
    fn test_fewer_records_than_workers() {
        let chunks = partition(vec!["a", "b", "c"], 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunks = partition(Vec::<u32>::new(), 10);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_zero_workers_yields_no_chunks() {
        assert!(partition(vec![1u32, 2, 3], 0).is_empty());
    }
}
