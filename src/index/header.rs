use super::error::{IndexError, IndexResult};
use super::node::NodeHeader;
use super::{ColSpec, ColType};
use crate::file::{PageNo, PAGE_SIZE};

/// Magic number for index files: "SIDX" in ASCII
pub const MAGIC_NUMBER: u32 = 0x5349_4458;

/// Current index file version
pub const VERSION: u32 = 1;

/// The immutable shape of an index: key columns, derived key length and
/// the tree order (maximum keys per node)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    pub columns: Vec<ColSpec>,
    pub key_len: usize,
    pub order: usize,
}

impl KeySchema {
    /// Build a schema, capping the order at what a node page can hold
    pub fn new(columns: Vec<ColSpec>, order: Option<usize>) -> Self {
        let key_len: usize = columns.iter().map(|c| c.len).sum();
        let capacity = Self::max_order(key_len);
        let order = order.map_or(capacity, |o| o.min(capacity)).max(3);
        Self {
            columns,
            key_len,
            order,
        }
    }

    /// Largest node order that fits a page: header plus `order` keys and
    /// `order` rids
    pub fn max_order(key_len: usize) -> usize {
        (PAGE_SIZE - NodeHeader::SIZE) / (key_len + 8)
    }

    /// Every non-root node keeps at least this many keys
    pub fn min_size(&self) -> usize {
        self.order / 2
    }
}

/// The mutable part of the index file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeState {
    pub root_page: PageNo,
    pub first_leaf: PageNo,
    pub last_leaf: PageNo,
    /// Total pages in the file, header and sentinel included
    pub num_pages: u32,
}

/// On-disk form of page 0 of an index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFileHeader {
    pub schema: KeySchema,
    pub state: TreeState,
}

impl IndexFileHeader {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut offset = 0;

        let mut put_u32 = |buf: &mut Vec<u8>, value: u32| {
            buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            offset += 4;
        };

        put_u32(&mut buf, MAGIC_NUMBER);
        put_u32(&mut buf, VERSION);
        put_u32(&mut buf, self.state.root_page);
        put_u32(&mut buf, self.state.first_leaf);
        put_u32(&mut buf, self.state.last_leaf);
        put_u32(&mut buf, self.state.num_pages);
        put_u32(&mut buf, self.schema.order as u32);
        put_u32(&mut buf, self.schema.key_len as u32);
        put_u32(&mut buf, self.schema.columns.len() as u32);

        for col in &self.schema.columns {
            let ty = match col.ty {
                ColType::Int => 0u8,
                ColType::Float => 1,
                ColType::Str => 2,
            };
            buf[offset] = ty;
            offset += 1;
            buf[offset..offset + 4].copy_from_slice(&(col.len as u32).to_le_bytes());
            offset += 4;
        }

        buf
    }

    pub fn deserialize(buf: &[u8]) -> IndexResult<Self> {
        let mut offset = 0;
        let mut take_u32 = |offset: &mut usize| {
            let value = u32::from_le_bytes(buf[*offset..*offset + 4].try_into().unwrap());
            *offset += 4;
            value
        };

        let magic = take_u32(&mut offset);
        if magic != MAGIC_NUMBER {
            return Err(IndexError::InvalidMagic);
        }
        let version = take_u32(&mut offset);
        if version != VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }

        let root_page = take_u32(&mut offset);
        let first_leaf = take_u32(&mut offset);
        let last_leaf = take_u32(&mut offset);
        let num_pages = take_u32(&mut offset);
        let order = take_u32(&mut offset) as usize;
        let key_len = take_u32(&mut offset) as usize;
        let ncols = take_u32(&mut offset) as usize;

        let mut columns = Vec::with_capacity(ncols);
        for _ in 0..ncols {
            let ty = match buf[offset] {
                0 => ColType::Int,
                1 => ColType::Float,
                _ => ColType::Str,
            };
            offset += 1;
            let len = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            columns.push(ColSpec { ty, len });
        }

        Ok(Self {
            schema: KeySchema {
                columns,
                key_len,
                order,
            },
            state: TreeState {
                root_page,
                first_leaf,
                last_leaf,
                num_pages,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::INVALID_PAGE_NO;

    #[test]
    fn test_header_round_trip() {
        let header = IndexFileHeader {
            schema: KeySchema::new(
                vec![
                    ColSpec {
                        ty: ColType::Int,
                        len: 4,
                    },
                    ColSpec {
                        ty: ColType::Str,
                        len: 12,
                    },
                ],
                Some(64),
            ),
            state: TreeState {
                root_page: INVALID_PAGE_NO,
                first_leaf: 1,
                last_leaf: 1,
                num_pages: 2,
            },
        };

        let restored = IndexFileHeader::deserialize(&header.serialize()).unwrap();
        assert_eq!(restored, header);
        assert_eq!(restored.schema.key_len, 16);
    }

    #[test]
    fn test_bad_magic() {
        let buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            IndexFileHeader::deserialize(&buf),
            Err(IndexError::InvalidMagic)
        ));
    }

    #[test]
    fn test_order_is_capped() {
        let schema = KeySchema::new(
            vec![ColSpec {
                ty: ColType::Int,
                len: 4,
            }],
            Some(100_000),
        );
        assert!(schema.order <= KeySchema::max_order(4));
        assert!(schema.order >= 3);
    }
}
