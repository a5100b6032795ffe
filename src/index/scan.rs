use super::error::IndexResult;
use super::handle::IndexHandle;
use super::Iid;
use crate::record::Rid;

/// Ordered cursor over `[begin, end)` leaf slots of a B+ tree.
pub struct IndexScan<'a> {
    index: &'a IndexHandle,
    iid: Iid,
    end: Iid,
}

impl<'a> IndexScan<'a> {
    pub(crate) fn new(index: &'a IndexHandle, begin: Iid, end: Iid) -> Self {
        Self {
            index,
            iid: begin,
            end,
        }
    }

    pub fn is_end(&self) -> bool {
        self.iid == self.end
    }

    /// Current cursor position
    pub fn iid(&self) -> Iid {
        self.iid
    }

    /// Rid under the cursor
    pub fn rid(&self) -> IndexResult<Rid> {
        self.index.get_rid(self.iid)
    }

    /// Advance to the next entry
    pub fn next(&mut self) -> IndexResult<()> {
        debug_assert!(!self.is_end());
        self.iid = self.index.next_iid(self.iid)?;
        Ok(())
    }

    /// Drain the remaining range into a vector of Rids
    pub fn collect_rids(mut self) -> IndexResult<Vec<Rid>> {
        let mut rids = Vec::new();
        while !self.is_end() {
            rids.push(self.rid()?);
            self.next()?;
        }
        Ok(rids)
    }
}
