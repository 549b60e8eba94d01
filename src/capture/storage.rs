//! Append-only paged storage for capture records.
//!
//! Items live in fixed power-of-two pages, so an item's position is found
//! with a shift and a mask. A page is a `Vec` allocated with exactly one
//! page of capacity and never grows past it, which keeps every slot address
//! stable and makes `alloc_item` O(1) without reallocation. `reserve` moves
//! page allocation ahead of need; `drain` is single-use and frees pages as
//! the consumer walks past them.

use std::iter::Flatten;
use std::time::Instant;
use std::vec::IntoIter;

use crate::utils::config::PAGE_BITS;

pub struct PagedStorage<T> {
    pages: Vec<Vec<T>>,
    page_bits: u32,
    len: usize,
    drained: bool,
    alloc_overhead_ns: u64,
}

/// Destructive, insertion-ordered iterator returned by `drain`
pub type Drain<T> = Flatten<IntoIter<Vec<T>>>;

impl<T> PagedStorage<T> {
    pub fn new() -> Self {
        Self::with_page_bits(PAGE_BITS)
    }

    pub fn with_page_bits(page_bits: u32) -> Self {
        let mut storage = Self {
            pages: Vec::new(),
            page_bits,
            len: 0,
            drained: false,
            alloc_overhead_ns: 0,
        };
        storage.pages.push(storage.page_alloc());
        storage
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        1 << self.page_bits
    }

    #[inline]
    fn page_mask(&self) -> usize {
        self.page_size() - 1
    }

    fn page_alloc(&self) -> Vec<T> {
        Vec::with_capacity(self.page_size())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Slots already allocated but not yet handed out
    pub fn free_slots(&self) -> usize {
        self.pages.len() * self.page_size() - self.len
    }

    /// Wallclock ns spent allocating pages so far
    pub fn alloc_overhead_ns(&self) -> u64 {
        self.alloc_overhead_ns
    }

    /// Store `item` in the next free slot and return its index.
    ///
    /// A fresh page is allocated only when the preallocated ones are
    /// exhausted; that time is added to `alloc_overhead_ns`.
    #[inline]
    pub fn alloc_item(&mut self, item: T) -> usize {
        debug_assert!(!self.drained, "alloc_item after drain");
        let idx = self.len;
        let page = idx >> self.page_bits;
        if page == self.pages.len() {
            let started = Instant::now();
            let fresh = self.page_alloc();
            self.pages.push(fresh);
            self.alloc_overhead_ns += started.elapsed().as_nanos() as u64;
        }
        self.pages[page].push(item);
        self.len += 1;
        idx
    }

    /// Make sure at least `num_items` more items fit without allocating.
    pub fn reserve(&mut self, num_items: usize) {
        debug_assert!(!self.drained, "reserve after drain");
        let free = self.free_slots();
        if num_items <= free {
            return;
        }
        let started = Instant::now();
        let missing = num_items - free;
        let num_pages = (missing + self.page_size() - 1) >> self.page_bits;
        for _ in 0..num_pages {
            let fresh = self.page_alloc();
            self.pages.push(fresh);
        }
        self.alloc_overhead_ns += started.elapsed().as_nanos() as u64;
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.pages
            .get(idx >> self.page_bits)
            .and_then(|page| page.get(idx & self.page_mask()))
    }

    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        let mask = self.page_mask();
        self.pages
            .get_mut(idx >> self.page_bits)
            .and_then(|page| page.get_mut(idx & mask))
    }

    /// Items in insertion order, without consuming them
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.iter())
    }

    /// Stream all items out in insertion order.
    ///
    /// Each page is released once its last item has been yielded. A second
    /// call returns an empty iterator.
    pub fn drain(&mut self) -> Drain<T> {
        let pages = if self.drained {
            Vec::new()
        } else {
            std::mem::take(&mut self.pages)
        };
        self.drained = true;
        self.len = 0;
        pages.into_iter().flatten()
    }
}

impl<T> Default for PagedStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}
