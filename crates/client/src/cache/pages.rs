/// One server page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// 1-based page number, used as the cursor for the next request.
    pub number: u32,
    pub items: Vec<T>,
    pub has_more: bool,
    pub total_count: u64,
}

/// Pages loaded so far, in load order. The flat list is always derived.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedData<T> {
    pages: Vec<Page<T>>,
}

impl<T> Default for PagedData<T> {
    fn default() -> Self {
        Self { pages: Vec::new() }
    }
}

impl<T> PagedData<T> {
    pub fn new(pages: Vec<Page<T>>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[Page<T>] {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut [Page<T>] {
        &mut self.pages
    }

    pub fn push(&mut self, page: Page<T>) {
        self.pages.push(page);
    }

    pub fn has_more(&self) -> bool {
        self.pages.last().is_some_and(|page| page.has_more)
    }

    pub fn next_page_number(&self) -> Option<u32> {
        match self.pages.last() {
            None => Some(1),
            Some(page) if page.has_more => Some(page.number + 1),
            Some(_) => None,
        }
    }

    pub fn total_count(&self) -> u64 {
        self.pages.last().map_or(0, |page| page.total_count)
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, items: Vec<u32>, has_more: bool) -> Page<u32> {
        Page {
            number,
            items,
            has_more,
            total_count: 5,
        }
    }

    #[test]
    fn cursor_follows_last_page() {
        let mut data = PagedData::default();
        assert_eq!(data.next_page_number(), Some(1));
        data.push(page(1, vec![1, 2], true));
        assert_eq!(data.next_page_number(), Some(2));
        data.push(page(2, vec![3], false));
        assert_eq!(data.next_page_number(), None);
        assert!(!data.has_more());
        assert_eq!(data.items().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(data.len(), 3);
        assert_eq!(data.total_count(), 5);
    }
}
