use pmem_addresses::PageSizeClass;

/// Runtime configuration of a [`PmemDevice`](crate::PmemDevice).
///
/// ```rust
/// # use pmem_rogue::PmemConfig;
/// # use pmem_addresses::PageSizeClass;
/// const CONFIG: PmemConfig = PmemConfig::new()
///     .with_page_size(PageSizeClass::Size2M)
///     .with_writable(true);
/// assert_eq!(CONFIG.page_size(), PageSizeClass::Size2M);
/// assert!(PmemConfig::default().page_size() == PageSizeClass::Size4K);
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PmemConfig {
    page_size: PageSizeClass,
    writable: bool,
}

impl PmemConfig {
    /// 4 KiB rogue pages, read-only.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            page_size: PageSizeClass::Size4K,
            writable: false,
        }
    }

    /// Size of the rogue page. Only 4 KiB and 2 MiB are accepted by the mapper.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: PageSizeClass) -> Self {
        self.page_size = page_size;
        self
    }

    /// Allow [`PmemDevice::write`](crate::PmemDevice::write).
    #[must_use]
    pub const fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    #[must_use]
    pub const fn page_size(&self) -> PageSizeClass {
        self.page_size
    }

    #[must_use]
    pub const fn writable(&self) -> bool {
        self.writable
    }
}
