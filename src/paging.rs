use serde::{Deserialize, Serialize};

pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw `?page=&size=` query. Unparseable values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub size: u32,
}

impl Paging {
    pub fn new(page: u32, size: u32) -> Paging {
        Paging {
            page: page.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn from_query(query: &PageQuery, default_size: u32) -> Paging {
        fn positive(raw: Option<&String>) -> Option<u32> {
            raw?.trim().parse::<u32>().ok().filter(|n| *n > 0)
        }

        Paging::new(
            positive(query.page.as_ref()).unwrap_or(1),
            positive(query.size.as_ref()).unwrap_or(default_size),
        )
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.size as i64
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        let total = total.max(0) as u64;
        PageMeta {
            total,
            page: self.page,
            size: self.size,
            total_pages: total.div_ceil(self.size as u64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub total_pages: u64,
}
