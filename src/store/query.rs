use serde_json::Value as JsonValue;

const DEFAULT_LIMIT: usize = 100;

/// Equality filters, ordering and paging for [`DbCollection::query`](super::DbCollection::query).
#[derive(Debug, Clone)]
pub struct Query {
    filters: Vec<(String, JsonValue)>,
    order_by: Vec<(String, bool)>,
    limit: usize,
    offset: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    /// Keep rows whose `key` column equals `value`.
    pub fn with_filter<V: Into<JsonValue>>(
        mut self,
        key: &str,
        value: V,
    ) -> Self {
        self.filters.push((key.to_string(), value.into()));
        self
    }

    /// Order by `key`, descending when `rev`.
    pub fn with_order(
        mut self,
        key: &str,
        rev: bool,
    ) -> Self {
        self.order_by.push((key.to_string(), rev));
        self
    }

    pub fn with_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_offset(
        mut self,
        offset: usize,
    ) -> Self {
        self.offset = offset;
        self
    }

    pub fn filters(&self) -> &[(String, JsonValue)] {
        &self.filters
    }

    pub fn order_by(&self) -> &[(String, bool)] {
        &self.order_by
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::Query;

    #[test]
    fn test_builder() {
        let q = Query::new().with_filter("sid", "s1").with_order("timestamp", false).with_limit(0).with_offset(20);
        assert_eq!(q.filters().len(), 1);
        assert_eq!(q.order_by()[0], ("timestamp".to_string(), false));
        assert_eq!(q.limit(), 1);
        assert_eq!(q.offset(), 20);
    }
}
