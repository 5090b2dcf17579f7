use std::{
    cmp::Ordering,
    sync::{PoisonError, RwLock},
};

use serde_json::Value as JsonValue;

use crate::{
    ChatflowError, Result,
    store::{DbCollection, PageData, query::Query},
};

use super::DbDocument;

/// In-memory collection, rows kept in insertion order.
#[derive(Debug)]
pub struct Collect<T> {
    name: String,
    rows: RwLock<Vec<T>>,
}

impl<T> Collect<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: RwLock::new(Vec::new()),
        }
    }
}

fn compare(
    a: Option<&JsonValue>,
    b: Option<&JsonValue>,
) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Null) | None, Some(JsonValue::Null) | None) => Ordering::Equal,
        (Some(JsonValue::Null) | None, _) => Ordering::Less,
        (_, Some(JsonValue::Null) | None) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.iter().any(|r| r.id() == id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.iter().find(|r| r.id() == id).cloned().ok_or(ChatflowError::Store(format!("{}: '{}' not found", self.name, id)))
    }

    fn query(
        &self,
        q: &Query,
    ) -> Result<PageData<Self::Item>> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);

        let mut matched = Vec::new();
        for row in rows.iter() {
            let doc = row.doc()?;
            if q.filters().iter().all(|(k, v)| doc.get(k) == Some(v)) {
                matched.push((doc, row.clone()));
            }
        }

        if !q.order_by().is_empty() {
            matched.sort_by(|(a, _), (b, _)| {
                for (key, rev) in q.order_by() {
                    let ord = compare(a.get(key), b.get(key));
                    let ord = if *rev {
                        ord.reverse()
                    } else {
                        ord
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let count = matched.len();
        let rows = matched.into_iter().skip(q.offset()).take(q.limit()).map(|(_, row)| row).collect();

        Ok(PageData {
            count,
            page_num: q.offset() / q.limit() + 1,
            page_count: count.div_ceil(q.limit()),
            page_size: q.limit(),
            rows,
        })
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if rows.iter().any(|r| r.id() == data.id()) {
            return Err(ChatflowError::Store(format!("{}: '{}' already exists", self.name, data.id())));
        }
        rows.push(data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        match rows.iter_mut().find(|r| r.id() == data.id()) {
            Some(row) => {
                *row = data.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let before = rows.len();
        rows.retain(|r| r.id() != id);
        Ok(rows.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::Collect;
    use crate::store::{DbCollection, data::Log, query::Query};

    fn log(
        id: &str,
        sid: &str,
        timestamp: i64,
    ) -> Log {
        Log {
            id: id.to_string(),
            sid: sid.to_string(),
            nid: "n".to_string(),
            content: format!("line {}", id),
            timestamp,
        }
    }

    #[test]
    fn test_crud() {
        let c = Collect::new("logs");
        assert!(c.create(&log("1", "s1", 1)).unwrap());
        assert!(c.create(&log("1", "s1", 1)).is_err());
        assert!(c.exists("1").unwrap());
        assert!(c.find("2").is_err());

        let mut l = c.find("1").unwrap();
        l.content = "changed".to_string();
        assert!(c.update(&l).unwrap());
        assert_eq!(c.find("1").unwrap().content, "changed");
        assert!(!c.update(&log("9", "s1", 1)).unwrap());

        assert!(c.delete("1").unwrap());
        assert!(!c.exists("1").unwrap());
    }

    #[test]
    fn test_query_filter_order_page() {
        let c = Collect::new("logs");
        for (id, sid, ts) in [("a", "s1", 3), ("b", "s2", 1), ("c", "s1", 1), ("d", "s1", 2)] {
            c.create(&log(id, sid, ts)).unwrap();
        }

        let page = c.query(&Query::new().with_filter("sid", "s1").with_order("timestamp", false)).unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["c", "d", "a"]);

        let page = c.query(&Query::new().with_filter("sid", "s1").with_order("timestamp", true).with_limit(2).with_offset(2)).unwrap();
        assert_eq!(page.page_num, 2);
        assert_eq!(page.page_count, 2);
        assert_eq!(page.rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["c"]);
    }
}
